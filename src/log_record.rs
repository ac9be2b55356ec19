//! Log record representation.
//!
//! [`LogRecord`] is the producer-supplied event handed to
//! [`DatadogHandler`](crate::DatadogHandler). It captures the level, logger
//! name and message together with call-site metadata, open-ended extra
//! attributes and optional exception or stack payloads.

use std::collections::BTreeMap;
use std::fmt;
use std::thread::{self, ThreadId};
use std::time::SystemTime;

use serde_json::Value;

use crate::exception_schema::{ExceptionPayload, StackTracePayload};
use crate::level::Level;

/// Additional context associated with a log record.
#[derive(Clone, Debug)]
pub struct RecordMetadata {
    /// Rust module path where the log call originated.
    pub module_path: String,
    /// Source file path for the log call.
    pub filename: String,
    /// Line number in the source file.
    pub line_number: u32,
    /// Time the record was created.
    pub timestamp: SystemTime,
    /// ID of the thread that created the record.
    pub thread_id: ThreadId,
    /// Name of the thread that created the record (if any).
    pub thread_name: Option<String>,
    /// ID of the process that created the record.
    pub process_id: u32,
    /// Caller-supplied attributes, passed through to the wire untouched.
    pub key_values: BTreeMap<String, Value>,
}

impl RecordMetadata {
    /// Capture timestamp and thread info from the current execution context.
    fn capture_runtime() -> (SystemTime, ThreadId, Option<String>) {
        let current = thread::current();
        (
            SystemTime::now(),
            current.id(),
            current.name().map(ToString::to_string),
        )
    }
}

impl Default for RecordMetadata {
    fn default() -> Self {
        let (timestamp, thread_id, thread_name) = Self::capture_runtime();
        Self {
            module_path: String::new(),
            filename: String::new(),
            line_number: 0,
            timestamp,
            thread_id,
            thread_name,
            process_id: std::process::id(),
            key_values: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct LogRecord {
    /// Name of the logger that created this record.
    pub logger: String,
    /// Record severity.
    pub level: Level,
    /// The log message content.
    pub message: String,
    /// Contextual metadata for the record.
    pub metadata: RecordMetadata,
    /// Exception being reported, if any.
    pub exception: Option<ExceptionPayload>,
    /// Call-stack snapshot, if requested by the caller.
    pub stack: Option<StackTracePayload>,
}

impl LogRecord {
    /// Construct a new log record from logger `name`, `level`, and `message`.
    pub fn new(logger: &str, level: Level, message: &str) -> Self {
        Self::with_metadata(logger, level, message, RecordMetadata::default())
    }

    /// Construct a log record from caller-supplied metadata.
    ///
    /// The metadata is kept as given, including its timestamp and thread
    /// details. Start from [`RecordMetadata::default`] to capture them from
    /// the current thread.
    pub fn with_metadata(
        logger: &str,
        level: Level,
        message: &str,
        metadata: RecordMetadata,
    ) -> Self {
        Self {
            logger: logger.to_owned(),
            level,
            message: message.to_owned(),
            metadata,
            exception: None,
            stack: None,
        }
    }

    /// Attach an extra attribute.
    pub fn with_key_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.key_values.insert(key.into(), value.into());
        self
    }

    pub fn with_exception(mut self, exception: ExceptionPayload) -> Self {
        self.exception = Some(exception);
        self
    }

    pub fn with_stack(mut self, stack: StackTracePayload) -> Self {
        self.stack = Some(stack);
        self
    }

    pub fn exception_payload(&self) -> Option<&ExceptionPayload> {
        self.exception.as_ref()
    }

    pub fn stack_payload(&self) -> Option<&StackTracePayload> {
        self.stack.as_ref()
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.level, self.message)
    }
}
