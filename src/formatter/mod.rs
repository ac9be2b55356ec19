//! Record formatters.
//!
//! A [`RecordFormatter`] is the first stage of the emit pipeline: it turns a
//! [`LogRecord`] into a JSON value. The wire encoder accepts either a string
//! (wrapped into `{"message": ...}`) or an object; the default
//! [`DictFormatter`] always produces an object via [`normalize`].

use std::{fmt, path::Path, sync::Arc, time::UNIX_EPOCH};

use chrono::{DateTime, Local};
use serde_json::{Map, Value};

use crate::log_record::LogRecord;

mod exception;

pub use exception::{format_exception_payload, format_stack_frame, format_stack_payload};

/// Field map produced by [`normalize`].
pub type NormalizedFields = Map<String, Value>;

/// `strftime` pattern for the `asctime` field.
pub const ASCTIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// Trait for turning log records into JSON values.
///
/// Implementors must be thread-safe (`Send + Sync`) so formatters can be
/// shared across threads. Closures of the right shape implement it too.
pub trait RecordFormatter: Send + Sync {
    fn format(&self, record: &LogRecord) -> Value;
}

impl<F> RecordFormatter for F
where
    F: Fn(&LogRecord) -> Value + Send + Sync,
{
    fn format(&self, record: &LogRecord) -> Value {
        self(record)
    }
}

/// Shared formatter trait object used by the handler.
#[derive(Clone)]
pub struct SharedFormatter {
    inner: Arc<dyn RecordFormatter>,
}

impl SharedFormatter {
    /// Create a shared formatter from an owned formatter implementation.
    pub fn new<F>(formatter: F) -> Self
    where
        F: RecordFormatter + 'static,
    {
        Self {
            inner: Arc::new(formatter),
        }
    }

    /// Wrap an existing shared formatter trait object.
    pub fn from_arc(inner: Arc<dyn RecordFormatter>) -> Self {
        Self { inner }
    }

    pub fn format(&self, record: &LogRecord) -> Value {
        self.inner.format(record)
    }
}

impl Default for SharedFormatter {
    fn default() -> Self {
        Self::new(DictFormatter)
    }
}

impl fmt::Debug for SharedFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedFormatter(<dyn RecordFormatter>)")
    }
}

/// Emits every record attribute as a JSON object. The default formatter.
#[derive(Copy, Clone, Debug, Default)]
pub struct DictFormatter;

impl RecordFormatter for DictFormatter {
    fn format(&self, record: &LogRecord) -> Value {
        Value::Object(normalize(record))
    }
}

/// Emits only the record message as a plain string.
#[derive(Copy, Clone, Debug, Default)]
pub struct MessageFormatter;

impl RecordFormatter for MessageFormatter {
    fn format(&self, record: &LogRecord) -> Value {
        Value::String(record.message.clone())
    }
}

/// Flatten a record into a field map.
///
/// Standard attributes are emitted under their conventional names. The
/// creation time becomes the formatted `asctime`, and exception or stack
/// payloads become their rendered text under `exc_info` and `stack_info`.
/// Absent values are omitted. Extra attributes are added under their own key
/// unless it collides with a standard attribute.
pub fn normalize(record: &LogRecord) -> NormalizedFields {
    let meta = &record.metadata;
    let mut fields = Map::new();

    fields.insert("name".into(), record.logger.clone().into());
    fields.insert("msg".into(), record.message.clone().into());
    fields.insert("message".into(), record.message.clone().into());
    fields.insert("levelname".into(), record.level.as_str().into());
    fields.insert("levelno".into(), record.level.levelno().into());

    if !meta.filename.is_empty() {
        let basename = Path::new(&meta.filename)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| meta.filename.clone());
        fields.insert("pathname".into(), meta.filename.clone().into());
        fields.insert("filename".into(), basename.into());
        fields.insert("lineno".into(), meta.line_number.into());
    }
    if !meta.module_path.is_empty() {
        fields.insert("module".into(), meta.module_path.clone().into());
    }

    let since_epoch = meta.timestamp.duration_since(UNIX_EPOCH).unwrap_or_default();
    fields.insert("created".into(), since_epoch.as_secs_f64().into());
    fields.insert("msecs".into(), f64::from(since_epoch.subsec_millis()).into());
    fields.insert("asctime".into(), format_time(record).into());

    fields.insert("thread".into(), format!("{:?}", meta.thread_id).into());
    if let Some(name) = &meta.thread_name {
        fields.insert("threadName".into(), name.clone().into());
    }
    fields.insert("process".into(), meta.process_id.into());

    if let Some(exception) = record
        .exception_payload()
        .filter(|exception| !exception.is_empty())
    {
        fields.insert("exc_info".into(), format_exception_payload(exception).into());
    }
    if let Some(stack) = record.stack_payload().filter(|stack| !stack.is_empty()) {
        fields.insert("stack_info".into(), format_stack_payload(stack).into());
    }

    for (key, value) in &meta.key_values {
        if !fields.contains_key(key) {
            fields.insert(key.clone(), value.clone());
        }
    }
    fields
}

/// Render the record creation time in local time using [`ASCTIME_FORMAT`].
pub fn format_time(record: &LogRecord) -> String {
    DateTime::<Local>::from(record.metadata.timestamp)
        .format(ASCTIME_FORMAT)
        .to_string()
}
