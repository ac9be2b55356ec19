//! Ship structured log records to the Datadog TCP log intake.
//!
//! A [`DatadogHandler`] turns each [`LogRecord`] into a JSON object, adds the
//! Datadog routing keys and writes `<api_key> <json>\n` over a persistent
//! TCP connection, optionally wrapped in TLS. Failed connects back off
//! exponentially and failed writes are retried until they succeed or the
//! handler is closed.
//!
//! ```no_run
//! use ddlogging::{DatadogHandler, Level, LogRecord};
//!
//! let handler = DatadogHandler::builder()
//!     .with_api_key("my-api-key")
//!     .with_service("checkout")
//!     .build()?;
//! handler.handle(&LogRecord::new("checkout.payments", Level::Error, "card declined"));
//! handler.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config_file;
pub mod connection;
pub mod exception_schema;
pub mod formatter;
pub mod handler;
mod level;
#[cfg(feature = "log-compat")]
pub mod log_compat;
mod log_record;
mod rate_limited_warner;
pub mod wire;

#[cfg(test)]
mod test_utils;

pub use config_file::{ConfigFileError, builder_from_str, load_builder};
pub use connection::{BackoffPolicy, ConnectionManager, ConnectionStatus, SendError};
pub use exception_schema::{ExceptionPayload, StackFrame, StackTracePayload};
pub use formatter::{
    DictFormatter, MessageFormatter, NormalizedFields, RecordFormatter, SharedFormatter, normalize,
};
pub use handler::{
    DatadogHandler, DatadogHandlerBuilder, EmitError, ErrorReporter, HandlerBuildError,
    HandlerConfig, LogErrorReporter,
};
pub use level::{Level, ParseLevelError};
pub use log_record::{LogRecord, RecordMetadata};
pub use rate_limited_warner::{DEFAULT_WARN_INTERVAL, RateLimitedWarner};
pub use wire::{EncodeError, WireConfig};
