//! Compatibility bridge for the Rust `log` crate.
//!
//! [`DatadogLogAdapter`] implements `log::Log` and forwards records from the
//! `log` macros into a [`DatadogHandler`]. Call [`install`] once at startup to
//! make it the global logger.

use std::{borrow::Cow, sync::Arc};

use log::{
    LevelFilter, Metadata, Record, SetLoggerError,
    kv::{self, VisitSource},
};
use serde_json::Value;

use crate::{
    connection::{Connector, TcpConnector},
    handler::{DatadogHandler, REPORT_TARGET},
    level::Level,
    log_record::{LogRecord, RecordMetadata},
};

/// Adapter implementing the Rust `log::Log` trait on top of a handler.
pub struct DatadogLogAdapter<C: Connector = TcpConnector> {
    handler: Arc<DatadogHandler<C>>,
}

impl<C: Connector> DatadogLogAdapter<C> {
    pub fn new(handler: Arc<DatadogHandler<C>>) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &Arc<DatadogHandler<C>> {
        &self.handler
    }
}

fn normalise_target(target: &str) -> Cow<'_, str> {
    if target.contains("::") {
        Cow::Owned(target.replace("::", "."))
    } else {
        Cow::Borrowed(target)
    }
}

/// Records from this crate would feed its own retry diagnostics back into
/// the connection they describe.
fn is_internal(target: &str) -> bool {
    target == REPORT_TARGET
        || target
            .strip_prefix(REPORT_TARGET)
            .is_some_and(|rest| rest.starts_with("::"))
}

fn level_filter(level: Level) -> LevelFilter {
    match level {
        Level::Trace => LevelFilter::Trace,
        Level::Debug => LevelFilter::Debug,
        Level::Info => LevelFilter::Info,
        Level::Warning => LevelFilter::Warn,
        Level::Error | Level::Critical => LevelFilter::Error,
    }
}

#[derive(Default)]
struct KeyValueCollector {
    pairs: Vec<(String, Value)>,
}

impl<'kvs> VisitSource<'kvs> for KeyValueCollector {
    fn visit_pair(&mut self, key: kv::Key<'kvs>, value: kv::Value<'kvs>) -> Result<(), kv::Error> {
        let json = if let Some(flag) = value.to_bool() {
            Value::Bool(flag)
        } else if let Some(int) = value.to_i64() {
            Value::from(int)
        } else if let Some(uint) = value.to_u64() {
            Value::from(uint)
        } else if let Some(float) = value.to_f64() {
            Value::from(float)
        } else {
            Value::String(value.to_string())
        };
        self.pairs.push((key.as_str().to_owned(), json));
        Ok(())
    }
}

/// Convert a `log` record into a [`LogRecord`].
///
/// The target becomes the logger name with `::` separators replaced by dots.
pub fn convert_record(record: &Record<'_>) -> LogRecord {
    let mut collector = KeyValueCollector::default();
    // Visiting only fails if the collector does; it never does.
    let _ = record.key_values().visit(&mut collector);

    let metadata = RecordMetadata {
        module_path: record.module_path().unwrap_or_default().to_owned(),
        filename: record.file().unwrap_or_default().to_owned(),
        line_number: record.line().unwrap_or(0),
        key_values: collector.pairs.into_iter().collect(),
        ..Default::default()
    };
    LogRecord::with_metadata(
        &normalise_target(record.target()),
        Level::from(record.level()),
        &record.args().to_string(),
        metadata,
    )
}

impl<C: Connector> log::Log for DatadogLogAdapter<C> {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        !is_internal(metadata.target()) && self.handler.is_enabled_for(metadata.level().into())
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.handler.handle(&convert_record(record));
    }

    fn flush(&self) {}
}

/// Install `handler` as the global `log` logger.
///
/// The global maximum level is set to the handler's threshold.
///
/// # Errors
///
/// Fails when a global logger has already been installed.
pub fn install<C>(handler: Arc<DatadogHandler<C>>) -> Result<(), SetLoggerError>
where
    C: Connector + 'static,
{
    let max_level = level_filter(handler.level());
    log::set_boxed_logger(Box::new(DatadogLogAdapter::new(handler)))?;
    log::set_max_level(max_level);
    Ok(())
}
