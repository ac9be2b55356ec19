//! Reporting of records the handler failed to emit.

use crate::log_record::LogRecord;

use super::EmitError;

/// `log` target used for failure reports and internal diagnostics.
pub const REPORT_TARGET: &str = "ddlogging";

/// Receives records that could not be emitted.
///
/// [`DatadogHandler::emit`](super::DatadogHandler::emit) never returns an
/// error; every failure is handed to the reporter instead. Closures of the
/// right shape implement this trait.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, record: &LogRecord, error: &EmitError);
}

impl<F> ErrorReporter for F
where
    F: Fn(&LogRecord, &EmitError) + Send + Sync,
{
    fn report(&self, record: &LogRecord, error: &EmitError) {
        self(record, error)
    }
}

/// Reports failures through the `log` facade at error level.
#[derive(Copy, Clone, Debug, Default)]
pub struct LogErrorReporter;

impl ErrorReporter for LogErrorReporter {
    fn report(&self, record: &LogRecord, error: &EmitError) {
        log::error!(
            target: REPORT_TARGET,
            "failed to emit {} record from logger {:?}: {error}",
            record.level,
            record.logger
        );
    }
}
