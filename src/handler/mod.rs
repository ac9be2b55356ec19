//! The Datadog logs handler.
//!
//! [`DatadogHandler`] ties the pipeline together: each record is formatted
//! by a [`RecordFormatter`](crate::formatter::RecordFormatter), encoded into
//! a wire line, and written through the [`ConnectionManager`]. Failures never
//! reach the caller; they are handed to an [`ErrorReporter`].

use std::{io, sync::Arc};

use thiserror::Error;

use crate::{
    connection::{ConnectionManager, Connector, SendError, TcpConnector},
    formatter::SharedFormatter,
    level::Level,
    log_record::LogRecord,
    rate_limited_warner::RateLimitedWarner,
    wire::{self, EncodeError, WireConfig},
};

mod builder;
mod reporter;


pub use builder::{API_KEY_ENV, DatadogHandlerBuilder, HandlerBuildError, HandlerConfig};
pub use reporter::{ErrorReporter, LogErrorReporter, REPORT_TARGET};

/// Why a record was not emitted.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Send(#[from] SendError),
}

/// Handler shipping records to the Datadog TCP log intake.
pub struct DatadogHandler<C: Connector = TcpConnector> {
    level: Level,
    formatter: SharedFormatter,
    wire: WireConfig,
    connection: ConnectionManager<C>,
    reporter: Arc<dyn ErrorReporter>,
}

impl DatadogHandler {
    /// Start building a handler.
    pub fn builder() -> DatadogHandlerBuilder {
        DatadogHandlerBuilder::new()
    }

    /// Construct a handler dialling the transport described by `config`.
    pub fn new(config: HandlerConfig) -> Self {
        let connector = config.connector();
        Self::with_connector(config, connector)
    }
}

impl<C: Connector> DatadogHandler<C> {
    /// Construct a handler that opens connections through `connector`.
    ///
    /// Transport settings in `config` are ignored; backoff, pause and
    /// routing settings still apply.
    pub fn with_connector(config: HandlerConfig, connector: C) -> Self {
        let connection = ConnectionManager::new(connector, config.backoff)
            .with_write_retry_pause(config.write_retry_pause)
            .with_warner(RateLimitedWarner::new(config.warn_interval));
        Self {
            level: config.level,
            formatter: SharedFormatter::default(),
            wire: config.wire,
            connection,
            reporter: Arc::new(LogErrorReporter),
        }
    }

    pub fn with_formatter(mut self, formatter: SharedFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn wire_config(&self) -> &WireConfig {
        &self.wire
    }

    pub fn connection(&self) -> &ConnectionManager<C> {
        &self.connection
    }

    pub fn is_enabled_for(&self, level: Level) -> bool {
        level >= self.level
    }

    /// Format and encode `record` into the exact bytes that would be sent.
    ///
    /// # Errors
    ///
    /// Fails when the formatter output is neither a string nor an object.
    pub fn prepare(&self, record: &LogRecord) -> Result<Vec<u8>, EncodeError> {
        wire::encode(self.formatter.format(record), record, &self.wire)
    }

    /// Format, encode and send `record`, blocking until it is delivered.
    ///
    /// # Errors
    ///
    /// Returns the encoding failure, or [`SendError::Closed`] when the
    /// handler is closed before delivery.
    pub fn try_emit(&self, record: &LogRecord) -> Result<(), EmitError> {
        let payload = self.prepare(record)?;
        self.connection.send(&payload)?;
        Ok(())
    }

    /// Emit `record`, routing any failure to the error reporter.
    pub fn emit(&self, record: &LogRecord) {
        if let Err(err) = self.try_emit(record) {
            self.reporter.report(record, &err);
        }
    }

    /// Emit `record` if its level passes the handler threshold.
    ///
    /// Returns whether the record was passed on to [`emit`](Self::emit).
    pub fn handle(&self, record: &LogRecord) -> bool {
        if !self.is_enabled_for(record.level) {
            return false;
        }
        self.emit(record);
        true
    }

    /// Close the connection. Sends blocked on other threads give up and
    /// report the record as undelivered.
    ///
    /// # Errors
    ///
    /// Propagates unexpected errors from shutting down the socket.
    pub fn close(&self) -> io::Result<()> {
        self.connection.close()
    }
}

impl<C: Connector> std::fmt::Debug for DatadogHandler<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatadogHandler")
            .field("level", &self.level)
            .field("service", &self.wire.service)
            .field("host", &self.wire.host)
            .field("connection", &self.connection)
            .finish()
    }
}
