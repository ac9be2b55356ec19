//! Builder for [`DatadogHandler`].
//!
//! Every option is optional; unset options fall back to the environment or
//! the intake defaults when the handler is built.

use std::{fmt, sync::Arc, time::Duration};

use thiserror::Error;

use crate::{
    connection::{
        BackoffPolicy, Connector, DEFAULT_CONNECT_TIMEOUT, DEFAULT_INTAKE_HOST,
        DEFAULT_RETRY_FACTOR, DEFAULT_RETRY_MAX, DEFAULT_RETRY_START, DEFAULT_WRITE_RETRY_PAUSE,
        MAX_CONFIGURED_DELAY, TcpConnector, TcpTransport,
    },
    formatter::{RecordFormatter, SharedFormatter},
    level::Level,
    rate_limited_warner::DEFAULT_WARN_INTERVAL,
    wire::{DEFAULT_SOURCE, DEFAULT_SOURCE_CATEGORY, WireConfig},
};

use super::{DatadogHandler, ErrorReporter};

/// Environment variable consulted when no API key is configured.
pub const API_KEY_ENV: &str = "DD_API_KEY";

/// Errors that may occur while building a handler.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandlerBuildError {
    #[error("invalid handler configuration: {0}")]
    InvalidConfig(String),
}

macro_rules! ensure_positive {
    ($value:expr, $field:expr) => {{
        if $value.is_zero() {
            Err(HandlerBuildError::InvalidConfig(format!(
                "{} must be greater than zero",
                $field
            )))
        } else {
            Ok($value)
        }
    }};
}

macro_rules! option_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

macro_rules! string_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: impl Into<String>) -> Self {
            self.$field = Some(value.into());
            self
        }
    };
}

/// Fully resolved handler settings.
#[derive(Clone, Debug)]
pub struct HandlerConfig {
    pub level: Level,
    pub wire: WireConfig,
    pub transport: TcpTransport,
    pub connect_timeout: Duration,
    pub blocking: bool,
    pub backoff: BackoffPolicy,
    pub write_retry_pause: Duration,
    pub warn_interval: Duration,
}

impl HandlerConfig {
    /// Default settings, taking the API key from `DD_API_KEY` and the host
    /// from the machine's hostname.
    pub fn from_env() -> Self {
        Self {
            level: Level::default(),
            wire: WireConfig::new(env_api_key(), local_hostname()),
            transport: TcpTransport::intake(DEFAULT_INTAKE_HOST, true),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            blocking: false,
            backoff: BackoffPolicy::default(),
            write_retry_pause: DEFAULT_WRITE_RETRY_PAUSE,
            warn_interval: DEFAULT_WARN_INTERVAL,
        }
    }

    /// Connector dialling the configured transport.
    pub fn connector(&self) -> TcpConnector {
        TcpConnector {
            transport: self.transport.clone(),
            connect_timeout: self.connect_timeout,
            blocking: self.blocking,
        }
    }
}

fn env_api_key() -> String {
    std::env::var(API_KEY_ENV).unwrap_or_default()
}

fn local_hostname() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

fn seconds(value: f64, field: &str) -> Result<Duration, HandlerBuildError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(HandlerBuildError::InvalidConfig(format!(
            "{field} must be a positive number of seconds"
        )));
    }
    Duration::try_from_secs_f64(value)
        .map_err(|err| HandlerBuildError::InvalidConfig(format!("{field}: {err}")))
        .and_then(|duration| at_most_limit(duration, field))
}

fn at_most_limit(value: Duration, field: &str) -> Result<Duration, HandlerBuildError> {
    if value > MAX_CONFIGURED_DELAY {
        return Err(HandlerBuildError::InvalidConfig(format!(
            "{field} must not exceed {MAX_CONFIGURED_DELAY:?}, got {value:?}"
        )));
    }
    Ok(value)
}

fn non_empty(value: Option<String>, field: &str) -> Result<Option<String>, HandlerBuildError> {
    match value {
        Some(value) if value.trim().is_empty() => Err(HandlerBuildError::InvalidConfig(format!(
            "{field} must not be empty"
        ))),
        other => Ok(other),
    }
}

/// Builder for constructing [`DatadogHandler`] instances.
#[derive(Clone, Default)]
pub struct DatadogHandlerBuilder {
    api_key: Option<String>,
    source_category: Option<String>,
    source: Option<String>,
    service: Option<String>,
    host: Option<String>,
    intake_host: Option<String>,
    port: Option<u16>,
    ssl: Option<bool>,
    blocking: Option<bool>,
    retry_start: Option<f64>,
    retry_max: Option<f64>,
    retry_factor: Option<f64>,
    connect_timeout: Option<Duration>,
    write_retry_pause: Option<Duration>,
    warn_interval: Option<Duration>,
    level: Option<Level>,
    formatter: Option<SharedFormatter>,
    reporter: Option<Arc<dyn ErrorReporter>>,
}

impl DatadogHandlerBuilder {
    /// Create a builder with every option unset.
    pub fn new() -> Self {
        Self::default()
    }

    string_setter!(
        /// Set the API key prefixed to every line. Defaults to `DD_API_KEY`.
        with_api_key,
        api_key
    );
    string_setter!(
        /// Set the `ddsourcecategory` value.
        with_source_category,
        source_category
    );
    string_setter!(
        /// Set the `ddsource` value.
        with_source,
        source
    );
    string_setter!(
        /// Set the `service` value. Defaults to each record's logger name.
        with_service,
        service
    );
    string_setter!(
        /// Set the `host` value. Defaults to the machine's hostname.
        with_host,
        host
    );
    string_setter!(
        /// Override the intake host name.
        with_intake_host,
        intake_host
    );
    option_setter!(
        /// Override the intake port. Defaults to 10516 with TLS, 10514 without.
        with_port,
        port,
        u16
    );
    option_setter!(
        /// Enable or disable TLS. Enabled by default.
        with_ssl,
        ssl,
        bool
    );
    option_setter!(
        /// Keep the socket in blocking mode after connecting.
        with_blocking,
        blocking,
        bool
    );
    option_setter!(
        /// Set the first reconnect delay in seconds.
        with_retry_start,
        retry_start,
        f64
    );
    option_setter!(
        /// Set the reconnect delay cap in seconds.
        with_retry_max,
        retry_max,
        f64
    );
    option_setter!(
        /// Set the multiplier applied to the delay after each failure.
        with_retry_factor,
        retry_factor,
        f64
    );
    option_setter!(with_connect_timeout, connect_timeout, Duration);
    option_setter!(
        /// Set the pause between failed writes.
        with_write_retry_pause,
        write_retry_pause,
        Duration
    );
    option_setter!(
        /// Set the minimum interval between repeated retry warnings.
        with_warn_interval,
        warn_interval,
        Duration
    );
    option_setter!(
        /// Set the minimum level passed by [`DatadogHandler::handle`].
        with_level,
        level,
        Level
    );

    /// Use `formatter` to turn records into payloads.
    pub fn with_formatter<F>(mut self, formatter: F) -> Self
    where
        F: RecordFormatter + 'static,
    {
        self.formatter = Some(SharedFormatter::new(formatter));
        self
    }

    /// Hand emit failures to `reporter`.
    pub fn with_reporter<R>(mut self, reporter: R) -> Self
    where
        R: ErrorReporter + 'static,
    {
        self.reporter = Some(Arc::new(reporter));
        self
    }

    fn validate(&self) -> Result<BackoffPolicy, HandlerBuildError> {
        if self.port == Some(0) {
            return Err(HandlerBuildError::InvalidConfig(
                "port must be greater than zero".into(),
            ));
        }
        if let Some(timeout) = self.connect_timeout {
            ensure_positive!(timeout, "connect_timeout")?;
            at_most_limit(timeout, "connect_timeout")?;
        }
        if let Some(pause) = self.write_retry_pause {
            ensure_positive!(pause, "write_retry_pause")?;
            at_most_limit(pause, "write_retry_pause")?;
        }
        if let Some(interval) = self.warn_interval {
            ensure_positive!(interval, "warn_interval")?;
            at_most_limit(interval, "warn_interval")?;
        }
        let start = match self.retry_start {
            Some(value) => seconds(value, "retry_start")?,
            None => DEFAULT_RETRY_START,
        };
        let max = match self.retry_max {
            Some(value) => seconds(value, "retry_max")?,
            None => DEFAULT_RETRY_MAX,
        };
        if start > max {
            return Err(HandlerBuildError::InvalidConfig(format!(
                "retry_start ({start:?}) must not exceed retry_max ({max:?})"
            )));
        }
        let factor = self.retry_factor.unwrap_or(DEFAULT_RETRY_FACTOR);
        if !factor.is_finite() || factor < 1.0 {
            return Err(HandlerBuildError::InvalidConfig(format!(
                "retry_factor must be at least 1.0, got {factor}"
            )));
        }
        Ok(BackoffPolicy { start, max, factor })
    }

    fn build_wire(&self) -> Result<WireConfig, HandlerBuildError> {
        let source_category = non_empty(self.source_category.clone(), "source_category")?;
        let host = non_empty(self.host.clone(), "host")?;
        Ok(WireConfig {
            api_key: self.api_key.clone().unwrap_or_else(env_api_key),
            source_category: source_category.unwrap_or_else(|| DEFAULT_SOURCE_CATEGORY.into()),
            source: self.source.clone().unwrap_or_else(|| DEFAULT_SOURCE.into()),
            service: self.service.clone(),
            host: host.unwrap_or_else(local_hostname),
        })
    }

    fn build_transport(&self) -> Result<TcpTransport, HandlerBuildError> {
        let intake_host = non_empty(self.intake_host.clone(), "intake_host")?
            .unwrap_or_else(|| DEFAULT_INTAKE_HOST.into());
        let mut transport = TcpTransport::intake(intake_host, self.ssl.unwrap_or(true));
        if let Some(port) = self.port {
            transport.port = port;
        }
        Ok(transport)
    }

    /// Validate the options and resolve them into a [`HandlerConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`HandlerBuildError::InvalidConfig`] when an option is out of
    /// range or empty.
    pub fn build_config(&self) -> Result<HandlerConfig, HandlerBuildError> {
        let backoff = self.validate()?;
        Ok(HandlerConfig {
            level: self.level.unwrap_or_default(),
            wire: self.build_wire()?,
            transport: self.build_transport()?,
            connect_timeout: self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            blocking: self.blocking.unwrap_or(false),
            backoff,
            write_retry_pause: self.write_retry_pause.unwrap_or(DEFAULT_WRITE_RETRY_PAUSE),
            warn_interval: self.warn_interval.unwrap_or(DEFAULT_WARN_INTERVAL),
        })
    }

    /// Build a handler dialling the configured intake.
    ///
    /// # Errors
    ///
    /// See [`build_config`](Self::build_config).
    pub fn build(self) -> Result<DatadogHandler, HandlerBuildError> {
        let config = self.build_config()?;
        let connector = config.connector();
        Ok(self.finish(config, connector))
    }

    /// Build a handler that opens connections through `connector`.
    ///
    /// # Errors
    ///
    /// See [`build_config`](Self::build_config).
    pub fn build_with_connector<C: Connector>(
        self,
        connector: C,
    ) -> Result<DatadogHandler<C>, HandlerBuildError> {
        let config = self.build_config()?;
        Ok(self.finish(config, connector))
    }

    fn finish<C: Connector>(self, config: HandlerConfig, connector: C) -> DatadogHandler<C> {
        let mut handler = DatadogHandler::with_connector(config, connector);
        if let Some(formatter) = self.formatter {
            handler = handler.with_formatter(formatter);
        }
        if let Some(reporter) = self.reporter {
            handler = handler.with_reporter(reporter);
        }
        handler
    }
}

impl fmt::Debug for DatadogHandlerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatadogHandlerBuilder")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("source_category", &self.source_category)
            .field("source", &self.source)
            .field("service", &self.service)
            .field("host", &self.host)
            .field("intake_host", &self.intake_host)
            .field("port", &self.port)
            .field("ssl", &self.ssl)
            .field("blocking", &self.blocking)
            .field("retry_start", &self.retry_start)
            .field("retry_max", &self.retry_max)
            .field("retry_factor", &self.retry_factor)
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}
