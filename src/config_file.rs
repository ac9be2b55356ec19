//! Handler configuration from INI files.
//!
//! Options live in a `[ddlogging]` section and use the same names as the
//! builder setters without the `with_` prefix:
//!
//! ```ini
//! [ddlogging]
//! api_key = abc123
//! service = checkout
//! ssl = yes
//! retry_max = 10
//! level = WARNING
//! ```
//!
//! Durations are given in seconds. Unknown keys are rejected so typos do not
//! silently fall back to defaults.

use std::{fs, io::ErrorKind, path::Path, time::Duration};

use ini::Ini;
use thiserror::Error;

use crate::{handler::DatadogHandlerBuilder, level::Level};

/// Name of the section holding handler options.
pub const SECTION: &str = "ddlogging";

/// Errors raised while loading handler configuration from INI text.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("{path} doesn't exist")]
    NotFound { path: String },
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{origin} is invalid: {message}")]
    Parse { origin: String, message: String },
    #[error("{origin} has no [ddlogging] section")]
    MissingSection { origin: String },
    #[error("unknown option {0:?}")]
    UnknownKey(String),
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Read `path` and convert its `[ddlogging]` section into a builder.
///
/// # Errors
///
/// Fails when the file cannot be read or parsed, lacks the section, or
/// contains an unknown option or malformed value.
pub fn load_builder(path: impl AsRef<Path>) -> Result<DatadogHandlerBuilder, ConfigFileError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => ConfigFileError::NotFound {
            path: display.clone(),
        },
        _ => ConfigFileError::Io {
            path: display.clone(),
            source: err,
        },
    })?;
    parse_builder(&display, &text)
}

/// Convert INI text into a builder.
///
/// # Errors
///
/// See [`load_builder`].
pub fn builder_from_str(text: &str) -> Result<DatadogHandlerBuilder, ConfigFileError> {
    parse_builder("<string>", text)
}

fn parse_builder(origin: &str, text: &str) -> Result<DatadogHandlerBuilder, ConfigFileError> {
    let ini = Ini::load_from_str(text).map_err(|err| ConfigFileError::Parse {
        origin: origin.to_owned(),
        message: err.to_string(),
    })?;
    let props = ini
        .section(Some(SECTION))
        .ok_or_else(|| ConfigFileError::MissingSection {
            origin: origin.to_owned(),
        })?;
    props
        .iter()
        .try_fold(DatadogHandlerBuilder::new(), |builder, (key, value)| {
            apply_option(builder, key, value)
        })
}

fn apply_option(
    builder: DatadogHandlerBuilder,
    key: &str,
    value: &str,
) -> Result<DatadogHandlerBuilder, ConfigFileError> {
    let value = value.trim();
    let builder = match key.trim().to_ascii_lowercase().as_str() {
        "api_key" => builder.with_api_key(value),
        "source_category" => builder.with_source_category(value),
        "source" => builder.with_source(value),
        "service" => builder.with_service(value),
        "host" => builder.with_host(value),
        "intake_host" => builder.with_intake_host(value),
        "port" => builder.with_port(parse_value(key, value)?),
        "ssl" => builder.with_ssl(parse_bool(key, value)?),
        "blocking" => builder.with_blocking(parse_bool(key, value)?),
        "retry_start" => builder.with_retry_start(parse_value(key, value)?),
        "retry_max" => builder.with_retry_max(parse_value(key, value)?),
        "retry_factor" => builder.with_retry_factor(parse_value(key, value)?),
        "connect_timeout" => builder.with_connect_timeout(parse_seconds(key, value)?),
        "write_retry_pause" => builder.with_write_retry_pause(parse_seconds(key, value)?),
        "warn_interval" => builder.with_warn_interval(parse_seconds(key, value)?),
        "level" => builder.with_level(parse_value::<Level>(key, value)?),
        _ => return Err(ConfigFileError::UnknownKey(key.to_owned())),
    };
    Ok(builder)
}

fn invalid(key: &str, value: &str, reason: impl ToString) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        key: key.to_owned(),
        value: value.to_owned(),
        reason: reason.to_string(),
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigFileError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|err| invalid(key, value, err))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigFileError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Ok(true),
        "0" | "no" | "false" | "off" => Ok(false),
        _ => Err(invalid(key, value, "expected a boolean")),
    }
}

fn parse_seconds(key: &str, value: &str) -> Result<Duration, ConfigFileError> {
    let secs: f64 = parse_value(key, value)?;
    Duration::try_from_secs_f64(secs).map_err(|err| invalid(key, value, err))
}
