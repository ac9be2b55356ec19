//! Wire encoding for the log intake.
//!
//! Every record travels as one line: the API key, a single space, a JSON
//! object, and a newline. Before serialisation the object is enriched with
//! routing metadata, overwriting any caller value under the same key so
//! routing cannot be spoofed by record attributes.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::{level::Level, log_record::LogRecord};

/// Default `ddsourcecategory` value.
pub const DEFAULT_SOURCE_CATEGORY: &str = "ddlogging";
/// Default `ddsource` value identifying this client.
pub const DEFAULT_SOURCE: &str = "rust";
/// Keys always written by [`encode`].
pub const ENRICHMENT_KEYS: [&str; 5] = ["ddsourcecategory", "ddsource", "service", "host", "status"];

const EXCERPT_LIMIT: usize = 120;

/// Routing metadata and credentials applied to every encoded line.
#[derive(Clone, Debug)]
pub struct WireConfig {
    pub api_key: String,
    pub source_category: String,
    pub source: String,
    /// Service name; the record's logger name is used when unset.
    pub service: Option<String>,
    pub host: String,
}

impl WireConfig {
    /// Configuration with default routing values for `api_key` and `host`.
    pub fn new(api_key: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            source_category: DEFAULT_SOURCE_CATEGORY.into(),
            source: DEFAULT_SOURCE.into(),
            service: None,
            host: host.into(),
        }
    }
}

/// Errors raised while turning a formatted record into wire bytes.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The formatter produced neither a string nor an object.
    #[error("cannot send the entry as it must be either a string or a map; provided entry: {0}")]
    InvalidPayloadShape(String),
    /// JSON serialisation failed.
    #[error("failed to serialise entry: {0}")]
    Json(#[from] serde_json::Error),
}

/// Map a level onto the intake `status` attribute.
///
/// Only `WARNING` and `ERROR`-or-above are distinguished; every other level
/// reports as `"info"`.
pub fn status_for(level: Level) -> &'static str {
    if level >= Level::Error {
        "error"
    } else if level == Level::Warning {
        "warning"
    } else {
        "info"
    }
}

/// Encode a formatted record into a newline-terminated wire line.
///
/// # Errors
///
/// Returns [`EncodeError::InvalidPayloadShape`] when `formatted` is neither a
/// string nor an object.
pub fn encode(
    formatted: Value,
    record: &LogRecord,
    config: &WireConfig,
) -> Result<Vec<u8>, EncodeError> {
    let mut fields = match formatted {
        Value::Object(map) => map,
        Value::String(message) => {
            let mut map = Map::new();
            map.insert("message".into(), Value::String(message));
            map
        }
        other => return Err(EncodeError::InvalidPayloadShape(other.to_string())),
    };

    let service = config
        .service
        .clone()
        .unwrap_or_else(|| record.logger.clone());
    fields.insert("ddsourcecategory".into(), config.source_category.clone().into());
    fields.insert("ddsource".into(), config.source.clone().into());
    fields.insert("service".into(), service.into());
    fields.insert("host".into(), config.host.clone().into());
    fields.insert("status".into(), status_for(record.level).into());

    let mut line = Vec::with_capacity(config.api_key.len() + 256);
    line.extend_from_slice(config.api_key.as_bytes());
    line.push(b' ');
    serde_json::to_writer(&mut line, &fields)?;
    line.push(b'\n');
    Ok(line)
}

/// Produce a short human-readable excerpt of an encoded line.
///
/// Used in delivery diagnostics. The API key prefix is never included: the
/// excerpt is the `msg` or `message` attribute of the JSON body, or a byte
/// count when the body cannot be parsed.
pub fn message_excerpt(payload: &[u8]) -> String {
    let text = String::from_utf8_lossy(payload);
    let parsed = text
        .find(" {")
        .and_then(|start| serde_json::from_str::<Map<String, Value>>(text[start + 1..].trim_end()).ok());
    let message = parsed.and_then(|mut map| map.remove("msg").or_else(|| map.remove("message")));
    match message {
        Some(Value::String(message)) => truncate(&message),
        Some(other) => truncate(&other.to_string()),
        None => format!("<{} byte payload>", payload.len()),
    }
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(EXCERPT_LIMIT) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_owned(),
    }
}
