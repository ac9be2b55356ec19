//! Severity levels attached to log records.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Ordered record severity.
///
/// `Trace` sits below `Debug` so records arriving through the `log` crate
/// bridge keep their level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Trace,
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

/// Returned when a level name is not recognised.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unknown log level {0:?}")]
pub struct ParseLevelError(pub String);

impl Level {
    /// Canonical upper-case name (`"WARNING"`, `"ERROR"`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        }
    }

    /// Numeric severity using the conventional 10-step scale.
    pub fn levelno(self) -> u8 {
        match self {
            Level::Trace => 5,
            Level::Debug => 10,
            Level::Info => 20,
            Level::Warning => 30,
            Level::Error => 40,
            Level::Critical => 50,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Ok(Self::Trace),
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARN" | "WARNING" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            "CRITICAL" | "FATAL" => Ok(Self::Critical),
            _ => Err(ParseLevelError(s.to_owned())),
        }
    }
}

impl From<log::Level> for Level {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Trace => Level::Trace,
            log::Level::Debug => Level::Debug,
            log::Level::Info => Level::Info,
            log::Level::Warn => Level::Warning,
            log::Level::Error => Level::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("warn", Level::Warning)]
    #[case("WARNING", Level::Warning)]
    #[case(" critical ", Level::Critical)]
    #[case("fatal", Level::Critical)]
    #[case("trace", Level::Trace)]
    fn parses_level_names(#[case] input: &str, #[case] expected: Level) {
        assert_eq!(input.parse::<Level>(), Ok(expected));
    }

    #[rstest]
    fn rejects_unknown_names() {
        let err = "verbose".parse::<Level>().expect_err("unknown level");
        assert_eq!(err, ParseLevelError("verbose".into()));
    }

    #[rstest]
    fn ordering_follows_severity() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warning);
        assert!(Level::Warning < Level::Error);
        assert!(Level::Error < Level::Critical);
    }

    #[rstest]
    #[case(log::Level::Trace, Level::Trace)]
    #[case(log::Level::Debug, Level::Debug)]
    #[case(log::Level::Info, Level::Info)]
    #[case(log::Level::Warn, Level::Warning)]
    #[case(log::Level::Error, Level::Error)]
    fn log_levels_map_directly(#[case] level: log::Level, #[case] expected: Level) {
        assert_eq!(Level::from(level), expected);
    }
}
