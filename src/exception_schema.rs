//! Structured exception and stack trace payloads.
//!
//! Records carry traces as plain data rather than a live in-process
//! representation, so they can be built from a Rust error chain, captured by
//! an upstream framework, or deserialised from another process. Rendering to
//! text lives in [`crate::formatter`].

use std::error::Error;

use serde::{Deserialize, Serialize};

/// A single frame of a stack trace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Source file the frame originated from.
    pub filename: String,
    /// Line number in the source file.
    pub lineno: u32,
    /// Function or method name.
    pub function: String,
    /// Source code line, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_line: Option<String>,
}

impl StackFrame {
    pub fn new(filename: impl Into<String>, lineno: u32, function: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            lineno,
            function: function.into(),
            source_line: None,
        }
    }
}

/// A call-stack snapshot with no exception attached.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackTracePayload {
    /// Frames, outermost first.
    pub frames: Vec<StackFrame>,
}

impl StackTracePayload {
    pub fn new(frames: Vec<StackFrame>) -> Self {
        Self { frames }
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// An exception (error) with its frames and chained causes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionPayload {
    /// Short type name, e.g. `"ValueError"` or `"ParseIntError"`.
    pub type_name: String,
    /// Module or crate path of the type, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// Rendered error message.
    pub message: String,
    /// Frames, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<StackFrame>,
    /// Additional notes appended after the message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    /// Explicit cause of this error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<ExceptionPayload>>,
    /// Error that was being handled when this one occurred.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Box<ExceptionPayload>>,
    /// Hide `context` when rendering.
    #[serde(default)]
    pub suppress_context: bool,
}

impl ExceptionPayload {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            ..Self::default()
        }
    }

    /// Build a payload from a Rust error, following its `source()` chain.
    ///
    /// The outer error's type name is taken from `E`; sources are opaque
    /// trait objects and are labelled `Error`.
    pub fn from_error<E: Error + ?Sized>(err: &E) -> Self {
        let (module, type_name) = split_type_path(std::any::type_name::<E>());
        let mut payload = Self::new(type_name, err.to_string());
        payload.module = module;

        let mut sources = Vec::new();
        let mut next = err.source();
        while let Some(source) = next {
            sources.push(Self::new("Error", source.to_string()));
            next = source.source();
        }
        // Fold innermost first so each payload owns its own cause.
        let cause = sources.into_iter().rev().fold(None, |inner, mut outer| {
            outer.cause = inner.map(Box::new);
            Some(outer)
        });
        payload.cause = cause.map(Box::new);
        payload
    }

    pub fn with_frames(mut self, frames: Vec<StackFrame>) -> Self {
        self.frames = frames;
        self
    }

    /// True when there is nothing to render: no type, message, frames,
    /// notes or chained errors.
    pub fn is_empty(&self) -> bool {
        self.type_name.is_empty()
            && self.message.is_empty()
            && self.frames.is_empty()
            && self.notes.is_empty()
            && self.cause.is_none()
            && self.context.is_none()
    }
}

fn split_type_path(path: &str) -> (Option<String>, String) {
    // Generic arguments may contain `::`, so only split the outer path.
    let outer = path.split('<').next().unwrap_or(path);
    match outer.rsplit_once("::") {
        Some((module, _)) => (Some(module.to_owned()), path[module.len() + 2..].to_owned()),
        None => (None, path.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Outer(std::num::ParseIntError);

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("configuration is invalid")
        }
    }

    impl Error for Outer {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn from_error_follows_source_chain() {
        let inner = "x".parse::<u32>().expect_err("not a number");
        let payload = ExceptionPayload::from_error(&Outer(inner));

        assert_eq!(payload.type_name, "Outer");
        assert_eq!(payload.message, "configuration is invalid");
        assert!(payload.module.is_some());
        let cause = payload.cause.expect("source becomes cause");
        assert_eq!(cause.message, "invalid digit found in string");
        assert!(cause.cause.is_none());
    }

    #[test]
    fn payload_round_trips_through_json() {
        let payload = ExceptionPayload::new("ValueError", "bad")
            .with_frames(vec![StackFrame::new("app.py", 3, "main")]);
        let json = serde_json::to_string(&payload).expect("serialise");
        let back: ExceptionPayload = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(back, payload);
    }

    #[test]
    fn default_payload_is_empty() {
        assert!(ExceptionPayload::default().is_empty());
        assert!(!ExceptionPayload::new("ValueError", "").is_empty());
        let with_cause = ExceptionPayload {
            cause: Some(Box::new(ExceptionPayload::new("IoError", "gone"))),
            ..ExceptionPayload::default()
        };
        assert!(!with_cause.is_empty());
    }

    #[test]
    fn split_type_path_keeps_generics_intact() {
        let (module, name) = split_type_path("a::b::Wrapper<c::D>");
        assert_eq!(module.as_deref(), Some("a::b"));
        assert_eq!(name, "Wrapper<c::D>");
    }
}
