//! Shared helpers for unit tests.

pub mod scripted_connector;

pub use scripted_connector::{MemoryStream, ScriptedConnector, Step};
