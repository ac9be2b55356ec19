#[path = "intake.rs"]
pub mod intake_support;

pub use intake_support::{IntakeListener, intake, plaintext_builder};
