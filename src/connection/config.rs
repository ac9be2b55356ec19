//! Connection defaults and tuning knobs.

use std::time::{Duration, Instant};

/// Intake host for TCP log submission.
pub const DEFAULT_INTAKE_HOST: &str = "lambda-intake.logs.datadoghq.com";
/// Port used when TLS is disabled.
pub const PLAINTEXT_PORT: u16 = 10514;
/// Port used when TLS is enabled.
pub const TLS_PORT: u16 = 10516;
/// Timeout applied to TCP connect and the TLS handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
/// Pause between failed write attempts.
pub const DEFAULT_WRITE_RETRY_PAUSE: Duration = Duration::from_secs(3);
/// First backoff period after a failed connect.
pub const DEFAULT_RETRY_START: Duration = Duration::from_secs(1);
/// Upper bound for the backoff period.
pub const DEFAULT_RETRY_MAX: Duration = Duration::from_secs(30);
/// Multiplier applied to the backoff period on each consecutive failure.
pub const DEFAULT_RETRY_FACTOR: f64 = 2.0;
/// Largest accepted value for any configured delay or timeout.
pub const MAX_CONFIGURED_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Exponential backoff policy for reconnection attempts.
#[derive(Clone, Debug, PartialEq)]
pub struct BackoffPolicy {
    pub start: Duration,
    pub max: Duration,
    pub factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            start: DEFAULT_RETRY_START,
            max: DEFAULT_RETRY_MAX,
            factor: DEFAULT_RETRY_FACTOR,
        }
    }
}

/// Intake port for the selected transport security.
pub fn intake_port(ssl: bool) -> u16 {
    if ssl { TLS_PORT } else { PLAINTEXT_PORT }
}

/// `now + delay`, clamped to the latest instant the platform can represent.
pub(crate) fn deadline_after(now: Instant, delay: Duration) -> Instant {
    let mut step = delay;
    loop {
        if let Some(deadline) = now.checked_add(step) {
            return deadline;
        }
        step /= 2;
    }
}
