#![forbid(unsafe_code)]

//! JSON log output for hosts without their own subscriber.
//!
//! Only built with the `tracing-json` feature. The filter comes from
//! `RUST_LOG`; without it, warnings and errors are shown.

use tracing_subscriber::EnvFilter;

/// Why [`init`] did not install a subscriber.
#[derive(Debug)]
pub struct InitError(String);

impl std::fmt::Display for InitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to install tracing subscriber: {}", self.0)
    }
}

impl std::error::Error for InitError {}

/// Install a global JSON subscriber.
///
/// Fails if a global subscriber is already set.
pub fn init() -> Result<(), InitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(true)
        .try_init()
        .map_err(|err| InitError(err.to_string()))
}
