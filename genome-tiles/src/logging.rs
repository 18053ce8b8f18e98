//! Logging setup.
//!
//! Library code only emits `tracing` events. Applications and tests that
//! want them printed call [`init_logging`] once at startup.

use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_DIRECTIVE: &str = "genome_tiles=info";

/// Errors installing the global subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The fallback filter directive does not parse.
    #[error("invalid log directive: {0}")]
    InvalidDirective(#[from] ParseError),

    /// Another global subscriber is already installed.
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

/// Install a formatted subscriber as the global default.
///
/// The filter comes from `RUST_LOG` when set, otherwise from
/// `default_directive` (for example `"genome_tiles=debug"`).
///
/// # Errors
///
/// Returns `LoggingError::InvalidDirective` if `default_directive` is used
/// and does not parse, or `LoggingError::AlreadyInitialized` if a global
/// subscriber is already set.
pub fn init_logging(default_directive: &str) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive)?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()?;
    Ok(())
}
