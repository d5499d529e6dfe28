//! Error taxonomy for the decision core.
//!
//! Only `Configuration` is fatal. `InsufficientData` and `InvalidRisk` are
//! per-tick conditions the session engine turns into `NoAction`.

use thiserror::Error;

/// Errors raised by indicator, sizing, configuration and session code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Gap or band could not be computed from the available data.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Sizing inputs were non-positive (equity, stop distance, price).
    #[error("Invalid risk inputs: {0}")]
    InvalidRisk(String),

    /// Invalid or missing configuration. Fatal at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A tick was requested while the previous intent is still unresolved.
    #[error("Intent {0} is still pending; report its outcome before the next tick")]
    IntentPending(String),

    /// An execution report arrived but no intent was waiting for one.
    #[error("No pending intent to resolve")]
    NoPendingIntent,
}

impl EngineError {
    /// Whether this error must stop the process.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
