//! Engine error taxonomy
//!
//! Recoverable failures surface as `EngineError`. Corruption-class
//! failures (sequence gaps beyond tolerance, arithmetic overflow, balance
//! invariant violations) never appear here: they terminate the process
//! after a state dump.

use thiserror::Error;

/// Result alias used throughout the engine
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced by the engine's fallible boundaries
#[derive(Debug, Error)]
pub enum EngineError {
    /// SQLite failure from the write-ahead event store
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Event payload could not be serialized or deserialized
    #[error("payload encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Persisted payload uses an encoding version this build cannot read
    #[error("unsupported payload version {0}")]
    UnsupportedVersion(u32),

    /// Invalid construction-time parameters
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Decimal literal could not be converted to a fixed-point mantissa
    #[error("invalid decimal literal {literal:?}: {reason}")]
    Decimal {
        literal: String,
        reason: &'static str,
    },

    /// Floating-point input rejected at the conversion boundary
    #[error("value not representable as fixed-point: {0}")]
    NotRepresentable(f64),

    /// Filesystem failure outside the event store (state dumps)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
