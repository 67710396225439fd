//! Error types for the junction scheduler
//!
//! All errors implement `std::error::Error` via `thiserror::Error`. The core
//! loops never abort on these: per-cycle failures (a malformed arrival batch,
//! an unreadable source) are contained within that cycle and surface here only
//! when a caller invokes an operation directly.

use thiserror::Error;

/// Junction error type
///
/// # Variants
///
/// * `UnknownLane` - A lane label did not match any of the twelve lanes
/// * `SourceError` - An arrival source could not be read or cleared
/// * `ParseError` - An arrival record could not be decoded
/// * `ShutdownInProgress` - The controller is shutting down
/// * `Other` - Catch-all for unexpected errors
#[derive(Error, Debug)]
pub enum JunctionError {
    /// Lane label not recognized
    #[error("Unknown lane: {0}")]
    UnknownLane(String),

    /// Arrival source failure
    #[error("Arrival source error: {0}")]
    SourceError(String),

    /// Arrival record decode failure
    #[error("Arrival record parse error: {0}")]
    ParseError(String),

    /// Shutdown in progress
    #[error("Junction is shutting down, not accepting new work")]
    ShutdownInProgress,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Result type alias using JunctionError
pub type Result<T> = std::result::Result<T, JunctionError>;
