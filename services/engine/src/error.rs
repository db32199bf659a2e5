//! services/engine/src/error.rs
//!
//! Defines the primary error types for the engine service.

use crate::config::ConfigError;
use praxis_core::availability::BookingError;
use praxis_core::ports::PortError;

/// The primary error type for the `engine` service.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// The outcome of a user-initiated command (create/update appointment,
/// send message). Validation failures are produced locally before any
/// network call; port failures after the optimistic write triggers a
/// rollback.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Rejected by the availability engine before any round trip.
    #[error("Validation failed: {0}")]
    Validation(#[from] BookingError),

    /// The backend rejected or never acknowledged the command.
    #[error("{0}")]
    Port(#[from] PortError),

    /// The owning view was torn down before the round trip completed.
    /// The remote side effect may still have happened; the affected cache
    /// key is invalidated so a later fetch converges.
    #[error("The command was canceled before the server replied")]
    Canceled,
}
