//! Error types for the orchestration layer.

use std::time::Duration;
use thiserror::Error;

/// Failures of an engine subprocess. Every variant is fatal to the owning
/// session: engine state is not recoverable mid-protocol, so the session is
/// ended with result `aborted` instead of retrying or respawning.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Process failed to launch, exited before replying to `init`, or
    /// rejected the init request.
    #[error("engine failed to start: {0}")]
    Start(String),

    /// No reply line within the configured deadline.
    #[error("engine did not reply within {0:?}")]
    Unresponsive(Duration),

    /// Reply line was not a valid protocol object.
    #[error("malformed engine reply: {0}")]
    Protocol(String),

    /// Output stream reached EOF; the process is gone.
    #[error("engine stream closed")]
    Closed,

    #[error("engine i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handshake authentication failures. These terminate only the handshake,
/// never an established session.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("missing credentials")]
    MissingCredentials,
}

#[derive(Debug, Error)]
#[error("invalid configuration: {0}")]
pub struct ConfigError(pub String);
