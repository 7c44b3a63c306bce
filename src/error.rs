// Error types shared by the registry, transport and reconnect service

use thiserror::Error;

use crate::registry::ConnectionId;

/// Failures reported by registry and reconnect operations.
///
/// Send failures are deliberately absent: delivery is reported as a boolean
/// so a broadcast never aborts on a single bad connection.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("connection '{0}' not found")]
    NotFound(ConnectionId),

    #[error("connection '{0}' already has an attempt in flight")]
    AttemptInFlight(ConnectionId),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Transport-level failures, recorded as `last_error` on the affected record.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("handshake with '{address}' failed: {reason}")]
    Handshake { address: String, reason: String },

    #[error("handshake with '{0}' timed out")]
    Timeout(String),

    #[error("transport error: {0}")]
    Io(String),

    #[error("transport closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, StreamError>;
