//! Error types for peerlink

use thiserror::Error;

/// Result type alias for negotiation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the negotiation client
///
/// `UnexpectedMessage`, `MalformedMessage`, `Remote`, and `MediaEngine` are
/// fatal to the session that raised them: they all collapse to the same
/// teardown path (close media connection, close relay, terminal state).
/// `Connection` covers the relay dial and the established link dropping.
#[derive(Debug, Error)]
pub enum Error {
    /// Relay unreachable or the relay connection dropped
    #[error("connection error: {0}")]
    Connection(String),

    /// Message received in a state that does not permit it
    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),

    /// Frame failed to parse as any recognized shape
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Explicit ERROR frame from the relay; text is surfaced verbatim
    #[error("remote error: {0}")]
    Remote(String),

    /// A call into the media engine failed
    #[error("media engine failure: {0}")]
    MediaEngine(String),

    /// Operation invoked in a state that does not permit it
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Configuration rejected by validation
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
