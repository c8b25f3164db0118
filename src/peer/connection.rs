//! Media-connection capability seam
//!
//! The negotiation state machine drives the media engine exclusively through
//! [`MediaConnection`]; codecs, transports, and candidate gathering are
//! opaque behind it. Events flowing the other way arrive as [`MediaEvent`]s
//! on the session's event queue.

use crate::signaling::{IceCandidate, SessionDescription};
use crate::Result;
use async_trait::async_trait;

/// Inbound events produced by the media engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    /// The engine wants a (re)negotiation. Informational in this design:
    /// negotiation is driven by the signaling exchange, not by the engine.
    NegotiationNeeded,

    /// A locally gathered candidate to forward to the relay. `None` marks
    /// end of gathering and is never forwarded (gathering-complete is
    /// implicit on the remote side).
    Candidate(Option<IceCandidate>),

    /// A remote media stream became available on the connection
    StreamAdded {
        /// Identifier of the remote track
        track_id: String,
    },

    /// The engine reached end-of-stream or an unrecoverable failure;
    /// fatal to the session
    Ended {
        /// Engine-reported reason
        reason: String,
    },
}

/// The media-connection capability consumed by the state machine
///
/// Implementations wrap an actual peer-connection engine (see
/// [`RtcMediaConnection`](crate::RtcMediaConnection)). Every method is
/// awaited inline by the transition that issued it, so the session never
/// advances past an incomplete engine operation.
#[async_trait]
pub trait MediaConnection: Send + Sync {
    /// Create a local SDP offer
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Create a local SDP answer to the previously applied remote offer
    async fn create_answer(&self) -> Result<SessionDescription>;

    /// Apply a locally created description
    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;

    /// Apply the remote peer's description
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    /// Apply a remote trickle-ICE candidate
    ///
    /// Callers guarantee a remote description has been applied first; the
    /// session buffers earlier candidates.
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Tear down the connection and release engine resources
    async fn close(&self) -> Result<()>;
}
