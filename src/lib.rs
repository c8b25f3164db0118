//! Peer-to-peer WebRTC signaling negotiation
//!
//! This crate implements the negotiation sequence two endpoints run through
//! a signaling relay before media flows directly between them: registration,
//! call setup, the SDP offer/answer exchange, and trickle-ICE candidate
//! exchange. The relay only forwards frames; the media engine (offers,
//! answers, candidate gathering) sits behind the [`MediaConnection`] seam.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  PeerClient                                          │
//! │  ├─ RelayConnection (WebSocket to the relay)         │
//! │  ├─ PeerSession (explicit negotiation state machine) │
//! │  └─ MediaConnection (engine seam; RtcMediaConnection │
//! │     is the webrtc-rs adapter)                        │
//! │     ↓ (after negotiation)                            │
//! │  direct peer-to-peer media transport                 │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! Relay frames, engine callbacks, and user calls are all delivered as
//! discrete [`SessionEvent`]s through one queue, so session state is never
//! mutated concurrently and async engine operations suspend the transition
//! that issued them.
//!
//! # Example
//!
//! ```ignore
//! use peerlink::{PeerClient, PeerClientConfig};
//!
//! let config = PeerClientConfig {
//!     relay_url: "wss://relay.example.com:8443".to_string(),
//!     ..Default::default()
//! };
//!
//! let client = PeerClient::new(config)?;
//! // Call peer 77; omit to wait for an inbound call instead.
//! let state = client.run(Some("77".to_string())).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod config;
pub mod error;

// Internal modules
mod client;
mod peer;
mod session;
mod signaling;

// Re-exports for public API
pub use client::PeerClient;
pub use config::PeerClientConfig;
pub use error::{Error, Result};
pub use peer::{MediaConnection, MediaEvent, RtcMediaConnection};
pub use session::{PeerSession, SessionEvent, SessionRole, SessionState};
pub use signaling::{
    IceCandidate, RelayCommand, RelayConnection, SdpKind, SessionDescription, SignalingMessage,
};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let ver = version();
        assert!(!ver.is_empty());
    }
}
