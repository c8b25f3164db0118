//! Signaling protocol and relay connection
//!
//! The relay is a message forwarder only; this module covers the wire
//! framing ([`protocol`]) and the WebSocket link to it ([`client`]).

pub mod client;
pub mod protocol;

pub use client::{RelayCommand, RelayConnection};
pub use protocol::{IceCandidate, SdpKind, SessionDescription, SignalingMessage};
