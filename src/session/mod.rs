//! Session lifecycle and the negotiation state machine

pub mod session;

pub use session::{PeerSession, SessionEvent, SessionRole, SessionState};
