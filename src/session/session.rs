//! Peer session state machine
//!
//! One [`PeerSession`] owns the full negotiation lifecycle against a single
//! remote peer: registration with the relay, call setup, the offer/answer
//! exchange, and trickle-ICE. All inputs arrive as discrete
//! [`SessionEvent`]s consumed by one transition at a time, so session state
//! is never mutated concurrently and transitions never re-enter.
//!
//! All fatal conditions collapse to the same teardown path: close the media
//! connection, close the relay connection, and park in a terminal state.
//! Events delivered after a terminal state are discarded.

use crate::peer::{MediaConnection, MediaEvent};
use crate::signaling::{
    IceCandidate, RelayCommand, SdpKind, SessionDescription, SignalingMessage,
};
use crate::{Error, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Which side of the offer/answer exchange this session is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// Caller: this side requested the call and produces the offer
    Offering,
    /// Callee: this side received an inbound offer and produces the answer
    Answering,
}

/// Signaling states of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No relay connection yet
    Disconnected,
    /// `HELLO <id>` sent, awaiting the relay's acknowledgement
    Registering,
    /// Registered with the relay, idle
    Registered,
    /// Offer/answer exchange in progress
    Negotiating(SessionRole),
    /// Negotiation complete; media flows independently of signaling
    Connected,
    /// Clean shutdown via [`PeerSession::close`]
    Closed,
    /// Protocol error, relay loss, or media-engine failure
    Failed,
}

impl SessionState {
    /// Whether this state is terminal (no further transitions)
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

/// A single input consumed by the transition function
#[derive(Debug)]
pub enum SessionEvent {
    /// The relay connection was established; triggers registration
    RelayOpen,
    /// A raw text frame from the relay (decoded inside the transition so
    /// malformed frames fail the session through the normal error path)
    Frame(String),
    /// The relay connection dropped or was closed by the far side
    RelayClosed,
    /// An event produced by the media engine
    Media(MediaEvent),
}

/// One negotiation instance against a single remote peer
pub struct PeerSession {
    /// Local identifier sent at registration
    local_id: String,

    /// Remote peer identifier (known for the caller; the relay does not
    /// reveal it to the callee)
    remote_peer: Option<String>,

    /// Current signaling state
    state: SessionState,

    /// Negotiation role, fixed when negotiation starts
    role: Option<SessionRole>,

    /// Media-connection capability
    media: Arc<dyn MediaConnection>,

    /// Outbound queue to the relay writer task
    relay: mpsc::UnboundedSender<RelayCommand>,

    /// Remote candidates received before the remote description, in arrival
    /// order
    pending_candidates: VecDeque<IceCandidate>,

    /// Whether a remote description has been applied (gates candidate
    /// application)
    remote_description_set: bool,

    /// Whether underlying resources have already been released
    torn_down: bool,
}

impl PeerSession {
    /// Create a session in `Disconnected`
    ///
    /// # Arguments
    ///
    /// * `local_id` - Identifier announced to the relay
    /// * `media` - Media-connection capability
    /// * `relay` - Sender feeding the relay writer task
    pub fn new(
        local_id: String,
        media: Arc<dyn MediaConnection>,
        relay: mpsc::UnboundedSender<RelayCommand>,
    ) -> Self {
        info!("creating session, local id {}", local_id);

        Self {
            local_id,
            remote_peer: None,
            state: SessionState::Disconnected,
            role: None,
            media,
            relay,
            pending_candidates: VecDeque::new(),
            remote_description_set: false,
            torn_down: false,
        }
    }

    /// Current signaling state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Negotiation role, once negotiation has started
    pub fn role(&self) -> Option<SessionRole> {
        self.role
    }

    /// Remote peer id, once known
    pub fn remote_peer(&self) -> Option<&str> {
        self.remote_peer.as_deref()
    }

    /// Number of remote candidates still waiting for the remote description
    pub fn buffered_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    /// Feed one event through the transition function
    ///
    /// Fatal errors have already torn the session down (media closed, relay
    /// close requested, state `Failed`) by the time they are returned, so
    /// callers only need the error for reporting. Events arriving after a
    /// terminal state are discarded, including completions of operations
    /// that were still outstanding when [`close`](Self::close) ran.
    pub async fn handle_event(&mut self, event: SessionEvent) -> Result<()> {
        if self.state.is_terminal() {
            debug!(state = ?self.state, "discarding event after terminal state");
            return Ok(());
        }

        let outcome = self.dispatch(event).await;
        if let Err(err) = &outcome {
            error!("session failed: {}", err);
            self.fail().await;
        }
        outcome
    }

    /// Place a call to `peer_id`. Valid only in `Registered`.
    pub async fn initiate_call(&mut self, peer_id: &str) -> Result<()> {
        if self.state != SessionState::Registered {
            return Err(Error::InvalidState(format!(
                "cannot place a call in state {:?}",
                self.state
            )));
        }

        info!("calling peer {}", peer_id);
        self.remote_peer = Some(peer_id.to_string());
        self.role = Some(SessionRole::Offering);
        self.set_state(SessionState::Negotiating(SessionRole::Offering));
        self.send(SignalingMessage::SessionRequest {
            peer_id: peer_id.to_string(),
        })
    }

    /// Shut the session down cleanly
    ///
    /// Idempotent: the first call releases the media connection and asks the
    /// relay writer to close; later calls (and calls on an already-failed
    /// session) are no-ops.
    pub async fn close(&mut self) {
        if self.state.is_terminal() {
            debug!("close on terminal session is a no-op");
            return;
        }
        self.teardown().await;
        self.set_state(SessionState::Closed);
    }

    async fn dispatch(&mut self, event: SessionEvent) -> Result<()> {
        match event {
            SessionEvent::RelayOpen => self.on_relay_open(),
            SessionEvent::Frame(text) => {
                let message = SignalingMessage::decode(&text)?;
                self.on_relay_message(message).await
            }
            SessionEvent::RelayClosed => {
                Err(Error::Connection("relay connection closed".to_string()))
            }
            SessionEvent::Media(event) => self.on_media_event(event),
        }
    }

    fn on_relay_open(&mut self) -> Result<()> {
        match self.state {
            SessionState::Disconnected => {
                self.set_state(SessionState::Registering);
                self.send(SignalingMessage::Hello {
                    id: Some(self.local_id.clone()),
                })
            }
            state => Err(Error::InvalidState(format!(
                "relay opened while in state {:?}",
                state
            ))),
        }
    }

    async fn on_relay_message(&mut self, message: SignalingMessage) -> Result<()> {
        match message {
            SignalingMessage::Hello { id: None } => {
                if self.state != SessionState::Registering {
                    return Err(Error::UnexpectedMessage(format!(
                        "registration ack in state {:?}",
                        self.state
                    )));
                }
                info!("registered with relay as {}", self.local_id);
                self.set_state(SessionState::Registered);
                Ok(())
            }
            SignalingMessage::Hello { id: Some(_) } => Err(Error::UnexpectedMessage(
                "registration frame sent by the relay".to_string(),
            )),
            SignalingMessage::SessionRequest { .. } => Err(Error::UnexpectedMessage(
                "call request frame sent by the relay".to_string(),
            )),
            SignalingMessage::SessionAck => self.on_session_ack().await,
            SignalingMessage::RemoteError { text } => Err(Error::Remote(text)),
            SignalingMessage::Description(desc) => self.on_description(desc).await,
            SignalingMessage::Candidate(candidate) => self.on_remote_candidate(candidate).await,
        }
    }

    /// `SESSION_OK`: the relay accepted the call request. Produce and send
    /// the offer; the session keeps offering until the answer arrives.
    async fn on_session_ack(&mut self) -> Result<()> {
        if self.state != SessionState::Negotiating(SessionRole::Offering) {
            return Err(Error::UnexpectedMessage(format!(
                "SESSION_OK in state {:?}",
                self.state
            )));
        }

        debug!("call accepted by relay, creating offer");
        let offer = self.media.create_offer().await?;
        self.media.set_local_description(offer.clone()).await?;
        self.send(SignalingMessage::Description(offer))
    }

    async fn on_description(&mut self, desc: SessionDescription) -> Result<()> {
        match (desc.kind, self.state) {
            // Passive role: an inbound offer while idle starts the session
            // implicitly.
            (SdpKind::Offer, SessionState::Registered) => {
                info!("inbound call: answering");
                self.role = Some(SessionRole::Answering);
                self.set_state(SessionState::Negotiating(SessionRole::Answering));

                self.media.set_remote_description(desc).await?;
                self.remote_description_set = true;
                self.flush_pending_candidates().await?;

                let answer = self.media.create_answer().await?;
                self.media.set_local_description(answer.clone()).await?;
                self.send(SignalingMessage::Description(answer))?;

                self.set_state(SessionState::Connected);
                Ok(())
            }
            // Glare: no tie-break or rollback policy is defined, so a
            // colliding offer is a hard protocol violation.
            (SdpKind::Offer, SessionState::Negotiating(SessionRole::Offering)) => {
                Err(Error::UnexpectedMessage(
                    "offer received while a local offer is pending (glare)".to_string(),
                ))
            }
            (SdpKind::Offer, state) => Err(Error::UnexpectedMessage(format!(
                "offer in state {:?}",
                state
            ))),
            (SdpKind::Answer, SessionState::Negotiating(SessionRole::Offering)) => {
                debug!("answer received, applying remote description");
                self.media.set_remote_description(desc).await?;
                self.remote_description_set = true;
                self.flush_pending_candidates().await?;

                self.set_state(SessionState::Connected);
                Ok(())
            }
            (SdpKind::Answer, state) => Err(Error::UnexpectedMessage(format!(
                "answer with no pending offer (state {:?})",
                state
            ))),
        }
    }

    /// Remote candidates are applied in arrival order; until a remote
    /// description exists they are buffered, then flushed before any later
    /// candidate is applied.
    async fn on_remote_candidate(&mut self, candidate: IceCandidate) -> Result<()> {
        if self.remote_description_set {
            self.media.add_ice_candidate(candidate).await
        } else {
            debug!(
                mline = candidate.sdp_mline_index,
                "buffering candidate until remote description is set"
            );
            self.pending_candidates.push_back(candidate);
            Ok(())
        }
    }

    async fn flush_pending_candidates(&mut self) -> Result<()> {
        while let Some(candidate) = self.pending_candidates.pop_front() {
            debug!(
                mline = candidate.sdp_mline_index,
                "applying buffered candidate"
            );
            self.media.add_ice_candidate(candidate).await?;
        }
        Ok(())
    }

    fn on_media_event(&mut self, event: MediaEvent) -> Result<()> {
        match event {
            MediaEvent::Candidate(Some(candidate)) => {
                self.send(SignalingMessage::Candidate(candidate))
            }
            MediaEvent::Candidate(None) => {
                debug!("local candidate gathering complete");
                Ok(())
            }
            MediaEvent::NegotiationNeeded => {
                debug!("media engine requested negotiation");
                Ok(())
            }
            MediaEvent::StreamAdded { track_id } => {
                info!("remote stream available: {}", track_id);
                Ok(())
            }
            MediaEvent::Ended { reason } => Err(Error::MediaEngine(reason)),
        }
    }

    fn send(&self, message: SignalingMessage) -> Result<()> {
        self.relay
            .send(RelayCommand::Frame(message))
            .map_err(|_| Error::Connection("relay writer task is gone".to_string()))
    }

    async fn fail(&mut self) {
        self.teardown().await;
        self.set_state(SessionState::Failed);
    }

    /// Release underlying resources exactly once: close the media
    /// connection, then ask the relay writer to close the socket.
    async fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Err(err) = self.media.close().await {
            warn!("media connection close failed during teardown: {}", err);
        }
        let _ = self.relay.send(RelayCommand::Close);
    }

    fn set_state(&mut self, new_state: SessionState) {
        if self.state != new_state {
            debug!(
                "session {} state transition: {:?} -> {:?}",
                self.local_id, self.state, new_state
            );
            self.state = new_state;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Minimal stub engine: succeeds at everything, counts closes.
    struct StubMedia {
        closes: std::sync::atomic::AtomicUsize,
    }

    impl StubMedia {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                closes: std::sync::atomic::AtomicUsize::new(0),
            })
        }

        fn close_count(&self) -> usize {
            self.closes.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MediaConnection for StubMedia {
        async fn create_offer(&self) -> Result<SessionDescription> {
            Ok(SessionDescription {
                kind: SdpKind::Offer,
                sdp: "v=0\r\n".to_string(),
            })
        }

        async fn create_answer(&self) -> Result<SessionDescription> {
            Ok(SessionDescription {
                kind: SdpKind::Answer,
                sdp: "v=0\r\n".to_string(),
            })
        }

        async fn set_local_description(&self, _desc: SessionDescription) -> Result<()> {
            Ok(())
        }

        async fn set_remote_description(&self, _desc: SessionDescription) -> Result<()> {
            Ok(())
        }

        async fn add_ice_candidate(&self, _candidate: IceCandidate) -> Result<()> {
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            self.closes
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    fn session() -> (
        PeerSession,
        Arc<StubMedia>,
        mpsc::UnboundedReceiver<RelayCommand>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let media = StubMedia::new();
        let session = PeerSession::new("4821".to_string(), media.clone(), tx);
        (session, media, rx)
    }

    #[tokio::test]
    async fn test_relay_open_registers() {
        let (mut session, _media, mut rx) = session();

        session.handle_event(SessionEvent::RelayOpen).await.unwrap();
        assert_eq!(session.state(), SessionState::Registering);

        match rx.recv().await.unwrap() {
            RelayCommand::Frame(msg) => assert_eq!(msg.encode().unwrap(), "HELLO 4821"),
            RelayCommand::Close => panic!("unexpected close"),
        }
    }

    #[tokio::test]
    async fn test_call_requires_registered() {
        let (mut session, _media, _rx) = session();

        let result = session.initiate_call("77").await;
        assert!(matches!(result, Err(Error::InvalidState(_))));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_relay_closure_is_fatal() {
        let (mut session, media, _rx) = session();

        session.handle_event(SessionEvent::RelayOpen).await.unwrap();
        let result = session.handle_event(SessionEvent::RelayClosed).await;

        assert!(matches!(result, Err(Error::Connection(_))));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(media.close_count(), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut session, media, _rx) = session();

        session.close().await;
        session.close().await;
        session.close().await;

        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(media.close_count(), 1);
    }

    #[tokio::test]
    async fn test_events_after_close_are_discarded() {
        let (mut session, media, _rx) = session();

        session.close().await;
        session
            .handle_event(SessionEvent::Frame("HELLO".to_string()))
            .await
            .unwrap();

        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(media.close_count(), 1);
    }
}
