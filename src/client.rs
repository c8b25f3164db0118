//! High-level negotiation client
//!
//! [`PeerClient`] wires the three collaborators together: the relay
//! connection, the media engine, and the session state machine. All inputs
//! funnel through a single event queue, so the session sees one transition
//! at a time.

use crate::config::PeerClientConfig;
use crate::peer::{MediaConnection, MediaEvent, RtcMediaConnection};
use crate::session::{PeerSession, SessionEvent, SessionState};
use crate::signaling::RelayConnection;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// One-shot negotiation client
///
/// Connects to the relay, registers, optionally places a call, and serves
/// the session until it reaches a terminal state.
pub struct PeerClient {
    config: PeerClientConfig,
    local_id: String,
}

impl PeerClient {
    /// Create a client from a validated configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if validation fails.
    pub fn new(config: PeerClientConfig) -> Result<Self> {
        config.validate()?;
        let local_id = config.local_id_or_random();

        Ok(Self { config, local_id })
    }

    /// The local peer id announced to the relay
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Run one negotiation to completion
    ///
    /// With `call_peer` set this side is the caller and places the call as
    /// soon as registration completes; otherwise it waits for an inbound
    /// offer. Returns the terminal [`SessionState`] on a clean end, or the
    /// failure that tore the session down.
    pub async fn run(self, call_peer: Option<String>) -> Result<SessionState> {
        // Engine callbacks land on their own channel and are forwarded onto
        // the single session queue.
        let (media_tx, media_rx) = mpsc::unbounded_channel();
        let media = Arc::new(RtcMediaConnection::new(&self.config, media_tx).await?);

        self.run_with_media(media, media_rx, call_peer).await
    }

    async fn run_with_media(
        self,
        media: Arc<dyn MediaConnection>,
        mut media_rx: mpsc::UnboundedReceiver<MediaEvent>,
        call_peer: Option<String>,
    ) -> Result<SessionState> {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<SessionEvent>();

        let forward = events_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = media_rx.recv().await {
                if forward.send(SessionEvent::Media(event)).is_err() {
                    break;
                }
            }
        });

        // The engine is already live at this point, so a dial failure must
        // release it before surfacing the error.
        let relay = match RelayConnection::connect(
            &self.config.relay_url,
            self.config.max_connect_attempts,
            Duration::from_millis(self.config.retry_delay_ms),
            events_tx,
        )
        .await
        {
            Ok(relay) => relay,
            Err(err) => {
                if let Err(close_err) = media.close().await {
                    warn!(
                        "media connection close failed after relay dial failure: {}",
                        close_err
                    );
                }
                return Err(err);
            }
        };

        let mut session = PeerSession::new(self.local_id.clone(), media, relay.command_sender());
        let mut pending_call = call_peer;
        let mut failure: Option<Error> = None;

        while let Some(event) = events_rx.recv().await {
            if let Err(err) = session.handle_event(event).await {
                // The session has already torn itself down; keep the first
                // failure for the caller.
                failure.get_or_insert(err);
            }

            if session.state() == SessionState::Registered {
                if let Some(peer) = pending_call.take() {
                    if let Err(err) = session.initiate_call(&peer).await {
                        session.close().await;
                        return Err(err);
                    }
                }
            }

            if session.state().is_terminal() {
                break;
            }
        }

        match failure {
            Some(err) => Err(err),
            None => {
                info!("session ended in state {:?}", session.state());
                Ok(session.state())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::{IceCandidate, SdpKind, SessionDescription};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubMedia {
        closes: AtomicUsize,
    }

    impl StubMedia {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                closes: AtomicUsize::new(0),
            })
        }

        fn close_count(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
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
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_relay_dial_failure_releases_media_engine() {
        // Port 9 (discard) refuses the handshake immediately.
        let config = PeerClientConfig {
            relay_url: "ws://127.0.0.1:9".to_string(),
            max_connect_attempts: 1,
            retry_delay_ms: 10,
            ..Default::default()
        };
        let client = PeerClient::new(config).unwrap();

        let media = StubMedia::new();
        let (_media_tx, media_rx) = mpsc::unbounded_channel();

        let result = client.run_with_media(media.clone(), media_rx, None).await;

        assert!(matches!(result, Err(Error::Connection(_))));
        assert_eq!(media.close_count(), 1);
    }
}
