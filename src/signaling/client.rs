//! WebSocket relay connection
//!
//! Maintains the signaling link: bounded-retry dialing, a writer task
//! draining an outbound command queue, and a reader task forwarding text
//! frames onto the session's event queue. The relay itself only forwards
//! messages between peers and is never interpreted here beyond framing.

use crate::session::SessionEvent;
use crate::signaling::SignalingMessage;
use crate::{Error, Result};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Commands accepted by the relay writer task
#[derive(Debug)]
pub enum RelayCommand {
    /// Encode and send a signaling message
    Frame(SignalingMessage),
    /// Send a close frame and terminate the writer
    Close,
}

/// An established relay connection
///
/// Dropping the connection (or sending [`RelayCommand::Close`]) shuts the
/// writer down; the reader signals [`SessionEvent::RelayClosed`] when the
/// socket ends for any reason.
pub struct RelayConnection {
    command_tx: mpsc::UnboundedSender<RelayCommand>,
}

impl RelayConnection {
    /// Dial the relay with a bounded retry policy
    ///
    /// Emits [`SessionEvent::RelayOpen`] once connected, then every received
    /// text frame as [`SessionEvent::Frame`]. Exhausting the attempt budget
    /// surfaces [`Error::Connection`]; resuming after exhaustion requires an
    /// explicit new call.
    ///
    /// # Arguments
    ///
    /// * `url` - Relay WebSocket URL
    /// * `max_attempts` - Consecutive dial attempts before giving up
    /// * `retry_delay` - Pause between attempts
    /// * `events` - Session event queue fed by the reader task
    pub async fn connect(
        url: &str,
        max_attempts: u32,
        retry_delay: Duration,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Self> {
        let mut attempt = 1u32;
        let ws_stream = loop {
            match connect_async(url).await {
                Ok((stream, _)) => break stream,
                Err(err) => {
                    warn!(attempt, "relay dial failed: {}", err);
                    if attempt >= max_attempts {
                        return Err(Error::Connection(format!(
                            "relay unreachable after {} attempts: {}",
                            attempt, err
                        )));
                    }
                    attempt += 1;
                    tokio::time::sleep(retry_delay).await;
                }
            }
        };

        info!("connected to relay at {}", url);

        let (mut write, mut read) = ws_stream.split();
        let (command_tx, mut command_rx) = mpsc::unbounded_channel::<RelayCommand>();

        // Writer task: drains the outbound queue until closed.
        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                match command {
                    RelayCommand::Frame(message) => {
                        let frame = match message.encode() {
                            Ok(frame) => frame,
                            Err(err) => {
                                error!("failed to encode outbound frame: {}", err);
                                continue;
                            }
                        };
                        debug!("relay send: {}", frame);
                        if write.send(Message::Text(frame)).await.is_err() {
                            break;
                        }
                    }
                    RelayCommand::Close => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            debug!("relay writer task terminated");
        });

        // RelayOpen goes onto the queue before the reader starts so it
        // precedes any frame.
        let _ = events.send(SessionEvent::RelayOpen);

        // Reader task: forwards text frames, signals closure once.
        tokio::spawn(async move {
            while let Some(result) = read.next().await {
                match result {
                    Ok(Message::Text(text)) => {
                        debug!("relay recv: {}", text);
                        if events.send(SessionEvent::Frame(text)).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        info!("relay closed the connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        error!("relay read error: {}", err);
                        break;
                    }
                }
            }
            let _ = events.send(SessionEvent::RelayClosed);
            debug!("relay reader task terminated");
        });

        Ok(Self { command_tx })
    }

    /// Clone of the sender feeding the writer task
    pub fn command_sender(&self) -> mpsc::UnboundedSender<RelayCommand> {
        self.command_tx.clone()
    }

    /// Queue a signaling message for sending
    pub fn send(&self, message: SignalingMessage) -> Result<()> {
        self.command_tx
            .send(RelayCommand::Frame(message))
            .map_err(|_| Error::Connection("relay writer task is gone".to_string()))
    }

    /// Ask the writer task to close the socket
    pub fn close(&self) {
        let _ = self.command_tx.send(RelayCommand::Close);
    }
}
