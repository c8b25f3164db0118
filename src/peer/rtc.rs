//! webrtc-rs backed media connection
//!
//! Production adapter implementing [`MediaConnection`] over an
//! `RTCPeerConnection`. Engine callbacks (gathered candidates, remote
//! tracks, connection state) are converted into [`MediaEvent`]s on the
//! session's queue; the engine never mutates session state directly.

use crate::config::PeerClientConfig;
use crate::peer::{MediaConnection, MediaEvent};
use crate::signaling::{IceCandidate, SdpKind, SessionDescription};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

/// [`MediaConnection`] implementation over the `webrtc` crate
pub struct RtcMediaConnection {
    pc: Arc<RTCPeerConnection>,
}

impl RtcMediaConnection {
    /// Build a peer connection with default codecs and interceptors and
    /// wire its callbacks onto `events`
    ///
    /// A data channel is opened up front so candidate gathering starts as
    /// soon as a description is applied.
    pub async fn new(
        config: &PeerClientConfig,
        events: mpsc::UnboundedSender<MediaEvent>,
    ) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::MediaEngine(format!("failed to register codecs: {}", e)))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| Error::MediaEngine(format!("failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: config.stun_servers.clone(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let pc = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(|e| Error::MediaEngine(format!("failed to create peer connection: {}", e)))?,
        );

        // Gathered candidates are forwarded as they are produced; the None
        // sentinel marks end of gathering.
        let candidate_tx = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate| {
            let tx = candidate_tx.clone();
            Box::pin(async move {
                match candidate {
                    Some(c) => match c.to_json() {
                        Ok(json) => {
                            let mapped = IceCandidate {
                                candidate: json.candidate,
                                sdp_mline_index: u32::from(json.sdp_mline_index.unwrap_or(0)),
                            };
                            let _ = tx.send(MediaEvent::Candidate(Some(mapped)));
                        }
                        Err(err) => warn!("dropping unserializable candidate: {}", err),
                    },
                    None => {
                        let _ = tx.send(MediaEvent::Candidate(None));
                    }
                }
            })
        }));

        let negotiation_tx = events.clone();
        pc.on_negotiation_needed(Box::new(move || {
            let _ = negotiation_tx.send(MediaEvent::NegotiationNeeded);
            Box::pin(async {})
        }));

        let track_tx = events.clone();
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let _ = track_tx.send(MediaEvent::StreamAdded {
                track_id: track.id(),
            });
            Box::pin(async {})
        }));

        let state_tx = events;
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            debug!("peer connection state: {:?}", state);
            if state == RTCPeerConnectionState::Failed {
                let _ = state_tx.send(MediaEvent::Ended {
                    reason: "peer connection failed".to_string(),
                });
            }
            Box::pin(async {})
        }));

        // Having at least one negotiated channel guarantees the offer
        // carries a media section.
        pc.create_data_channel("peerlink", None)
            .await
            .map_err(|e| Error::MediaEngine(format!("failed to create data channel: {}", e)))?;

        info!("peer connection created");

        Ok(Self { pc })
    }

    fn to_engine_description(desc: SessionDescription) -> Result<RTCSessionDescription> {
        let result = match desc.kind {
            SdpKind::Offer => RTCSessionDescription::offer(desc.sdp),
            SdpKind::Answer => RTCSessionDescription::answer(desc.sdp),
        };
        result.map_err(|e| Error::MediaEngine(format!("invalid SDP: {}", e)))
    }
}

#[async_trait]
impl MediaConnection for RtcMediaConnection {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| Error::MediaEngine(format!("failed to create offer: {}", e)))?;

        Ok(SessionDescription {
            kind: SdpKind::Offer,
            sdp: offer.sdp,
        })
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| Error::MediaEngine(format!("failed to create answer: {}", e)))?;

        Ok(SessionDescription {
            kind: SdpKind::Answer,
            sdp: answer.sdp,
        })
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        let desc = Self::to_engine_description(desc)?;
        self.pc
            .set_local_description(desc)
            .await
            .map_err(|e| Error::MediaEngine(format!("failed to set local description: {}", e)))
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        let desc = Self::to_engine_description(desc)?;
        self.pc
            .set_remote_description(desc)
            .await
            .map_err(|e| Error::MediaEngine(format!("failed to set remote description: {}", e)))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        // The index travels as u32 on the wire but the engine takes u16; an
        // overflow must not be smuggled through as "unspecified".
        let mline_index = u16::try_from(candidate.sdp_mline_index).map_err(|_| {
            Error::MediaEngine(format!(
                "sdpMLineIndex {} out of range for the engine",
                candidate.sdp_mline_index
            ))
        })?;

        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: None,
            sdp_mline_index: Some(mline_index),
            ..Default::default()
        };

        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| Error::MediaEngine(format!("failed to add candidate: {}", e)))
    }

    async fn close(&self) -> Result<()> {
        self.pc
            .close()
            .await
            .map_err(|e| Error::MediaEngine(format!("failed to close peer connection: {}", e)))
    }
}
