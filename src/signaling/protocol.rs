//! Wire protocol for the signaling relay
//!
//! The relay speaks two frame shapes over a single text channel: short
//! space-delimited control frames (`HELLO`, `SESSION <peer>`, `SESSION_OK`,
//! `ERROR <text>`) and JSON envelopes for SDP descriptions and trickle-ICE
//! candidates. Decoding fails closed: any frame that is not one of the
//! recognized shapes is a [`MalformedMessage`](crate::Error::MalformedMessage),
//! never a best-effort partial parse.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Which half of the offer/answer exchange a description belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    /// The initiating description of a negotiation
    Offer,
    /// The response to a previously received offer
    Answer,
}

/// An SDP blob tagged with its role in the exchange
///
/// The SDP text is opaque to signaling; only the tag participates in state
/// transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Offer or answer
    #[serde(rename = "type")]
    pub kind: SdpKind,
    /// Raw SDP text
    pub sdp: String,
}

/// A trickle-ICE candidate
///
/// `sdp_mline_index` correlates with the media section order of the
/// offer/answer SDP and is passed through unmodified, never recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Candidate line as produced by the media engine
    pub candidate: String,
    /// Index of the SDP media section this candidate belongs to
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: u32,
}

/// Messages exchanged with the signaling relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingMessage {
    /// Registration (`HELLO <id>`, client to relay) or its acknowledgement
    /// (bare `HELLO`, relay to client)
    Hello {
        /// Local peer id when registering; `None` in the relay's ack
        id: Option<String>,
    },
    /// Call request naming the remote peer (`SESSION <peerId>`)
    SessionRequest {
        /// Remote peer identifier
        peer_id: String,
    },
    /// Relay accepted the call request (`SESSION_OK`)
    SessionAck,
    /// Failure reported by the relay; text after the prefix is free-form
    RemoteError {
        /// Verbatim error text
        text: String,
    },
    /// SDP offer or answer, either direction
    Description(SessionDescription),
    /// Trickle-ICE candidate, either direction
    Candidate(IceCandidate),
}

#[derive(Serialize, Deserialize)]
struct SdpEnvelope {
    sdp: SessionDescription,
}

#[derive(Serialize, Deserialize)]
struct IceEnvelope {
    ice: IceCandidate,
}

impl SignalingMessage {
    /// Encode this message as a relay text frame
    pub fn encode(&self) -> Result<String> {
        match self {
            SignalingMessage::Hello { id: Some(id) } => Ok(format!("HELLO {}", id)),
            SignalingMessage::Hello { id: None } => Ok("HELLO".to_string()),
            SignalingMessage::SessionRequest { peer_id } => Ok(format!("SESSION {}", peer_id)),
            SignalingMessage::SessionAck => Ok("SESSION_OK".to_string()),
            SignalingMessage::RemoteError { text } => Ok(format!("ERROR {}", text)),
            SignalingMessage::Description(desc) => {
                Ok(serde_json::to_string(&SdpEnvelope { sdp: desc.clone() })?)
            }
            SignalingMessage::Candidate(candidate) => Ok(serde_json::to_string(&IceEnvelope {
                ice: candidate.clone(),
            })?),
        }
    }

    /// Decode a relay text frame, failing closed on any unrecognized shape
    pub fn decode(frame: &str) -> Result<Self> {
        let frame = frame.trim();

        if frame == "HELLO" {
            return Ok(SignalingMessage::Hello { id: None });
        }
        if let Some(rest) = frame.strip_prefix("HELLO ") {
            let id = rest.trim();
            if id.is_empty() || id.contains(char::is_whitespace) {
                return Err(Error::MalformedMessage(format!(
                    "HELLO frame with invalid id: {:?}",
                    frame
                )));
            }
            return Ok(SignalingMessage::Hello {
                id: Some(id.to_string()),
            });
        }
        if frame == "SESSION_OK" {
            return Ok(SignalingMessage::SessionAck);
        }
        if let Some(rest) = frame.strip_prefix("SESSION ") {
            let peer_id = rest.trim();
            if peer_id.is_empty() {
                return Err(Error::MalformedMessage(
                    "SESSION frame without a peer id".to_string(),
                ));
            }
            return Ok(SignalingMessage::SessionRequest {
                peer_id: peer_id.to_string(),
            });
        }
        if frame == "ERROR" {
            return Ok(SignalingMessage::RemoteError {
                text: String::new(),
            });
        }
        if let Some(rest) = frame.strip_prefix("ERROR ") {
            return Ok(SignalingMessage::RemoteError {
                text: rest.to_string(),
            });
        }

        if frame.starts_with('{') {
            let value: serde_json::Value = serde_json::from_str(frame)
                .map_err(|e| Error::MalformedMessage(format!("invalid JSON frame: {}", e)))?;

            if value.get("sdp").is_some() {
                let envelope: SdpEnvelope = serde_json::from_value(value).map_err(|e| {
                    Error::MalformedMessage(format!("invalid sdp envelope: {}", e))
                })?;
                return Ok(SignalingMessage::Description(envelope.sdp));
            }
            if value.get("ice").is_some() {
                let envelope: IceEnvelope = serde_json::from_value(value).map_err(|e| {
                    Error::MalformedMessage(format!("invalid ice envelope: {}", e))
                })?;
                return Ok(SignalingMessage::Candidate(envelope.ice));
            }
            return Err(Error::MalformedMessage(
                "JSON frame is neither an sdp nor an ice envelope".to_string(),
            ));
        }

        Err(Error::MalformedMessage(format!(
            "unrecognized frame: {:?}",
            frame
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_registration() {
        let msg = SignalingMessage::Hello {
            id: Some("4821".to_string()),
        };
        assert_eq!(msg.encode().unwrap(), "HELLO 4821");
    }

    #[test]
    fn test_decode_registration_ack() {
        let msg = SignalingMessage::decode("HELLO").unwrap();
        assert_eq!(msg, SignalingMessage::Hello { id: None });
    }

    #[test]
    fn test_encode_session_request() {
        let msg = SignalingMessage::SessionRequest {
            peer_id: "77".to_string(),
        };
        assert_eq!(msg.encode().unwrap(), "SESSION 77");
    }

    #[test]
    fn test_decode_session_ack() {
        assert_eq!(
            SignalingMessage::decode("SESSION_OK").unwrap(),
            SignalingMessage::SessionAck
        );
    }

    #[test]
    fn test_decode_error_keeps_text_verbatim() {
        let msg = SignalingMessage::decode("ERROR no such peer").unwrap();
        assert_eq!(
            msg,
            SignalingMessage::RemoteError {
                text: "no such peer".to_string()
            }
        );
    }

    #[test]
    fn test_decode_offer_envelope() {
        let msg =
            SignalingMessage::decode(r#"{"sdp":{"type":"offer","sdp":"v=0\r\n"}}"#).unwrap();
        match msg {
            SignalingMessage::Description(desc) => {
                assert_eq!(desc.kind, SdpKind::Offer);
                assert_eq!(desc.sdp, "v=0\r\n");
            }
            other => panic!("expected description, got {:?}", other),
        }
    }

    #[test]
    fn test_description_round_trip() {
        let msg = SignalingMessage::Description(SessionDescription {
            kind: SdpKind::Answer,
            sdp: "v=0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n".to_string(),
        });
        let frame = msg.encode().unwrap();
        assert_eq!(SignalingMessage::decode(&frame).unwrap(), msg);
    }

    #[test]
    fn test_decode_ice_preserves_mline_index() {
        let msg = SignalingMessage::decode(
            r#"{"ice":{"candidate":"candidate:1 1 UDP 2013266431 192.168.1.7 51393 typ host","sdpMLineIndex":2}}"#,
        )
        .unwrap();
        match msg {
            SignalingMessage::Candidate(c) => {
                assert_eq!(c.sdp_mline_index, 2);
                assert!(c.candidate.starts_with("candidate:"));
            }
            other => panic!("expected candidate, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_sdp_type_is_malformed() {
        let result = SignalingMessage::decode(r#"{"sdp":{"type":"pranswer","sdp":"v=0"}}"#);
        assert!(matches!(result, Err(Error::MalformedMessage(_))));
    }

    #[test]
    fn test_unknown_json_shape_is_malformed() {
        let result = SignalingMessage::decode(r#"{"rollback":true}"#);
        assert!(matches!(result, Err(Error::MalformedMessage(_))));
    }

    #[test]
    fn test_garbage_frame_is_malformed() {
        assert!(matches!(
            SignalingMessage::decode("REGISTER 12"),
            Err(Error::MalformedMessage(_))
        ));
        assert!(matches!(
            SignalingMessage::decode("{not json"),
            Err(Error::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_hello_with_spaced_id_is_malformed() {
        assert!(matches!(
            SignalingMessage::decode("HELLO 12 34"),
            Err(Error::MalformedMessage(_))
        ));
    }
}
