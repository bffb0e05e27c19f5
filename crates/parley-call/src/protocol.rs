//! Signaling message types for call negotiation.
//!
//! These are the application-level messages that ride inside a broadcast
//! relay. On the wire every message is a JSON object
//! `{ "type", "callId", "from", "payload" }`; the relay envelope itself is
//! handled by the signaling channel implementations.

use parley_common::{CallId, ParticipantId};
use serde::{Deserialize, Serialize};

use crate::error::SignalingError;
use crate::media::MediaKind;
use crate::peer::{IceCandidate, SdpType, SessionDescription};

// ---------------------------------------------------------------------------
// Message type names
// ---------------------------------------------------------------------------

/// Values of the wire `type` field (also used as broadcast event names).
pub mod events {
    pub const OFFER: &str = "offer";
    pub const ANSWER: &str = "answer";
    pub const ICE_CANDIDATE: &str = "ice-candidate";
    pub const TRACK_STATUS: &str = "track-status";
    pub const TRACK_REPLACED: &str = "track-replaced";

    pub const ALL: [&str; 5] = [OFFER, ANSWER, ICE_CANDIDATE, TRACK_STATUS, TRACK_REPLACED];
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Payload of `track-status`: the sender muted or unmuted a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackStatusPayload {
    pub track_kind: MediaKind,
    pub enabled: bool,
}

/// Payload of `track-replaced`: the sender swapped its video source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackReplacedPayload {
    pub track_kind: MediaKind,
    pub is_screen_share: bool,
}

/// Kind-specific body of a signaling message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalBody {
    Offer(SessionDescription),
    Answer(SessionDescription),
    IceCandidate(IceCandidate),
    TrackStatus(TrackStatusPayload),
    TrackReplaced(TrackReplacedPayload),
}

impl SignalBody {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Offer(_) => events::OFFER,
            Self::Answer(_) => events::ANSWER,
            Self::IceCandidate(_) => events::ICE_CANDIDATE,
            Self::TrackStatus(_) => events::TRACK_STATUS,
            Self::TrackReplaced(_) => events::TRACK_REPLACED,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One signaling message, tagged with its call and sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalingMessage {
    pub call_id: CallId,
    pub from: ParticipantId,
    pub body: SignalBody,
}

/// JSON shape on the wire.
#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "callId")]
    call_id: CallId,
    from: ParticipantId,
    #[serde(default)]
    payload: serde_json::Value,
}

impl SignalingMessage {
    pub fn new(call_id: CallId, from: ParticipantId, body: SignalBody) -> Self {
        Self {
            call_id,
            from,
            body,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.body.kind()
    }

    /// Encode into the `{ type, callId, from, payload }` JSON object.
    pub fn to_wire(&self) -> serde_json::Value {
        let payload = match &self.body {
            SignalBody::Offer(desc) | SignalBody::Answer(desc) => serde_json::to_value(desc),
            SignalBody::IceCandidate(c) => serde_json::to_value(c),
            SignalBody::TrackStatus(p) => serde_json::to_value(p),
            SignalBody::TrackReplaced(p) => serde_json::to_value(p),
        }
        .unwrap_or(serde_json::Value::Null);

        serde_json::json!({
            "type": self.kind(),
            "callId": self.call_id,
            "from": self.from,
            "payload": payload,
        })
    }

    /// Decode a wire JSON object, rejecting unknown types and payloads that
    /// do not match their declared type.
    pub fn from_wire(value: &serde_json::Value) -> Result<Self, SignalingError> {
        let wire: WireMessage = serde_json::from_value(value.clone())
            .map_err(|e| SignalingError::Malformed(format!("envelope: {e}")))?;

        let body = match wire.kind.as_str() {
            events::OFFER => SignalBody::Offer(parse_description(wire.payload, SdpType::Offer)?),
            events::ANSWER => {
                SignalBody::Answer(parse_description(wire.payload, SdpType::Answer)?)
            }
            events::ICE_CANDIDATE => SignalBody::IceCandidate(parse_payload(wire.payload)?),
            events::TRACK_STATUS => SignalBody::TrackStatus(parse_payload(wire.payload)?),
            events::TRACK_REPLACED => SignalBody::TrackReplaced(parse_payload(wire.payload)?),
            other => {
                return Err(SignalingError::Malformed(format!(
                    "unknown message type '{other}'"
                )))
            }
        };

        Ok(Self {
            call_id: wire.call_id,
            from: wire.from,
            body,
        })
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(
    payload: serde_json::Value,
) -> Result<T, SignalingError> {
    serde_json::from_value(payload).map_err(|e| SignalingError::Malformed(format!("payload: {e}")))
}

fn parse_description(
    payload: serde_json::Value,
    expected: SdpType,
) -> Result<SessionDescription, SignalingError> {
    let desc: SessionDescription = parse_payload(payload)?;
    if desc.sdp_type != expected {
        return Err(SignalingError::Malformed(format!(
            "expected sdpType {expected}, got {}",
            desc.sdp_type
        )));
    }
    Ok(desc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(body: SignalBody) -> SignalingMessage {
        SignalingMessage::new(CallId::from("abc123"), ParticipantId::from("alice"), body)
    }

    #[test]
    fn offer_wire_shape() {
        let wire = msg(SignalBody::Offer(SessionDescription::offer("v=0\r\n"))).to_wire();
        assert_eq!(wire["type"], "offer");
        assert_eq!(wire["callId"], "abc123");
        assert_eq!(wire["from"], "alice");
        assert_eq!(wire["payload"]["sdpType"], "offer");
        assert_eq!(wire["payload"]["sdp"], "v=0\r\n");
    }

    #[test]
    fn ice_candidate_wire_shape() {
        let candidate = IceCandidate {
            candidate: "candidate:1 1 udp 2122260223 10.0.0.1 50000 typ host".into(),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
            username_fragment: Some("abcd".into()),
        };
        let wire = msg(SignalBody::IceCandidate(candidate.clone())).to_wire();
        assert_eq!(wire["type"], "ice-candidate");
        assert_eq!(wire["payload"]["sdpMid"], "0");
        assert_eq!(wire["payload"]["sdpMLineIndex"], 0);
        assert_eq!(wire["payload"]["usernameFragment"], "abcd");

        let decoded = SignalingMessage::from_wire(&wire).unwrap();
        assert_eq!(decoded.body, SignalBody::IceCandidate(candidate));
    }

    #[test]
    fn track_payloads_use_camel_case() {
        let wire = msg(SignalBody::TrackReplaced(TrackReplacedPayload {
            track_kind: MediaKind::Video,
            is_screen_share: true,
        }))
        .to_wire();
        assert_eq!(wire["type"], "track-replaced");
        assert_eq!(wire["payload"]["trackKind"], "video");
        assert_eq!(wire["payload"]["isScreenShare"], true);
    }

    #[test]
    fn decodes_browser_track_status() {
        let wire = serde_json::json!({
            "type": "track-status",
            "callId": "abc123",
            "from": "bob",
            "payload": { "trackKind": "audio", "enabled": false }
        });
        let decoded = SignalingMessage::from_wire(&wire).unwrap();
        assert_eq!(decoded.from, ParticipantId::from("bob"));
        assert_eq!(
            decoded.body,
            SignalBody::TrackStatus(TrackStatusPayload {
                track_kind: MediaKind::Audio,
                enabled: false
            })
        );
    }

    #[test]
    fn candidate_without_optional_fields_decodes() {
        let wire = serde_json::json!({
            "type": "ice-candidate",
            "callId": "abc123",
            "from": "bob",
            "payload": { "candidate": "candidate:2 1 udp 1 10.0.0.2 5000 typ host" }
        });
        let decoded = SignalingMessage::from_wire(&wire).unwrap();
        let SignalBody::IceCandidate(c) = decoded.body else {
            panic!("expected candidate");
        };
        assert!(c.sdp_mid.is_none());
        assert!(c.sdp_mline_index.is_none());
    }

    #[test]
    fn unknown_type_is_malformed() {
        let wire = serde_json::json!({
            "type": "hangup",
            "callId": "abc123",
            "from": "bob",
            "payload": {}
        });
        assert!(matches!(
            SignalingMessage::from_wire(&wire),
            Err(SignalingError::Malformed(_))
        ));
    }

    #[test]
    fn offer_carrying_answer_sdp_type_is_malformed() {
        let wire = serde_json::json!({
            "type": "offer",
            "callId": "abc123",
            "from": "bob",
            "payload": { "sdpType": "answer", "sdp": "v=0" }
        });
        assert!(matches!(
            SignalingMessage::from_wire(&wire),
            Err(SignalingError::Malformed(_))
        ));
    }

    #[test]
    fn missing_call_id_is_malformed() {
        let wire = serde_json::json!({ "type": "offer", "from": "bob" });
        assert!(SignalingMessage::from_wire(&wire).is_err());
    }
}
