use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of a forwarded session description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
    /// `pranswer`, `rollback`, or a missing `type`; relayed but never buffered
    Other,
}

impl SdpKind {
    fn of(description: &Value) -> Self {
        match description.get("type").and_then(Value::as_str) {
            Some("offer") => SdpKind::Offer,
            Some("answer") => SdpKind::Answer,
            _ => SdpKind::Other,
        }
    }
}

/// An inbound frame, classified once at ingress.
///
/// Only the discriminating fields are inspected. The relay always forwards
/// the original frame bytes, never a re-serialization of this value.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingMessage {
    /// `{"type":"ready"}`
    Ready,
    /// `{"type":"peer-ready"}` sent by a client
    PeerReady,
    /// `{"sdp":{"type":"offer"|"answer",...}}`
    SessionDescription { kind: SdpKind, description: Value },
    /// `{"ice":{...}}`
    IceCandidate { candidate: Value },
    /// Anything else, including non-JSON and binary payloads
    Opaque,
}

impl SignalingMessage {
    /// Classify a raw payload. Never fails: undecodable input is `Opaque`.
    pub fn decode(payload: &[u8]) -> Self {
        let mut fields = match serde_json::from_slice::<Value>(payload) {
            Ok(Value::Object(map)) => map,
            _ => return SignalingMessage::Opaque,
        };

        match fields.get("type").and_then(Value::as_str) {
            Some("ready") => return SignalingMessage::Ready,
            Some("peer-ready") => return SignalingMessage::PeerReady,
            _ => {}
        }

        // `null` counts as absent
        if let Some(description) = fields.remove("sdp").filter(|v| !v.is_null()) {
            return SignalingMessage::SessionDescription {
                kind: SdpKind::of(&description),
                description,
            };
        }
        if let Some(candidate) = fields.remove("ice").filter(|v| !v.is_null()) {
            return SignalingMessage::IceCandidate { candidate };
        }

        SignalingMessage::Opaque
    }

    /// The slot kind this message would occupy when no peer is present.
    pub fn bufferable_kind(&self) -> Option<SdpKind> {
        match self {
            SignalingMessage::SessionDescription {
                kind: kind @ (SdpKind::Offer | SdpKind::Answer),
                ..
            } => Some(*kind),
            _ => None,
        }
    }

    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            SignalingMessage::Ready => "ready",
            SignalingMessage::PeerReady => "peer-ready",
            SignalingMessage::SessionDescription { kind, .. } => match kind {
                SdpKind::Offer => "SDP offer",
                SdpKind::Answer => "SDP answer",
                SdpKind::Other => "SDP",
            },
            SignalingMessage::IceCandidate { .. } => "ICE candidate",
            SignalingMessage::Opaque => "opaque",
        }
    }
}

/// Messages generated by the relay itself
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Another peer is present and either side may start the offer
    #[serde(rename = "peer-ready")]
    PeerReady,
}

impl ServerMessage {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("ServerMessage serialization should never fail")
    }
}
