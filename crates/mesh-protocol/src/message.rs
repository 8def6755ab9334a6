//! The channel message vocabulary.
//!
//! Every message on a peer channel is a JSON object with a required
//! `type` field. The vocabulary splits into three disjoint groups:
//!
//! - [`StateEvent`] - host-committed document mutations (host -> all)
//! - [`StateRequest`] - mutation requests (guest -> host only)
//! - [`ControlMessage`] - mesh introduction and session control
//!   (host <-> guest only, never guest <-> guest)
//!
//! [`ChannelMessage`] is the union of the three; the groups' tag sets
//! are disjoint, so the untagged wrapper deserializes unambiguously.

use crate::event::StateEvent;
use crate::ids::ParticipantId;
use crate::invite::SessionDescription;
use serde::{Deserialize, Serialize};

/// A mutation request a guest submits to the host.
///
/// The requester is identified by the link the message arrived on, not
/// by a field in the message; a peer cannot request on behalf of
/// another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StateRequest {
    TokenMoveRequest {
        layer_id: String,
        token_id: String,
        x: f64,
        y: f64,
    },

    ClaimTokenRequest { layer_id: String, token_id: String },

    UnclaimTokenRequest { layer_id: String, token_id: String },
}

/// One entry of an `offer-list` batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PooledOffer {
    pub from: ParticipantId,
    pub offer: SessionDescription,
}

/// Mesh introduction and session control messages.
///
/// The host relays handshake metadata only; it never interprets the
/// descriptions it forwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlMessage {
    /// Host -> newly connected guest: publish a mesh offer.
    RequestOffer,

    /// Guest -> host: the link this guest exposes to other peers.
    /// Also host -> guests as a pool announcement when an entry is
    /// added or replaced.
    Offer {
        from: ParticipantId,
        offer: SessionDescription,
    },

    /// Host -> newly introduced guest: every other pooled offer.
    /// Never sent empty.
    OfferList { offers: Vec<PooledOffer> },

    /// Answer routed through the host; forwarded verbatim to `to`.
    AnswerRelay {
        to: ParticipantId,
        from: ParticipantId,
        answer: SessionDescription,
    },

    /// Exchanged on channel open so rosters can carry display names.
    Hello { name: String },
}

/// Any message that can cross a peer channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelMessage {
    State(StateEvent),
    Request(StateRequest),
    Control(ControlMessage),
}

impl ChannelMessage {
    /// The wire `type` tag, for logging.
    #[must_use]
    pub fn type_tag(&self) -> String {
        match serde_json::to_value(self) {
            Ok(value) => value
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or("unknown")
                .to_string(),
            Err(_) => "unknown".to_string(),
        }
    }
}

impl From<StateEvent> for ChannelMessage {
    fn from(event: StateEvent) -> Self {
        ChannelMessage::State(event)
    }
}

impl From<StateRequest> for ChannelMessage {
    fn from(request: StateRequest) -> Self {
        ChannelMessage::Request(request)
    }
}

impl From<ControlMessage> for ChannelMessage {
    fn from(control: ControlMessage) -> Self {
        ChannelMessage::Control(control)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::invite::SdpKind;

    fn description() -> SessionDescription {
        SessionDescription {
            kind: SdpKind::Offer,
            handshake_id: "hs_1".to_string(),
            payload: "sdp-blob".to_string(),
        }
    }

    #[test]
    fn test_request_wire_tags() {
        let request = StateRequest::TokenMoveRequest {
            layer_id: "layer_1".to_string(),
            token_id: "token_1".to_string(),
            x: 1.0,
            y: 2.0,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["type"], "token-move-request");

        let claim = StateRequest::ClaimTokenRequest {
            layer_id: "layer_1".to_string(),
            token_id: "token_1".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&claim).unwrap()["type"],
            "claim-token-request"
        );
    }

    #[test]
    fn test_control_wire_tags() {
        assert_eq!(
            serde_json::to_value(ControlMessage::RequestOffer).unwrap()["type"],
            "request-offer"
        );
        let relay = ControlMessage::AnswerRelay {
            to: ParticipantId::from("peer_a"),
            from: ParticipantId::from("peer_b"),
            answer: description(),
        };
        assert_eq!(serde_json::to_value(&relay).unwrap()["type"], "answer-relay");
    }

    #[test]
    fn test_untagged_union_dispatch() {
        // A channel carries bytes; receivers must recover the group
        // from the tag alone.
        let messages: Vec<ChannelMessage> = vec![
            StateEvent::TokenDeleted {
                layer_id: "layer_1".to_string(),
                token_id: "token_1".to_string(),
            }
            .into(),
            StateRequest::UnclaimTokenRequest {
                layer_id: "layer_1".to_string(),
                token_id: "token_1".to_string(),
            }
            .into(),
            ControlMessage::Hello {
                name: "Alice".to_string(),
            }
            .into(),
        ];

        for message in messages {
            let json = serde_json::to_string(&message).unwrap();
            let back: ChannelMessage = serde_json::from_str(&json).unwrap();
            assert_eq!(back, message);
        }
    }

    #[test]
    fn test_offer_list_roundtrip() {
        let list = ControlMessage::OfferList {
            offers: vec![PooledOffer {
                from: ParticipantId::from("peer_a"),
                offer: description(),
            }],
        };
        let json = serde_json::to_string(&ChannelMessage::from(list.clone())).unwrap();
        let back: ChannelMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ChannelMessage::Control(list));
    }

    #[test]
    fn test_type_tag_helper() {
        let message: ChannelMessage = ControlMessage::RequestOffer.into();
        assert_eq!(message.type_tag(), "request-offer");
    }
}
