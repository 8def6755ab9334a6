//! Opaque handshake tokens for the out-of-band invite exchange.
//!
//! The invite and answer tokens are the only data that travels outside
//! a peer channel. The out-of-band carrier (chat, email, a person
//! reading a string aloud) only needs to deliver the blob to exactly
//! one participant, so both tokens encode as URL-safe base64 over
//! their JSON form.

use crate::error::ProtocolError;
use crate::ids::{InviteId, ParticipantId};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Which half of the two-phase handshake a description is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// A connectivity description produced by the Peer Link collaborator
/// after candidate gathering.
///
/// `handshake_id` ties an answer back to the offer it was produced
/// for; an answer arriving for a superseded offer is detectably stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub handshake_id: String,
    pub payload: String,
}

/// Host -> guest out-of-band blob: "join my session".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InviteToken {
    pub invite_id: InviteId,
    pub host_id: ParticipantId,
    pub offer: SessionDescription,
}

/// Guest -> host out-of-band blob: "here is my answer".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerToken {
    pub invite_id: InviteId,
    pub guest_id: ParticipantId,
    pub answer: SessionDescription,
}

fn encode<T: Serialize>(value: &T) -> Result<String, ProtocolError> {
    let json = serde_json::to_vec(value)
        .map_err(|e| ProtocolError::Serialization(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode<T: DeserializeOwned>(blob: &str) -> Result<T, ProtocolError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(blob.trim())
        .map_err(|e| ProtocolError::InvalidToken(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| ProtocolError::InvalidToken(e.to_string()))
}

impl InviteToken {
    /// Encode as an opaque blob for out-of-band delivery.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        encode(self)
    }

    /// Decode a blob received out-of-band.
    pub fn decode(blob: &str) -> Result<Self, ProtocolError> {
        decode(blob)
    }
}

impl AnswerToken {
    /// Encode as an opaque blob for out-of-band delivery.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        encode(self)
    }

    /// Decode a blob received out-of-band.
    pub fn decode(blob: &str) -> Result<Self, ProtocolError> {
        decode(blob)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn offer() -> SessionDescription {
        SessionDescription {
            kind: SdpKind::Offer,
            handshake_id: "hs_abc".to_string(),
            payload: "v=0 candidates...".to_string(),
        }
    }

    #[test]
    fn test_invite_token_roundtrip() {
        let token = InviteToken {
            invite_id: InviteId::from("invite_abc"),
            host_id: ParticipantId::from("peer_host"),
            offer: offer(),
        };
        let blob = token.encode().unwrap();
        let back = InviteToken::decode(&blob).unwrap();
        assert_eq!(back, token);
    }

    #[test]
    fn test_answer_token_roundtrip() {
        let token = AnswerToken {
            invite_id: InviteId::from("invite_abc"),
            guest_id: ParticipantId::from("peer_guest"),
            answer: SessionDescription {
                kind: SdpKind::Answer,
                handshake_id: "hs_abc".to_string(),
                payload: "answer blob".to_string(),
            },
        };
        let blob = token.encode().unwrap();
        let back = AnswerToken::decode(&blob).unwrap();
        assert_eq!(back, token);
    }

    #[test]
    fn test_blob_is_opaque_single_line() {
        let token = InviteToken {
            invite_id: InviteId::generate(),
            host_id: ParticipantId::generate(),
            offer: offer(),
        };
        let blob = token.encode().unwrap();
        assert!(!blob.contains('\n'));
        assert!(!blob.contains('{'));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            InviteToken::decode("not base64 !!!"),
            Err(ProtocolError::InvalidToken(_))
        ));
        // Valid base64, invalid JSON inside.
        let blob = URL_SAFE_NO_PAD.encode(b"plainly not json");
        assert!(matches!(
            AnswerToken::decode(&blob),
            Err(ProtocolError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_decode_trims_whitespace() {
        let token = InviteToken {
            invite_id: InviteId::from("invite_ws"),
            host_id: ParticipantId::from("peer_host"),
            offer: offer(),
        };
        let blob = format!("  {}\n", token.encode().unwrap());
        assert_eq!(InviteToken::decode(&blob).unwrap(), token);
    }
}
