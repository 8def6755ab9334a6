//! Replication events.
//!
//! A `StateEvent` is the unit of replication: the host applies one to
//! its document and broadcasts it; guests apply exactly what they
//! receive. The enum is the wire format - each variant's tag is the
//! channel message `type` (kebab-case, with two legacy spellings kept
//! from the reference vocabulary: `ping` and `player-left`).
//!
//! Events are applied by `reduce` in `session-core`, which must treat
//! any missing target as a no-op rather than an error.

use crate::document::{Background, GameState, Layer, Ping, Token};
use crate::ids::ParticipantId;
use serde::{Deserialize, Serialize};

/// Address of a token inside the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRef {
    pub layer_id: String,
    pub token_id: String,
}

/// One ownership mutation inside a `token-ownership-changed` batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnershipChange {
    pub layer_id: String,
    pub token_id: String,
    pub new_owner: Option<ParticipantId>,
}

/// A discrete, host-committed mutation of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StateEvent {
    /// Wholesale document replacement, sent to a guest on join.
    FullSync { state: GameState },

    TokenMoved {
        layer_id: String,
        token_id: String,
        x: f64,
        y: f64,
    },

    TokenAdded { layer_id: String, token: Token },

    TokenDeleted { layer_id: String, token_id: String },

    /// Sets the given properties; absent fields are left untouched.
    TokenPropertyChanged {
        layer_id: String,
        token_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scale: Option<f64>,
    },

    /// Batch of ownership mutations, applied as one event so no peer
    /// observes a partial reassignment.
    TokenOwnershipChanged { changes: Vec<OwnershipChange> },

    LayerAdded { layer: Layer },

    LayerDeleted { layer_id: String },

    LayerRenamed { layer_id: String, name: String },

    LayerVisibilityChanged { layer_id: String, visible: bool },

    LayerBackgroundChanged {
        layer_id: String,
        background: Option<Background>,
    },

    /// Removes every token on the layer; the background stays.
    LayerCleared { layer_id: String },

    LayerScaled { layer_id: String, scale: f64 },

    LayerMoved { layer_id: String, x: f64, y: f64 },

    #[serde(rename = "ping")]
    PingAdded { ping: Ping },

    /// Atomic cleanup after a participant departs: delete their
    /// primary token and unclaim everything else they owned.
    #[serde(rename = "player-left")]
    ParticipantLeft {
        participant_id: ParticipantId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        removed_token: Option<TokenRef>,
        #[serde(default)]
        tokens_to_unclaim: Vec<TokenRef>,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_type_tags() {
        let moved = StateEvent::TokenMoved {
            layer_id: "layer_1".to_string(),
            token_id: "token_1".to_string(),
            x: 10.0,
            y: 20.0,
        };
        let value = serde_json::to_value(&moved).unwrap();
        assert_eq!(value["type"], "token-moved");

        let ping = StateEvent::PingAdded {
            ping: Ping {
                x: 0.0,
                y: 0.0,
                start_time_ms: 0,
                duration_ms: 1000,
            },
        };
        assert_eq!(serde_json::to_value(&ping).unwrap()["type"], "ping");

        let left = StateEvent::ParticipantLeft {
            participant_id: ParticipantId::from("peer_1"),
            removed_token: None,
            tokens_to_unclaim: Vec::new(),
        };
        assert_eq!(serde_json::to_value(&left).unwrap()["type"], "player-left");
    }

    #[test]
    fn test_event_roundtrip() {
        let event = StateEvent::TokenOwnershipChanged {
            changes: vec![
                OwnershipChange {
                    layer_id: "layer_1".to_string(),
                    token_id: "token_1".to_string(),
                    new_owner: Some(ParticipantId::from("peer_1")),
                },
                OwnershipChange {
                    layer_id: "layer_1".to_string(),
                    token_id: "token_2".to_string(),
                    new_owner: None,
                },
            ],
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: StateEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_full_sync_carries_document() {
        let event = StateEvent::FullSync {
            state: GameState::with_default_layer(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "full-sync");
        assert!(value["state"]["layers"].is_array());
    }
}
