//! The replicated game state document.
//!
//! The document is an ordered list of layers, each holding an ordered
//! list of tokens and an optional background image. Layers and tokens
//! are addressed by ID through the lookup helpers here; no component
//! holds direct references into the tree, so there is no aliasing
//! across the reducer, the authority gate, and the audio model.
//!
//! The document is created with one default layer at host start, is
//! mutated only by reducer application of discrete events, and is
//! replaced wholesale by a full-sync event when a guest joins.

use crate::ids::ParticipantId;
use serde::{Deserialize, Serialize};

/// Background image attached to a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Background {
    pub url: String,
    pub width: f64,
    pub height: f64,
    pub scale: f64,
    pub x: f64,
    pub y: f64,
}

/// A movable token on a layer.
///
/// `owner` is `None` for an unclaimed token. Token IDs are unique
/// within a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub color: String,
    #[serde(default)]
    pub owner: Option<ParticipantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
}

/// An ephemeral ping marker. Never persisted; expired pings are pruned
/// before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ping {
    pub x: f64,
    pub y: f64,
    /// Milliseconds since the Unix epoch.
    pub start_time_ms: u64,
    pub duration_ms: u64,
}

impl Ping {
    /// Whether this ping has expired at the given time.
    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.start_time_ms.saturating_add(self.duration_ms)
    }
}

/// A drawing layer holding tokens and an optional background.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: String,
    pub name: String,
    pub visible: bool,
    #[serde(default)]
    pub background: Option<Background>,
    #[serde(default)]
    pub tokens: Vec<Token>,
}

impl Layer {
    /// Create an empty visible layer.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            visible: true,
            background: None,
            tokens: Vec::new(),
        }
    }

    /// Look up a token by ID.
    #[must_use]
    pub fn token(&self, token_id: &str) -> Option<&Token> {
        self.tokens.iter().find(|t| t.id == token_id)
    }

    /// Look up a token by ID, mutably.
    pub fn token_mut(&mut self, token_id: &str) -> Option<&mut Token> {
        self.tokens.iter_mut().find(|t| t.id == token_id)
    }
}

/// ID of the layer created at host start.
pub const DEFAULT_LAYER_ID: &str = "layer_default";

/// The full replicated document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub pings: Vec<Ping>,
}

impl GameState {
    /// An empty document with no layers. Guests start here and wait
    /// for the host's full-sync.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            layers: Vec::new(),
            pings: Vec::new(),
        }
    }

    /// The host's starting document: one default layer, no pings.
    #[must_use]
    pub fn with_default_layer() -> Self {
        Self {
            layers: vec![Layer::new(DEFAULT_LAYER_ID, "Map")],
            pings: Vec::new(),
        }
    }

    /// Look up a layer by ID.
    #[must_use]
    pub fn layer(&self, layer_id: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == layer_id)
    }

    /// Look up a layer by ID, mutably.
    pub fn layer_mut(&mut self, layer_id: &str) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == layer_id)
    }

    /// Look up a token anywhere in the document.
    #[must_use]
    pub fn find_token(&self, layer_id: &str, token_id: &str) -> Option<&Token> {
        self.layer(layer_id).and_then(|l| l.token(token_id))
    }

    /// All tokens owned by a participant, in document order, as
    /// `(layer_id, token_id)` pairs.
    #[must_use]
    pub fn owned_tokens(&self, owner: &ParticipantId) -> Vec<(String, String)> {
        self.layers
            .iter()
            .flat_map(|l| {
                l.tokens
                    .iter()
                    .filter(|t| t.owner.as_ref() == Some(owner))
                    .map(|t| (l.id.clone(), t.id.clone()))
            })
            .collect()
    }

    /// Position of the token owned by a participant, if any.
    ///
    /// With the one-token-per-participant rule upheld this is
    /// unambiguous; if the document transiently holds several, the
    /// first in document order wins.
    #[must_use]
    pub fn owned_token_position(&self, owner: &ParticipantId) -> Option<(f64, f64)> {
        self.layers.iter().find_map(|l| {
            l.tokens
                .iter()
                .find(|t| t.owner.as_ref() == Some(owner))
                .map(|t| (t.x, t.y))
        })
    }

    /// Drop pings whose lifetime has elapsed.
    pub fn prune_expired_pings(&mut self, now_ms: u64) {
        self.pings.retain(|p| !p.is_expired(now_ms));
    }
}
