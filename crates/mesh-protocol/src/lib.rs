//! Wire protocol for serverless tabletop mesh sessions.
//!
//! This crate defines everything that crosses a peer channel or an
//! out-of-band invite exchange, with no behavior beyond validation and
//! (de)serialization:
//!
//! - [`ids`] - participant/invite identifier newtypes
//! - [`document`] - the replicated game state document (layers, tokens,
//!   backgrounds, pings)
//! - [`event`] - replication events applied by the reducer
//! - [`message`] - the JSON channel message vocabulary (`type`-tagged)
//! - [`invite`] - opaque invite/answer handshake tokens
//!
//! All channel traffic is a JSON object with a required `type` field.
//! State events flow host -> guests, request variants flow guest -> host
//! only, and mesh-control messages flow host <-> guest only.

#![warn(clippy::pedantic)]

pub mod document;
pub mod error;
pub mod event;
pub mod ids;
pub mod invite;
pub mod message;

pub use document::{Background, GameState, Layer, Ping, Token, DEFAULT_LAYER_ID};
pub use error::ProtocolError;
pub use event::{OwnershipChange, StateEvent, TokenRef};
pub use ids::{InviteId, ParticipantId};
pub use invite::{AnswerToken, InviteToken, SdpKind, SessionDescription};
pub use message::{ChannelMessage, ControlMessage, PooledOffer, StateRequest};
