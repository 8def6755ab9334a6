//! Peer link abstraction.
//!
//! A [`PeerLink`] is one encrypted point-to-point connection with a reliable,
//! ordered message channel on top. The session actor drives handshakes and
//! sends through the trait; inbound traffic arrives as [`LinkEvent`]s on a
//! per-link channel, which a pump task tags with the link's stable [`LinkId`]
//! and forwards into the actor's mailbox (see [`task`]).
//!
//! The trait hides the transport. Production wires in a WebRTC-style
//! implementation; tests use the in-memory fake from `mesh-test-utils`.

pub mod task;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::errors::SessionError;
use mesh_protocol::{ChannelMessage, SessionDescription};

/// Stable identity of a link, fixed at creation and unaffected by directory
/// rekeying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(Uuid);

impl LinkId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Which side of the offer/answer handshake this link plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeRole {
    /// Creates the offer and applies the remote answer.
    Initiator,
    /// Accepts a remote offer and produces the answer.
    Responder,
}

/// Connection lifecycle of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, no handshake started.
    New,
    /// Handshake in progress.
    Connecting,
    /// Channel open, traffic flowing.
    Connected,
    /// Transport lost; terminal.
    Disconnected,
    /// Handshake or transport failure; terminal.
    Failed,
    /// Closed locally; terminal.
    Closed,
}

impl ConnectionState {
    /// Terminal states never transition again; the session actor treats
    /// them as departure.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected | ConnectionState::Failed | ConnectionState::Closed
        )
    }
}

/// Event raised by a link's transport.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// The reliable channel is open in both directions.
    ChannelOpen,
    /// A message arrived on the channel.
    Message(ChannelMessage),
    /// The connection lifecycle advanced.
    StateChanged(ConnectionState),
}

/// One peer connection. Handshake methods resolve only once local candidate
/// gathering is complete, so the returned descriptions are self-contained
/// and need no trickle channel.
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Create the local offer. Initiator only.
    async fn initiate_offer(&self) -> Result<SessionDescription, SessionError>;

    /// Apply a remote offer and create the answer. Responder only.
    async fn accept_offer(
        &self,
        offer: &SessionDescription,
    ) -> Result<SessionDescription, SessionError>;

    /// Apply the remote answer to a previously created offer. Initiator only.
    async fn apply_remote_answer(&self, answer: &SessionDescription)
        -> Result<(), SessionError>;

    /// Send a message on the reliable channel.
    ///
    /// Fails with [`SessionError::ChannelNotOpen`] until `ChannelOpen` has
    /// been observed.
    async fn send(&self, message: &ChannelMessage) -> Result<(), SessionError>;

    /// Tear the link down. Idempotent.
    async fn close(&self);
}

/// Creates links. The factory hands back the link and the receiving end of
/// its event channel in one call so no events can be lost before the caller
/// starts (or defers) the pump.
pub trait PeerLinkFactory: Send + Sync {
    fn create(
        &self,
        role: HandshakeRole,
    ) -> Result<(Arc<dyn PeerLink>, mpsc::Receiver<LinkEvent>), SessionError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!ConnectionState::New.is_terminal());
        assert!(!ConnectionState::Connecting.is_terminal());
        assert!(!ConnectionState::Connected.is_terminal());
        assert!(ConnectionState::Disconnected.is_terminal());
        assert!(ConnectionState::Failed.is_terminal());
        assert!(ConnectionState::Closed.is_terminal());
    }

    #[test]
    fn test_link_ids_are_unique() {
        assert_ne!(LinkId::generate(), LinkId::generate());
    }
}
