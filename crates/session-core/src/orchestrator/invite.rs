//! Pending invite bookkeeping, host side.
//!
//! An invite is pending from the moment its offer is generated until the
//! guest's answer blob comes back. The link itself lives in the session
//! directory under an invite key; this registry holds only the handshake
//! metadata needed to validate the returning answer.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::errors::SessionError;
use mesh_protocol::InviteId;

/// Handshake metadata for one outstanding invite.
#[derive(Debug, Clone)]
pub struct InviteMeta {
    /// Ties the returning answer to the offer it was produced for.
    pub offer_handshake_id: String,
    pub created_at: DateTime<Utc>,
}

/// Outstanding invites by id.
#[derive(Debug, Default)]
pub struct InviteRegistry {
    pending: HashMap<InviteId, InviteMeta>,
}

impl InviteRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly created invite.
    pub fn register(
        &mut self,
        invite_id: InviteId,
        offer_handshake_id: String,
    ) -> Result<(), SessionError> {
        if self.pending.contains_key(&invite_id) {
            return Err(SessionError::DirectoryConflict(invite_id.to_string()));
        }
        self.pending.insert(
            invite_id,
            InviteMeta {
                offer_handshake_id,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// Consume the invite for an arriving answer. A second answer for the
    /// same invite, or an answer for an unknown invite, fails as stale.
    pub fn take(&mut self, invite_id: &InviteId) -> Result<InviteMeta, SessionError> {
        self.pending
            .remove(invite_id)
            .ok_or_else(|| SessionError::StaleInvite(invite_id.to_string()))
    }

    /// Drop a pending invite whose link failed before the answer arrived.
    pub fn abandon(&mut self, invite_id: &InviteId) -> bool {
        self.pending.remove(invite_id).is_some()
    }

    #[must_use]
    pub fn contains(&self, invite_id: &InviteId) -> bool {
        self.pending.contains_key(invite_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
