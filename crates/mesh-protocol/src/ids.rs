//! Identifier newtypes for mesh sessions.
//!
//! Identifiers are opaque strings on the wire. Generated IDs carry a
//! short prefix so logs stay readable.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a participant, generated locally at startup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Generate a new random participant ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("peer_{}", Uuid::new_v4().simple()))
    }

    /// The raw identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Transient identifier for an invite, valid until the answering guest's
/// participant ID is learned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InviteId(String);

impl InviteId {
    /// Generate a new random invite ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("invite_{}", Uuid::new_v4().simple()))
    }

    /// The raw identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InviteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InviteId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(ParticipantId::generate(), ParticipantId::generate());
        assert_ne!(InviteId::generate(), InviteId::generate());
    }

    #[test]
    fn test_id_prefixes() {
        assert!(ParticipantId::generate().as_str().starts_with("peer_"));
        assert!(InviteId::generate().as_str().starts_with("invite_"));
    }

    #[test]
    fn test_serde_transparent() {
        let id = ParticipantId::from("peer_xyz");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"peer_xyz\"");
        let back: ParticipantId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
