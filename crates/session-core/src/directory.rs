//! Session directory: who is connected, and over which link.
//!
//! Links are keyed two ways. The primary key is a [`LinkKey`]: an invite id
//! while a handshake is in flight, atomically rekeyed to the participant id
//! once the peer identifies itself. A secondary index maps the stable
//! [`LinkId`] carried by pump-task events back to the current primary key, so
//! events raised before a rekey still resolve after it.

use std::collections::HashMap;

use mesh_protocol::{InviteId, ParticipantId, PooledOffer, SessionDescription};

use crate::errors::SessionError;
use crate::link::LinkId;

/// Primary key for a managed link.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkKey(String);

impl LinkKey {
    /// Key a link by the invite used to establish it.
    #[must_use]
    pub fn invite(id: &InviteId) -> Self {
        Self(format!("invite:{}", id.as_str()))
    }

    /// Key a link by the participant on its far end.
    #[must_use]
    pub fn participant(id: &ParticipantId) -> Self {
        Self(format!("participant:{}", id.as_str()))
    }

    /// The participant id, if this key is a participant key.
    #[must_use]
    pub fn as_participant(&self) -> Option<ParticipantId> {
        self.0
            .strip_prefix("participant:")
            .map(ParticipantId::from)
    }

    /// The invite id, if this key is an invite key.
    #[must_use]
    pub fn as_invite(&self) -> Option<InviteId> {
        self.0.strip_prefix("invite:").map(InviteId::from)
    }
}

impl std::fmt::Display for LinkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maps link keys to managed link state, with a [`LinkId`] secondary index.
#[derive(Debug)]
pub struct SessionDirectory<T> {
    links: HashMap<LinkKey, T>,
    by_link: HashMap<LinkId, LinkKey>,
}

impl<T> Default for SessionDirectory<T> {
    fn default() -> Self {
        Self {
            links: HashMap::new(),
            by_link: HashMap::new(),
        }
    }
}

impl<T> SessionDirectory<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a link under `key`. Fails if the key is already taken.
    pub fn insert(&mut self, key: LinkKey, link_id: LinkId, value: T) -> Result<(), SessionError> {
        if self.links.contains_key(&key) {
            return Err(SessionError::DirectoryConflict(key.to_string()));
        }
        self.by_link.insert(link_id, key.clone());
        self.links.insert(key, value);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, key: &LinkKey) -> Option<&T> {
        self.links.get(key)
    }

    #[must_use]
    pub fn get_mut(&mut self, key: &LinkKey) -> Option<&mut T> {
        self.links.get_mut(key)
    }

    /// Resolve a pump-task event's link id to the current primary key.
    #[must_use]
    pub fn key_for(&self, link_id: LinkId) -> Option<&LinkKey> {
        self.by_link.get(&link_id)
    }

    #[must_use]
    pub fn get_by_link_id(&self, link_id: LinkId) -> Option<&T> {
        self.by_link.get(&link_id).and_then(|k| self.links.get(k))
    }

    /// Remove a link and its secondary-index entries.
    pub fn remove(&mut self, key: &LinkKey) -> Option<T> {
        let removed = self.links.remove(key)?;
        self.by_link.retain(|_, k| k != key);
        Some(removed)
    }

    /// Atomically move a link from `old` to `new`, updating the secondary
    /// index. Fails if `old` is absent or `new` is already taken.
    pub fn rekey(&mut self, old: &LinkKey, new: LinkKey) -> Result<(), SessionError> {
        if self.links.contains_key(&new) {
            return Err(SessionError::DirectoryConflict(new.to_string()));
        }
        let value = self
            .links
            .remove(old)
            .ok_or_else(|| SessionError::UnknownPeer(old.to_string()))?;
        for key in self.by_link.values_mut() {
            if key == old {
                *key = new.clone();
            }
        }
        self.links.insert(new, value);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LinkKey, &T)> {
        self.links.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.links.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.links.values_mut()
    }

    /// Participant ids of all links keyed by participant, unsorted.
    #[must_use]
    pub fn participants(&self) -> Vec<ParticipantId> {
        self.links
            .keys()
            .filter_map(LinkKey::as_participant)
            .collect()
    }
}

/// Host-side pool of the latest fresh offer from each connected guest.
///
/// An entry is replaced whenever its guest sends a newer offer (it does so
/// each time a previous offer is consumed by an answer), and removed when the
/// guest departs.
#[derive(Debug, Default)]
pub struct PendingOfferPool {
    offers: HashMap<ParticipantId, SessionDescription>,
}

impl PendingOfferPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the pooled offer for `from`. Returns `true` if an
    /// older offer was replaced.
    pub fn put(&mut self, from: ParticipantId, offer: SessionDescription) -> bool {
        self.offers.insert(from, offer).is_some()
    }

    #[must_use]
    pub fn contains(&self, participant: &ParticipantId) -> bool {
        self.offers.contains_key(participant)
    }

    pub fn remove(&mut self, participant: &ParticipantId) -> Option<SessionDescription> {
        self.offers.remove(participant)
    }

    /// Snapshot all pooled offers except the excluded participant's own,
    /// sorted by participant id for deterministic delivery.
    #[must_use]
    pub fn offers_for(&self, exclude: &ParticipantId) -> Vec<PooledOffer> {
        let mut offers: Vec<PooledOffer> = self
            .offers
            .iter()
            .filter(|(from, _)| *from != exclude)
            .map(|(from, offer)| PooledOffer {
                from: from.clone(),
                offer: offer.clone(),
            })
            .collect();
        offers.sort_by(|a, b| a.from.cmp(&b.from));
        offers
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.offers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }
}
