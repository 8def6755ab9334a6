//! Replicated state store.
//!
//! The store owns the session's [`GameState`] document and mutates it only
//! through [`reducer::reduce`]. The host applies validated events before
//! broadcasting them; guests apply exactly the events they receive, so a
//! guest's document is always a prefix-replay of the host's.

pub mod reducer;

use mesh_protocol::{GameState, StateEvent};
use tracing::trace;

/// Owns the document and applies events to it.
#[derive(Debug)]
pub struct StateStore {
    state: GameState,
    /// Number of events applied since creation, for log correlation.
    applied: u64,
}

impl StateStore {
    /// Host-side store: starts with the default layer.
    #[must_use]
    pub fn for_host() -> Self {
        Self {
            state: GameState::with_default_layer(),
            applied: 0,
        }
    }

    /// Guest-side store: starts empty, populated by the host's full-sync.
    #[must_use]
    pub fn for_guest() -> Self {
        Self {
            state: GameState::empty(),
            applied: 0,
        }
    }

    /// The current document.
    #[must_use]
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// A clone of the current document, for full-sync to a joining guest.
    #[must_use]
    pub fn snapshot(&self) -> GameState {
        self.state.clone()
    }

    /// Events applied since creation.
    #[must_use]
    pub fn applied_count(&self) -> u64 {
        self.applied
    }

    /// Apply one event to the document.
    pub fn apply(&mut self, event: &StateEvent) {
        reducer::reduce(&mut self.state, event);
        self.applied += 1;
        trace!(
            target: "mesh.state",
            applied = self.applied,
            "Applied state event"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use mesh_protocol::DEFAULT_LAYER_ID;

    #[test]
    fn test_host_store_starts_with_default_layer() {
        let store = StateStore::for_host();
        assert!(store.state().layer(DEFAULT_LAYER_ID).is_some());
        assert_eq!(store.applied_count(), 0);
    }

    #[test]
    fn test_guest_store_starts_empty() {
        let store = StateStore::for_guest();
        assert!(store.state().layers.is_empty());
    }

    #[test]
    fn test_apply_counts_events() {
        let mut store = StateStore::for_guest();
        store.apply(&StateEvent::FullSync {
            state: GameState::with_default_layer(),
        });
        assert_eq!(store.applied_count(), 1);
        assert!(store.state().layer(DEFAULT_LAYER_ID).is_some());
    }
}
