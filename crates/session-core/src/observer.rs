//! Observer hooks for surfacing session changes to an embedding application.
//!
//! The session actor is headless. A UI (or a test harness) registers a
//! [`SessionObserver`] to be told when the shared document, the roster, or the
//! user-facing status line changes. Callbacks run on the session actor's task
//! and must return quickly.

use crate::link::ConnectionState;
use mesh_protocol::{GameState, ParticipantId};

/// One row of the participant roster as seen locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub participant_id: ParticipantId,
    /// Display name from the `hello` exchange, if received yet.
    pub name: Option<String>,
    pub state: ConnectionState,
}

/// Callbacks invoked by the session actor as the session evolves.
///
/// `Sync` is required because the actor's future holds the observer across
/// await points and must itself stay `Send` for `tokio::spawn`.
pub trait SessionObserver: Send + Sync + 'static {
    /// The shared document changed. `state` is the post-reduction snapshot.
    fn on_state_changed(&mut self, state: &GameState);

    /// The set of connected peers (or a peer's connection state) changed.
    fn on_roster_changed(&mut self, roster: &[RosterEntry]);

    /// A user-facing status line, e.g. "Invite expired".
    fn on_status(&mut self, message: &str);
}

/// Observer that ignores everything. Useful for tests and tools that only
/// query the session handle.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl SessionObserver for NullObserver {
    fn on_state_changed(&mut self, _state: &GameState) {}
    fn on_roster_changed(&mut self, _roster: &[RosterEntry]) {}
    fn on_status(&mut self, _message: &str) {}
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    // The actor future holds the boxed observer across await points; if the
    // trait object stops being Sync, spawning the actor stops compiling.
    #[test]
    fn test_observer_objects_are_send_and_sync() {
        assert_send_sync::<Box<dyn SessionObserver>>();
        assert_send_sync::<NullObserver>();
    }
}
