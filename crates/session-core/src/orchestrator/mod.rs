//! The session actor.
//!
//! One actor per process owns every piece of mutable session state: the
//! directory of peer links, the replicated document, the authority gate, and
//! (on the host) the pending invite registry and mesh offer pool. All
//! interaction goes through [`SessionActorHandle`]; link traffic arrives via
//! per-link pump tasks feeding the actor's mailbox.
//!
//! Handshake steps that gather connectivity candidates are awaited inside
//! the actor under the configured `candidate_wait` bound, so a silent
//! network interface costs at most that long before the attempt is
//! abandoned.

mod invite;
mod messages;
mod session;

pub use invite::{InviteMeta, InviteRegistry};
pub use messages::SessionMessage;
pub use session::{SessionActor, SessionActorHandle};
