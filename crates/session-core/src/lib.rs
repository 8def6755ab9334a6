//! Serverless mesh session core.
//!
//! This library forms a full mesh of direct, reliable peer links among
//! N participants with no backend, using one participant (the host) as
//! a transient introduction hub, then keeps a shared document
//! synchronized across all peers under a single-writer authority
//! model.
//!
//! # Architecture
//!
//! ```text
//! SessionActor (one per process, owns all session state)
//! ├── SessionDirectory: participant/invite id -> peer link
//! ├── StateStore: the replicated document + pure reducer
//! ├── AuthorityGate: host applies, guests forward requests
//! ├── PendingOfferPool (host only): mesh introduction offers
//! └── spawns one pump task per peer link
//!     └── forwards link events into the session mailbox
//! ```
//!
//! The transport beneath a peer link is supplied by the caller through
//! the [`link::PeerLinkFactory`] trait; the core never touches sockets.
//! Rendering, input, and persistence live behind the
//! [`observer::SessionObserver`] callbacks.
//!
//! # Key design decisions
//!
//! - **Single writer**: only the host mutates the document. Guests
//!   translate desired mutations into request messages sent solely to
//!   the host; they observe state only through host-committed events.
//! - **One pump task per link**: each link's inbound traffic is drained
//!   independently; a stalled channel never blocks another link.
//! - **Bounded candidate gathering**: offer/answer generation is
//!   wrapped in a configurable timeout producing an abandoned invite,
//!   never a hung join flow.

#![warn(clippy::pedantic)]

pub mod audio;
pub mod authority;
pub mod config;
pub mod directory;
pub mod errors;
pub mod link;
pub mod metrics;
pub mod observer;
pub mod orchestrator;
pub mod state;
