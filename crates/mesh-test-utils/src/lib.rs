//! Test support for `session-core`.
//!
//! Provides an in-memory [`fake_link::FakeHub`] implementing the peer link
//! traits without any real transport, plus async assertion helpers. Test
//! tooling is expected to panic loudly on misuse.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]

pub mod eventual;
pub mod fake_link;

pub use eventual::eventually;
pub use fake_link::FakeHub;
