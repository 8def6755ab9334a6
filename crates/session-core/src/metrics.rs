//! Actor metrics and mailbox monitoring.
//!
//! Mailbox depth thresholds:
//!
//! | Actor   | Normal | Warning | Critical |
//! |---------|--------|---------|----------|
//! | Session | < 100  | 100-500 | > 500    |
//! | Link    | < 50   | 50-200  | > 200    |

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Mailbox depth thresholds for the session actor.
pub const SESSION_MAILBOX_NORMAL: usize = 100;
pub const SESSION_MAILBOX_WARNING: usize = 500;

/// Mailbox depth thresholds for link pump tasks.
pub const LINK_MAILBOX_NORMAL: usize = 50;
pub const LINK_MAILBOX_WARNING: usize = 200;

/// Actor type for metrics labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    /// The session actor (one per process).
    Session,
    /// A link pump task (one per peer link).
    Link,
}

impl ActorType {
    /// The actor type as a string for log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActorType::Session => "session",
            ActorType::Link => "link",
        }
    }

    /// Warning threshold for this actor type.
    #[must_use]
    pub const fn warning_threshold(&self) -> usize {
        match self {
            ActorType::Session => SESSION_MAILBOX_WARNING,
            ActorType::Link => LINK_MAILBOX_WARNING,
        }
    }

    /// Normal threshold for this actor type.
    #[must_use]
    pub const fn normal_threshold(&self) -> usize {
        match self {
            ActorType::Session => SESSION_MAILBOX_NORMAL,
            ActorType::Link => LINK_MAILBOX_NORMAL,
        }
    }
}

/// Mailbox depth level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    Normal,
    Warning,
    Critical,
}

/// Tracks queue depth for one actor's mailbox.
#[derive(Debug)]
pub struct MailboxMonitor {
    actor_type: ActorType,
    actor_id: String,
    depth: AtomicUsize,
    peak_depth: AtomicUsize,
    messages_processed: AtomicU64,
}

impl MailboxMonitor {
    /// Create a monitor for the given actor.
    #[must_use]
    pub fn new(actor_type: ActorType, actor_id: impl Into<String>) -> Self {
        Self {
            actor_type,
            actor_id: actor_id.into(),
            depth: AtomicUsize::new(0),
            peak_depth: AtomicUsize::new(0),
            messages_processed: AtomicU64::new(0),
        }
    }

    /// Record a message entering the mailbox.
    pub fn record_enqueue(&self) {
        let new_depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;

        let mut current_peak = self.peak_depth.load(Ordering::Relaxed);
        while new_depth > current_peak {
            match self.peak_depth.compare_exchange_weak(
                current_peak,
                new_depth,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current_peak = actual,
            }
        }

        match self.level_for_depth(new_depth) {
            MailboxLevel::Critical => {
                warn!(
                    target: "mesh.actor.mailbox",
                    actor_type = self.actor_type.as_str(),
                    actor_id = %self.actor_id,
                    depth = new_depth,
                    "Mailbox depth critical"
                );
            }
            MailboxLevel::Warning if new_depth == self.actor_type.normal_threshold() + 1 => {
                debug!(
                    target: "mesh.actor.mailbox",
                    actor_type = self.actor_type.as_str(),
                    actor_id = %self.actor_id,
                    depth = new_depth,
                    "Mailbox depth elevated"
                );
            }
            _ => {}
        }
    }

    /// Record a message leaving the mailbox.
    pub fn record_dequeue(&self) {
        self.depth.fetch_sub(1, Ordering::Relaxed);
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Current mailbox depth.
    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Peak mailbox depth.
    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    /// Total messages processed.
    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    /// Current depth level.
    #[must_use]
    pub fn current_level(&self) -> MailboxLevel {
        self.level_for_depth(self.current_depth())
    }

    fn level_for_depth(&self, depth: usize) -> MailboxLevel {
        if depth > self.actor_type.warning_threshold() {
            MailboxLevel::Critical
        } else if depth > self.actor_type.normal_threshold() {
            MailboxLevel::Warning
        } else {
            MailboxLevel::Normal
        }
    }
}

/// Aggregate counters for the session, shared across tasks.
#[derive(Debug, Default)]
pub struct SessionMetrics {
    /// Peer links currently registered.
    active_links: AtomicUsize,
    /// Invite or mesh handshakes abandoned before completion.
    handshakes_abandoned: AtomicU64,
    /// Messages dropped for a closed channel.
    sends_dropped: AtomicU64,
    /// Malformed or role-inappropriate messages ignored.
    protocol_violations: AtomicU64,
}

impl SessionMetrics {
    /// Create a new shared metrics instance.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn link_registered(&self) {
        self.active_links.fetch_add(1, Ordering::Relaxed);
    }

    pub fn link_removed(&self) {
        self.active_links.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_handshake_abandoned(&self) {
        self.handshakes_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_dropped(&self) {
        self.sends_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_protocol_violation(&self) {
        self.protocol_violations.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn link_count(&self) -> usize {
        self.active_links.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn handshakes_abandoned(&self) -> u64 {
        self.handshakes_abandoned.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn sends_dropped(&self) -> u64 {
        self.sends_dropped.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn protocol_violations(&self) -> u64 {
        self.protocol_violations.load(Ordering::Relaxed)
    }
}
