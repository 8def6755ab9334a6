//! Per-link pump task.
//!
//! Each link gets one task that drains the link's event channel and forwards
//! everything into the session actor's mailbox, tagged with the link's
//! [`LinkId`]. The tag stays valid across directory rekeying, so an event
//! raised while a handshake was still keyed by invite resolves correctly
//! after the peer identifies itself.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::link::{ConnectionState, LinkEvent, LinkId};
use crate::metrics::MailboxMonitor;

/// A link event tagged with its source link, as delivered to the session
/// actor.
#[derive(Debug)]
pub struct TaggedLinkEvent {
    pub link_id: LinkId,
    pub event: LinkEvent,
}

/// Spawn the pump for one link.
///
/// The task runs until the link's event channel closes, a terminal state
/// event is forwarded, or `cancel_token` fires. If the channel closes
/// without a terminal state, a synthesized `Disconnected` is forwarded so
/// the session actor always observes departure.
pub fn spawn_pump(
    link_id: LinkId,
    mut events: mpsc::Receiver<LinkEvent>,
    actor_tx: mpsc::Sender<TaggedLinkEvent>,
    actor_mailbox: Arc<MailboxMonitor>,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(target: "mesh.actor.link", link_id = %link_id, "Link pump started");

        let mut saw_terminal = false;
        loop {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    debug!(target: "mesh.actor.link", link_id = %link_id, "Link pump cancelled");
                    return;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    if let LinkEvent::StateChanged(state) = &event {
                        saw_terminal = state.is_terminal();
                    }
                    trace!(target: "mesh.actor.link", link_id = %link_id, "Forwarding link event");
                    actor_mailbox.record_enqueue();
                    if actor_tx
                        .send(TaggedLinkEvent { link_id, event })
                        .await
                        .is_err()
                    {
                        warn!(
                            target: "mesh.actor.link",
                            link_id = %link_id,
                            "Session actor mailbox closed, stopping pump"
                        );
                        return;
                    }
                    if saw_terminal {
                        break;
                    }
                }
            }
        }

        if !saw_terminal {
            actor_mailbox.record_enqueue();
            let _ = actor_tx
                .send(TaggedLinkEvent {
                    link_id,
                    event: LinkEvent::StateChanged(ConnectionState::Disconnected),
                })
                .await;
        }
        debug!(target: "mesh.actor.link", link_id = %link_id, "Link pump finished");
    })
}
