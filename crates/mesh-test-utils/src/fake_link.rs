//! In-memory peer link fake.
//!
//! A [`FakeHub`] stands in for the whole transport layer: every link created
//! from one of its factories shares a handshake registry, so an offer
//! produced by one fake link can be answered by another exactly as real
//! descriptions travel between processes. The fake preserves the handshake
//! contract the session actor depends on:
//!
//! - an offer is answerable exactly once
//! - the channel opens on both sides only when the initiator applies the
//!   answer
//! - `send` fails with `ChannelNotOpen` before that, and again after close
//!
//! Failure injection: [`FakeHub::fail_next_offer`] makes the next offer
//! creation fail, and [`FakeHub::set_candidate_delay`] slows handshake steps
//! to exercise the candidate gathering bound.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use mesh_protocol::{ChannelMessage, SdpKind, SessionDescription};
use session_core::errors::SessionError;
use session_core::link::{ConnectionState, HandshakeRole, LinkEvent, PeerLink, PeerLinkFactory};

const EVENT_CAPACITY: usize = 64;

/// One end of a wired channel, as seen from the other end.
struct PeerEnd {
    events: mpsc::Sender<LinkEvent>,
    state: Arc<Mutex<LinkState>>,
}

/// Mutable state of one fake link.
#[derive(Default)]
struct LinkState {
    open: bool,
    closed: bool,
    peer: Option<PeerEnd>,
}

struct PendingHandshake {
    offer_events: mpsc::Sender<LinkEvent>,
    offer_state: Arc<Mutex<LinkState>>,
    responder: Option<(mpsc::Sender<LinkEvent>, Arc<Mutex<LinkState>>)>,
}

#[derive(Default)]
struct HubState {
    next_handshake: u64,
    pending: HashMap<String, PendingHandshake>,
    fail_next_offer: bool,
    candidate_delay: Option<Duration>,
    open_channels: usize,
}

/// Shared in-memory transport for a whole test scenario.
#[derive(Clone, Default)]
pub struct FakeHub {
    state: Arc<Mutex<HubState>>,
}

impl FakeHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A link factory backed by this hub, one per simulated process.
    #[must_use]
    pub fn factory(&self) -> Arc<dyn PeerLinkFactory> {
        Arc::new(FakeLinkFactory {
            hub: Arc::clone(&self.state),
        })
    }

    /// Make the next offer creation fail with a setup error.
    pub fn fail_next_offer(&self) {
        self.state.lock().expect("hub lock poisoned").fail_next_offer = true;
    }

    /// Delay handshake steps, to trip the candidate gathering bound.
    pub fn set_candidate_delay(&self, delay: Duration) {
        self.state.lock().expect("hub lock poisoned").candidate_delay = Some(delay);
    }

    /// Number of channels currently open (each counted once per pair).
    #[must_use]
    pub fn open_channel_count(&self) -> usize {
        self.state.lock().expect("hub lock poisoned").open_channels
    }

    /// Number of offers awaiting an answer or a wire-up.
    #[must_use]
    pub fn pending_handshake_count(&self) -> usize {
        self.state.lock().expect("hub lock poisoned").pending.len()
    }
}

struct FakeLinkFactory {
    hub: Arc<Mutex<HubState>>,
}

impl PeerLinkFactory for FakeLinkFactory {
    fn create(
        &self,
        role: HandshakeRole,
    ) -> Result<(Arc<dyn PeerLink>, mpsc::Receiver<LinkEvent>), SessionError> {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
        let link = FakePeerLink {
            role,
            hub: Arc::clone(&self.hub),
            events_tx,
            state: Arc::new(Mutex::new(LinkState::default())),
            handshake_id: Mutex::new(None),
        };
        Ok((Arc::new(link), events_rx))
    }
}

struct FakePeerLink {
    role: HandshakeRole,
    hub: Arc<Mutex<HubState>>,
    events_tx: mpsc::Sender<LinkEvent>,
    state: Arc<Mutex<LinkState>>,
    handshake_id: Mutex<Option<String>>,
}

impl FakePeerLink {
    async fn candidate_delay(&self) {
        let delay = self.hub.lock().expect("hub lock poisoned").candidate_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl PeerLink for FakePeerLink {
    async fn initiate_offer(&self) -> Result<SessionDescription, SessionError> {
        if self.role != HandshakeRole::Initiator {
            return Err(SessionError::SetupFailure(
                "responder link cannot create offers".to_string(),
            ));
        }
        self.candidate_delay().await;

        let mut hub = self.hub.lock().expect("hub lock poisoned");
        if hub.fail_next_offer {
            hub.fail_next_offer = false;
            return Err(SessionError::SetupFailure(
                "injected offer failure".to_string(),
            ));
        }
        hub.next_handshake += 1;
        let handshake_id = format!("hs_{}", hub.next_handshake);
        hub.pending.insert(
            handshake_id.clone(),
            PendingHandshake {
                offer_events: self.events_tx.clone(),
                offer_state: Arc::clone(&self.state),
                responder: None,
            },
        );
        drop(hub);

        *self.handshake_id.lock().expect("link lock poisoned") = Some(handshake_id.clone());
        Ok(SessionDescription {
            kind: SdpKind::Offer,
            handshake_id: handshake_id.clone(),
            payload: format!("fake-offer {handshake_id}"),
        })
    }

    async fn accept_offer(
        &self,
        offer: &SessionDescription,
    ) -> Result<SessionDescription, SessionError> {
        if self.role != HandshakeRole::Responder {
            return Err(SessionError::SetupFailure(
                "initiator link cannot accept offers".to_string(),
            ));
        }
        self.candidate_delay().await;

        let mut hub = self.hub.lock().expect("hub lock poisoned");
        let pending = hub.pending.get_mut(&offer.handshake_id).ok_or_else(|| {
            SessionError::SetupFailure(format!("unknown offer {}", offer.handshake_id))
        })?;
        if pending.responder.is_some() {
            return Err(SessionError::SetupFailure(format!(
                "offer {} already answered",
                offer.handshake_id
            )));
        }
        pending.responder = Some((self.events_tx.clone(), Arc::clone(&self.state)));
        drop(hub);

        *self.handshake_id.lock().expect("link lock poisoned") = Some(offer.handshake_id.clone());
        Ok(SessionDescription {
            kind: SdpKind::Answer,
            handshake_id: offer.handshake_id.clone(),
            payload: format!("fake-answer {}", offer.handshake_id),
        })
    }

    async fn apply_remote_answer(
        &self,
        answer: &SessionDescription,
    ) -> Result<(), SessionError> {
        if self.role != HandshakeRole::Initiator {
            return Err(SessionError::SetupFailure(
                "responder link cannot apply answers".to_string(),
            ));
        }
        let own = self
            .handshake_id
            .lock()
            .expect("link lock poisoned")
            .clone();
        if own.as_deref() != Some(answer.handshake_id.as_str()) {
            return Err(SessionError::SetupFailure(format!(
                "answer {} does not match this link's offer",
                answer.handshake_id
            )));
        }

        let mut hub = self.hub.lock().expect("hub lock poisoned");
        let pending = hub.pending.remove(&answer.handshake_id).ok_or_else(|| {
            SessionError::SetupFailure(format!("offer {} no longer pending", answer.handshake_id))
        })?;
        let Some((responder_events, responder_state)) = pending.responder else {
            return Err(SessionError::SetupFailure(format!(
                "offer {} was never answered",
                answer.handshake_id
            )));
        };
        hub.open_channels += 1;
        drop(hub);

        {
            let mut offerer = pending.offer_state.lock().expect("link lock poisoned");
            offerer.open = true;
            offerer.peer = Some(PeerEnd {
                events: responder_events.clone(),
                state: Arc::clone(&responder_state),
            });
        }
        {
            let mut responder = responder_state.lock().expect("link lock poisoned");
            responder.open = true;
            responder.peer = Some(PeerEnd {
                events: pending.offer_events.clone(),
                state: Arc::clone(&pending.offer_state),
            });
        }

        let _ = pending.offer_events.try_send(LinkEvent::ChannelOpen);
        let _ = responder_events.try_send(LinkEvent::ChannelOpen);
        debug!(handshake_id = %answer.handshake_id, "Fake channel wired");
        Ok(())
    }

    async fn send(&self, message: &ChannelMessage) -> Result<(), SessionError> {
        let peer_events = {
            let state = self.state.lock().expect("link lock poisoned");
            if state.closed || !state.open {
                return Err(SessionError::ChannelNotOpen);
            }
            match &state.peer {
                Some(peer) => peer.events.clone(),
                None => return Err(SessionError::ChannelNotOpen),
            }
        };
        peer_events
            .try_send(LinkEvent::Message(message.clone()))
            .map_err(|_| SessionError::ChannelNotOpen)
    }

    async fn close(&self) {
        let (was_open, peer) = {
            let mut state = self.state.lock().expect("link lock poisoned");
            if state.closed {
                return;
            }
            state.closed = true;
            let was_open = state.open;
            state.open = false;
            (was_open, state.peer.take())
        };
        if was_open {
            self.hub.lock().expect("hub lock poisoned").open_channels -= 1;
        }
        if let Some(peer) = peer {
            {
                let mut remote = peer.state.lock().expect("link lock poisoned");
                remote.open = false;
                remote.peer = None;
            }
            let _ = peer
                .events
                .try_send(LinkEvent::StateChanged(ConnectionState::Disconnected));
        }
    }
}
