//! Session actor and its handle.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audio;
use crate::authority::{AuthorityGate, Decision, Role};
use crate::config::Config;
use crate::directory::{LinkKey, PendingOfferPool, SessionDirectory};
use crate::errors::SessionError;
use crate::link::task::{spawn_pump, TaggedLinkEvent};
use crate::link::{
    ConnectionState, HandshakeRole, LinkEvent, LinkId, PeerLink, PeerLinkFactory,
};
use crate::metrics::{ActorType, MailboxMonitor, SessionMetrics};
use crate::observer::{RosterEntry, SessionObserver};
use crate::orchestrator::invite::InviteRegistry;
use crate::orchestrator::messages::SessionMessage;
use crate::state::StateStore;
use mesh_protocol::{
    AnswerToken, ChannelMessage, ControlMessage, GameState, InviteId, InviteToken,
    ParticipantId, SessionDescription, StateEvent, StateRequest,
};

const MAILBOX_CAPACITY: usize = 256;

/// One peer link under session management.
struct ManagedLink {
    link_id: LinkId,
    link: Arc<dyn PeerLink>,
    /// Held until the pump starts; `None` once pumping.
    events: Option<mpsc::Receiver<LinkEvent>>,
    state: ConnectionState,
    /// Display name from the hello exchange.
    name: Option<String>,
    cancel: CancellationToken,
}

/// A guest's published mesh offer: an initiator link waiting for some other
/// peer's relayed answer. Its events stay unpumped until the link is bound
/// to a peer.
struct ExposedLink {
    link_id: LinkId,
    link: Arc<dyn PeerLink>,
    events: mpsc::Receiver<LinkEvent>,
    offer: SessionDescription,
}

/// Clonable handle to a running session actor.
#[derive(Clone)]
pub struct SessionActorHandle {
    participant_id: ParticipantId,
    sender: mpsc::Sender<SessionMessage>,
    mailbox: Arc<MailboxMonitor>,
    cancel_token: CancellationToken,
}

impl SessionActorHandle {
    /// The locally generated participant identity.
    #[must_use]
    pub fn participant_id(&self) -> &ParticipantId {
        &self.participant_id
    }

    /// Host: create an invite, returning the out-of-band blob for one guest.
    pub async fn create_invite(&self) -> Result<String, SessionError> {
        self.request(|respond_to| SessionMessage::CreateInvite { respond_to })
            .await?
    }

    /// Host: complete an invite with the guest's answer blob.
    pub async fn accept_answer(&self, blob: String) -> Result<(), SessionError> {
        self.request(|respond_to| SessionMessage::AcceptAnswer { blob, respond_to })
            .await?
    }

    /// Guest: consume an invite blob; returns the answer blob to carry back
    /// to the host out-of-band.
    pub async fn join(&self, blob: String) -> Result<String, SessionError> {
        self.request(|respond_to| SessionMessage::Join { blob, respond_to })
            .await?
    }

    /// Request a token move.
    pub async fn move_token(
        &self,
        layer_id: impl Into<String>,
        token_id: impl Into<String>,
        x: f64,
        y: f64,
    ) -> Result<(), SessionError> {
        self.submit_request(StateRequest::TokenMoveRequest {
            layer_id: layer_id.into(),
            token_id: token_id.into(),
            x,
            y,
        })
        .await
    }

    /// Request to claim a token (releasing any currently claimed one).
    pub async fn claim_token(
        &self,
        layer_id: impl Into<String>,
        token_id: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.submit_request(StateRequest::ClaimTokenRequest {
            layer_id: layer_id.into(),
            token_id: token_id.into(),
        })
        .await
    }

    /// Request to release a claimed token.
    pub async fn unclaim_token(
        &self,
        layer_id: impl Into<String>,
        token_id: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.submit_request(StateRequest::UnclaimTokenRequest {
            layer_id: layer_id.into(),
            token_id: token_id.into(),
        })
        .await
    }

    /// Submit a raw mutation request.
    pub async fn submit_request(&self, request: StateRequest) -> Result<(), SessionError> {
        self.request(|respond_to| SessionMessage::SubmitRequest {
            request,
            respond_to,
        })
        .await?
    }

    /// Host: apply and broadcast a host-authored event.
    pub async fn apply_event(&self, event: StateEvent) -> Result<(), SessionError> {
        self.request(|respond_to| SessionMessage::ApplyHostEvent { event, respond_to })
            .await?
    }

    /// Snapshot the current document.
    pub async fn state(&self) -> Result<GameState, SessionError> {
        self.request(|respond_to| SessionMessage::GetState { respond_to })
            .await
    }

    /// Snapshot the current roster.
    pub async fn roster(&self) -> Result<Vec<RosterEntry>, SessionError> {
        self.request(|respond_to| SessionMessage::GetRoster { respond_to })
            .await
    }

    /// Proximity audio gain for a remote participant's stream.
    pub async fn audio_gain(
        &self,
        remote: ParticipantId,
        user_max: f64,
    ) -> Result<f64, SessionError> {
        self.request(|respond_to| SessionMessage::AudioGain {
            remote,
            user_max,
            respond_to,
        })
        .await
    }

    /// Stop the actor and every link pump. The spawn-time join handle
    /// resolves once teardown completes.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionMessage,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.mailbox.record_enqueue();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| SessionError::Internal("session actor is gone".to_string()))?;
        rx.await
            .map_err(|_| SessionError::Internal("session actor dropped the response".to_string()))
    }
}

/// The session actor. Owns all mutable session state; see the module docs.
pub struct SessionActor {
    participant_id: ParticipantId,
    gate: AuthorityGate,
    config: Config,
    factory: Arc<dyn PeerLinkFactory>,
    observer: Box<dyn SessionObserver>,

    receiver: mpsc::Receiver<SessionMessage>,
    link_rx: mpsc::Receiver<TaggedLinkEvent>,
    link_tx: mpsc::Sender<TaggedLinkEvent>,

    directory: SessionDirectory<ManagedLink>,
    invites: InviteRegistry,
    pool: PendingOfferPool,
    exposed: Option<ExposedLink>,
    store: StateStore,
    /// Guest only: the host's participant id, learned from the invite.
    host_id: Option<ParticipantId>,

    mailbox: Arc<MailboxMonitor>,
    metrics: Arc<SessionMetrics>,
    cancel_token: CancellationToken,
}

impl SessionActor {
    /// Spawn a session actor with the given role.
    pub fn spawn(
        role: Role,
        config: Config,
        factory: Arc<dyn PeerLinkFactory>,
        observer: Box<dyn SessionObserver>,
    ) -> (SessionActorHandle, JoinHandle<()>) {
        let participant_id = ParticipantId::generate();
        let (sender, receiver) = mpsc::channel(MAILBOX_CAPACITY);
        let (link_tx, link_rx) = mpsc::channel(MAILBOX_CAPACITY);
        let mailbox = Arc::new(MailboxMonitor::new(
            ActorType::Session,
            participant_id.as_str(),
        ));
        let cancel_token = CancellationToken::new();

        let store = match role {
            Role::Host => StateStore::for_host(),
            Role::Guest => StateStore::for_guest(),
        };

        let actor = SessionActor {
            participant_id: participant_id.clone(),
            gate: AuthorityGate::new(role),
            config,
            factory,
            observer,
            receiver,
            link_rx,
            link_tx,
            directory: SessionDirectory::new(),
            invites: InviteRegistry::new(),
            pool: PendingOfferPool::new(),
            exposed: None,
            store,
            host_id: None,
            mailbox: Arc::clone(&mailbox),
            metrics: SessionMetrics::new(),
            cancel_token: cancel_token.clone(),
        };

        let handle = SessionActorHandle {
            participant_id,
            sender,
            mailbox,
            cancel_token,
        };
        let join = tokio::spawn(actor.run());
        (handle, join)
    }

    async fn run(mut self) {
        info!(
            target: "mesh.actor.session",
            participant_id = %self.participant_id,
            role = ?self.gate.role(),
            "Session actor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(target: "mesh.actor.session", "Session actor cancelled");
                    break;
                }
                message = self.receiver.recv() => {
                    let Some(message) = message else { break };
                    self.mailbox.record_dequeue();
                    self.handle_message(message).await;
                }
                event = self.link_rx.recv() => {
                    // Never `None`: the actor holds a sender.
                    let Some(event) = event else { break };
                    self.mailbox.record_dequeue();
                    self.handle_link_event(event).await;
                }
            }
        }

        self.teardown().await;
        info!(
            target: "mesh.actor.session",
            participant_id = %self.participant_id,
            "Session actor stopped"
        );
    }

    async fn teardown(&mut self) {
        let keys: Vec<LinkKey> = self.directory.iter().map(|(k, _)| k.clone()).collect();
        for key in keys {
            if let Some(entry) = self.directory.remove(&key) {
                entry.cancel.cancel();
                entry.link.close().await;
            }
        }
        if let Some(exposed) = self.exposed.take() {
            exposed.link.close().await;
        }
    }

    async fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::CreateInvite { respond_to } => {
                let result = self.create_invite().await;
                self.surface_error(&result);
                let _ = respond_to.send(result);
            }
            SessionMessage::AcceptAnswer { blob, respond_to } => {
                let result = self.accept_answer(&blob).await;
                self.surface_error(&result);
                let _ = respond_to.send(result);
            }
            SessionMessage::Join { blob, respond_to } => {
                let result = self.join(&blob).await;
                self.surface_error(&result);
                let _ = respond_to.send(result);
            }
            SessionMessage::SubmitRequest {
                request,
                respond_to,
            } => {
                let _ = respond_to.send(self.submit_request(request).await);
            }
            SessionMessage::ApplyHostEvent { event, respond_to } => {
                let result = if self.gate.is_host() {
                    self.apply_and_broadcast(event).await;
                    Ok(())
                } else {
                    Err(SessionError::NotHost)
                };
                let _ = respond_to.send(result);
            }
            SessionMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.store.snapshot());
            }
            SessionMessage::GetRoster { respond_to } => {
                let _ = respond_to.send(self.roster());
            }
            SessionMessage::AudioGain {
                remote,
                user_max,
                respond_to,
            } => {
                let gain = audio::proximity_gain(
                    self.store.state(),
                    &self.participant_id,
                    &remote,
                    user_max,
                );
                let _ = respond_to.send(gain);
            }
        }
    }

    fn surface_error<T>(&mut self, result: &Result<T, SessionError>) {
        if let Err(err) = result {
            self.observer.on_status(&err.status_message());
        }
    }

    // ---- invite flow -----------------------------------------------------

    async fn create_invite(&mut self) -> Result<String, SessionError> {
        if !self.gate.is_host() {
            return Err(SessionError::NotHost);
        }
        if self.directory.len() >= self.config.max_peers as usize {
            return Err(SessionError::CapacityExceeded);
        }

        let (link, events) = self.factory.create(HandshakeRole::Initiator)?;
        let offer = match self.bounded(link.initiate_offer()).await {
            Ok(offer) => offer,
            Err(err) => {
                self.metrics.record_handshake_abandoned();
                link.close().await;
                return Err(err);
            }
        };

        let invite_id = InviteId::generate();
        self.invites
            .register(invite_id.clone(), offer.handshake_id.clone())?;

        let link_id = LinkId::generate();
        let entry = ManagedLink {
            link_id,
            link,
            events: Some(events),
            state: ConnectionState::Connecting,
            name: None,
            cancel: self.cancel_token.child_token(),
        };
        self.directory
            .insert(LinkKey::invite(&invite_id), link_id, entry)?;
        self.metrics.link_registered();

        info!(
            target: "mesh.actor.session",
            invite_id = %invite_id,
            link_id = %link_id,
            "Invite created"
        );
        let token = InviteToken {
            invite_id,
            host_id: self.participant_id.clone(),
            offer,
        };
        Ok(token.encode()?)
    }

    async fn accept_answer(&mut self, blob: &str) -> Result<(), SessionError> {
        if !self.gate.is_host() {
            return Err(SessionError::NotHost);
        }
        let token = AnswerToken::decode(blob)?;
        let meta = self.invites.take(&token.invite_id)?;
        if token.answer.handshake_id != meta.offer_handshake_id {
            return Err(SessionError::StaleInvite(token.invite_id.to_string()));
        }
        if token.guest_id == self.participant_id {
            return Err(SessionError::ProtocolViolation(
                "answer names the host as guest".to_string(),
            ));
        }

        let invite_key = LinkKey::invite(&token.invite_id);
        let participant_key = LinkKey::participant(&token.guest_id);
        self.directory.rekey(&invite_key, participant_key.clone())?;

        let link = match self.directory.get(&participant_key) {
            Some(entry) => Arc::clone(&entry.link),
            None => return Err(SessionError::UnknownPeer(participant_key.to_string())),
        };
        if let Err(err) = self.bounded(link.apply_remote_answer(&token.answer)).await {
            self.metrics.record_handshake_abandoned();
            self.remove_link(&participant_key).await;
            return Err(err);
        }

        self.start_pump(&participant_key);
        info!(
            target: "mesh.actor.session",
            invite_id = %token.invite_id,
            guest_id = %token.guest_id,
            "Invite answered, connection forming"
        );
        Ok(())
    }

    async fn join(&mut self, blob: &str) -> Result<String, SessionError> {
        if self.gate.is_host() {
            return Err(SessionError::ProtocolViolation(
                "a host cannot join another session".to_string(),
            ));
        }
        if self.host_id.is_some() {
            return Err(SessionError::ProtocolViolation(
                "already joined a session".to_string(),
            ));
        }
        let invite = InviteToken::decode(blob)?;

        let (link, events) = self.factory.create(HandshakeRole::Responder)?;
        let answer = match self.bounded(link.accept_offer(&invite.offer)).await {
            Ok(answer) => answer,
            Err(err) => {
                self.metrics.record_handshake_abandoned();
                link.close().await;
                return Err(err);
            }
        };

        let link_id = LinkId::generate();
        let host_key = LinkKey::participant(&invite.host_id);
        let entry = ManagedLink {
            link_id,
            link,
            events: Some(events),
            state: ConnectionState::Connecting,
            name: None,
            cancel: self.cancel_token.child_token(),
        };
        self.directory.insert(host_key.clone(), link_id, entry)?;
        self.metrics.link_registered();
        // The responder side needs no further local step; pump now so the
        // channel-open event is not missed.
        self.start_pump(&host_key);
        self.host_id = Some(invite.host_id.clone());

        info!(
            target: "mesh.actor.session",
            host_id = %invite.host_id,
            "Joining session, answer produced"
        );
        let token = AnswerToken {
            invite_id: invite.invite_id,
            guest_id: self.participant_id.clone(),
            answer,
        };
        Ok(token.encode()?)
    }

    // ---- mutations -------------------------------------------------------

    async fn submit_request(&mut self, request: StateRequest) -> Result<(), SessionError> {
        match self.gate.decide() {
            Decision::ApplyAndBroadcast => {
                let event =
                    self.gate
                        .validate_request(self.store.state(), &self.participant_id, &request)?;
                self.apply_and_broadcast(event).await;
                Ok(())
            }
            Decision::ForwardToHost => {
                let host_id = self
                    .host_id
                    .clone()
                    .ok_or(SessionError::ChannelNotOpen)?;
                self.send_to_participant(&host_id, &request.into()).await
            }
        }
    }

    /// Apply a host-committed event locally and broadcast it to every
    /// connected guest, the requester included.
    async fn apply_and_broadcast(&mut self, event: StateEvent) {
        self.store.apply(&event);
        self.observer.on_state_changed(self.store.state());

        let message = ChannelMessage::from(event);
        for (key, entry) in self.directory.iter() {
            if key.as_participant().is_none() || entry.state != ConnectionState::Connected {
                continue;
            }
            if let Err(err) = entry.link.send(&message).await {
                self.metrics.record_send_dropped();
                warn!(
                    target: "mesh.actor.session",
                    peer = %key,
                    error = %err,
                    message_type = %message.type_tag(),
                    "Broadcast send dropped"
                );
            }
        }
    }

    async fn send_to_participant(
        &self,
        participant: &ParticipantId,
        message: &ChannelMessage,
    ) -> Result<(), SessionError> {
        let key = LinkKey::participant(participant);
        let entry = self
            .directory
            .get(&key)
            .ok_or_else(|| SessionError::UnknownPeer(key.to_string()))?;
        if entry.state != ConnectionState::Connected {
            return Err(SessionError::ChannelNotOpen);
        }
        entry.link.send(message).await
    }

    // ---- link events -----------------------------------------------------

    async fn handle_link_event(&mut self, tagged: TaggedLinkEvent) {
        let Some(key) = self.directory.key_for(tagged.link_id).cloned() else {
            debug!(
                target: "mesh.actor.session",
                link_id = %tagged.link_id,
                "Event from removed link, dropping"
            );
            return;
        };

        match tagged.event {
            LinkEvent::ChannelOpen => self.handle_channel_open(&key).await,
            LinkEvent::Message(message) => self.handle_channel_message(&key, message).await,
            LinkEvent::StateChanged(state) => {
                if let Some(entry) = self.directory.get_mut(&key) {
                    entry.state = state;
                }
                if state.is_terminal() {
                    self.handle_departure(&key).await;
                } else {
                    self.notify_roster();
                }
            }
        }
    }

    async fn handle_channel_open(&mut self, key: &LinkKey) {
        if let Some(entry) = self.directory.get_mut(key) {
            entry.state = ConnectionState::Connected;
        }
        info!(target: "mesh.actor.session", peer = %key, "Channel open");
        self.notify_roster();

        let hello = ChannelMessage::from(ControlMessage::Hello {
            name: self.config.display_name.clone(),
        });
        if let Err(err) = self.send_on_key(key, &hello).await {
            warn!(target: "mesh.actor.session", peer = %key, error = %err, "Hello send failed");
        }

        // Host onboarding: document first, then the mesh introduction.
        if self.gate.is_host() {
            if let Some(participant) = key.as_participant() {
                let sync = ChannelMessage::from(StateEvent::FullSync {
                    state: self.store.snapshot(),
                });
                if let Err(err) = self.send_on_key(key, &sync).await {
                    warn!(target: "mesh.actor.session", peer = %key, error = %err, "Full sync send failed");
                }
                if !self.pool.contains(&participant) {
                    let request = ChannelMessage::from(ControlMessage::RequestOffer);
                    if let Err(err) = self.send_on_key(key, &request).await {
                        warn!(target: "mesh.actor.session", peer = %key, error = %err, "Offer request send failed");
                    }
                }
            }
        }
    }

    async fn handle_channel_message(&mut self, key: &LinkKey, message: ChannelMessage) {
        match message {
            ChannelMessage::State(event) => self.handle_state_event(key, event),
            ChannelMessage::Request(request) => self.handle_state_request(key, request).await,
            ChannelMessage::Control(control) => self.handle_control(key, control).await,
        }
    }

    fn handle_state_event(&mut self, key: &LinkKey, event: StateEvent) {
        if self.gate.is_host() {
            self.violation(key, "state event from a guest");
            return;
        }
        let from_host = matches!(
            (key.as_participant(), &self.host_id),
            (Some(sender), Some(host)) if sender == *host
        );
        if !from_host {
            self.violation(key, "state event from a non-host peer");
            return;
        }
        self.store.apply(&event);
        self.observer.on_state_changed(self.store.state());
    }

    async fn handle_state_request(&mut self, key: &LinkKey, request: StateRequest) {
        if !self.gate.is_host() {
            self.violation(key, "state request received by a guest");
            return;
        }
        let Some(requester) = key.as_participant() else {
            self.violation(key, "state request on an unidentified link");
            return;
        };
        match self
            .gate
            .validate_request(self.store.state(), &requester, &request)
        {
            Ok(event) => self.apply_and_broadcast(event).await,
            Err(err) => {
                // A denied request is dropped; the requester simply never
                // sees an echo.
                debug!(
                    target: "mesh.actor.session",
                    requester = %requester,
                    error = %err,
                    "Request denied"
                );
            }
        }
    }

    async fn handle_control(&mut self, key: &LinkKey, control: ControlMessage) {
        if let ControlMessage::Hello { name } = &control {
            if let Some(entry) = self.directory.get_mut(key) {
                entry.name = Some(name.clone());
            }
            self.notify_roster();
            return;
        }

        if self.gate.is_host() {
            self.handle_control_as_host(key, control).await;
        } else {
            self.handle_control_as_guest(key, control).await;
        }
    }

    async fn handle_control_as_host(&mut self, key: &LinkKey, control: ControlMessage) {
        let Some(sender) = key.as_participant() else {
            self.violation(key, "control message on an unidentified link");
            return;
        };
        match control {
            ControlMessage::Offer { from, offer } => {
                if from != sender {
                    self.violation(key, "offer claiming another participant's identity");
                    return;
                }
                self.pool_offer(from, offer).await;
            }
            ControlMessage::AnswerRelay { to, from, answer } => {
                if from != sender {
                    self.violation(key, "answer relay claiming another participant's identity");
                    return;
                }
                // Forwarded verbatim; the host never inspects descriptions.
                let relay = ChannelMessage::from(ControlMessage::AnswerRelay { to: to.clone(), from, answer });
                if let Err(err) = self.send_to_participant(&to, &relay).await {
                    self.metrics.record_send_dropped();
                    debug!(
                        target: "mesh.actor.session",
                        to = %to,
                        error = %err,
                        "Answer relay dropped, recipient unreachable"
                    );
                }
            }
            ControlMessage::RequestOffer
            | ControlMessage::OfferList { .. } => {
                self.violation(key, "introduction message reserved for the host");
            }
            ControlMessage::Hello { .. } => {}
        }
    }

    /// Pool a guest's published offer. A first offer from a guest is the
    /// join trigger: the guest gets back every other pooled offer. A
    /// replacement offer (the guest rotated after its old offer was
    /// consumed) just updates the pool.
    async fn pool_offer(&mut self, from: ParticipantId, offer: SessionDescription) {
        let replaced = self.pool.put(from.clone(), offer.clone());
        debug!(
            target: "mesh.actor.session",
            from = %from,
            replaced,
            "Mesh offer pooled"
        );

        // Announce the pooled offer to the other connected guests.
        let announcement = ChannelMessage::from(ControlMessage::Offer {
            from: from.clone(),
            offer,
        });
        let others: Vec<ParticipantId> = self
            .directory
            .participants()
            .into_iter()
            .filter(|p| *p != from)
            .collect();
        for peer in others {
            if let Err(err) = self.send_to_participant(&peer, &announcement).await {
                debug!(
                    target: "mesh.actor.session",
                    peer = %peer,
                    error = %err,
                    "Offer announcement dropped"
                );
            }
        }

        if !replaced {
            let offers = self.pool.offers_for(&from);
            if !offers.is_empty() {
                let list = ChannelMessage::from(ControlMessage::OfferList { offers });
                if let Err(err) = self.send_to_participant(&from, &list).await {
                    self.metrics.record_send_dropped();
                    warn!(
                        target: "mesh.actor.session",
                        to = %from,
                        error = %err,
                        "Offer list send failed"
                    );
                }
            }
        }
    }

    async fn handle_control_as_guest(&mut self, key: &LinkKey, control: ControlMessage) {
        let from_host = matches!(
            (key.as_participant(), &self.host_id),
            (Some(sender), Some(host)) if sender == *host
        );
        if !from_host {
            self.violation(key, "control message from a non-host peer");
            return;
        }
        match control {
            ControlMessage::RequestOffer => {
                if let Err(err) = self.publish_mesh_offer().await {
                    warn!(
                        target: "mesh.actor.session",
                        error = %err,
                        "Failed to publish mesh offer"
                    );
                    self.observer.on_status(&err.status_message());
                }
            }
            ControlMessage::OfferList { offers } => {
                for pooled in offers {
                    self.answer_pooled_offer(pooled.from, pooled.offer).await;
                }
            }
            // Pool announcements are informational; answering them as well
            // as the offer list would create duplicate links.
            ControlMessage::Offer { from, .. } => {
                debug!(
                    target: "mesh.actor.session",
                    from = %from,
                    "Pool announcement noted"
                );
            }
            ControlMessage::AnswerRelay { to, from, answer } => {
                if to != self.participant_id {
                    self.violation(key, "relayed answer addressed to another participant");
                    return;
                }
                self.complete_exposed_handshake(from, answer).await;
            }
            ControlMessage::Hello { .. } => {}
        }
    }

    /// Create a fresh initiator link, hold it as the exposed offer, and
    /// publish it to the host.
    async fn publish_mesh_offer(&mut self) -> Result<(), SessionError> {
        if let Some(stale) = self.exposed.take() {
            self.metrics.record_handshake_abandoned();
            stale.link.close().await;
        }

        let (link, events) = self.factory.create(HandshakeRole::Initiator)?;
        let offer = match self.bounded(link.initiate_offer()).await {
            Ok(offer) => offer,
            Err(err) => {
                self.metrics.record_handshake_abandoned();
                link.close().await;
                return Err(err);
            }
        };

        let host_id = self.host_id.clone().ok_or(SessionError::ChannelNotOpen)?;
        let message = ChannelMessage::from(ControlMessage::Offer {
            from: self.participant_id.clone(),
            offer: offer.clone(),
        });
        self.exposed = Some(ExposedLink {
            link_id: LinkId::generate(),
            link,
            events,
            offer,
        });
        self.send_to_participant(&host_id, &message).await?;
        debug!(target: "mesh.actor.session", "Mesh offer published");
        Ok(())
    }

    /// Answer one entry of an offer list: connect responder-side to the
    /// offering peer and route the answer back through the host.
    async fn answer_pooled_offer(&mut self, from: ParticipantId, offer: SessionDescription) {
        if from == self.participant_id {
            debug!(target: "mesh.actor.session", "Skipping own pooled offer");
            return;
        }
        let peer_key = LinkKey::participant(&from);
        if self.directory.get(&peer_key).is_some() {
            debug!(
                target: "mesh.actor.session",
                peer = %from,
                "Already linked to offering peer, skipping"
            );
            return;
        }

        let (link, events) = match self.factory.create(HandshakeRole::Responder) {
            Ok(created) => created,
            Err(err) => {
                warn!(target: "mesh.actor.session", error = %err, "Responder link creation failed");
                return;
            }
        };
        let answer = match self.bounded(link.accept_offer(&offer)).await {
            Ok(answer) => answer,
            Err(err) => {
                self.metrics.record_handshake_abandoned();
                link.close().await;
                warn!(
                    target: "mesh.actor.session",
                    peer = %from,
                    error = %err,
                    "Failed to answer pooled offer"
                );
                return;
            }
        };

        let link_id = LinkId::generate();
        let entry = ManagedLink {
            link_id,
            link,
            events: Some(events),
            state: ConnectionState::Connecting,
            name: None,
            cancel: self.cancel_token.child_token(),
        };
        if let Err(err) = self.directory.insert(peer_key.clone(), link_id, entry) {
            warn!(target: "mesh.actor.session", error = %err, "Directory insert failed");
            return;
        }
        self.metrics.link_registered();
        self.start_pump(&peer_key);

        let relay = ChannelMessage::from(ControlMessage::AnswerRelay {
            to: from.clone(),
            from: self.participant_id.clone(),
            answer,
        });
        if let Some(host_id) = self.host_id.clone() {
            if let Err(err) = self.send_to_participant(&host_id, &relay).await {
                warn!(
                    target: "mesh.actor.session",
                    peer = %from,
                    error = %err,
                    "Answer relay to host failed"
                );
            }
        }
    }

    /// A relayed answer arrived for our exposed offer: bind the link to the
    /// answering peer, then rotate a fresh offer into the pool.
    async fn complete_exposed_handshake(
        &mut self,
        from: ParticipantId,
        answer: SessionDescription,
    ) {
        let stale = !matches!(
            &self.exposed,
            Some(exposed) if exposed.offer.handshake_id == answer.handshake_id
        );
        if stale {
            // Answer to an offer that was already consumed or rotated away.
            debug!(
                target: "mesh.actor.session",
                from = %from,
                "Stale answer for a superseded offer, ignoring"
            );
            return;
        }
        let Some(exposed) = self.exposed.take() else {
            return;
        };

        if let Err(err) = self.bounded(exposed.link.apply_remote_answer(&answer)).await {
            self.metrics.record_handshake_abandoned();
            exposed.link.close().await;
            warn!(
                target: "mesh.actor.session",
                from = %from,
                error = %err,
                "Failed to apply relayed answer"
            );
            return;
        }

        let peer_key = LinkKey::participant(&from);
        let entry = ManagedLink {
            link_id: exposed.link_id,
            link: exposed.link,
            events: Some(exposed.events),
            state: ConnectionState::Connecting,
            name: None,
            cancel: self.cancel_token.child_token(),
        };
        if let Err(err) = self
            .directory
            .insert(peer_key.clone(), exposed.link_id, entry)
        {
            warn!(target: "mesh.actor.session", error = %err, "Directory insert failed");
            return;
        }
        self.metrics.link_registered();
        self.start_pump(&peer_key);
        info!(target: "mesh.actor.session", peer = %from, "Mesh link forming");

        // The exposed offer is consumed; publish a fresh one so later
        // joiners find a usable entry in the pool.
        if let Err(err) = self.publish_mesh_offer().await {
            warn!(
                target: "mesh.actor.session",
                error = %err,
                "Failed to rotate mesh offer"
            );
        }
    }

    // ---- departure -------------------------------------------------------

    async fn handle_departure(&mut self, key: &LinkKey) {
        info!(target: "mesh.actor.session", peer = %key, "Peer link terminal");

        if let Some(invite_id) = key.as_invite() {
            // Handshake died before the answer arrived.
            if self.invites.abandon(&invite_id) {
                self.metrics.record_handshake_abandoned();
            }
            self.remove_link(key).await;
            return;
        }

        let name = self
            .directory
            .get(key)
            .and_then(|entry| entry.name.clone());
        self.remove_link(key).await;

        let Some(participant) = key.as_participant() else {
            return;
        };
        if self.gate.is_host() {
            self.pool.remove(&participant);
            match self.gate.departure_event(self.store.state(), &participant) {
                Ok(event) => self.apply_and_broadcast(event).await,
                Err(err) => {
                    error!(
                        target: "mesh.actor.session",
                        error = %err,
                        "Failed to build departure event"
                    );
                }
            }
        } else if self.host_id.as_ref() == Some(&participant) {
            self.observer.on_status("Host disconnected");
        }

        let display = name.unwrap_or_else(|| participant.to_string());
        self.observer.on_status(&format!("{display} left the session"));
        self.notify_roster();
    }

    async fn remove_link(&mut self, key: &LinkKey) {
        if let Some(entry) = self.directory.remove(key) {
            entry.cancel.cancel();
            entry.link.close().await;
            self.metrics.link_removed();
        }
    }

    // ---- helpers ---------------------------------------------------------

    fn start_pump(&mut self, key: &LinkKey) {
        let Some(entry) = self.directory.get_mut(key) else {
            return;
        };
        let Some(events) = entry.events.take() else {
            return;
        };
        spawn_pump(
            entry.link_id,
            events,
            self.link_tx.clone(),
            Arc::clone(&self.mailbox),
            entry.cancel.clone(),
        );
    }

    async fn send_on_key(
        &self,
        key: &LinkKey,
        message: &ChannelMessage,
    ) -> Result<(), SessionError> {
        let entry = self
            .directory
            .get(key)
            .ok_or_else(|| SessionError::UnknownPeer(key.to_string()))?;
        entry.link.send(message).await
    }

    fn violation(&mut self, key: &LinkKey, what: &str) {
        self.metrics.record_protocol_violation();
        warn!(
            target: "mesh.actor.session",
            peer = %key,
            "Protocol violation ignored: {what}"
        );
    }

    fn notify_roster(&mut self) {
        let roster = self.roster();
        self.observer.on_roster_changed(&roster);
    }

    fn roster(&self) -> Vec<RosterEntry> {
        let mut roster: Vec<RosterEntry> = self
            .directory
            .iter()
            .filter_map(|(key, entry)| {
                key.as_participant().map(|participant_id| RosterEntry {
                    participant_id,
                    name: entry.name.clone(),
                    state: entry.state,
                })
            })
            .collect();
        roster.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));
        roster
    }

    /// Bound a handshake step by the configured candidate wait.
    async fn bounded<T>(
        &self,
        step: impl Future<Output = Result<T, SessionError>>,
    ) -> Result<T, SessionError> {
        match tokio::time::timeout(self.config.candidate_wait, step).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::CandidateTimeout),
        }
    }
}
