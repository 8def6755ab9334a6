//! Messages accepted by the session actor.

use tokio::sync::oneshot;

use crate::errors::SessionError;
use crate::observer::RosterEntry;
use mesh_protocol::{GameState, ParticipantId, StateEvent, StateRequest};

/// A command or internal event delivered to the session actor's mailbox.
#[derive(Debug)]
pub enum SessionMessage {
    /// Host: create an invite and return its out-of-band blob.
    CreateInvite {
        respond_to: oneshot::Sender<Result<String, SessionError>>,
    },

    /// Host: complete an invite with the guest's answer blob.
    AcceptAnswer {
        blob: String,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Guest: consume an invite blob and return the answer blob to be
    /// carried back to the host.
    Join {
        blob: String,
        respond_to: oneshot::Sender<Result<String, SessionError>>,
    },

    /// Submit a locally initiated mutation request. Applied directly on
    /// the host; forwarded to the host on a guest.
    SubmitRequest {
        request: StateRequest,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Host: apply and broadcast a host-authored event (layer edits,
    /// token add/delete, pings).
    ApplyHostEvent {
        event: StateEvent,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Snapshot the current document.
    GetState {
        respond_to: oneshot::Sender<GameState>,
    },

    /// Snapshot the current roster.
    GetRoster {
        respond_to: oneshot::Sender<Vec<RosterEntry>>,
    },

    /// Proximity audio gain for a remote participant.
    AudioGain {
        remote: ParticipantId,
        user_max: f64,
        respond_to: oneshot::Sender<f64>,
    },
}
