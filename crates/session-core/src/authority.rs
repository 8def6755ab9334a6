//! Host-authoritative mutation gating.
//!
//! Every document mutation is decided by the host. Guests never mutate
//! locally; they forward a [`StateRequest`] to the host and wait for the
//! resulting [`StateEvent`] broadcast (which the host sends to every guest,
//! the requester included). The host validates each request against the
//! current document and either admits it as an event or drops it.

use mesh_protocol::{GameState, OwnershipChange, ParticipantId, StateEvent, StateRequest};
use tracing::debug;

use crate::errors::SessionError;

/// The local endpoint's authority role, fixed for the session's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Session creator. Validates requests, applies events, broadcasts.
    Host,
    /// Joined via invite. Forwards requests, applies broadcast events.
    Guest,
}

/// What to do with a locally initiated mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Host path: validate, apply to the local store, broadcast to guests.
    ApplyAndBroadcast,
    /// Guest path: send the request to the host, touch nothing locally.
    ForwardToHost,
}

/// Gate that routes mutations according to the local role.
#[derive(Debug, Clone, Copy)]
pub struct AuthorityGate {
    role: Role,
}

impl AuthorityGate {
    #[must_use]
    pub fn new(role: Role) -> Self {
        Self { role }
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }

    /// Route a locally initiated mutation.
    #[must_use]
    pub fn decide(&self) -> Decision {
        match self.role {
            Role::Host => Decision::ApplyAndBroadcast,
            Role::Guest => Decision::ForwardToHost,
        }
    }

    /// Validate a guest request against the current document, producing the
    /// event to apply and broadcast. Host only.
    ///
    /// A denied request is not an error in the session; callers log the
    /// denial and drop the request.
    pub fn validate_request(
        &self,
        state: &GameState,
        requester: &ParticipantId,
        request: &StateRequest,
    ) -> Result<StateEvent, SessionError> {
        if self.role != Role::Host {
            return Err(SessionError::NotHost);
        }

        match request {
            StateRequest::TokenMoveRequest {
                layer_id,
                token_id,
                x,
                y,
            } => {
                if state.find_token(layer_id, token_id).is_none() {
                    return Err(SessionError::RequestDenied(format!(
                        "move target {layer_id}/{token_id} does not exist"
                    )));
                }
                Ok(StateEvent::TokenMoved {
                    layer_id: layer_id.clone(),
                    token_id: token_id.clone(),
                    x: *x,
                    y: *y,
                })
            }
            StateRequest::ClaimTokenRequest { layer_id, token_id } => {
                let Some(token) = state.find_token(layer_id, token_id) else {
                    return Err(SessionError::RequestDenied(format!(
                        "claim target {layer_id}/{token_id} does not exist"
                    )));
                };
                if token.owner.as_ref() == Some(requester) {
                    return Err(SessionError::RequestDenied(format!(
                        "{requester} already owns {layer_id}/{token_id}"
                    )));
                }

                // One token per participant: claiming releases everything
                // the requester currently owns, in the same atomic event.
                let mut changes: Vec<OwnershipChange> = state
                    .owned_tokens(requester)
                    .into_iter()
                    .map(|(owned_layer, owned_token)| OwnershipChange {
                        layer_id: owned_layer,
                        token_id: owned_token,
                        new_owner: None,
                    })
                    .collect();
                changes.push(OwnershipChange {
                    layer_id: layer_id.clone(),
                    token_id: token_id.clone(),
                    new_owner: Some(requester.clone()),
                });
                Ok(StateEvent::TokenOwnershipChanged { changes })
            }
            StateRequest::UnclaimTokenRequest { layer_id, token_id } => {
                let Some(token) = state.find_token(layer_id, token_id) else {
                    return Err(SessionError::RequestDenied(format!(
                        "unclaim target {layer_id}/{token_id} does not exist"
                    )));
                };
                if token.owner.as_ref() != Some(requester) {
                    debug!(
                        target: "mesh.authority",
                        requester = %requester,
                        layer_id = %layer_id,
                        token_id = %token_id,
                        "Unclaim denied, requester is not the owner"
                    );
                    return Err(SessionError::RequestDenied(format!(
                        "{requester} does not own {layer_id}/{token_id}"
                    )));
                }
                Ok(StateEvent::TokenOwnershipChanged {
                    changes: vec![OwnershipChange {
                        layer_id: layer_id.clone(),
                        token_id: token_id.clone(),
                        new_owner: None,
                    }],
                })
            }
        }
    }

    /// Build the atomic departure event for a participant leaving the
    /// session. The first token they own (in document order) is removed from
    /// the map; any others are merely released. Host only.
    pub fn departure_event(
        &self,
        state: &GameState,
        departed: &ParticipantId,
    ) -> Result<StateEvent, SessionError> {
        if self.role != Role::Host {
            return Err(SessionError::NotHost);
        }

        let mut owned = state.owned_tokens(departed).into_iter();
        let removed_token = owned.next().map(|(layer_id, token_id)| {
            mesh_protocol::TokenRef { layer_id, token_id }
        });
        let tokens_to_unclaim = owned
            .map(|(layer_id, token_id)| mesh_protocol::TokenRef { layer_id, token_id })
            .collect();

        Ok(StateEvent::ParticipantLeft {
            participant_id: departed.clone(),
            removed_token,
            tokens_to_unclaim,
        })
    }
}
