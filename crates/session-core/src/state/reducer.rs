//! The event reducer.
//!
//! [`reduce`] is the single mutation path for the document. It is
//! deterministic and total: an event whose target is missing is a no-op,
//! never an error, so hosts and guests converge even when an event races a
//! departure cleanup. Re-applying an `*-added` event for an ID that already
//! exists replaces the existing entry, keeping application idempotent.

use mesh_protocol::{GameState, StateEvent};
use tracing::trace;

/// Apply one event to the document in place.
pub fn reduce(state: &mut GameState, event: &StateEvent) {
    match event {
        StateEvent::FullSync { state: replacement } => {
            *state = replacement.clone();
        }

        StateEvent::TokenMoved {
            layer_id,
            token_id,
            x,
            y,
        } => {
            if let Some(token) = state
                .layer_mut(layer_id)
                .and_then(|l| l.token_mut(token_id))
            {
                token.x = *x;
                token.y = *y;
            }
        }

        StateEvent::TokenAdded { layer_id, token } => {
            if let Some(layer) = state.layer_mut(layer_id) {
                if let Some(existing) = layer.token_mut(&token.id) {
                    *existing = token.clone();
                } else {
                    layer.tokens.push(token.clone());
                }
            }
        }

        StateEvent::TokenDeleted { layer_id, token_id } => {
            if let Some(layer) = state.layer_mut(layer_id) {
                layer.tokens.retain(|t| t.id != *token_id);
            }
        }

        StateEvent::TokenPropertyChanged {
            layer_id,
            token_id,
            color,
            name,
            scale,
        } => {
            if let Some(token) = state
                .layer_mut(layer_id)
                .and_then(|l| l.token_mut(token_id))
            {
                if let Some(color) = color {
                    token.color = color.clone();
                }
                if let Some(name) = name {
                    token.name = Some(name.clone());
                }
                if let Some(scale) = scale {
                    token.scale = Some(*scale);
                }
            }
        }

        StateEvent::TokenOwnershipChanged { changes } => {
            for change in changes {
                if let Some(token) = state
                    .layer_mut(&change.layer_id)
                    .and_then(|l| l.token_mut(&change.token_id))
                {
                    token.owner = change.new_owner.clone();
                }
            }
        }

        StateEvent::LayerAdded { layer } => {
            if let Some(existing) = state.layer_mut(&layer.id) {
                *existing = layer.clone();
            } else {
                state.layers.push(layer.clone());
            }
        }

        StateEvent::LayerDeleted { layer_id } => {
            state.layers.retain(|l| l.id != *layer_id);
        }

        StateEvent::LayerRenamed { layer_id, name } => {
            if let Some(layer) = state.layer_mut(layer_id) {
                layer.name = name.clone();
            }
        }

        StateEvent::LayerVisibilityChanged { layer_id, visible } => {
            if let Some(layer) = state.layer_mut(layer_id) {
                layer.visible = *visible;
            }
        }

        StateEvent::LayerBackgroundChanged {
            layer_id,
            background,
        } => {
            if let Some(layer) = state.layer_mut(layer_id) {
                layer.background = background.clone();
            }
        }

        StateEvent::LayerCleared { layer_id } => {
            if let Some(layer) = state.layer_mut(layer_id) {
                layer.tokens.clear();
            }
        }

        // Scale and offset live on the background transform; a layer
        // without a background has nothing to scale or move.
        StateEvent::LayerScaled { layer_id, scale } => {
            if let Some(background) = state
                .layer_mut(layer_id)
                .and_then(|l| l.background.as_mut())
            {
                background.scale = *scale;
            }
        }

        StateEvent::LayerMoved { layer_id, x, y } => {
            if let Some(background) = state
                .layer_mut(layer_id)
                .and_then(|l| l.background.as_mut())
            {
                background.x = *x;
                background.y = *y;
            }
        }

        StateEvent::PingAdded { ping } => {
            // New pings bound the clock; anything already expired by the
            // new ping's start time can go.
            state.prune_expired_pings(ping.start_time_ms);
            state.pings.push(ping.clone());
        }

        StateEvent::ParticipantLeft {
            participant_id,
            removed_token,
            tokens_to_unclaim,
        } => {
            trace!(
                target: "mesh.state",
                participant_id = %participant_id,
                "Applying departure cleanup"
            );
            if let Some(removed) = removed_token {
                if let Some(layer) = state.layer_mut(&removed.layer_id) {
                    layer.tokens.retain(|t| t.id != removed.token_id);
                }
            }
            for token_ref in tokens_to_unclaim {
                if let Some(token) = state
                    .layer_mut(&token_ref.layer_id)
                    .and_then(|l| l.token_mut(&token_ref.token_id))
                {
                    token.owner = None;
                }
            }
        }
    }
}
