//! Proximity audio gain model.
//!
//! Voice volume between two participants is driven by the distance between
//! their owned tokens on the shared map. Gain follows an inverse-square
//! falloff, normalized so it is 1.0 at [`NEAR_RADIUS`] and exactly 0.0 at
//! [`FAR_RADIUS`], then scaled into `[GAIN_FLOOR, user_max]`.
//!
//! Participants that own no token are always heard at full volume; proximity
//! only attenuates once both sides have a presence on the map.

use mesh_protocol::GameState;
use mesh_protocol::ParticipantId;

/// Distance (map units) within which gain is maximal.
pub const NEAR_RADIUS: f64 = 40.0;

/// Distance (map units) at and beyond which gain is zero.
pub const FAR_RADIUS: f64 = 1_200.0;

/// Minimum audible gain inside the falloff band.
pub const GAIN_FLOOR: f64 = 0.05;

/// Compute the gain to apply to `remote`'s audio as heard by `local`.
///
/// `user_max` is the listener's volume slider for that peer, in `[0.0, 1.0]`.
/// Returns a gain in `[0.0, user_max]`.
#[must_use]
pub fn proximity_gain(
    state: &GameState,
    local: &ParticipantId,
    remote: &ParticipantId,
    user_max: f64,
) -> f64 {
    let user_max = user_max.clamp(0.0, 1.0);

    let (Some(local_pos), Some(remote_pos)) = (
        state.owned_token_position(local),
        state.owned_token_position(remote),
    ) else {
        return user_max;
    };

    let dx = local_pos.0 - remote_pos.0;
    let dy = local_pos.1 - remote_pos.1;
    let distance = (dx * dx + dy * dy).sqrt();

    gain_at_distance(distance, user_max)
}

/// Gain for a raw distance, scaled into `[GAIN_FLOOR, user_max]` inside the
/// falloff band, with a hard cutoff to silence at [`FAR_RADIUS`].
#[must_use]
pub fn gain_at_distance(distance: f64, user_max: f64) -> f64 {
    let user_max = user_max.clamp(0.0, 1.0);

    if distance >= FAR_RADIUS {
        return 0.0;
    }
    if distance <= NEAR_RADIUS {
        return user_max;
    }

    // Inverse-square falloff, normalized to [0, 1] over the falloff band.
    let inv_far = 1.0 / (FAR_RADIUS * FAR_RADIUS);
    let inv_near = 1.0 / (NEAR_RADIUS * NEAR_RADIUS);
    let ratio = (1.0 / (distance * distance) - inv_far) / (inv_near - inv_far);

    GAIN_FLOOR + (user_max - GAIN_FLOOR) * ratio.clamp(0.0, 1.0)
}
