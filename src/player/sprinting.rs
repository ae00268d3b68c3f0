use nalgebra::Vector3;

use super::math::{lerp, normalize_or_zero};
use crate::config::SprintingSettings;

/// Speed multiplier while sprinting. Full bonus when moving straight ahead,
/// none when moving sideways or backward.
pub fn sprint_multiplier(
    forward: Vector3<f32>,
    velocity: Vector3<f32>,
    settings: &SprintingSettings,
) -> f32 {
    let alignment = forward.dot(&normalize_or_zero(velocity)).clamp(0.0, 1.0);
    lerp(1.0, settings.speed_multiplier, alignment)
}
