//! Variable-rate look update.

use nalgebra::Vector2;

use super::avatar::Avatar;
use super::constants::look as consts;
use super::input::PlayerInput;
use crate::config::InputSettings;

/// Spike filtering state carried between look samples
#[derive(Debug, Default)]
pub struct LookState {
    previous_delta: Vector2<f32>,
    previous_time: Option<f32>,
}

impl LookState {
    /// Applies a look sample to the avatar's heading and pitch.
    ///
    /// A sample arriving after a long silence only restarts the clock. Zero
    /// deltas and deltas that jump far from the previous one are dropped.
    /// Returns true when the sample was applied.
    pub fn update(
        &mut self,
        avatar: &mut Avatar,
        input: &PlayerInput,
        settings: &InputSettings,
        now: f32,
    ) -> bool {
        let stale = self
            .previous_time
            .map_or(true, |t| now - t > consts::STALE_INPUT_SECS);
        if stale {
            self.previous_time = Some(now);
            return false;
        }

        let (sensitivity_x, sensitivity_y) = if input.gamepad_look {
            (
                settings.gamepad_horizontal_look_sensitivity,
                settings.gamepad_vertical_look_sensitivity,
            )
        } else {
            (settings.look_sensitivity, settings.look_sensitivity)
        };
        let mut delta = Vector2::new(
            input.look_delta.x * consts::DELTA_SCALE * sensitivity_x,
            input.look_delta.y * consts::DELTA_SCALE * sensitivity_y,
        );
        if settings.invert_look_y {
            delta.y = -delta.y;
        }

        if delta == Vector2::zeros() {
            return false;
        }
        if (delta - self.previous_delta).norm_squared() > consts::SPIKE_THRESHOLD_SQUARED {
            log::debug!("Dropping look spike {:?}", delta);
            return false;
        }

        avatar.heading += delta.x;
        avatar.pitch = (avatar.pitch + delta.y).clamp(
            -settings.look_pitch_limit_degrees,
            settings.look_pitch_limit_degrees,
        );

        self.previous_delta = delta;
        self.previous_time = Some(now);
        true
    }
}
