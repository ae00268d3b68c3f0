use nalgebra::Vector3;

use super::avatar::Avatar;
use super::constants::locomotion::{CROUCH_CEILING_CLEARANCE, CROUCH_THRESHOLD};
use super::constants::physics::CEILING_PROBE_DISTANCE;
use super::input::PlayerInput;
use super::math::lerp;
use super::physics::PhysicsWorld;
use crate::config::CrouchingSettings;

/// Outcome of one crouch update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrouchStep {
    /// Capsule height to apply this tick
    pub height: f32,
    /// New crouch state when it flipped this tick
    pub changed: Option<bool>,
}

/// Smoothly moves the capsule height between standing and crouched.
#[derive(Debug)]
pub struct Crouching {
    current_height: f32,
    standing_height: f32,
    toggled: bool,
    was_crouching: bool,
}

impl Crouching {
    pub fn new(standing_height: f32) -> Self {
        Self {
            current_height: standing_height,
            standing_height,
            toggled: false,
            was_crouching: false,
        }
    }

    pub fn set_standing_height(&mut self, height: f32) {
        self.standing_height = height;
    }

    pub fn current_height(&self) -> f32 {
        self.current_height
    }

    pub fn is_crouching(&self) -> bool {
        self.standing_height - self.current_height > CROUCH_THRESHOLD
    }

    /// Flips the toggle used when crouching is configured as a toggle
    pub fn toggle(&mut self) {
        self.toggled = !self.toggled;
    }

    fn is_trying(&self, input: &PlayerInput, settings: &CrouchingSettings) -> bool {
        if settings.toggle {
            self.toggled
        } else {
            input.crouch_axis > 0.0
        }
    }

    /// Advances the height one tick. Standing up is capped by any ceiling right above the head.
    pub fn update(
        &mut self,
        world: &PhysicsWorld,
        avatar: &Avatar,
        input: &PlayerInput,
        settings: &CrouchingSettings,
        can_crouch: bool,
        dt: f32,
    ) -> CrouchStep {
        let trying = self.is_trying(input, settings);
        let mut target = if trying && can_crouch {
            settings.height
        } else {
            self.standing_height
        };

        if self.is_crouching() && !trying {
            let head = avatar.position + Vector3::new(0.0, self.current_height / 2.0, 0.0);
            if let Some((_, distance)) =
                world.cast_ray(head, Vector3::y(), CEILING_PROBE_DISTANCE, world.world_filter())
            {
                target = (self.current_height + distance - CROUCH_CEILING_CLEARANCE)
                    .max(settings.height);
            }
        }

        self.current_height = lerp(self.current_height, target, dt * settings.transition_speed);

        let crouching = self.is_crouching();
        let changed = (crouching != self.was_crouching).then_some(crouching);
        self.was_crouching = crouching;

        CrouchStep {
            height: self.current_height,
            changed,
        }
    }
}
