//! Locomotion modes and their fixed-tick rules.

use nalgebra::Vector3;
use serde::Serialize;
use std::fmt;

use super::input::PlayerInput;
use super::movement::{apply_gravity, blend, blend_horizontal, shape_climbing_input};
use super::physics::PhysicsWorld;
use super::Player;
use crate::config::ModeSettings;

/// The four mutually exclusive locomotion modes. Walking is the initial one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocomotionMode {
    #[default]
    Walking,
    Flying,
    Swimming,
    Climbing,
}

impl LocomotionMode {
    /// Modes where vertical input is free rather than gravity bound
    pub fn is_vertical_movement(self) -> bool {
        matches!(
            self,
            LocomotionMode::Flying | LocomotionMode::Swimming | LocomotionMode::Climbing
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LocomotionMode::Walking => "walking",
            LocomotionMode::Flying => "flying",
            LocomotionMode::Swimming => "swimming",
            LocomotionMode::Climbing => "climbing",
        }
    }
}

impl fmt::Display for LocomotionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs the active mode's physics-phase rule
pub(super) fn fixed_update(
    player: &mut Player,
    world: &mut PhysicsWorld,
    input: &PlayerInput,
    dt: f32,
) {
    match player.mode {
        LocomotionMode::Walking => walking(player, world, input, dt),
        LocomotionMode::Flying => {
            let mode = player.settings.flying.clone();
            free_movement(player, world, input, &mode, dt);
        }
        LocomotionMode::Swimming => {
            let mode = player.settings.swimming.clone();
            free_movement(player, world, input, &mode, dt);
        }
        LocomotionMode::Climbing => climbing(player, world, input, dt),
    }
}

fn walking(player: &mut Player, world: &mut PhysicsWorld, input: &PlayerInput, dt: f32) {
    player.update_ground(world, dt);
    player.update_ceiling(dt);
    apply_gravity(
        &mut player.avatar.velocity,
        player.avatar.touching_ground,
        &player.settings,
        dt,
    );
    player.before_move(world, input, dt);

    let walking = &player.settings.walking;
    let (speed, acceleration) = if player.is_grounded() {
        (walking.speed, walking.acceleration)
    } else {
        (walking.speed, walking.midair_acceleration)
    };
    let desired = player.movement_input(world, input, speed, true);
    blend_horizontal(&mut player.avatar.velocity, desired, acceleration * dt);

    player.displace(world, dt);
    player.ride_platform(world, dt);
    player.check_bounds(world);
}

fn free_movement(
    player: &mut Player,
    world: &mut PhysicsWorld,
    input: &PlayerInput,
    mode: &ModeSettings,
    dt: f32,
) {
    player.before_move(world, input, dt);
    let desired = player.movement_input(world, input, mode.speed, false);
    blend(&mut player.avatar.velocity, desired, mode.acceleration * dt);
    player.displace(world, dt);
}

fn climbing(player: &mut Player, world: &mut PhysicsWorld, input: &PlayerInput, dt: f32) {
    player.before_move(world, input, dt);
    let climbing = player.settings.climbing.clone();
    let desired = player.movement_input(world, input, climbing.speed, false);
    let desired: Vector3<f32> = shape_climbing_input(desired, player.avatar.forward(), climbing.speed);
    blend(&mut player.avatar.velocity, desired, climbing.acceleration * dt);
    player.displace(world, dt);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertical_movement_classification() {
        assert!(!LocomotionMode::Walking.is_vertical_movement());
        assert!(LocomotionMode::Flying.is_vertical_movement());
        assert!(LocomotionMode::Swimming.is_vertical_movement());
        assert!(LocomotionMode::Climbing.is_vertical_movement());
    }

    #[test]
    fn test_default_mode_is_walking() {
        assert_eq!(LocomotionMode::default(), LocomotionMode::Walking);
        assert_eq!(LocomotionMode::Climbing.to_string(), "climbing");
    }
}
