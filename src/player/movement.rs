//! Velocity integration rules. The avatar velocity is only ever changed through these.

use nalgebra::Vector3;

use super::constants::locomotion as tuning;
use super::constants::physics::MOVING_SPEED_SQUARED;
use super::input::PlayerInput;
use super::math::{clamp_magnitude, lerp, lerp_vector, normalize_or_zero, project_on_plane};
use crate::config::ControllerSettings;

/// Pins the vertical velocity while grounded, otherwise accumulates weight.
pub fn apply_gravity(
    velocity: &mut Vector3<f32>,
    grounded: bool,
    settings: &ControllerSettings,
    dt: f32,
) {
    if grounded {
        velocity.y = -settings.ground.stick_to_ground_velocity;
    } else {
        let weight = settings.gravity() * settings.general.mass;
        add_force(velocity, weight, dt);
    }
}

/// Moves the horizontal components toward `target` by `factor` (rate times dt).
pub fn blend_horizontal(velocity: &mut Vector3<f32>, target: Vector3<f32>, factor: f32) {
    velocity.x = lerp(velocity.x, target.x, factor);
    velocity.z = lerp(velocity.z, target.z, factor);
}

/// Moves all components toward `target` by `factor`.
pub fn blend(velocity: &mut Vector3<f32>, target: Vector3<f32>, factor: f32) {
    *velocity = lerp_vector(*velocity, target, factor);
}

/// Adds a velocity, or sets the horizontal and/or vertical parts outright.
pub fn launch(
    velocity: &mut Vector3<f32>,
    launch_velocity: Vector3<f32>,
    override_horizontal: bool,
    override_vertical: bool,
) {
    if override_horizontal {
        velocity.x = launch_velocity.x;
        velocity.z = launch_velocity.z;
    } else {
        velocity.x += launch_velocity.x;
        velocity.z += launch_velocity.z;
    }

    if override_vertical {
        velocity.y = launch_velocity.y;
    } else {
        velocity.y += launch_velocity.y;
    }
}

/// Continuous acceleration over one tick
pub fn add_force(velocity: &mut Vector3<f32>, force: Vector3<f32>, dt: f32) {
    *velocity += force * dt;
}

/// Axes input is projected onto
#[derive(Debug, Clone, Copy)]
pub struct MovementFrame {
    pub forward: Vector3<f32>,
    pub right: Vector3<f32>,
    pub up: Vector3<f32>,
}

/// Turns the move axes into a desired velocity.
///
/// `vertical` adds the jump and crouch axes along `up`; it is only honoured by
/// states with free vertical movement. Once the shadow body has been held back
/// from the avatar, input pointing away from it is flattened against the offset
/// so the avatar cannot walk out of its own proxy.
pub fn resolve_movement_input(
    input: &PlayerInput,
    frame: &MovementFrame,
    vertical: bool,
    speed: f32,
    speed_multiplier: f32,
    shadow_offset: Vector3<f32>,
    shadow_margin: f32,
) -> Vector3<f32> {
    let mut desired = frame.forward * input.move_axis.y + frame.right * input.move_axis.x;
    if vertical {
        desired += frame.up * (input.jump_axis - input.crouch_axis);
    }

    let desired = clamp_magnitude(desired, 1.0) * speed * speed_multiplier;

    if desired.dot(&shadow_offset) < 0.0
        && shadow_offset.norm() > shadow_margin * tuning::SHADOW_STEER_MARGIN_FRACTION
    {
        return project_on_plane(desired, shadow_offset);
    }
    desired
}

/// Reshapes climbing input.
///
/// Pushing toward the wall (along `forward`) halves lateral motion and turns
/// any significant vertical input into full climb speed. Anything else drops
/// the vertical part and speeds up lateral motion so the avatar can detach.
pub fn shape_climbing_input(
    input: Vector3<f32>,
    forward: Vector3<f32>,
    climb_speed: f32,
) -> Vector3<f32> {
    let mut shaped = input;
    if forward.dot(&normalize_or_zero(input)) > 0.0 {
        shaped.x *= tuning::CLIMB_LATERAL_SCALE;
        shaped.z *= tuning::CLIMB_LATERAL_SCALE;
        if shaped.y.abs() > tuning::CLIMB_VERTICAL_DEADZONE {
            shaped.y = shaped.y.signum() * climb_speed;
        }
    } else {
        shaped.y = 0.0;
        shaped.x *= tuning::CLIMB_DETACH_SCALE;
        shaped.z *= tuning::CLIMB_DETACH_SCALE;
    }
    shaped
}

/// Smoothed 0..1 indicator of whether the avatar is moving
pub fn update_movement_factor(
    factor: f32,
    displacement_velocity: Vector3<f32>,
    interpolation_speed: f32,
    dt: f32,
) -> f32 {
    let moving = displacement_velocity.norm_squared() > MOVING_SPEED_SQUARED;
    lerp(factor, if moving { 1.0 } else { 0.0 }, dt * interpolation_speed)
}
