use nalgebra::Vector2;

/// Resolved input for one tick. Axes are already mapped from devices.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerInput {
    /// x = strafe right, y = forward
    pub move_axis: Vector2<f32>,
    /// x = turn right, y = look up
    pub look_delta: Vector2<f32>,
    pub jump_axis: f32,
    pub crouch_axis: f32,
    pub sprint_axis: f32,
    /// Jump action edge for this tick
    pub jump_pressed: bool,
    /// Crouch action edge for this tick, used by toggle crouching
    pub crouch_pressed: bool,
    /// Look delta comes from a gamepad rather than a mouse
    pub gamepad_look: bool,
}

impl PlayerInput {
    pub fn moving(x: f32, y: f32) -> Self {
        Self {
            move_axis: Vector2::new(x, y),
            ..Self::default()
        }
    }

    /// Input of the previous tick with one-shot edges cleared
    pub fn held(&self) -> Self {
        Self {
            jump_pressed: false,
            crouch_pressed: false,
            ..*self
        }
    }
}
