//! Controller constants that are not exposed as settings.

/// Physics constants
pub mod physics {
    use rapier3d::prelude::Group;

    /// Fixed timestep for the physics phase (50 Hz)
    pub const TIMESTEP: f32 = 1.0 / 50.0;

    /// Small epsilon for float comparisons and degenerate vectors
    pub const EPSILON: f32 = 0.0001;

    /// Skin kept between the avatar capsule and the geometry it slides along
    pub const CONTROLLER_OFFSET: f32 = 0.01;

    /// Shrinks probe spheres so they start outside the surfaces the capsule rests on
    pub const CAST_SKIN: f32 = 0.001;

    /// Steepest surface, as a normal Y component, the ground probe allows for when
    /// stretching to reach a capsule resting on a slope (about 80 degrees)
    pub const MIN_GROUND_NORMAL_Y: f32 = 0.17;

    /// Length of the upward ceiling probe
    pub const CEILING_PROBE_DISTANCE: f32 = 0.2;

    /// Autostep minimum landing width
    pub const AUTOSTEP_MIN_WIDTH: f32 = 0.05;

    /// Squared speed above which the avatar counts as moving
    pub const MOVING_SPEED_SQUARED: f32 = 0.1;

    /// Level geometry (floors, walls, props)
    pub const GROUP_WORLD: Group = Group::GROUP_1;

    /// Avatar capsule and shadow body
    pub const GROUP_PLAYER: Group = Group::GROUP_32;
}

/// Look update constants
pub mod look {
    /// Raw look delta to degrees, before sensitivity
    pub const DELTA_SCALE: f32 = 0.05;

    /// Samples arriving after this much silence are treated as a cursor spike
    pub const STALE_INPUT_SECS: f32 = 0.5;

    /// Reject deltas whose squared difference from the previous one exceeds this
    pub const SPIKE_THRESHOLD_SQUARED: f32 = 100.0;
}

/// Fixed locomotion tuning
pub mod locomotion {
    /// Shadow body offset, as a fraction of the collider margin, above which input is steered
    pub const SHADOW_STEER_MARGIN_FRACTION: f32 = 0.2;

    /// Vertical climbing input below this magnitude is ignored
    pub const CLIMB_VERTICAL_DEADZONE: f32 = 0.2;

    /// Lateral input scale while climbing toward the wall
    pub const CLIMB_LATERAL_SCALE: f32 = 0.5;

    /// Lateral input scale while moving away from the wall
    pub const CLIMB_DETACH_SCALE: f32 = 3.0;

    /// Height difference from standing that counts as crouched
    pub const CROUCH_THRESHOLD: f32 = 0.1;

    /// Clearance kept under a ceiling while standing up
    pub const CROUCH_CEILING_CLEARANCE: f32 = 0.1;
}
