//! Controller settings parsing from TOML files

use nalgebra::Vector3;
use rapier3d::prelude::Group;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// General avatar and world settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Avatar mass, scales gravity
    pub mass: f32,
    /// Gravity acceleration applied while airborne
    pub gravity: [f32; 3],
    /// How fast the movement blend factor follows the moving/still state
    pub movement_factor_interpolation_speed: f32,
    /// Teleport back to spawn when the avatar drops below this height
    pub world_bottom_boundary: f32,
    /// Standing capsule height (hemispheres included)
    pub height: f32,
    /// Capsule radius
    pub radius: f32,
    /// Camera height above the capsule centre
    pub eye_height: f32,
    /// Steepest walkable slope, in degrees
    pub slope_limit_degrees: f32,
    /// Tallest obstacle the move primitive steps over
    pub step_offset: f32,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            mass: 1.0,
            gravity: [0.0, -9.8, 0.0],
            movement_factor_interpolation_speed: 3.0,
            world_bottom_boundary: -100.0,
            height: 2.0,
            radius: 0.5,
            eye_height: 0.7,
            slope_limit_degrees: 45.0,
            step_offset: 0.3,
        }
    }
}

/// Look and input gating settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputSettings {
    /// Whether any movement input is read
    pub input_enabled: bool,
    /// Both this and `input_enabled` must be set for the look update to run
    pub look_enabled: bool,
    pub look_sensitivity: f32,
    pub gamepad_horizontal_look_sensitivity: f32,
    pub gamepad_vertical_look_sensitivity: f32,
    pub invert_look_y: bool,
    pub look_pitch_limit_degrees: f32,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            input_enabled: true,
            look_enabled: true,
            look_sensitivity: 3.0,
            gamepad_horizontal_look_sensitivity: 6.0,
            gamepad_vertical_look_sensitivity: 4.0,
            invert_look_y: false,
            look_pitch_limit_degrees: 89.0,
        }
    }
}

/// Ground and ceiling sensing settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GroundSettings {
    /// Ground probe length while on regular ground
    pub ground_cast_distance: f32,
    /// Ground probe length while riding a descending platform
    pub platform_cast_distance: f32,
    /// Downward velocity held while grounded, keeps the avatar glued on slopes
    pub stick_to_ground_velocity: f32,
    /// Collision group bits the avatar can walk on; anything else slides
    pub walkable_mask: u32,
    pub slide_speed_multiplier: f32,
    /// Downward acceleration applied while a ceiling is pressing on the capsule
    pub ceiling_unstick_force: f32,
}

impl Default for GroundSettings {
    fn default() -> Self {
        Self {
            ground_cast_distance: 0.02,
            platform_cast_distance: 0.5,
            stick_to_ground_velocity: 3.0,
            walkable_mask: u32::MAX,
            slide_speed_multiplier: 1.0,
            ceiling_unstick_force: 20.0,
        }
    }
}

/// Shadow body rig settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShadowBodySettings {
    /// Difference between the avatar radius and the shadow body radius
    pub collider_margin: f32,
    /// Stiffness of the lateral recentering drive
    pub position_spring: f32,
    /// Damping of the lateral recentering drive
    pub position_damper: f32,
    pub mass: f32,
    /// Contact impulse to avatar velocity conversion factor
    pub push_impulse_scale: f32,
    /// Largest velocity nudge a single contact pair can produce
    pub push_max_velocity: f32,
}

impl Default for ShadowBodySettings {
    fn default() -> Self {
        Self {
            collider_margin: 0.15,
            position_spring: 15000.0,
            position_damper: 0.0,
            mass: 1.0,
            push_impulse_scale: 0.001,
            push_max_velocity: 0.1,
        }
    }
}

/// Speed and acceleration of one locomotion mode
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModeSettings {
    pub speed: f32,
    pub acceleration: f32,
}

impl Default for ModeSettings {
    fn default() -> Self {
        Self {
            speed: 4.0,
            acceleration: 10.0,
        }
    }
}

/// Walking mode settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WalkingSettings {
    pub speed: f32,
    pub acceleration: f32,
    /// Velocity change rate while airborne
    pub midair_acceleration: f32,
}

impl Default for WalkingSettings {
    fn default() -> Self {
        Self {
            speed: 4.0,
            acceleration: 10.0,
            midair_acceleration: 2.0,
        }
    }
}

/// Jumping settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JumpingSettings {
    /// Vertical launch speed
    pub speed: f32,
    /// Accept a press this long before landing
    pub press_buffer_time: f32,
    /// Accept a press this long after leaving the ground
    pub ground_grace_time: f32,
    pub max_jumps: u32,
}

impl Default for JumpingSettings {
    fn default() -> Self {
        Self {
            speed: 4.0,
            press_buffer_time: 0.05,
            ground_grace_time: 0.2,
            max_jumps: 1,
        }
    }
}

/// Crouching settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrouchingSettings {
    /// Capsule height when fully crouched
    pub height: f32,
    pub transition_speed: f32,
    pub speed_multiplier: f32,
    /// Crouch presses toggle instead of requiring a held axis
    pub toggle: bool,
}

impl Default for CrouchingSettings {
    fn default() -> Self {
        Self {
            height: 1.0,
            transition_speed: 10.0,
            speed_multiplier: 0.5,
            toggle: false,
        }
    }
}

/// Sprinting settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SprintingSettings {
    pub speed_multiplier: f32,
}

impl Default for SprintingSettings {
    fn default() -> Self {
        Self {
            speed_multiplier: 1.8,
        }
    }
}

/// Grab controller settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GrabbingSettings {
    /// Gain from target offset to held body linear velocity
    pub velocity: f32,
    /// Gain from rotation error (radians) to held body angular velocity
    pub rotation_speed: f32,
    pub throw_force: f32,
    /// Releasing faster than this turns the release into a throw
    pub throw_speed_threshold: f32,
    /// Drop the body once it is further than this from its hold target
    pub max_hold_distance: f32,
    /// Hold target relative to the camera as [right, up, forward]
    pub position_offset: [f32; 3],
    /// Heaviest body that can be grabbed
    pub mass_limit: f32,
    /// Collision group bits that can be grabbed
    pub mask: u32,
    /// Held body mass is divided by this
    pub mass_divisor: f32,
    /// Angular damping applied while held
    pub angular_damping: f32,
    /// Enable continuous collision detection while held
    pub force_ccd: bool,
    /// Clamp the hold target in front of geometry between body and target
    pub occlusion_check: bool,
}

impl Default for GrabbingSettings {
    fn default() -> Self {
        Self {
            velocity: 30.0,
            rotation_speed: 10.0,
            throw_force: 10.0,
            throw_speed_threshold: 5.0,
            max_hold_distance: 3.0,
            position_offset: [0.0, 0.0, 2.0],
            mass_limit: 20.0,
            mask: u32::MAX,
            mass_divisor: 20.0,
            angular_damping: 20.0,
            force_ccd: true,
            occlusion_check: true,
        }
    }
}

/// Full settings snapshot consumed by the controller every tick
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    pub general: GeneralSettings,
    pub input: InputSettings,
    pub ground: GroundSettings,
    pub shadow_body: ShadowBodySettings,
    pub walking: WalkingSettings,
    pub flying: ModeSettings,
    pub swimming: ModeSettings,
    pub climbing: ModeSettings,
    pub jumping: JumpingSettings,
    pub crouching: CrouchingSettings,
    pub sprinting: SprintingSettings,
    pub grabbing: GrabbingSettings,
}

impl ControllerSettings {
    /// Load settings from a TOML file and validate them
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let settings: Self = toml::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse and validate settings from an in-memory TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(content).map_err(|source| SettingsError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the controller cannot work with
    pub fn validate(&self) -> Result<(), SettingsError> {
        let general = &self.general;
        if general.radius <= 0.0 {
            return Err(SettingsError::invalid("general.radius", "must be positive"));
        }
        if general.height < 2.0 * general.radius {
            return Err(SettingsError::invalid(
                "general.height",
                "must be at least twice the radius",
            ));
        }
        if self.crouching.height < 2.0 * general.radius || self.crouching.height > general.height {
            return Err(SettingsError::invalid(
                "crouching.height",
                "must lie between twice the radius and the standing height",
            ));
        }
        if !(0.0..90.0).contains(&general.slope_limit_degrees) {
            return Err(SettingsError::invalid(
                "general.slope_limit_degrees",
                "must be in [0, 90)",
            ));
        }
        if general.mass <= 0.0 {
            return Err(SettingsError::invalid("general.mass", "must be positive"));
        }
        if self.shadow_body.collider_margin < 0.0 {
            return Err(SettingsError::invalid(
                "shadow_body.collider_margin",
                "must not be negative",
            ));
        }
        if self.shadow_body.mass <= 0.0 {
            return Err(SettingsError::invalid("shadow_body.mass", "must be positive"));
        }
        if self.grabbing.mass_divisor <= 0.0 {
            return Err(SettingsError::invalid(
                "grabbing.mass_divisor",
                "must be positive",
            ));
        }
        if self.grabbing.max_hold_distance <= 0.0 {
            return Err(SettingsError::invalid(
                "grabbing.max_hold_distance",
                "must be positive",
            ));
        }
        if self.ground.ground_cast_distance <= 0.0 || self.ground.platform_cast_distance <= 0.0 {
            return Err(SettingsError::invalid(
                "ground.ground_cast_distance",
                "cast distances must be positive",
            ));
        }
        Ok(())
    }

    pub fn gravity(&self) -> Vector3<f32> {
        let [x, y, z] = self.general.gravity;
        Vector3::new(x, y, z)
    }

    pub fn walkable_groups(&self) -> Group {
        Group::from_bits_truncate(self.ground.walkable_mask)
    }

    pub fn grab_groups(&self) -> Group {
        Group::from_bits_truncate(self.grabbing.mask)
    }

    pub fn slope_limit(&self) -> f32 {
        self.general.slope_limit_degrees.to_radians()
    }
}

/// Errors that can occur when loading controller settings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl SettingsError {
    fn invalid(field: &'static str, reason: &str) -> Self {
        SettingsError::Invalid {
            field,
            reason: reason.to_string(),
        }
    }
}
