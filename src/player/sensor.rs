//! Ground and ceiling probes run at the start of every walking tick.

use nalgebra::Vector3;
use rapier3d::prelude::{ColliderHandle, Group, RigidBodyHandle};

use super::avatar::{capsule_half_height, Avatar};
use super::constants::physics as consts;
use super::physics::PhysicsWorld;
use crate::config::ControllerSettings;

/// Surface found under the avatar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundContact {
    pub collider: ColliderHandle,
    /// Body the collider is attached to, if any
    pub body: Option<RigidBodyHandle>,
    pub normal: Vector3<f32>,
    /// Surface material tag, from the collider's user data
    pub material: Option<u128>,
    pub walkable: bool,
    pub distance: f32,
}

/// Ground facts for the current tick. Rebuilt from scratch by every probe.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GroundInfo {
    pub contact: Option<GroundContact>,
    pub sliding: bool,
    /// Point velocity and yaw rate of the supporting kinematic body, when there is one
    pub platform: Option<(Vector3<f32>, f32)>,
}

impl GroundInfo {
    pub fn collider(&self) -> Option<ColliderHandle> {
        self.contact.map(|c| c.collider)
    }

    pub fn body(&self) -> Option<RigidBodyHandle> {
        self.contact.and_then(|c| c.body)
    }
}

/// Surface directly above the avatar's head, if any
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CeilingInfo {
    pub collider: Option<ColliderHandle>,
}

impl CeilingInfo {
    pub fn is_blocked(&self) -> bool {
        self.collider.is_some()
    }
}

/// A surface is walkable when its groups are within the mask and it is no steeper than the limit.
pub fn is_walkable(memberships: Group, mask: Group, normal: Vector3<f32>, slope_limit: f32) -> bool {
    (mask | memberships) == mask && normal.angle(&Vector3::y()) <= slope_limit
}

/// Lateral velocity added each tick while standing on a surface that is not walkable
pub fn slide_velocity(normal: Vector3<f32>, multiplier: f32) -> Vector3<f32> {
    let y_inverse = 1.0 - normal.y;
    Vector3::new(
        y_inverse * normal.x * multiplier,
        0.0,
        y_inverse * normal.z * multiplier,
    )
}

/// Extra vertical gap between a capsule resting on a surface with the given
/// normal and the same capsule resting on flat ground. The move primitive keeps
/// its skin along the normal, so the gap measured straight down grows with tilt.
fn resting_gap_growth(normal_y: f32) -> f32 {
    let skin = consts::CONTROLLER_OFFSET + consts::CAST_SKIN;
    skin / normal_y.max(consts::MIN_GROUND_NORMAL_Y) - skin
}

/// Probes ground and ceiling around the avatar.
///
/// The ground probe sweeps a slightly shrunk sphere down from the centre of the
/// lower hemisphere. It reaches further while the previous platform is going
/// down and the avatar is not going up, so a descending lift keeps its rider.
pub fn sense(
    world: &PhysicsWorld,
    avatar: &Avatar,
    settings: &ControllerSettings,
    previous_platform_velocity: Vector3<f32>,
) -> (GroundInfo, CeilingInfo) {
    let ground = sense_ground(world, avatar, settings, previous_platform_velocity);
    let ceiling = sense_ceiling(world, avatar);
    (ground, ceiling)
}

fn sense_ground(
    world: &PhysicsWorld,
    avatar: &Avatar,
    settings: &ControllerSettings,
    previous_platform_velocity: Vector3<f32>,
) -> GroundInfo {
    let cast_distance = if previous_platform_velocity.y < 0.0 && avatar.velocity.y <= 0.0 {
        settings.ground.platform_cast_distance
    } else {
        settings.ground.ground_cast_distance
    };

    let offset = capsule_half_height(avatar.height, avatar.radius);
    let origin = avatar.position - Vector3::new(0.0, offset, 0.0);
    let Some(hit) = world.cast_sphere(
        origin,
        avatar.radius - consts::CAST_SKIN,
        -Vector3::y(),
        cast_distance + resting_gap_growth(consts::MIN_GROUND_NORMAL_Y),
        world.world_filter(),
    ) else {
        return GroundInfo::default();
    };
    if hit.distance > cast_distance + resting_gap_growth(hit.normal.y) {
        return GroundInfo::default();
    }

    let Some(collider) = world.collider_set.get(hit.collider) else {
        return GroundInfo::default();
    };
    let body = collider.parent();
    let walkable = is_walkable(
        collider.collision_groups().memberships,
        settings.walkable_groups(),
        hit.normal,
        settings.slope_limit(),
    );
    let material = (collider.user_data != 0).then_some(collider.user_data);
    let platform = body.and_then(|b| world.kinematic_point_velocity(b, origin));

    GroundInfo {
        contact: Some(GroundContact {
            collider: hit.collider,
            body,
            normal: hit.normal,
            material,
            walkable,
            distance: hit.distance,
        }),
        sliding: !walkable,
        platform,
    }
}

fn sense_ceiling(world: &PhysicsWorld, avatar: &Avatar) -> CeilingInfo {
    let offset = capsule_half_height(avatar.height, avatar.radius);
    let origin = avatar.position + Vector3::new(0.0, offset, 0.0);
    let collider = world
        .cast_sphere(
            origin,
            avatar.radius - consts::CAST_SKIN,
            Vector3::y(),
            consts::CEILING_PROBE_DISTANCE,
            world.world_filter(),
        )
        .map(|hit| hit.collider);
    CeilingInfo { collider }
}
