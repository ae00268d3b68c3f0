//! Dynamic proxy that lets the intangible avatar push physics objects.
//!
//! A kinematic anchor follows the avatar. A slightly wider dynamic capsule hangs
//! off the anchor by a joint that locks the vertical axis and all rotation,
//! limits lateral travel to the collider margin and springs back to centre.
//! The proxy is carried along with the anchor every tick, so only contacts
//! open a gap between the two. Whatever the proxy bumps into pushes back on
//! the avatar velocity.

use nalgebra::Vector3;
use rapier3d::prelude::*;

use super::avatar::{capsule_half_height, Avatar};
use super::constants::physics as consts;
use super::math::clamp_magnitude;
use super::physics::PhysicsWorld;
use crate::config::ControllerSettings;

pub struct ShadowBody {
    pub(crate) anchor: RigidBodyHandle,
    pub(crate) body: RigidBodyHandle,
    pub(crate) collider: ColliderHandle,
    margin: f32,
    radius: f32,
}

fn shadow_shape(height: f32, radius: f32) -> SharedShape {
    SharedShape::capsule_y(capsule_half_height(height, radius), radius)
}

impl ShadowBody {
    pub fn spawn(world: &mut PhysicsWorld, avatar: &Avatar, settings: &ControllerSettings) -> Self {
        let shadow = &settings.shadow_body;
        let margin = shadow.collider_margin;
        let radius = avatar.radius + margin;

        let anchor = RigidBodyBuilder::kinematic_position_based()
            .translation(avatar.position)
            .build();
        let anchor = world.rigid_body_set.insert(anchor);

        let body = RigidBodyBuilder::dynamic()
            .translation(avatar.position)
            .gravity_scale(0.0)
            .lock_rotations()
            .build();
        let body = world.rigid_body_set.insert(body);

        let collider = ColliderBuilder::new(shadow_shape(avatar.height, radius))
            .mass(shadow.mass)
            .collision_groups(InteractionGroups::new(
                consts::GROUP_PLAYER,
                Group::ALL & !consts::GROUP_PLAYER,
            ))
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS)
            .build();
        let collider = world
            .collider_set
            .insert_with_parent(collider, body, &mut world.rigid_body_set);

        let joint = GenericJointBuilder::new(
            JointAxesMask::LIN_Y | JointAxesMask::ANG_X | JointAxesMask::ANG_Y | JointAxesMask::ANG_Z,
        )
        .limits(JointAxis::LinX, [-margin, margin])
        .limits(JointAxis::LinZ, [-margin, margin])
        .motor_position(JointAxis::LinX, 0.0, shadow.position_spring, shadow.position_damper)
        .motor_position(JointAxis::LinZ, 0.0, shadow.position_spring, shadow.position_damper)
        .motor_max_force(JointAxis::LinX, Real::MAX)
        .motor_max_force(JointAxis::LinZ, Real::MAX)
        .build();
        world.impulse_joint_set.insert(anchor, body, joint, true);

        Self {
            anchor,
            body,
            collider,
            margin,
            radius,
        }
    }

    pub fn margin(&self) -> f32 {
        self.margin
    }

    /// Schedules the anchor to the avatar position for the coming step and
    /// gives the proxy the same motion on top of its own drift from the anchor.
    pub fn follow(&self, world: &mut PhysicsWorld, position: Vector3<f32>, dt: f32) {
        let Some(anchor) = world.rigid_body_set.get_mut(self.anchor) else {
            return;
        };
        let carry = (position - anchor.translation()) / dt;
        let anchor_velocity = *anchor.linvel();
        anchor.set_next_kinematic_translation(position);

        if let Some(body) = world.rigid_body_set.get_mut(self.body) {
            let drift = body.linvel() - anchor_velocity;
            body.set_linvel(carry + drift, true);
        }
    }

    /// How far contacts have held the proxy back from the anchor
    pub fn offset(&self, world: &PhysicsWorld) -> Vector3<f32> {
        match (world.get_position(self.body), world.get_position(self.anchor)) {
            (Some(body), Some(anchor)) => body - anchor,
            _ => Vector3::zeros(),
        }
    }

    /// Moves anchor and proxy together, dropping any proxy velocity
    pub fn teleport(&self, world: &mut PhysicsWorld, position: Vector3<f32>) {
        if let Some(anchor) = world.rigid_body_set.get_mut(self.anchor) {
            anchor.set_translation(position, true);
        }
        if let Some(body) = world.rigid_body_set.get_mut(self.body) {
            body.set_translation(position, true);
            body.set_linvel(Vector3::zeros(), true);
        }
    }

    /// Matches the proxy capsule to a new avatar height
    pub fn resize(&self, world: &mut PhysicsWorld, height: f32) {
        if let Some(collider) = world.collider_set.get_mut(self.collider) {
            collider.set_shape(shadow_shape(height, self.radius));
        }
    }

    /// Reacts to a collision event. Static and kinematic geometry is already
    /// handled by the avatar's own move, so the first contact with such a
    /// collider turns their contacts off for good. Returns true when a pair was ignored.
    pub fn handle_collision_event(&self, world: &mut PhysicsWorld, event: &CollisionEvent) -> bool {
        let CollisionEvent::Started(c1, c2, _) = *event else {
            return false;
        };
        let other = if c1 == self.collider {
            c2
        } else if c2 == self.collider {
            c1
        } else {
            return false;
        };
        if world.is_dynamic_collider(other) {
            return false;
        }
        let inserted = world.ignored_pairs.insert(self.collider, other);
        if inserted {
            log::debug!("Shadow body now ignores collider {:?}", other);
        }
        inserted
    }

    /// Velocity nudge from the contacts the proxy had with dynamic bodies during the last step
    pub fn contact_push(&self, world: &PhysicsWorld, settings: &ControllerSettings) -> Vector3<f32> {
        let shadow = &settings.shadow_body;
        world
            .contact_impulses(self.collider)
            .into_iter()
            .filter(|(other, _)| world.is_dynamic_collider(*other))
            .map(|(_, impulse)| clamp_magnitude(impulse * shadow.push_impulse_scale, shadow.push_max_velocity))
            .sum()
    }

    pub fn is_touching_body(&self, world: &PhysicsWorld, body: RigidBodyHandle) -> bool {
        world.is_touching_body(self.collider, body)
    }
}
