use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use rapier3d::control::{
    CharacterAutostep, CharacterLength, EffectiveCharacterMovement, KinematicCharacterController,
};
use rapier3d::prelude::*;

use super::constants::physics as consts;
use super::physics::PhysicsWorld;
use crate::config::ControllerSettings;

/// Half length of the cylindrical part of a capsule with the given total height
pub fn capsule_half_height(height: f32, radius: f32) -> f32 {
    (height / 2.0 - radius).max(0.0)
}

/// The kinematic capsule. Its position is authoritative; the Rapier body follows it.
pub struct Avatar {
    pub(crate) body: RigidBodyHandle,
    pub(crate) collider: ColliderHandle,
    /// Capsule centre
    pub(crate) position: Vector3<f32>,
    pub(crate) velocity: Vector3<f32>,
    pub(crate) height: f32,
    pub(crate) radius: f32,
    /// Look yaw in degrees, increasing when turning right
    pub(crate) heading: f32,
    /// Look pitch in degrees, positive looking up
    pub(crate) pitch: f32,
    /// Yaw accumulated from rotating platforms, degrees
    pub(crate) look_offset: f32,
    /// Whether the last collide-and-slide move ended on the ground
    pub(crate) touching_ground: bool,
    pub(crate) spawn_position: Vector3<f32>,
    pub(crate) spawn_heading: f32,
    controller: KinematicCharacterController,
}

fn build_controller(settings: &ControllerSettings) -> KinematicCharacterController {
    let step = settings.general.step_offset;
    KinematicCharacterController {
        offset: CharacterLength::Absolute(consts::CONTROLLER_OFFSET),
        autostep: (step > 0.0).then(|| CharacterAutostep {
            max_height: CharacterLength::Absolute(step),
            min_width: CharacterLength::Absolute(consts::AUTOSTEP_MIN_WIDTH),
            include_dynamic_bodies: false,
        }),
        max_slope_climb_angle: settings.slope_limit(),
        // Sliding on steep ground is driven by the sensor, not the move primitive.
        min_slope_slide_angle: std::f32::consts::FRAC_PI_2,
        snap_to_ground: None,
        ..Default::default()
    }
}

impl Avatar {
    pub fn spawn(
        world: &mut PhysicsWorld,
        settings: &ControllerSettings,
        position: Vector3<f32>,
        heading: f32,
    ) -> Self {
        let height = settings.general.height;
        let radius = settings.general.radius;

        let body = RigidBodyBuilder::kinematic_position_based()
            .translation(position)
            .build();
        let body = world.rigid_body_set.insert(body);

        // A sensor: the avatar never exchanges forces with the world directly.
        let collider = ColliderBuilder::capsule_y(capsule_half_height(height, radius), radius)
            .sensor(true)
            .collision_groups(InteractionGroups::new(
                consts::GROUP_PLAYER,
                Group::ALL & !consts::GROUP_PLAYER,
            ))
            .build();
        let collider = world
            .collider_set
            .insert_with_parent(collider, body, &mut world.rigid_body_set);

        Self {
            body,
            collider,
            position,
            velocity: Vector3::zeros(),
            height,
            radius,
            heading,
            pitch: 0.0,
            look_offset: 0.0,
            touching_ground: false,
            spawn_position: position,
            spawn_heading: heading,
            controller: build_controller(settings),
        }
    }

    /// Picks up slope limit and step height changes from a new settings snapshot
    pub fn apply_settings(&mut self, settings: &ControllerSettings) {
        self.controller = build_controller(settings);
    }

    pub fn shape(&self) -> SharedShape {
        SharedShape::capsule_y(capsule_half_height(self.height, self.radius), self.radius)
    }

    /// Body yaw including the platform offset
    pub fn orientation(&self) -> UnitQuaternion<f32> {
        UnitQuaternion::from_axis_angle(
            &Vector3::y_axis(),
            -(self.heading + self.look_offset).to_radians(),
        )
    }

    /// Body yaw and look pitch combined
    pub fn look_rotation(&self) -> UnitQuaternion<f32> {
        self.orientation() * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), self.pitch.to_radians())
    }

    pub fn forward(&self) -> Vector3<f32> {
        self.orientation() * -Vector3::z()
    }

    pub fn right(&self) -> Vector3<f32> {
        self.orientation() * Vector3::x()
    }

    /// Lowest point of the capsule
    pub fn feet(&self) -> Vector3<f32> {
        self.position - Vector3::new(0.0, self.height / 2.0, 0.0)
    }

    /// Moves the capsule with collide-and-slide and returns what the primitive reported.
    /// The velocity is left untouched.
    pub fn move_by(&mut self, world: &PhysicsWorld, translation: Vector3<f32>) -> EffectiveCharacterMovement {
        self.move_passing(world, translation, None)
    }

    /// Like [`Avatar::move_by`], but `ignored` does not block the move. Used to carry
    /// the avatar with the body it stands on, which still sits at its old pose.
    pub fn move_passing(
        &mut self,
        world: &PhysicsWorld,
        translation: Vector3<f32>,
        ignored: Option<RigidBodyHandle>,
    ) -> EffectiveCharacterMovement {
        let filter = match ignored {
            Some(body) => world.world_filter().exclude_rigid_body(body),
            None => world.world_filter(),
        };
        let shape = self.shape();
        // Zero timestep: platform carry is applied explicitly by the walking rule,
        // so Rapier's own kinematic-ground following has to stay off.
        let movement =
            world.move_shape(&self.controller, shape.as_ref(), self.position, translation, 0.0, filter);
        self.position += movement.translation;
        movement
    }

    /// Schedules the kinematic body to the avatar pose for the coming step
    pub fn sync_body(&self, world: &mut PhysicsWorld) {
        if let Some(body) = world.rigid_body_set.get_mut(self.body) {
            body.set_next_kinematic_position(Isometry3::from_parts(
                Translation3::from(self.position),
                self.orientation(),
            ));
        }
    }

    /// Places the avatar instantly and clears its velocity
    pub fn teleport(&mut self, world: &mut PhysicsWorld, position: Vector3<f32>, heading: f32) {
        self.position = position;
        self.heading = heading;
        self.look_offset = 0.0;
        self.pitch = 0.0;
        self.velocity = Vector3::zeros();
        if let Some(body) = world.rigid_body_set.get_mut(self.body) {
            body.set_position(
                Isometry3::from_parts(Translation3::from(position), self.orientation()),
                true,
            );
        }
    }

    /// Resizes the capsule. When `keep_feet` is set the bottom stays where it is.
    pub fn set_height(&mut self, world: &mut PhysicsWorld, height: f32, keep_feet: bool) {
        let height = height.max(2.0 * self.radius);
        if (height - self.height).abs() < consts::EPSILON {
            return;
        }
        if keep_feet {
            self.position.y += (height - self.height) / 2.0;
        }
        self.height = height;
        let shape = self.shape();
        if let Some(collider) = world.collider_set.get_mut(self.collider) {
            collider.set_shape(shape);
        }
    }
}
