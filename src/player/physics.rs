use crossbeam_channel::Receiver;
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use rapier3d::control::{EffectiveCharacterMovement, KinematicCharacterController};
use rapier3d::parry::query::ShapeCastOptions;
use rapier3d::parry::shape::Ball;
use rapier3d::prelude::*;
use std::collections::{HashMap, HashSet};

use super::constants::physics as consts;

/// Shape of a level part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartShape {
    Block,
    Ball,
    Cylinder,
}

/// How a part participates in the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Fixed,
    /// Moved by setting its pose every tick
    KinematicPosition,
    /// Moved by its own linear and angular velocity
    KinematicVelocity,
    Dynamic,
}

/// Description of a level part to insert into the world
#[derive(Debug, Clone)]
pub struct PartDesc {
    pub shape: PartShape,
    pub size: Vector3<f32>,
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub kind: BodyKind,
    /// Collision group memberships
    pub groups: Group,
    /// Overrides the collider mass computed from density
    pub mass: Option<f32>,
    /// Surface material tag reported by the ground sensor, 0 means none
    pub material: u128,
    pub friction: f32,
    pub linvel: Vector3<f32>,
    pub angvel: Vector3<f32>,
}

impl PartDesc {
    pub fn new(shape: PartShape, size: Vector3<f32>, position: Vector3<f32>) -> Self {
        Self {
            shape,
            size,
            position,
            rotation: UnitQuaternion::identity(),
            kind: BodyKind::Fixed,
            groups: consts::GROUP_WORLD,
            mass: None,
            material: 0,
            friction: 0.5,
            linvel: Vector3::zeros(),
            angvel: Vector3::zeros(),
        }
    }

    pub fn block(size: Vector3<f32>, position: Vector3<f32>) -> Self {
        Self::new(PartShape::Block, size, position)
    }

    pub fn kind(mut self, kind: BodyKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn rotation(mut self, rotation: UnitQuaternion<f32>) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn groups(mut self, groups: Group) -> Self {
        self.groups = groups;
        self
    }

    pub fn mass(mut self, mass: f32) -> Self {
        self.mass = Some(mass);
        self
    }

    pub fn material(mut self, material: u128) -> Self {
        self.material = material;
        self
    }

    pub fn friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    /// Initial velocity for dynamic and velocity-based kinematic parts
    pub fn velocity(mut self, linvel: Vector3<f32>, angvel: Vector3<f32>) -> Self {
        self.linvel = linvel;
        self.angvel = angvel;
        self
    }
}

/// Result of a sphere cast
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeHit {
    pub collider: ColliderHandle,
    /// Outward surface normal at the impact, world space
    pub normal: Vector3<f32>,
    pub distance: f32,
}

/// Velocity of a kinematic body sampled when its pose was last set
#[derive(Debug, Clone, Copy, Default)]
struct SampledVelocity {
    linear: Vector3<f32>,
    angular: Vector3<f32>,
}

/// Collider pairs whose contacts are discarded before the solver sees them
#[derive(Debug, Default)]
pub struct IgnoredPairs {
    pairs: HashSet<(ColliderHandle, ColliderHandle)>,
}

impl IgnoredPairs {
    pub fn insert(&mut self, a: ColliderHandle, b: ColliderHandle) -> bool {
        if self.contains(a, b) {
            return false;
        }
        self.pairs.insert((a, b))
    }

    pub fn contains(&self, a: ColliderHandle, b: ColliderHandle) -> bool {
        self.pairs.contains(&(a, b)) || self.pairs.contains(&(b, a))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    fn forget(&mut self, collider: ColliderHandle) {
        self.pairs.retain(|&(a, b)| a != collider && b != collider);
    }
}

impl PhysicsHooks for IgnoredPairs {
    fn filter_contact_pair(&self, context: &PairFilterContext) -> Option<SolverFlags> {
        if self.contains(context.collider1, context.collider2) {
            None
        } else {
            Some(SolverFlags::COMPUTE_IMPULSES)
        }
    }
}

/// Wrapper around the Rapier world the controller lives in.
pub struct PhysicsWorld {
    pub gravity: Vector<Real>,
    pub rigid_body_set: RigidBodySet,
    pub collider_set: ColliderSet,
    pub integration_parameters: IntegrationParameters,
    pub physics_pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub impulse_joint_set: ImpulseJointSet,
    pub multibody_joint_set: MultibodyJointSet,
    pub ccd_solver: CCDSolver,
    pub query_pipeline: QueryPipeline,

    /// Contact filter applied during the step
    pub ignored_pairs: IgnoredPairs,
    event_collector: ChannelEventCollector,
    collision_events: Receiver<CollisionEvent>,
    contact_force_events: Receiver<ContactForceEvent>,
    /// Pose-driven kinematic velocities sampled from per-tick target poses
    kinematic_velocities: HashMap<RigidBodyHandle, SampledVelocity>,
}

/// Builds a collider with the correct shape for a given part.
fn build_collider(desc: &PartDesc) -> Collider {
    let half = desc.size / 2.0;
    let shared_shape = match desc.shape {
        PartShape::Block => SharedShape::cuboid(half.x, half.y, half.z),
        PartShape::Ball => SharedShape::ball(half.x),
        PartShape::Cylinder => SharedShape::cylinder(half.y, half.x),
    };
    let mut builder = ColliderBuilder::new(shared_shape)
        .collision_groups(InteractionGroups::new(desc.groups, Group::ALL))
        .friction(desc.friction)
        .user_data(desc.material);
    if let Some(mass) = desc.mass {
        builder = builder.mass(mass);
    }
    builder.build()
}

impl PhysicsWorld {
    pub fn new(gravity: Vector3<f32>) -> Self {
        let (collision_send, collision_events) = crossbeam_channel::unbounded();
        let (contact_force_send, contact_force_events) = crossbeam_channel::unbounded();
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = consts::TIMESTEP;
        Self {
            gravity,
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            integration_parameters,
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            ignored_pairs: IgnoredPairs::default(),
            event_collector: ChannelEventCollector::new(collision_send, contact_force_send),
            collision_events,
            contact_force_events,
            kinematic_velocities: HashMap::new(),
        }
    }

    /// Steps the simulation forward by dt seconds
    pub fn step(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &self.ignored_pairs,
            &self.event_collector,
        );
        // Only collision events are enabled on colliders; keep the other channel from growing.
        while self.contact_force_events.try_recv().is_ok() {}
    }

    /// Refreshes the query pipeline so casts see the current collider poses
    pub fn update_queries(&mut self) {
        self.query_pipeline.update(&self.collider_set);
    }

    /// Takes every collision event produced since the last call
    pub fn drain_collision_events(&self) -> Vec<CollisionEvent> {
        self.collision_events.try_iter().collect()
    }

    /// Adds a part and returns its body handle
    pub fn add_part(&mut self, desc: &PartDesc) -> RigidBodyHandle {
        let builder = match desc.kind {
            BodyKind::Fixed => RigidBodyBuilder::fixed(),
            BodyKind::KinematicPosition => RigidBodyBuilder::kinematic_position_based(),
            BodyKind::KinematicVelocity => RigidBodyBuilder::kinematic_velocity_based()
                .linvel(desc.linvel)
                .angvel(desc.angvel),
            BodyKind::Dynamic => RigidBodyBuilder::dynamic()
                .linvel(desc.linvel)
                .angvel(desc.angvel),
        };
        let body = builder
            .translation(desc.position)
            .rotation(desc.rotation.scaled_axis())
            .build();
        let handle = self.rigid_body_set.insert(body);

        let collider = build_collider(desc);
        self.collider_set
            .insert_with_parent(collider, handle, &mut self.rigid_body_set);

        if desc.kind == BodyKind::KinematicPosition {
            self.kinematic_velocities.insert(handle, SampledVelocity::default());
        }
        handle
    }

    /// Removes a body and its colliders. Returns false if it was already gone.
    pub fn remove_body(&mut self, handle: RigidBodyHandle) -> bool {
        let Some(body) = self.rigid_body_set.get(handle) else {
            return false;
        };
        for &collider in body.colliders() {
            self.ignored_pairs.forget(collider);
        }
        self.kinematic_velocities.remove(&handle);
        self.rigid_body_set
            .remove(
                handle,
                &mut self.island_manager,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                true,
            )
            .is_some()
    }

    /// Schedules a pose-driven kinematic body to reach `position`/`rotation` at the next step,
    /// recording the velocity that motion implies.
    pub fn set_kinematic_pose(
        &mut self,
        handle: RigidBodyHandle,
        position: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
        dt: f32,
    ) {
        if let Some(body) = self.rigid_body_set.get_mut(handle) {
            if body.is_kinematic() {
                let inv_dt = if dt > consts::EPSILON { 1.0 / dt } else { 0.0 };
                let linear = (position - body.translation()) * inv_dt;
                let angular = (rotation * body.rotation().inverse()).scaled_axis() * inv_dt;
                self.kinematic_velocities
                    .insert(handle, SampledVelocity { linear, angular });
                body.set_next_kinematic_position(Isometry3::from_parts(
                    Translation3::from(position),
                    rotation,
                ));
            }
        }
    }

    /// Velocity of a kinematic body at a world point, with its yaw rate.
    /// None when the body is missing or not kinematic.
    pub fn kinematic_point_velocity(
        &self,
        handle: RigidBodyHandle,
        point: Vector3<f32>,
    ) -> Option<(Vector3<f32>, f32)> {
        let body = self.rigid_body_set.get(handle)?;
        if !body.is_kinematic() {
            return None;
        }
        match self.kinematic_velocities.get(&handle) {
            Some(sampled) => {
                let arm = point - body.translation();
                Some((sampled.linear + sampled.angular.cross(&arm), sampled.angular.y))
            }
            None => {
                let v = body.velocity_at_point(&Point3::from(point));
                Some((v, body.angvel().y))
            }
        }
    }

    /// Excludes sensors and the player's own colliders
    pub fn world_filter(&self) -> QueryFilter<'static> {
        QueryFilter::default().exclude_sensors().groups(InteractionGroups::new(
            consts::GROUP_PLAYER,
            Group::ALL & !consts::GROUP_PLAYER,
        ))
    }

    /// Sweeps a ball of `radius` from `origin` along `direction`
    pub fn cast_sphere(
        &self,
        origin: Vector3<f32>,
        radius: f32,
        direction: Vector3<f32>,
        max_distance: f32,
        filter: QueryFilter,
    ) -> Option<ShapeHit> {
        let direction = direction.try_normalize(consts::EPSILON)?;
        let ball = Ball::new(radius.max(consts::EPSILON));
        let pose = Isometry3::translation(origin.x, origin.y, origin.z);
        let options = ShapeCastOptions {
            max_time_of_impact: max_distance,
            target_distance: 0.0,
            stop_at_penetration: true,
            compute_impact_geometry_on_penetration: true,
        };
        let (collider, hit) = self.query_pipeline.cast_shape(
            &self.rigid_body_set,
            &self.collider_set,
            &pose,
            &direction,
            &ball,
            options,
            filter,
        )?;
        // The ball is unrotated, so its local normal is already a world direction.
        let normal = (-hit.normal2.into_inner())
            .try_normalize(consts::EPSILON)
            .unwrap_or_else(|| -direction);
        Some(ShapeHit {
            collider,
            normal,
            distance: hit.time_of_impact,
        })
    }

    /// Casts a ray and returns the hit collider and distance
    pub fn cast_ray(
        &self,
        origin: Vector3<f32>,
        direction: Vector3<f32>,
        max_distance: f32,
        filter: QueryFilter,
    ) -> Option<(ColliderHandle, f32)> {
        let direction = direction.try_normalize(consts::EPSILON)?;
        let ray = Ray::new(Point3::from(origin), direction);
        self.query_pipeline.cast_ray(
            &self.rigid_body_set,
            &self.collider_set,
            &ray,
            max_distance,
            true,
            filter,
        )
    }

    /// Runs the collide-and-slide primitive for a character shape
    pub fn move_shape(
        &self,
        controller: &KinematicCharacterController,
        shape: &dyn Shape,
        position: Vector3<f32>,
        desired_translation: Vector3<f32>,
        dt: f32,
        filter: QueryFilter,
    ) -> EffectiveCharacterMovement {
        let pose = Isometry3::translation(position.x, position.y, position.z);
        controller.move_shape(
            dt,
            &self.rigid_body_set,
            &self.collider_set,
            &self.query_pipeline,
            shape,
            &pose,
            desired_translation,
            filter,
            |_collision| {},
        )
    }

    /// Body the collider is attached to, if any
    pub fn parent_body(&self, collider: ColliderHandle) -> Option<RigidBodyHandle> {
        self.collider_set.get(collider)?.parent()
    }

    /// True when the collider is attached to a dynamic body
    pub fn is_dynamic_collider(&self, collider: ColliderHandle) -> bool {
        self.parent_body(collider)
            .and_then(|h| self.rigid_body_set.get(h))
            .is_some_and(|b| b.is_dynamic())
    }

    /// Impulses the solver applied to `collider` during the last step, per touching collider.
    /// Only pairs with active contacts are reported.
    pub fn contact_impulses(&self, collider: ColliderHandle) -> Vec<(ColliderHandle, Vector3<f32>)> {
        self.narrow_phase
            .contact_pairs_with(collider)
            .filter(|pair| pair.has_any_active_contact)
            .map(|pair| {
                let total = pair.total_impulse();
                if pair.collider1 == collider {
                    (pair.collider2, -total)
                } else {
                    (pair.collider1, total)
                }
            })
            .collect()
    }

    /// True when `collider` has an active contact with any collider of `body`
    pub fn is_touching_body(&self, collider: ColliderHandle, body: RigidBodyHandle) -> bool {
        self.narrow_phase
            .contact_pairs_with(collider)
            .filter(|pair| pair.has_any_active_contact)
            .any(|pair| {
                let other = if pair.collider1 == collider {
                    pair.collider2
                } else {
                    pair.collider1
                };
                self.parent_body(other) == Some(body)
            })
    }

    pub fn get_position(&self, handle: RigidBodyHandle) -> Option<Vector3<f32>> {
        self.rigid_body_set.get(handle).map(|b| *b.translation())
    }

    pub fn get_velocity(&self, handle: RigidBodyHandle) -> Option<Vector3<f32>> {
        self.rigid_body_set.get(handle).map(|b| *b.linvel())
    }

    pub fn contains_body(&self, handle: RigidBodyHandle) -> bool {
        self.rigid_body_set.contains(handle)
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(vector![0.0, -9.81, 0.0])
    }
}
