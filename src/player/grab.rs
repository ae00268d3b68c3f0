//! Picking up, carrying and throwing dynamic bodies.
//!
//! While held, a body is driven by velocity commands toward a point in front
//! of the camera and turned so the face it was grabbed by keeps facing the
//! player. Its mass, angular damping and CCD flag are swapped for the duration
//! of the hold and restored on every release path.

use nalgebra::{UnitQuaternion, Vector3};
use rapier3d::prelude::{ColliderHandle, RigidBodyHandle};

use super::events::{EventBus, PlayerEvent};
use super::math::{look_rotation, normalize_or_zero, snapped_to_nearest_axis};
use super::physics::PhysicsWorld;
use super::shadow_body::ShadowBody;
use crate::config::{ControllerSettings, GrabbingSettings};

/// Camera position and orientation. Forward is local -Z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
}

impl CameraPose {
    pub fn forward(&self) -> Vector3<f32> {
        self.rotation * -Vector3::z()
    }

    pub fn up(&self) -> Vector3<f32> {
        self.rotation * Vector3::y()
    }

    /// Camera-space offset given as [right, up, forward]
    fn local_offset(offset: [f32; 3]) -> Vector3<f32> {
        Vector3::new(offset[0], offset[1], -offset[2])
    }
}

/// What the grab controller needs to know about the player each tick
pub struct GrabContext<'a> {
    pub camera: CameraPose,
    pub grounded: bool,
    pub ground_body: Option<RigidBodyHandle>,
    pub shadow: &'a ShadowBody,
    pub settings: &'a ControllerSettings,
}

/// Saved state of a held body
#[derive(Debug, Clone)]
struct GrabSession {
    body: RigidBodyHandle,
    collider_masses: Vec<(ColliderHandle, f32)>,
    angular_damping: f32,
    ccd_enabled: bool,
    /// Camera-space offset from the grab point to the body origin, forward part only
    grab_offset: Vector3<f32>,
    rotation_offset: UnitQuaternion<f32>,
}

#[derive(Debug, Default)]
pub struct GrabController {
    session: Option<GrabSession>,
    looked_at: Option<RigidBodyHandle>,
}

impl GrabController {
    pub fn is_holding(&self) -> bool {
        self.session.is_some()
    }

    pub fn held_body(&self) -> Option<RigidBodyHandle> {
        self.session.as_ref().map(|s| s.body)
    }

    pub fn looked_at(&self) -> Option<RigidBodyHandle> {
        self.looked_at
    }

    /// Whether `body` is dynamic, in the grab mask and light enough
    pub fn can_grab(world: &PhysicsWorld, body: RigidBodyHandle, settings: &ControllerSettings) -> bool {
        let Some(rb) = world.rigid_body_set.get(body) else {
            return false;
        };
        if !rb.is_dynamic() || rb.mass() > settings.grabbing.mass_limit {
            return false;
        }
        let mask = settings.grab_groups();
        rb.colliders().iter().any(|&c| {
            world
                .collider_set
                .get(c)
                .is_some_and(|col| (mask | col.collision_groups().memberships) == mask)
        })
    }

    /// Records the body under the crosshair. Returns true when it is grabbable.
    pub fn look_at(
        &mut self,
        world: &PhysicsWorld,
        body: RigidBodyHandle,
        settings: &ControllerSettings,
        events: &mut EventBus,
    ) -> bool {
        if self.looked_at == Some(body) {
            return true;
        }
        self.look_away(events);
        if !Self::can_grab(world, body, settings) {
            return false;
        }
        self.looked_at = Some(body);
        events.publish(PlayerEvent::GrabbableLookedAt(body));
        true
    }

    pub fn look_away(&mut self, events: &mut EventBus) {
        if let Some(body) = self.looked_at.take() {
            events.publish(PlayerEvent::GrabbableLookedAway(body));
        }
    }

    /// Starts holding `body`, grabbed at `grab_point`.
    ///
    /// Refused while already holding, while airborne, for the body being stood
    /// on and for anything that cannot be grabbed.
    pub fn start_hold(
        &mut self,
        world: &mut PhysicsWorld,
        body: RigidBodyHandle,
        grab_point: Vector3<f32>,
        ctx: &GrabContext,
        events: &mut EventBus,
    ) -> bool {
        if self.session.is_some()
            || !ctx.grounded
            || ctx.ground_body == Some(body)
            || !Self::can_grab(world, body, ctx.settings)
        {
            return false;
        }
        let grabbing = &ctx.settings.grabbing;

        let mut collider_masses = Vec::new();
        let Some(rb) = world.rigid_body_set.get(body) else {
            return false;
        };
        for &handle in rb.colliders() {
            if let Some(collider) = world.collider_set.get_mut(handle) {
                let mass = collider.mass();
                collider_masses.push((handle, mass));
                collider.set_mass(mass / grabbing.mass_divisor);
            }
        }

        let Some(rb) = world.rigid_body_set.get_mut(body) else {
            return false;
        };
        rb.recompute_mass_properties_from_colliders(&world.collider_set);
        let angular_damping = rb.angular_damping();
        let ccd_enabled = rb.is_ccd_enabled();
        rb.set_angular_damping(grabbing.angular_damping);
        if grabbing.force_ccd {
            rb.enable_ccd(true);
        }

        let camera_inverse = ctx.camera.rotation.inverse();
        let local = camera_inverse * (rb.translation() - grab_point);
        let grab_offset = Vector3::new(0.0, 0.0, local.z);

        let body_inverse = rb.rotation().inverse();
        let rotation_offset = look_rotation(
            snapped_to_nearest_axis(body_inverse * -ctx.camera.forward()),
            snapped_to_nearest_axis(body_inverse * ctx.camera.up()),
        );

        self.session = Some(GrabSession {
            body,
            collider_masses,
            angular_damping,
            ccd_enabled,
            grab_offset,
            rotation_offset,
        });
        log::debug!("Grabbed body {:?}", body);
        events.publish(PlayerEvent::Grabbed(body));
        true
    }

    /// Puts the held body's physical properties back. The session is left in place.
    fn restore(world: &mut PhysicsWorld, session: &GrabSession) {
        for &(handle, mass) in &session.collider_masses {
            if let Some(collider) = world.collider_set.get_mut(handle) {
                collider.set_mass(mass);
            }
        }
        if let Some(rb) = world.rigid_body_set.get_mut(session.body) {
            rb.recompute_mass_properties_from_colliders(&world.collider_set);
            rb.set_angular_damping(session.angular_damping);
            rb.enable_ccd(session.ccd_enabled);
        }
    }

    /// Releases the held body. A fast-moving body is turned into a throw along its motion.
    pub fn stop_hold(
        &mut self,
        world: &mut PhysicsWorld,
        settings: &GrabbingSettings,
        events: &mut EventBus,
    ) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        Self::restore(world, &session);

        if let Some(rb) = world.rigid_body_set.get_mut(session.body) {
            let velocity = *rb.linvel();
            if velocity.norm() > settings.throw_speed_threshold {
                rb.set_linvel(Vector3::zeros(), true);
                rb.apply_impulse(normalize_or_zero(velocity) * settings.throw_force, true);
            }
        }

        log::debug!("Released body {:?}", session.body);
        events.publish(PlayerEvent::Released(session.body));
        true
    }

    /// Throws the held body along the camera forward
    pub fn throw(
        &mut self,
        world: &mut PhysicsWorld,
        camera: &CameraPose,
        settings: &GrabbingSettings,
        events: &mut EventBus,
    ) -> bool {
        let Some(body) = self.held_body() else {
            return false;
        };
        self.stop_hold(world, settings, events);
        if let Some(rb) = world.rigid_body_set.get_mut(body) {
            rb.apply_impulse(camera.forward() * settings.throw_force, true);
        }
        true
    }

    /// Toggles holding: releases if holding, otherwise grabs the body being looked at
    pub fn interact(
        &mut self,
        world: &mut PhysicsWorld,
        grab_point: Option<Vector3<f32>>,
        ctx: &GrabContext,
        events: &mut EventBus,
    ) -> bool {
        if self.is_holding() {
            return self.stop_hold(world, &ctx.settings.grabbing, events);
        }
        match (self.looked_at, grab_point) {
            (Some(body), Some(point)) => self.start_hold(world, body, point, ctx, events),
            _ => false,
        }
    }

    /// Drives the held body toward its hold target, releasing it when the hold breaks
    pub fn fixed_update(&mut self, world: &mut PhysicsWorld, ctx: &GrabContext, events: &mut EventBus) {
        let Some((body, grab_offset, rotation_offset)) = self
            .session
            .as_ref()
            .map(|s| (s.body, s.grab_offset, s.rotation_offset))
        else {
            return;
        };
        let grabbing = &ctx.settings.grabbing;

        if !world.contains_body(body) {
            log::debug!("Held body {:?} was removed", body);
            self.session = None;
            events.publish(PlayerEvent::GrabSessionDestroyed);
            return;
        }

        if ctx.ground_body == Some(body) {
            self.stop_hold(world, grabbing, events);
            return;
        }
        if !ctx.grounded && ctx.shadow.is_touching_body(world, body) {
            self.stop_hold(world, grabbing, events);
            return;
        }

        let camera = &ctx.camera;
        let target = camera.position
            + camera.rotation * CameraPose::local_offset(grabbing.position_offset)
            + camera.rotation * grab_offset;
        let Some(position) = world.get_position(body) else {
            return;
        };
        let to_target = target - position;
        let distance = to_target.norm();
        if distance > grabbing.max_hold_distance {
            log::debug!("Held body {:?} fell {:.2} behind, releasing", body, distance);
            self.stop_hold(world, grabbing, events);
            return;
        }

        let mut goal = target;
        if grabbing.occlusion_check {
            let filter = world.world_filter().exclude_rigid_body(body);
            if let Some((_, toi)) = world.cast_ray(position, to_target, distance, filter) {
                goal = position + normalize_or_zero(to_target) * toi;
            }
        }

        let Some(rb) = world.rigid_body_set.get_mut(body) else {
            return;
        };
        let facing_player = look_rotation(camera.position - target, Vector3::y());
        let error = facing_player * (rb.rotation() * rotation_offset).inverse();

        rb.set_linvel((goal - position) * grabbing.velocity, true);
        rb.set_angvel(error.scaled_axis() * grabbing.rotation_speed, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::avatar::Avatar;
    use crate::player::events::EventKind;
    use crate::player::physics::{BodyKind, PartDesc};
    use approx::assert_relative_eq;
    use rapier3d::prelude::Group;
    use std::cell::RefCell;
    use std::rc::Rc;

    const GRAB_POINT: Vector3<f32> = Vector3::new(0.0, 1.7, -1.75);

    /// Crate 2 m in front of the camera, gravity off
    fn setup() -> (PhysicsWorld, ShadowBody, ControllerSettings, RigidBodyHandle) {
        let settings = ControllerSettings::default();
        let mut world = PhysicsWorld::new(Vector3::zeros());
        let crate_body = world.add_part(
            &PartDesc::block(Vector3::new(0.5, 0.5, 0.5), Vector3::new(0.0, 1.7, -2.0))
                .kind(BodyKind::Dynamic)
                .mass(4.0),
        );
        let avatar = Avatar::spawn(&mut world, &settings, Vector3::new(0.0, 1.0, 0.0), 0.0);
        let shadow = ShadowBody::spawn(&mut world, &avatar, &settings);
        world.update_queries();
        (world, shadow, settings, crate_body)
    }

    fn context<'a>(
        shadow: &'a ShadowBody,
        settings: &'a ControllerSettings,
        grounded: bool,
        ground_body: Option<RigidBodyHandle>,
    ) -> GrabContext<'a> {
        GrabContext {
            camera: CameraPose {
                position: Vector3::new(0.0, 1.7, 0.0),
                rotation: UnitQuaternion::identity(),
            },
            grounded,
            ground_body,
            shadow,
            settings,
        }
    }

    fn body_mass(world: &PhysicsWorld, body: RigidBodyHandle) -> f32 {
        world.rigid_body_set[body].mass()
    }

    #[test]
    fn test_can_grab_checks_kind_mask_and_mass() {
        let (mut world, _, mut settings, crate_body) = setup();
        assert!(GrabController::can_grab(&world, crate_body, &settings));

        let heavy = world.add_part(
            &PartDesc::block(Vector3::new(1.0, 1.0, 1.0), Vector3::new(5.0, 1.0, 0.0))
                .kind(BodyKind::Dynamic)
                .mass(50.0),
        );
        assert!(!GrabController::can_grab(&world, heavy, &settings));

        let wall = world.add_part(&PartDesc::block(
            Vector3::new(1.0, 1.0, 1.0),
            Vector3::new(-5.0, 1.0, 0.0),
        ));
        assert!(!GrabController::can_grab(&world, wall, &settings));

        settings.grabbing.mask = Group::GROUP_5.bits();
        assert!(!GrabController::can_grab(&world, crate_body, &settings));
    }

    #[test]
    fn test_start_and_stop_restore_body() {
        let (mut world, shadow, settings, crate_body) = setup();
        let original_mass = body_mass(&world, crate_body);
        let mut grab = GrabController::default();
        let mut events = EventBus::new();
        let ctx = context(&shadow, &settings, true, None);

        assert!(grab.start_hold(&mut world, crate_body, GRAB_POINT, &ctx, &mut events));
        assert_relative_eq!(body_mass(&world, crate_body), original_mass / 20.0, epsilon = 1e-4);
        assert_relative_eq!(world.rigid_body_set[crate_body].angular_damping(), 20.0);
        assert!(world.rigid_body_set[crate_body].is_ccd_enabled());
        assert!(!grab.start_hold(&mut world, crate_body, GRAB_POINT, &ctx, &mut events), "already holding");

        assert!(grab.stop_hold(&mut world, &settings.grabbing, &mut events));
        assert_relative_eq!(body_mass(&world, crate_body), original_mass, epsilon = 1e-4);
        assert!(!world.rigid_body_set[crate_body].is_ccd_enabled());
        assert!(!grab.is_holding());
        assert!(!grab.stop_hold(&mut world, &settings.grabbing, &mut events));
    }

    #[test]
    fn test_refused_when_airborne_or_standing_on_it() {
        let (mut world, shadow, settings, crate_body) = setup();
        let mut grab = GrabController::default();
        let mut events = EventBus::new();

        let airborne = context(&shadow, &settings, false, None);
        assert!(!grab.start_hold(&mut world, crate_body, GRAB_POINT, &airborne, &mut events));

        let standing = context(&shadow, &settings, true, Some(crate_body));
        assert!(!grab.start_hold(&mut world, crate_body, GRAB_POINT, &standing, &mut events));
        assert!(!grab.is_holding());
    }

    #[test]
    fn test_held_body_is_pulled_toward_target() {
        let (mut world, shadow, settings, crate_body) = setup();
        let mut grab = GrabController::default();
        let mut events = EventBus::new();
        let ctx = context(&shadow, &settings, true, None);
        assert!(grab.start_hold(&mut world, crate_body, GRAB_POINT, &ctx, &mut events));

        // Hold target is 2.25 m ahead; push the crate off to the side of it.
        world.rigid_body_set[crate_body].set_translation(Vector3::new(0.5, 1.7, -2.25), true);
        grab.fixed_update(&mut world, &ctx, &mut events);

        let v = world.get_velocity(crate_body).unwrap();
        assert_relative_eq!(v, Vector3::new(-0.5 * settings.grabbing.velocity, 0.0, 0.0), epsilon = 1e-3);
        assert!(grab.is_holding());
    }

    #[test]
    fn test_occluded_target_is_clamped_to_the_obstacle() {
        let (mut world, shadow, settings, crate_body) = setup();
        let mut grab = GrabController::default();
        let mut events = EventBus::new();
        let ctx = context(&shadow, &settings, true, None);
        assert!(grab.start_hold(&mut world, crate_body, GRAB_POINT, &ctx, &mut events));

        // Crate pulled back toward the camera with a thin wall between it and the
        // hold target at z = -2.25. The wall's near face is at z = -0.95.
        world.rigid_body_set[crate_body].set_translation(Vector3::new(0.0, 1.7, -0.25), true);
        world.add_part(&PartDesc::block(
            Vector3::new(2.0, 2.0, 0.1),
            Vector3::new(0.0, 1.7, -1.0),
        ));
        world.update_queries();
        grab.fixed_update(&mut world, &ctx, &mut events);

        let v = world.get_velocity(crate_body).unwrap();
        assert_relative_eq!(v, Vector3::new(0.0, 0.0, -0.7 * settings.grabbing.velocity), epsilon = 1e-2);
        assert!(grab.is_holding());
    }

    #[test]
    fn test_standing_on_held_body_releases_before_distance_check() {
        let (mut world, shadow, settings, crate_body) = setup();
        let mut grab = GrabController::default();
        let mut events = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        events.subscribe_all(move |e| sink.borrow_mut().push(e.kind()));
        let ctx = context(&shadow, &settings, true, None);
        assert!(grab.start_hold(&mut world, crate_body, GRAB_POINT, &ctx, &mut events));

        // Both release conditions at once: the crate is underfoot and out of reach.
        world.rigid_body_set[crate_body].set_translation(Vector3::new(0.0, 1.7, -20.0), true);
        let on_crate = context(&shadow, &settings, true, Some(crate_body));
        grab.fixed_update(&mut world, &on_crate, &mut events);
        grab.fixed_update(&mut world, &on_crate, &mut events);

        assert!(!grab.is_holding());
        assert_eq!(*log.borrow(), vec![EventKind::Grabbed, EventKind::Released]);
        assert_eq!(world.get_velocity(crate_body), Some(Vector3::zeros()));
    }

    #[test]
    fn test_fast_release_becomes_throw() {
        let (mut world, shadow, settings, crate_body) = setup();
        let mut grab = GrabController::default();
        let mut events = EventBus::new();
        let ctx = context(&shadow, &settings, true, None);
        grab.start_hold(&mut world, crate_body, GRAB_POINT, &ctx, &mut events);

        world.rigid_body_set[crate_body].set_linvel(Vector3::new(0.0, 0.0, -8.0), true);
        grab.stop_hold(&mut world, &settings.grabbing, &mut events);

        let v = world.get_velocity(crate_body).unwrap();
        let expected = settings.grabbing.throw_force / body_mass(&world, crate_body);
        assert_relative_eq!(v, Vector3::new(0.0, 0.0, -expected), epsilon = 1e-3);
    }

    #[test]
    fn test_release_paths_publish_events() {
        let (mut world, shadow, settings, crate_body) = setup();
        let mut grab = GrabController::default();
        let mut events = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        events.subscribe_all(move |e| sink.borrow_mut().push(e.kind()));
        let ctx = context(&shadow, &settings, true, None);

        grab.start_hold(&mut world, crate_body, GRAB_POINT, &ctx, &mut events);
        world.rigid_body_set[crate_body].set_translation(Vector3::new(0.0, 1.7, -20.0), true);
        grab.fixed_update(&mut world, &ctx, &mut events);
        assert!(!grab.is_holding(), "distance should break the hold");
        assert_eq!(world.get_velocity(crate_body), Some(Vector3::zeros()));

        grab.start_hold(&mut world, crate_body, Vector3::new(0.0, 1.7, -19.75), &ctx, &mut events);
        world.remove_body(crate_body);
        grab.fixed_update(&mut world, &ctx, &mut events);
        assert!(!grab.is_holding());

        assert_eq!(
            *log.borrow(),
            vec![
                EventKind::Grabbed,
                EventKind::Released,
                EventKind::Grabbed,
                EventKind::GrabSessionDestroyed
            ]
        );
    }

    #[test]
    fn test_look_at_edges() {
        let (world, _, settings, crate_body) = setup();
        let mut grab = GrabController::default();
        let mut events = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        events.subscribe_all(move |e| sink.borrow_mut().push(e.kind()));

        assert!(grab.look_at(&world, crate_body, &settings, &mut events));
        assert!(grab.look_at(&world, crate_body, &settings, &mut events));
        grab.look_away(&mut events);
        grab.look_away(&mut events);

        assert_eq!(
            *log.borrow(),
            vec![EventKind::GrabbableLookedAt, EventKind::GrabbableLookedAway]
        );
    }
}
