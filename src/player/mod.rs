//! First-person locomotion controller.
//!
//! A [`Player`] owns a kinematic avatar capsule, the dynamic shadow body that
//! lets it push things, the locomotion state machine, and the grab controller.
//! Hosts call [`Player::update`] once per rendered frame for look input and
//! [`tick_pipeline::run_fixed_tick`] once per physics step for everything else.

pub mod avatar;
pub mod constants;
pub mod crouching;
pub mod events;
pub mod grab;
pub mod input;
pub mod jumping;
pub mod look;
pub mod math;
pub mod movement;
pub mod physics;
pub mod sensor;
pub mod shadow_body;
pub mod sprinting;
pub mod state;
pub mod tick_pipeline;

use nalgebra::{UnitQuaternion, Vector3};
use rapier3d::prelude::RigidBodyHandle;

use crate::config::ControllerSettings;
use avatar::Avatar;
use constants::physics::EPSILON;
use crouching::Crouching;
use events::{EventBus, EventKind, PlayerEvent, SubscriptionId};
use grab::{CameraPose, GrabContext, GrabController};
use input::PlayerInput;
use jumping::{JumpContext, Jumping};
use look::LookState;
use movement::{resolve_movement_input, update_movement_factor, MovementFrame};
use physics::PhysicsWorld;
use sensor::{slide_velocity, CeilingInfo, GroundInfo};
use shadow_body::ShadowBody;
use sprinting::sprint_multiplier;
use state::LocomotionMode;

pub use tick_pipeline::run_fixed_tick;

pub struct Player {
    settings: ControllerSettings,
    avatar: Avatar,
    shadow: ShadowBody,
    mode: LocomotionMode,
    ground: GroundInfo,
    ceiling: CeilingInfo,
    /// Velocity inherited from the kinematic body underfoot
    platform_velocity: Vector3<f32>,
    was_grounded: bool,
    was_sliding: bool,
    last_grounded_position: Vector3<f32>,
    last_grounded_time: f32,
    /// Velocity implied by the last collide-and-slide move
    displacement_velocity: Vector3<f32>,
    movement_factor: f32,
    /// Product of feature multipliers for this tick, reset to 1 each tick
    speed_multiplier: f32,
    /// Simulated seconds since spawn
    time: f32,
    tick_dt: f32,
    jumping: Jumping,
    crouching: Crouching,
    look: LookState,
    grab: GrabController,
    events: EventBus,
}

impl Player {
    pub fn spawn(
        world: &mut PhysicsWorld,
        settings: ControllerSettings,
        position: Vector3<f32>,
        heading: f32,
    ) -> Self {
        let avatar = Avatar::spawn(world, &settings, position, heading);
        let shadow = ShadowBody::spawn(world, &avatar, &settings);
        let crouching = Crouching::new(settings.general.height);
        log::info!(
            "Spawned player at ({:.2}, {:.2}, {:.2}) heading {:.1}",
            position.x,
            position.y,
            position.z,
            heading
        );
        Self {
            settings,
            avatar,
            shadow,
            mode: LocomotionMode::default(),
            ground: GroundInfo::default(),
            ceiling: CeilingInfo::default(),
            platform_velocity: Vector3::zeros(),
            was_grounded: false,
            was_sliding: false,
            last_grounded_position: position,
            last_grounded_time: 0.0,
            displacement_velocity: Vector3::zeros(),
            movement_factor: 0.0,
            speed_multiplier: 1.0,
            time: 0.0,
            tick_dt: constants::physics::TIMESTEP,
            jumping: Jumping::default(),
            crouching,
            look: LookState::default(),
            grab: GrabController::default(),
            events: EventBus::new(),
        }
    }

    // ---- observation ----

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn mode(&self) -> LocomotionMode {
        self.mode
    }

    pub fn position(&self) -> Vector3<f32> {
        self.avatar.position
    }

    pub fn velocity(&self) -> Vector3<f32> {
        self.avatar.velocity
    }

    pub fn height(&self) -> f32 {
        self.avatar.height
    }

    pub fn heading(&self) -> f32 {
        self.avatar.heading + self.avatar.look_offset
    }

    pub fn pitch(&self) -> f32 {
        self.avatar.pitch
    }

    pub fn is_grounded(&self) -> bool {
        self.ground.contact.is_some()
    }

    pub fn is_sliding(&self) -> bool {
        self.was_sliding
    }

    pub fn is_crouching(&self) -> bool {
        self.crouching.is_crouching()
    }

    pub fn ground(&self) -> &GroundInfo {
        &self.ground
    }

    pub fn ceiling(&self) -> &CeilingInfo {
        &self.ceiling
    }

    pub fn movement_factor(&self) -> f32 {
        self.movement_factor
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn camera(&self) -> CameraPose {
        CameraPose {
            position: self.avatar.position + Vector3::new(0.0, self.settings.general.eye_height, 0.0),
            rotation: self.avatar.look_rotation(),
        }
    }

    pub fn camera_position(&self) -> Vector3<f32> {
        self.camera().position
    }

    pub fn camera_rotation(&self) -> UnitQuaternion<f32> {
        self.camera().rotation
    }

    pub fn is_holding(&self) -> bool {
        self.grab.is_holding()
    }

    pub fn held_body(&self) -> Option<RigidBodyHandle> {
        self.grab.held_body()
    }

    pub fn shadow_body(&self) -> &ShadowBody {
        &self.shadow
    }

    // ---- events ----

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    pub fn subscribe<F>(&mut self, kind: EventKind, listener: F) -> SubscriptionId
    where
        F: FnMut(&PlayerEvent) + 'static,
    {
        self.events.subscribe(kind, listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    // ---- commands ----

    /// Swaps in a new settings snapshot. Takes effect on the next tick.
    pub fn set_settings(&mut self, settings: ControllerSettings) {
        self.avatar.apply_settings(&settings);
        self.crouching.set_standing_height(settings.general.height);
        self.settings = settings;
    }

    /// Switches locomotion mode. Every call publishes exit, enter and change,
    /// even when `mode` is already active.
    pub fn set_state(&mut self, mode: LocomotionMode) {
        log::debug!("Locomotion {} -> {}", self.mode, mode);
        self.events.publish(PlayerEvent::StateExited(self.mode));
        self.mode = mode;
        self.events.publish(PlayerEvent::StateEntered(mode));
        self.events.publish(PlayerEvent::StateChanged(mode));
    }

    /// Adds to the velocity, or overrides its horizontal and/or vertical parts
    pub fn launch(&mut self, velocity: Vector3<f32>, override_horizontal: bool, override_vertical: bool) {
        movement::launch(
            &mut self.avatar.velocity,
            velocity,
            override_horizontal,
            override_vertical,
        );
    }

    /// Applies a force for one fixed tick
    pub fn add_force(&mut self, force: Vector3<f32>) {
        movement::add_force(&mut self.avatar.velocity, force, self.tick_dt);
    }

    /// Moves avatar and shadow body instantly and clears the velocity
    pub fn teleport(&mut self, world: &mut PhysicsWorld, position: Vector3<f32>, heading: f32) {
        log::debug!(
            "Teleporting player to ({:.2}, {:.2}, {:.2})",
            position.x,
            position.y,
            position.z
        );
        self.avatar.teleport(world, position, heading);
        self.shadow.teleport(world, position);
    }

    /// Resizes avatar and shadow body. While grounded the feet stay put.
    pub fn set_height(&mut self, world: &mut PhysicsWorld, height: f32) {
        let keep_feet = self.is_grounded();
        self.avatar.set_height(world, height, keep_feet);
        self.shadow.resize(world, self.avatar.height);
    }

    pub fn look_at(&mut self, world: &PhysicsWorld, body: RigidBodyHandle) -> bool {
        self.grab.look_at(world, body, &self.settings, &mut self.events)
    }

    pub fn look_away(&mut self) {
        self.grab.look_away(&mut self.events);
    }

    pub fn start_hold(
        &mut self,
        world: &mut PhysicsWorld,
        body: RigidBodyHandle,
        grab_point: Vector3<f32>,
    ) -> bool {
        let ctx = GrabContext {
            camera: self.camera(),
            grounded: self.is_grounded(),
            ground_body: self.ground.body(),
            shadow: &self.shadow,
            settings: &self.settings,
        };
        self.grab.start_hold(world, body, grab_point, &ctx, &mut self.events)
    }

    pub fn stop_hold(&mut self, world: &mut PhysicsWorld) -> bool {
        self.grab
            .stop_hold(world, &self.settings.grabbing, &mut self.events)
    }

    pub fn throw(&mut self, world: &mut PhysicsWorld) -> bool {
        let camera = self.camera();
        self.grab
            .throw(world, &camera, &self.settings.grabbing, &mut self.events)
    }

    /// Releases what is held, or grabs what is looked at by `grab_point`
    pub fn interact(&mut self, world: &mut PhysicsWorld, grab_point: Option<Vector3<f32>>) -> bool {
        let ctx = GrabContext {
            camera: self.camera(),
            grounded: self.is_grounded(),
            ground_body: self.ground.body(),
            shadow: &self.shadow,
            settings: &self.settings,
        };
        self.grab.interact(world, grab_point, &ctx, &mut self.events)
    }

    // ---- per-frame and per-tick entry points ----

    /// Variable-rate look update. `now` is wall-clock seconds.
    pub fn update(&mut self, input: &PlayerInput, now: f32) -> bool {
        let settings = &self.settings.input;
        if !settings.input_enabled || !settings.look_enabled {
            return false;
        }
        self.look.update(&mut self.avatar, input, settings, now)
    }

    /// Physics-phase update. Call between query refresh and the world step.
    pub fn fixed_update(&mut self, world: &mut PhysicsWorld, input: &PlayerInput, dt: f32) {
        if dt <= EPSILON {
            return;
        }
        self.time += dt;
        self.tick_dt = dt;
        self.speed_multiplier = 1.0;

        let input = if self.settings.input.input_enabled {
            *input
        } else {
            PlayerInput::default()
        };
        if input.jump_pressed {
            self.jumping.press(self.time);
        }
        if input.crouch_pressed {
            self.crouching.toggle();
        }

        state::fixed_update(self, world, &input, dt);

        self.movement_factor = update_movement_factor(
            self.movement_factor,
            self.displacement_velocity,
            self.settings.general.movement_factor_interpolation_speed,
            dt,
        );

        self.avatar.sync_body(world);
        self.shadow.follow(world, self.avatar.position, dt);

        let ctx = GrabContext {
            camera: self.camera(),
            grounded: self.is_grounded(),
            ground_body: self.ground.body(),
            shadow: &self.shadow,
            settings: &self.settings,
        };
        self.grab.fixed_update(world, &ctx, &mut self.events);
    }

    /// Feeds the step's collision results back into the controller
    pub fn after_physics_step(&mut self, world: &mut PhysicsWorld) {
        for event in world.drain_collision_events() {
            self.shadow.handle_collision_event(world, &event);
        }
        let push = self.shadow.contact_push(world, &self.settings);
        self.avatar.velocity += push;
    }

    // ---- tick phases used by the mode rules ----

    fn update_ground(&mut self, world: &PhysicsWorld, dt: f32) {
        let (ground, ceiling) = sensor::sense(world, &self.avatar, &self.settings, self.platform_velocity);
        self.ground = ground;
        self.ceiling = ceiling;

        if let Some(contact) = ground.contact.filter(|c| !c.walkable) {
            self.avatar.velocity +=
                slide_velocity(contact.normal, self.settings.ground.slide_speed_multiplier);
        }
        if ground.sliding != self.was_sliding {
            self.was_sliding = ground.sliding;
            self.events.publish(PlayerEvent::SlidingStateChanged(ground.sliding));
            self.events.publish(if ground.sliding {
                PlayerEvent::StartedSliding
            } else {
                PlayerEvent::StoppedSliding
            });
        }

        match ground.platform {
            Some((velocity, yaw_rate)) => {
                self.platform_velocity = velocity;
                self.avatar.look_offset -= yaw_rate.to_degrees() * dt;
            }
            None if ground.contact.is_some() => self.platform_velocity = Vector3::zeros(),
            None => {}
        }

        let grounded = ground.contact.is_some();
        if grounded != self.was_grounded {
            self.was_grounded = grounded;
            self.events.publish(PlayerEvent::GroundStateChanged(grounded));
            if grounded {
                let fall_distance = (self.avatar.position - self.last_grounded_position).norm();
                let fall_time = self.time - self.last_grounded_time;
                log::trace!("Landed after {:.2} m in {:.2} s", fall_distance, fall_time);
                self.events.publish(PlayerEvent::Grounded {
                    fall_distance,
                    fall_time,
                });
            } else {
                self.last_grounded_position = self.avatar.position;
                self.last_grounded_time = self.time;
                self.jumping.on_ungrounded(self.time);
                self.events.publish(PlayerEvent::Ungrounded);
                self.avatar.velocity += self.platform_velocity;
                self.platform_velocity = Vector3::zeros();
            }
        }
    }

    fn update_ceiling(&mut self, dt: f32) {
        if self.ceiling.is_blocked() {
            self.avatar.velocity.y -= self.settings.ground.ceiling_unstick_force * dt;
        }
    }

    /// Feature hooks shared by every mode: crouch, sprint, jump
    fn before_move(&mut self, world: &mut PhysicsWorld, input: &PlayerInput, dt: f32) {
        self.events.publish(PlayerEvent::BeforeMove);
        let walking = self.mode == LocomotionMode::Walking;

        let step = self.crouching.update(
            world,
            &self.avatar,
            input,
            &self.settings.crouching,
            walking,
            dt,
        );
        if (step.height - self.avatar.height).abs() > EPSILON {
            self.set_height(world, step.height);
        }
        if let Some(crouched) = step.changed {
            self.events.publish(PlayerEvent::CrouchStateChanged(crouched));
            self.events.publish(if crouched {
                PlayerEvent::Crouched
            } else {
                PlayerEvent::Uncrouched
            });
        }
        if self.crouching.is_crouching() {
            self.speed_multiplier *= self.settings.crouching.speed_multiplier;
        } else if input.sprint_axis != 0.0 {
            self.speed_multiplier *= sprint_multiplier(
                self.avatar.forward(),
                self.avatar.velocity,
                &self.settings.sprinting,
            );
        }

        let jump = self.jumping.before_move(
            JumpContext {
                now: self.time,
                grounded: self.is_grounded(),
                walking,
                sliding: self.was_sliding,
                ceiling: self.ceiling.is_blocked(),
            },
            &self.settings.jumping,
        );
        if jump {
            self.launch(Vector3::new(0.0, self.settings.jumping.speed, 0.0), false, true);
            log::trace!("Jumped at t={:.2}", self.time);
            self.events.publish(PlayerEvent::Jumped);
        }
    }

    /// Desired velocity from the move axes. `horizontal` projects onto the body
    /// yaw; otherwise the full camera orientation is used.
    fn movement_input(&self, world: &PhysicsWorld, input: &PlayerInput, speed: f32, horizontal: bool) -> Vector3<f32> {
        let rotation = if horizontal {
            self.avatar.orientation()
        } else {
            self.avatar.look_rotation()
        };
        let frame = MovementFrame {
            forward: rotation * -Vector3::z(),
            right: rotation * Vector3::x(),
            up: Vector3::y(),
        };
        resolve_movement_input(
            input,
            &frame,
            !horizontal && self.mode.is_vertical_movement(),
            speed,
            self.speed_multiplier,
            self.shadow.offset(world),
            self.shadow.margin(),
        )
    }

    /// Moves the avatar by its velocity with collide-and-slide
    fn displace(&mut self, world: &PhysicsWorld, dt: f32) {
        let movement = self.avatar.move_by(world, self.avatar.velocity * dt);
        self.avatar.touching_ground = movement.grounded;
        self.displacement_velocity = movement.translation / dt;
    }

    /// Carries the avatar with the kinematic body it stood on at the start of
    /// the tick. Runs after the avatar's own move: the body is still at its old
    /// pose, so it is passed through rather than collided with.
    fn ride_platform(&mut self, world: &PhysicsWorld, dt: f32) {
        if let Some((velocity, _)) = self.ground.platform {
            self.avatar.move_passing(world, velocity * dt, self.ground.body());
        }
    }

    fn check_bounds(&mut self, world: &mut PhysicsWorld) {
        if self.avatar.position.y >= self.settings.general.world_bottom_boundary {
            return;
        }
        log::warn!(
            "Player fell below {:.1}, respawning",
            self.settings.general.world_bottom_boundary
        );
        let (spawn, heading) = (self.avatar.spawn_position, self.avatar.spawn_heading);
        self.teleport(world, spawn, heading);
    }
}
