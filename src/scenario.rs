//! Headless demo level used by the CLI and the integration tests.
//!
//! Flat floor, a walkable ramp, a steep slide, a kinematic platform that
//! shuttles along X, a pushable crate in the player's path and a loose ball.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use nalgebra::{UnitQuaternion, Vector2, Vector3};
use rapier3d::prelude::RigidBodyHandle;
use serde::Serialize;

use crate::config::ControllerSettings;
use crate::player::input::PlayerInput;
use crate::player::physics::{BodyKind, PartDesc, PartShape, PhysicsWorld};
use crate::player::state::LocomotionMode;
use crate::player::{run_fixed_tick, Player};

pub const SPAWN: Vector3<f32> = Vector3::new(0.0, 1.05, 0.0);
const PLATFORM_ORIGIN: Vector3<f32> = Vector3::new(-8.0, 0.25, 0.0);
const PLATFORM_TRAVEL: f32 = 3.0;
const PLATFORM_PERIOD: f32 = 6.0;

pub struct DemoScene {
    pub world: PhysicsWorld,
    pub player: Player,
    pub floor: RigidBodyHandle,
    pub ramp: RigidBodyHandle,
    pub slide: RigidBodyHandle,
    pub platform: RigidBodyHandle,
    pub crate_body: RigidBodyHandle,
    pub ball: RigidBodyHandle,
    elapsed: f32,
}

impl DemoScene {
    pub fn build(settings: ControllerSettings) -> Self {
        let mut world = PhysicsWorld::new(settings.gravity());

        let floor = world.add_part(
            &PartDesc::block(Vector3::new(60.0, 1.0, 60.0), Vector3::new(0.0, -0.5, 0.0)).material(1),
        );
        let ramp = world.add_part(
            &PartDesc::block(Vector3::new(4.0, 0.5, 8.0), Vector3::new(8.0, 0.5, 0.0))
                .rotation(UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 20.0_f32.to_radians())),
        );
        let slide = world.add_part(
            &PartDesc::block(Vector3::new(4.0, 0.5, 8.0), Vector3::new(14.0, 2.0, 0.0))
                .rotation(UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 60.0_f32.to_radians())),
        );
        let platform = world.add_part(
            &PartDesc::block(Vector3::new(3.0, 0.5, 3.0), PLATFORM_ORIGIN).kind(BodyKind::KinematicPosition),
        );
        let crate_body = world.add_part(
            &PartDesc::block(Vector3::new(1.0, 1.0, 1.0), Vector3::new(0.0, 0.5, -6.0))
                .kind(BodyKind::Dynamic)
                .mass(5.0),
        );
        let ball = world.add_part(
            &PartDesc::new(PartShape::Ball, Vector3::new(0.5, 0.5, 0.5), Vector3::new(3.0, 0.25, -4.0))
                .kind(BodyKind::Dynamic)
                .mass(1.0),
        );

        let player = Player::spawn(&mut world, settings, SPAWN, 0.0);
        Self {
            world,
            player,
            floor,
            ramp,
            slide,
            platform,
            crate_body,
            ball,
            elapsed: 0.0,
        }
    }

    /// Drives the platform and runs one fixed tick
    pub fn tick(&mut self, input: &PlayerInput, dt: f32) {
        self.elapsed += dt;
        let phase = self.elapsed / PLATFORM_PERIOD * std::f32::consts::TAU;
        let target = PLATFORM_ORIGIN + Vector3::new(phase.sin() * PLATFORM_TRAVEL, 0.0, 0.0);
        self.world
            .set_kinematic_pose(self.platform, target, UnitQuaternion::identity(), dt);
        run_fixed_tick(&mut self.world, &mut self.player, input, dt);
    }
}

/// Input for tick `tick` of the scripted walk: settle, walk into the crate,
/// jump, sprint, crouch, then stand still.
pub fn scripted_input(tick: usize) -> PlayerInput {
    let mut input = match tick {
        0..=24 => PlayerInput::default(),
        25..=199 => PlayerInput::moving(0.0, 1.0),
        200..=259 => PlayerInput {
            sprint_axis: 1.0,
            ..PlayerInput::moving(0.3, 1.0)
        },
        260..=319 => PlayerInput {
            crouch_axis: 1.0,
            ..PlayerInput::moving(0.0, -1.0)
        },
        _ => PlayerInput::default(),
    };
    if tick == 150 {
        input.jump_pressed = true;
    }
    if (200..260).contains(&tick) {
        input.look_delta = Vector2::new(2.0, 0.0);
    }
    input
}

/// What happened during a simulation run
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub ticks: usize,
    pub timestep: f32,
    pub final_position: [f32; 3],
    pub final_velocity: [f32; 3],
    pub heading: f32,
    pub grounded: bool,
    pub crouching: bool,
    pub mode: LocomotionMode,
    pub movement_factor: f32,
    pub crate_displacement: f32,
    pub longest_fall: f32,
    pub events: BTreeMap<String, usize>,
}

/// Runs the scripted walk through the demo scene
pub fn simulate(settings: ControllerSettings, ticks: usize, dt: f32) -> Summary {
    let mut scene = DemoScene::build(settings);
    let crate_start = scene.world.get_position(scene.crate_body).unwrap_or_else(Vector3::zeros);

    let counts = Rc::new(RefCell::new(BTreeMap::<String, usize>::new()));
    let longest_fall = Rc::new(RefCell::new(0.0_f32));
    let (count_sink, fall_sink) = (counts.clone(), longest_fall.clone());
    scene.player.events_mut().subscribe_all(move |event| {
        *count_sink
            .borrow_mut()
            .entry(format!("{:?}", event.kind()))
            .or_default() += 1;
        if let crate::player::events::PlayerEvent::Grounded { fall_distance, .. } = event {
            let mut longest = fall_sink.borrow_mut();
            *longest = longest.max(*fall_distance);
        }
    });

    for tick in 0..ticks {
        let input = scripted_input(tick);
        scene.player.update(&input, tick as f32 * dt);
        scene.tick(&input, dt);
    }

    let crate_end = scene.world.get_position(scene.crate_body).unwrap_or(crate_start);
    let player = &scene.player;
    let position = player.position();
    let velocity = player.velocity();
    let events = counts.borrow().clone();
    let longest_fall = *longest_fall.borrow();
    log::info!(
        "Simulated {} ticks, player at ({:.2}, {:.2}, {:.2})",
        ticks,
        position.x,
        position.y,
        position.z
    );

    Summary {
        ticks,
        timestep: dt,
        final_position: [position.x, position.y, position.z],
        final_velocity: [velocity.x, velocity.y, velocity.z],
        heading: player.heading(),
        grounded: player.is_grounded(),
        crouching: player.is_crouching(),
        mode: player.mode(),
        movement_factor: player.movement_factor(),
        crate_displacement: (crate_end - crate_start).norm(),
        longest_fall,
        events,
    }
}
