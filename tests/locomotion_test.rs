//! End-to-end locomotion behaviour: sensing, gravity, platforms, jumping,
//! crouching, sprinting, modes and the shadow body, driven through the same
//! fixed-tick pipeline a host would use.
//!
//! Run with: cargo test --test locomotion_test -- --nocapture

use std::cell::RefCell;
use std::rc::Rc;

use nalgebra::{UnitQuaternion, Vector3};
use strider::config::ControllerSettings;
use strider::player::constants::physics::TIMESTEP;
use strider::player::events::{EventKind, PlayerEvent};
use strider::player::input::PlayerInput;
use strider::player::physics::{BodyKind, PartDesc, PhysicsWorld};
use strider::player::state::LocomotionMode;
use strider::player::tick_pipeline::run_ticks;
use strider::player::{run_fixed_tick, Player};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const STANDING: Vector3<f32> = Vector3::new(0.0, 1.02, 0.0);

fn floor(world: &mut PhysicsWorld) {
    world.add_part(&PartDesc::block(
        Vector3::new(80.0, 1.0, 80.0),
        Vector3::new(0.0, -0.5, 0.0),
    ));
}

fn spawn(world: &mut PhysicsWorld, position: Vector3<f32>) -> Player {
    Player::spawn(world, ControllerSettings::default(), position, 0.0)
}

fn tick(world: &mut PhysicsWorld, player: &mut Player, input: &PlayerInput) {
    run_fixed_tick(world, player, input, TIMESTEP);
}

fn idle(world: &mut PhysicsWorld, player: &mut Player, ticks: usize) {
    for _ in 0..ticks {
        tick(world, player, &PlayerInput::default());
    }
}

fn record(player: &mut Player) -> Rc<RefCell<Vec<PlayerEvent>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    player.events_mut().subscribe_all(move |e| sink.borrow_mut().push(*e));
    log
}

fn count(log: &Rc<RefCell<Vec<PlayerEvent>>>, kind: EventKind) -> usize {
    log.borrow().iter().filter(|e| e.kind() == kind).count()
}

// ---------------------------------------------------------------------------
// Ground sensing and gravity
// ---------------------------------------------------------------------------

#[test]
fn test_grounded_vertical_velocity_stays_pinned() {
    let mut world = PhysicsWorld::default();
    floor(&mut world);
    let mut player = spawn(&mut world, STANDING);
    idle(&mut world, &mut player, 25);

    let stick = player.settings().ground.stick_to_ground_velocity;
    for _ in 0..30 {
        tick(&mut world, &mut player, &PlayerInput::default());
        assert!(player.is_grounded(), "player should stay grounded on a flat floor");
        assert_eq!(player.velocity().y, -stick);
    }
}

#[test]
fn test_landing_reports_fall_distance() {
    let mut world = PhysicsWorld::default();
    floor(&mut world);
    let spawn_at = Vector3::new(0.0, 4.0, 0.0);
    let mut player = spawn(&mut world, spawn_at);
    let log = record(&mut player);

    let mut landed = None;
    for _ in 0..150 {
        tick(&mut world, &mut player, &PlayerInput::default());
        let reported = log.borrow().iter().find_map(|e| match e {
            PlayerEvent::Grounded { fall_distance, fall_time } => Some((*fall_distance, *fall_time)),
            _ => None,
        });
        if let Some(report) = reported {
            landed = Some((report, player.position()));
            break;
        }
    }

    let ((fall_distance, fall_time), position) = landed.expect("player should land");
    let expected = (spawn_at - position).norm();
    assert!(
        (fall_distance - expected).abs() < 0.05,
        "fall distance {} vs travelled {}",
        fall_distance,
        expected
    );
    assert!(fall_time > 0.5, "a ~3 m drop takes most of a second, got {}", fall_time);
    assert_eq!(count(&log, EventKind::GroundStateChanged), 1);
}

#[test]
fn test_sliding_events_follow_state_flips() {
    let mut world = PhysicsWorld::default();
    let tilt = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 60.0_f32.to_radians());
    world.add_part(
        &PartDesc::block(Vector3::new(20.0, 1.0, 20.0), Vector3::new(0.0, -0.5, 0.0)).rotation(tilt),
    );
    world.add_part(&PartDesc::block(
        Vector3::new(20.0, 1.0, 20.0),
        Vector3::new(40.0, -0.5, 0.0),
    ));
    // Lower hemisphere a few millimetres off the 60 degree slope.
    let mut player = spawn(&mut world, Vector3::new(0.0, 2.006, 0.0));
    let log = record(&mut player);

    idle(&mut world, &mut player, 10);
    player.teleport(&mut world, Vector3::new(40.0, 1.02, 0.0), 0.0);
    idle(&mut world, &mut player, 40);

    let flips: Vec<bool> = log
        .borrow()
        .iter()
        .filter_map(|e| match e {
            PlayerEvent::SlidingStateChanged(s) => Some(*s),
            _ => None,
        })
        .collect();
    assert_eq!(flips, vec![true, false], "one slide on the slope, ended by the flat floor");
    assert_eq!(count(&log, EventKind::StartedSliding), 1);
    assert_eq!(count(&log, EventKind::StoppedSliding), 1);
    assert!(!player.is_sliding());
}

#[test]
fn test_sustained_slide_reports_once() {
    let mut world = PhysicsWorld::default();
    let tilt = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 50.0_f32.to_radians());
    world.add_part(
        &PartDesc::block(Vector3::new(40.0, 1.0, 40.0), Vector3::new(0.0, -0.5, 0.0)).rotation(tilt),
    );
    // Lower hemisphere 0.015 off the 50 degree slope along its normal.
    let mut player = spawn(&mut world, Vector3::new(0.0, 1.5775, 0.0));
    let log = record(&mut player);

    let start = player.position();
    for i in 0..40 {
        tick(&mut world, &mut player, &PlayerInput::default());
        assert!(player.ground().contact.is_some(), "lost the slope on tick {}", i);
        assert!(player.is_sliding(), "stopped sliding on tick {}", i);
        assert!(player.is_grounded(), "ungrounded on tick {}", i);
    }

    let started: Vec<_> = log
        .borrow()
        .iter()
        .filter(|e| matches!(e, PlayerEvent::SlidingStateChanged(_)))
        .copied()
        .collect();
    assert_eq!(started, vec![PlayerEvent::SlidingStateChanged(true)]);
    assert_eq!(count(&log, EventKind::GroundStateChanged), 1);
    assert!(player.position().x < start.x - 0.2, "should slide downhill toward -X");
}

#[test]
fn test_platform_carries_standing_player() {
    let mut world = PhysicsWorld::default();
    let platform_velocity = Vector3::new(1.0, 0.0, 0.0);
    world.add_part(
        &PartDesc::block(Vector3::new(40.0, 1.0, 40.0), Vector3::new(0.0, -0.5, 0.0))
            .kind(BodyKind::KinematicVelocity)
            .velocity(platform_velocity, Vector3::zeros()),
    );
    let mut player = spawn(&mut world, STANDING);
    idle(&mut world, &mut player, 25);

    let start = player.position();
    let ticks = 50;
    for i in 0..ticks {
        tick(&mut world, &mut player, &PlayerInput::default());
        assert!(player.is_grounded(), "ungrounded on tick {}", i);
        assert!(!player.is_sliding(), "sliding on tick {}", i);
    }

    let moved = player.position() - start;
    let expected = platform_velocity * TIMESTEP * ticks as f32;
    assert!(
        (moved - expected).norm() < 0.05,
        "moved {:?}, expected about {:?}",
        moved,
        expected
    );
    assert!(player.ground().body().is_some());
}

#[test]
fn test_rising_platform_lifts_standing_player() {
    let mut world = PhysicsWorld::default();
    let mut platform_at = Vector3::new(0.0, -0.5, 0.0);
    let platform = world.add_part(
        &PartDesc::block(Vector3::new(40.0, 1.0, 40.0), platform_at).kind(BodyKind::KinematicPosition),
    );
    let mut player = spawn(&mut world, STANDING);
    for _ in 0..25 {
        world.set_kinematic_pose(platform, platform_at, UnitQuaternion::identity(), TIMESTEP);
        tick(&mut world, &mut player, &PlayerInput::default());
    }
    assert!(player.is_grounded());

    let rise = 1.0;
    for i in 0..40 {
        platform_at.y += rise * TIMESTEP;
        world.set_kinematic_pose(platform, platform_at, UnitQuaternion::identity(), TIMESTEP);
        tick(&mut world, &mut player, &PlayerInput::default());

        let top = world.get_position(platform).unwrap().y + 0.5;
        let feet = player.position().y - player.height() / 2.0;
        assert!(feet >= top - 1e-3, "tick {}: feet {:.3} sank below platform top {:.3}", i, feet, top);
        assert!(feet - top < 0.05, "tick {}: feet {:.3} lifted off platform top {:.3}", i, feet, top);
        assert!(player.is_grounded(), "ungrounded on tick {}", i);
    }
}

#[test]
fn test_rotating_platform_turns_player() {
    let mut world = PhysicsWorld::default();
    let centre = Vector3::new(0.0, -0.5, 0.0);
    let platform = world.add_part(
        &PartDesc::block(Vector3::new(10.0, 1.0, 10.0), centre).kind(BodyKind::KinematicPosition),
    );
    let mut player = spawn(&mut world, STANDING);
    for _ in 0..25 {
        world.set_kinematic_pose(platform, centre, UnitQuaternion::identity(), TIMESTEP);
        tick(&mut world, &mut player, &PlayerInput::default());
    }
    let start = player.position();

    // Counter-clockwise seen from above, so the player turns left.
    let yaw_rate = 0.5_f32;
    let ticks = 50;
    for i in 1..=ticks {
        let angle = yaw_rate * TIMESTEP * i as f32;
        let rotation = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), angle);
        world.set_kinematic_pose(platform, centre, rotation, TIMESTEP);
        tick(&mut world, &mut player, &PlayerInput::default());
    }

    let expected = -(yaw_rate * TIMESTEP * ticks as f32).to_degrees();
    assert!(
        (player.heading() - expected).abs() < 1.0,
        "heading {} should follow the platform to {}",
        player.heading(),
        expected
    );
    let drift = player.position() - start;
    assert!(Vector3::new(drift.x, 0.0, drift.z).norm() < 0.05, "centre of rotation stays put, drift {:?}", drift);
}

// ---------------------------------------------------------------------------
// Jumping
// ---------------------------------------------------------------------------

#[test]
fn test_jump_sets_vertical_velocity_once() {
    let mut world = PhysicsWorld::default();
    floor(&mut world);
    let mut player = spawn(&mut world, STANDING);
    idle(&mut world, &mut player, 25);
    let log = record(&mut player);

    let press = PlayerInput {
        jump_pressed: true,
        ..PlayerInput::default()
    };
    tick(&mut world, &mut player, &press);
    let jump_speed = player.settings().jumping.speed;
    assert_eq!(player.velocity().y, jump_speed);
    assert_eq!(count(&log, EventKind::Jumped), 1);

    idle(&mut world, &mut player, 4);
    tick(&mut world, &mut player, &press);
    assert_eq!(count(&log, EventKind::Jumped), 1, "no second jump before landing");
    assert!(player.velocity().y < jump_speed);
    assert!(!player.is_grounded());

    idle(&mut world, &mut player, 80);
    assert!(player.is_grounded());
    tick(&mut world, &mut player, &press);
    assert_eq!(count(&log, EventKind::Jumped), 2, "landing restores the jump");
}

#[test]
fn test_jump_blocked_while_flying() {
    let mut world = PhysicsWorld::default();
    floor(&mut world);
    let mut player = spawn(&mut world, STANDING);
    idle(&mut world, &mut player, 25);
    player.set_state(LocomotionMode::Flying);
    let log = record(&mut player);

    tick(
        &mut world,
        &mut player,
        &PlayerInput {
            jump_pressed: true,
            ..PlayerInput::default()
        },
    );

    assert_eq!(count(&log, EventKind::Jumped), 0);
    assert_eq!(count(&log, EventKind::BeforeMove), 1);
}

// ---------------------------------------------------------------------------
// Crouching and sprinting
// ---------------------------------------------------------------------------

#[test]
fn test_crouch_lowers_capsule_and_camera() {
    let mut world = PhysicsWorld::default();
    floor(&mut world);
    let mut player = spawn(&mut world, STANDING);
    idle(&mut world, &mut player, 25);
    let log = record(&mut player);
    let standing_camera = player.camera_position();

    let crouch = PlayerInput {
        crouch_axis: 1.0,
        ..PlayerInput::default()
    };
    for _ in 0..60 {
        tick(&mut world, &mut player, &crouch);
    }

    let crouch_height = player.settings().crouching.height;
    assert!((player.height() - crouch_height).abs() < 0.02, "height {}", player.height());
    assert!(player.is_crouching());
    assert!(standing_camera.y - player.camera_position().y > 0.4);
    assert!(player.is_grounded(), "feet stay on the floor while crouching");
    assert_eq!(count(&log, EventKind::Crouched), 1);
    assert_eq!(count(&log, EventKind::CrouchStateChanged), 1);

    idle(&mut world, &mut player, 60);
    assert!(!player.is_crouching());
    assert_eq!(count(&log, EventKind::Uncrouched), 1);
}

#[test]
fn test_low_ceiling_keeps_player_crouched() {
    let mut world = PhysicsWorld::default();
    floor(&mut world);
    let mut player = spawn(&mut world, STANDING);
    idle(&mut world, &mut player, 25);

    let crouch = PlayerInput {
        crouch_axis: 1.0,
        ..PlayerInput::default()
    };
    for _ in 0..60 {
        tick(&mut world, &mut player, &crouch);
    }
    // Underside at 1.3, well below standing height.
    world.add_part(&PartDesc::block(
        Vector3::new(10.0, 1.0, 10.0),
        Vector3::new(0.0, 1.8, 0.0),
    ));

    idle(&mut world, &mut player, 100);

    assert!(player.is_crouching(), "cannot stand under the ceiling");
    assert!(player.height() < 1.3, "height {}", player.height());
    assert!(player.ceiling().is_blocked());
}

#[test]
fn test_flat_ground_speed_reaches_walk_speed() {
    let mut world = PhysicsWorld::default();
    floor(&mut world);
    let mut player = spawn(&mut world, STANDING);
    idle(&mut world, &mut player, 25);

    let forward = PlayerInput::moving(0.0, 1.0);
    run_ticks(&mut world, &mut player, 75, TIMESTEP, |_, _| forward);
    let start = player.position();
    let ticks = 25;
    run_ticks(&mut world, &mut player, ticks, TIMESTEP, |_, _| forward);

    let speed = (player.position() - start).norm() / (ticks as f32 * TIMESTEP);
    let walk_speed = player.settings().walking.speed;
    assert!(
        speed > walk_speed * 0.97,
        "steady walk at {:.2} m/s, configured {:.2}",
        speed,
        walk_speed
    );
}

#[test]
fn test_sprint_and_crouch_scale_speed() {
    fn distance_after(input: PlayerInput) -> f32 {
        let mut world = PhysicsWorld::default();
        floor(&mut world);
        let mut player = spawn(&mut world, STANDING);
        idle(&mut world, &mut player, 25);
        let start = player.position();
        run_ticks(&mut world, &mut player, 100, TIMESTEP, |_, _| input);
        (player.position() - start).norm()
    }

    let walk = distance_after(PlayerInput::moving(0.0, 1.0));
    let sprint = distance_after(PlayerInput {
        sprint_axis: 1.0,
        ..PlayerInput::moving(0.0, 1.0)
    });
    let crouch = distance_after(PlayerInput {
        crouch_axis: 1.0,
        sprint_axis: 1.0,
        ..PlayerInput::moving(0.0, 1.0)
    });

    assert!(sprint > walk * 1.3, "sprint {} vs walk {}", sprint, walk);
    assert!(crouch < walk * 0.8, "crouch {} vs walk {}", crouch, walk);
}

#[test]
fn test_movement_factor_tracks_motion() {
    let mut world = PhysicsWorld::default();
    floor(&mut world);
    let mut player = spawn(&mut world, STANDING);
    idle(&mut world, &mut player, 25);
    assert!(player.movement_factor() < 0.1);

    for _ in 0..100 {
        tick(&mut world, &mut player, &PlayerInput::moving(1.0, 0.0));
    }
    assert!(player.movement_factor() > 0.9);

    idle(&mut world, &mut player, 100);
    assert!(player.movement_factor() < 0.1);
}

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

#[test]
fn test_flying_follows_vertical_axes() {
    let mut world = PhysicsWorld::default();
    floor(&mut world);
    let mut player = spawn(&mut world, STANDING);
    idle(&mut world, &mut player, 25);
    player.set_state(LocomotionMode::Flying);
    let start = player.position();

    let up = PlayerInput {
        jump_axis: 1.0,
        ..PlayerInput::default()
    };
    for _ in 0..50 {
        tick(&mut world, &mut player, &up);
    }
    assert!(player.position().y - start.y > 1.5, "should climb, at {:?}", player.position());

    // No gravity while flying: releasing input coasts to a stop in the air.
    idle(&mut world, &mut player, 100);
    assert!(player.velocity().norm() < 0.05);
    assert!(player.position().y - start.y > 1.5);
}

#[test]
fn test_look_turns_walking_direction() {
    let mut world = PhysicsWorld::default();
    floor(&mut world);
    let mut player = spawn(&mut world, STANDING);
    idle(&mut world, &mut player, 25);

    // Quarter turn to the right: 90 degrees = 600 raw units at sensitivity 3.
    let turn = PlayerInput {
        look_delta: nalgebra::Vector2::new(10.0, 0.0),
        ..PlayerInput::default()
    };
    player.update(&turn, 0.0);
    for i in 1..=60 {
        player.update(&turn, i as f32 * 0.01);
    }
    assert!((player.heading() - 90.0).abs() < 1e-3, "heading {}", player.heading());

    let start = player.position();
    for _ in 0..50 {
        tick(&mut world, &mut player, &PlayerInput::moving(0.0, 1.0));
    }
    let moved = player.position() - start;
    assert!(moved.x > 1.0 && moved.z.abs() < 0.05, "should walk toward +X, moved {:?}", moved);
}

// ---------------------------------------------------------------------------
// Shadow body
// ---------------------------------------------------------------------------

#[test]
fn test_shadow_body_pushes_crate() {
    let mut world = PhysicsWorld::default();
    floor(&mut world);
    let crate_body = world.add_part(
        &PartDesc::block(Vector3::new(1.0, 1.0, 1.0), Vector3::new(0.0, 0.5, -3.0))
            .kind(BodyKind::Dynamic)
            .mass(2.0),
    );
    let mut player = spawn(&mut world, STANDING);
    idle(&mut world, &mut player, 25);
    let crate_start = world.get_position(crate_body).unwrap();

    for _ in 0..150 {
        tick(&mut world, &mut player, &PlayerInput::moving(0.0, 1.0));
    }

    let crate_end = world.get_position(crate_body).unwrap();
    assert!(
        crate_start.z - crate_end.z > 0.3,
        "crate should be pushed forward, moved from {:?} to {:?}",
        crate_start,
        crate_end
    );
}
