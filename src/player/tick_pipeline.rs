use super::input::PlayerInput;
use super::physics::PhysicsWorld;
use super::Player;

/// Runs one physics-phase tick for a single player.
///
/// Casts must see the poses the last step produced, so queries are refreshed
/// before the controller runs. Contact feedback is read after the step.
pub fn run_fixed_tick(world: &mut PhysicsWorld, player: &mut Player, input: &PlayerInput, dt: f32) {
    world.update_queries();
    player.fixed_update(world, input, dt);
    world.step(dt);
    player.after_physics_step(world);
}

/// Runs `ticks` fixed ticks, asking `input_for` for each tick's input
pub fn run_ticks<F>(world: &mut PhysicsWorld, player: &mut Player, ticks: usize, dt: f32, mut input_for: F)
where
    F: FnMut(usize, &Player) -> PlayerInput,
{
    for tick in 0..ticks {
        let input = input_for(tick, player);
        run_fixed_tick(world, player, &input, dt);
    }
}
