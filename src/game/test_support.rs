//! Shared fixtures for unit tests

use uuid::Uuid;

use crate::config::SimConfig;
use crate::game::game_loop::GameLoop;
use crate::game::state::{Actor, ActorId, Arena, Faction, SimState};
use crate::services::{Catalog, Services};
use crate::util::vec2::Vec2;

pub fn test_state() -> SimState {
    SimState::new(Arena::new(1000.0, 800.0).unwrap(), "plains", Vec::new())
}

pub fn create_test_services() -> Services {
    Services::from_catalog(&Catalog::builtin().unwrap())
}

/// Plain 100 HP actor with default stats that never re-rolls its heading
pub fn spawn_test_actor(state: &mut SimState, faction: Faction, position: Vec2) -> ActorId {
    let mut actor = Actor::new(Uuid::new_v4(), "test", faction, position);
    actor.next_direction_change_ms = u64::MAX;
    state.add_actor(actor).unwrap()
}

/// Loop over the builtin catalog with periodic spawning pushed out of the way
pub fn test_loop() -> GameLoop {
    let mut config = SimConfig::default();
    config.arena_width = 1000.0;
    config.arena_height = 800.0;
    config.enemy_spawn_interval_ms = u64::MAX / 2;
    config.resource_spawn_interval_ms = u64::MAX / 2;
    let mut game = GameLoop::new(config, create_test_services()).unwrap();
    game.state_mut().session.next_enemy_spawn_ms = u64::MAX / 2;
    game.state_mut().session.next_node_spawn_ms = u64::MAX / 2;
    game
}
