pub mod constants;
pub mod error;
pub mod events;
pub mod game_loop;
pub mod scheduler;
pub mod skill;
pub mod state;
pub mod systems;

#[cfg(test)]
pub mod test_support;
