use rand::seq::SliceRandom;

use super::EncounterDirector;
use crate::game::state::ActorTemplate;

/// Picks enemies and bosses uniformly from fixed rosters
#[derive(Debug, Clone, Default)]
pub struct RosterDirector {
    enemies: Vec<ActorTemplate>,
    bosses: Vec<ActorTemplate>,
    boss_requests: u32,
}

impl RosterDirector {
    pub fn new(enemies: Vec<ActorTemplate>, bosses: Vec<ActorTemplate>) -> Self {
        Self {
            enemies,
            bosses,
            boss_requests: 0,
        }
    }

    /// How many times the boss spawn was requested
    pub fn boss_requests(&self) -> u32 {
        self.boss_requests
    }
}

impl EncounterDirector for RosterDirector {
    fn next_enemy(&mut self, _stage: &str) -> Option<ActorTemplate> {
        self.enemies.choose(&mut rand::thread_rng()).cloned()
    }

    fn boss_for(&mut self, stage: &str) -> Option<ActorTemplate> {
        self.boss_requests += 1;
        let boss = self.bosses.choose(&mut rand::thread_rng()).cloned();
        if boss.is_none() {
            tracing::warn!(stage, "No boss template available");
        }
        boss
    }
}
