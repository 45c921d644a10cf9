use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::constants::{arena, physics, progression};

/// Party roster entry used for EXP and affinity distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyMember {
    pub id: Uuid,
    pub max_level: u32,
}

impl PartyMember {
    pub fn new(id: Uuid, max_level: u32) -> Self {
        Self { id, max_level }
    }

    /// Low level-cap characters earn boosted affinity
    pub fn is_low_cap(&self) -> bool {
        self.max_level <= progression::LOW_CAP_MAX_LEVEL
    }
}

/// Simulation configuration
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Arena width in world units
    pub arena_width: f32,
    /// Arena height in world units
    pub arena_height: f32,
    /// Ticks per second for the headless driver
    pub tick_rate: u32,
    /// Cap on concurrent regular enemies
    pub max_enemies: usize,
    /// Cap on concurrent resource nodes
    pub max_resource_nodes: usize,
    /// Interval between periodic enemy spawn attempts
    pub enemy_spawn_interval_ms: u64,
    /// Interval between periodic resource node spawn attempts
    pub resource_spawn_interval_ms: u64,
    /// Current stage name
    pub stage: String,
    /// Ordered party roster
    pub party: Vec<PartyMember>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            arena_width: arena::DEFAULT_WIDTH,
            arena_height: arena::DEFAULT_HEIGHT,
            tick_rate: physics::TICK_RATE,
            max_enemies: 12,
            max_resource_nodes: 4,
            enemy_spawn_interval_ms: 2_500,
            resource_spawn_interval_ms: 10_000,
            stage: "plains".to_string(),
            party: Vec::new(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", key, raw);
            None
        }
    }
}

impl SimConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Some(width) = env_parse::<f32>("ARENA_WIDTH") {
            if width >= 200.0 {
                config.arena_width = width;
            } else {
                tracing::warn!("ARENA_WIDTH must be >= 200, using default");
            }
        }

        if let Some(height) = env_parse::<f32>("ARENA_HEIGHT") {
            if height >= 200.0 {
                config.arena_height = height;
            } else {
                tracing::warn!("ARENA_HEIGHT must be >= 200, using default");
            }
        }

        if let Some(rate) = env_parse::<u32>("TICK_RATE") {
            if (1..=240).contains(&rate) {
                config.tick_rate = rate;
            } else {
                tracing::warn!("TICK_RATE must be 1-240, using default");
            }
        }

        if let Some(max) = env_parse::<usize>("MAX_ENEMIES") {
            if max <= 500 {
                config.max_enemies = max;
            } else {
                tracing::warn!("MAX_ENEMIES must be <= 500, using default");
            }
        }

        if let Some(max) = env_parse::<usize>("MAX_RESOURCE_NODES") {
            if max <= 100 {
                config.max_resource_nodes = max;
            } else {
                tracing::warn!("MAX_RESOURCE_NODES must be <= 100, using default");
            }
        }

        if let Some(interval) = env_parse::<u64>("ENEMY_SPAWN_INTERVAL_MS") {
            if interval > 0 {
                config.enemy_spawn_interval_ms = interval;
            } else {
                tracing::warn!("ENEMY_SPAWN_INTERVAL_MS must be > 0, using default");
            }
        }

        if let Some(interval) = env_parse::<u64>("RESOURCE_SPAWN_INTERVAL_MS") {
            if interval > 0 {
                config.resource_spawn_interval_ms = interval;
            } else {
                tracing::warn!("RESOURCE_SPAWN_INTERVAL_MS must be > 0, using default");
            }
        }

        if let Ok(stage) = std::env::var("STAGE") {
            if !stage.trim().is_empty() {
                config.stage = stage.trim().to_string();
            }
        }

        config
    }

    pub fn with_party(mut self, party: Vec<PartyMember>) -> Self {
        self.party = party;
        self
    }

    pub fn with_stage(mut self, stage: &str) -> Self {
        self.stage = stage.to_string();
        self
    }

    /// Nominal tick length for the driver loop
    pub fn tick_dt(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if !(self.arena_width > 0.0 && self.arena_height > 0.0) {
            return Err("arena dimensions must be positive".to_string());
        }
        if self.tick_rate == 0 {
            return Err("tick_rate must be at least 1".to_string());
        }
        if self.enemy_spawn_interval_ms == 0 || self.resource_spawn_interval_ms == 0 {
            return Err("spawn intervals must be non-zero".to_string());
        }
        if self.stage.is_empty() {
            return Err("stage cannot be empty".to_string());
        }
        let mut seen = std::collections::HashSet::new();
        if !self.party.iter().all(|m| seen.insert(m.id)) {
            return Err("party member ids must be unique".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimConfig::default();
        assert_eq!(config.tick_rate, 30);
        assert_eq!(config.stage, "plains");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_default() {
        let config = SimConfig::load_or_default();
        assert!(config.tick_rate > 0);
    }

    #[test]
    fn test_duplicate_party_rejected() {
        let id = Uuid::new_v4();
        let config = SimConfig::default().with_party(vec![PartyMember::new(id, 50), PartyMember::new(id, 20)]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = SimConfig::default();
        config.enemy_spawn_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_low_cap_member() {
        assert!(PartyMember::new(Uuid::new_v4(), 20).is_low_cap());
        assert!(!PartyMember::new(Uuid::new_v4(), 21).is_low_cap());
    }
}
