/// Arena constants
pub mod arena {
    /// Default arena width in world units
    pub const DEFAULT_WIDTH: f32 = 1280.0;
    /// Default arena height in world units
    pub const DEFAULT_HEIGHT: f32 = 720.0;
    /// Inward margin at which actors bounce off the arena edge
    pub const EDGE_MARGIN: f32 = 20.0;
    /// Largest random rotation applied to a velocity after an edge bounce (radians)
    pub const BOUNCE_JITTER: f32 = 0.35;
}

/// Simulation clock constants
pub mod physics {
    /// Default tick rate in Hz
    pub const TICK_RATE: u32 = 30;
    /// Delta time per tick in seconds
    pub const DT: f32 = 1.0 / 30.0;
    /// Upper bound on a single tick's delta; larger frame gaps are clamped
    pub const MAX_DT: f32 = 0.1;
}

/// Actor body constants
pub mod actor {
    /// Collision radius at size scale 1.0
    pub const BASE_RADIUS: f32 = 35.0;
    /// Default critical damage percent when a template omits it
    pub const DEFAULT_CRIT_DAMAGE: f32 = 150.0;
}

/// Wandering and pursuit constants
pub mod movement {
    /// Speed every actor has before its move_speed stat is added
    pub const BASE_SPEED: f32 = 20.0;
    /// Wander heading re-roll window (ms)
    pub const WANDER_MIN_MS: u64 = 2_000;
    pub const WANDER_MAX_MS: u64 = 5_000;
    /// Re-roll window while standing on a slippery surface (ms)
    pub const SLIP_MIN_MS: u64 = 250;
    pub const SLIP_MAX_MS: u64 = 700;
    /// Speed multiplier while a charge is active
    pub const CHARGE_MULTIPLIER: f32 = 2.0;
    /// Fraction per second by which speed converges on its target
    pub const RENORMALIZE_RATE: f32 = 8.0;
    /// Boss steering acceleration toward its quarry
    pub const BOSS_ACCELERATION: f32 = 240.0;
    /// Boss stops steering for this long after a collision (ms)
    pub const BOSS_TRACKING_PAUSE_MS: u64 = 300;
}

/// Collision resolution constants
pub mod collision {
    /// Knockback magnitude = (BASE + |weight delta| * WEIGHT_FACTOR) * SCALE
    pub const KNOCKBACK_BASE: f32 = 10.0;
    pub const KNOCKBACK_WEIGHT_FACTOR: f32 = 0.5;
    pub const KNOCKBACK_SCALE: f32 = 10.0;
    /// Share of the knockback taken by the heavier combatant
    pub const HEAVIER_SHARE: f32 = 0.5;
    /// Weights closer than this are treated as equal
    pub const WEIGHT_EPSILON: f32 = 0.01;
    /// Window after a collision during which velocity is left alone (ms)
    pub const KNOCKBACK_RECOVERY_MS: u64 = 200;
    /// A charge cannot end until this long after the last collision (ms)
    pub const CHARGE_END_DEFER_MS: u64 = 200;
    /// The same pair cannot collide again within this window (ms)
    pub const PAIR_COOLDOWN_MS: u64 = 500;
}

/// Damage pipeline constants
pub mod combat {
    /// Floor for post-defense and final damage
    pub const MIN_DAMAGE: f32 = 1.0;
    /// Defense and resistance are capped below 100% mitigation
    pub const MAX_MITIGATION_PERCENT: f32 = 95.0;
}

/// Mana constants
pub mod mana {
    /// Passive regeneration interval (ms)
    pub const REGEN_INTERVAL_MS: u64 = 1_000;
    /// MP restored per regeneration interval
    pub const REGEN_AMOUNT: f32 = 10.0;
    /// MP gained by each side of a collision
    pub const COLLISION_GAIN: f32 = 15.0;
}

/// Death, injury and revival constants
pub mod lifecycle {
    /// Injured party members revive after this long (ms)
    pub const REVIVE_DELAY_MS: u64 = 60_000;
    /// Candidate positions sampled when choosing a revive point
    pub const REVIVE_SAMPLES: u32 = 20;
}

/// Spawn placement constants
pub mod spawn {
    /// Maximum attempts to find a clear spawn position
    pub const MAX_PLACEMENT_ATTEMPTS: u32 = 30;
    /// Minimum distance from any other actor
    pub const SAFE_DISTANCE: f32 = 90.0;
    /// Minimum distance from hostile actors
    pub const HOSTILE_SAFE_DISTANCE: f32 = 220.0;
}

/// Session progression constants
pub mod progression {
    /// Crisis percent added per regular kill
    pub const CRISIS_PER_KILL: u32 = 5;
    /// Crisis percent at which the boss spawns
    pub const CRISIS_MAX: u32 = 100;
    /// Extra share of an enemy's EXP granted to its killer
    pub const KILLER_EXP_BONUS: f32 = 0.5;
    /// Flat EXP granted to every party member when the boss falls
    pub const BOSS_BONUS_EXP: u64 = 500;
    /// Affinity gained per kill
    pub const AFFINITY_PER_KILL: u32 = 1;
    /// Characters at or below this level cap gain boosted affinity
    pub const LOW_CAP_MAX_LEVEL: u32 = 20;
    pub const LOW_CAP_AFFINITY_MULTIPLIER: u32 = 10;
    /// Stages on which no combat or enemy spawning happens
    pub const NON_COMBAT_STAGES: &[&str] = &["town", "farm", "guild_hall"];
}

/// Skill engine constants
pub mod skills {
    /// Default pulse interval for zones and spike traps (ms)
    pub const DEFAULT_PULSE_MS: u64 = 500;
    /// Collision radius of a projectile
    pub const PROJECTILE_RADIUS: f32 = 12.0;
    /// Hard lifetime cap for projectiles that never reach their range (ms)
    pub const PROJECTILE_MAX_LIFETIME_MS: u64 = 10_000;
    /// Collision radius of an orbiting blade
    pub const ORBIT_RADIUS: f32 = 18.0;
    /// A grapple drag ends once the owner is this close to the anchor
    pub const GRAPPLE_ARRIVAL_DISTANCE: f32 = 8.0;
    /// Owner drag speed during a grapple pull
    pub const GRAPPLE_PULL_SPEED: f32 = 650.0;
    /// A grapple drag gives up after this long (ms)
    pub const GRAPPLE_MAX_DRAG_MS: u64 = 1_500;
    /// Sideways shove applied to actors swept by a grapple drag
    pub const GRAPPLE_SWEEP_KNOCKBACK: f32 = 180.0;
    /// Maximum depth of casts triggered from inside another cast
    pub const MAX_FORCED_CAST_DEPTH: u8 = 1;
}

/// Resource node constants
pub mod harvest {
    /// Node is immune to further hits for this long after each hit (ms)
    pub const INVINCIBILITY_MS: u64 = 500;
    /// Node HP removed per hit
    pub const HIT_DAMAGE: u32 = 1;
    /// Push applied to the harvesting actor
    pub const ACTOR_KNOCKBACK: f32 = 140.0;
}
