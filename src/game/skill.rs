//! Skill and passive definitions
//!
//! These are the shapes the content provider hands to the simulation. Every
//! effect kind is its own variant carrying only the parameters it needs, so
//! dispatch in the skill engine is a plain `match`.

use serde::{Deserialize, Serialize};

use crate::game::constants::skills::DEFAULT_PULSE_MS;
use crate::game::state::{Actor, BuffId, SkillId};

/// Attribute a formula scales with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scaling {
    Attack,
    Defense,
    MagicPower,
    Weight,
    Strength,
    Agility,
    Wisdom,
    Skill,
    MaxHp,
    MaxMp,
}

/// `base + attribute * multiplier`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    #[serde(default)]
    pub base: f32,
    #[serde(default)]
    pub scaling: Option<Scaling>,
    #[serde(default = "default_multiplier")]
    pub multiplier: f32,
}

fn default_multiplier() -> f32 {
    1.0
}

impl Default for Formula {
    fn default() -> Self {
        Self::flat(0.0)
    }
}

impl Formula {
    pub fn flat(base: f32) -> Self {
        Self {
            base,
            scaling: None,
            multiplier: 1.0,
        }
    }

    pub fn scaled(base: f32, scaling: Scaling, multiplier: f32) -> Self {
        Self {
            base,
            scaling: Some(scaling),
            multiplier,
        }
    }

    pub fn evaluate(&self, actor: &Actor) -> f32 {
        let scaled = self
            .scaling
            .map(|s| actor.scaling_value(s) * self.multiplier)
            .unwrap_or(0.0);
        (self.base + scaled).max(0.0)
    }
}

/// Re-hit policy for transient hit volumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitPolicy {
    /// Each target is hit at most once per entity
    #[default]
    Once,
    /// The same target can be hit again after the cooldown
    Cooldown { ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compass {
    North,
    South,
    East,
    West,
}

/// How a projectile picks its initial heading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AimMode {
    #[default]
    Nearest,
    RandomTarget,
    Farthest,
    Fixed(Compass),
    RandomDirection,
}

/// Where a zone or trap is placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    #[default]
    Caster,
    /// Zone follows the caster for its whole lifetime
    FollowCaster,
    LowestHpAlly,
    Random,
}

/// Which side of the caster a zone affects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetScope {
    Hostile,
    Friendly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrbitSpec {
    #[serde(default = "default_count")]
    pub count: u32,
    pub damage: Formula,
    #[serde(default)]
    pub knockback: Formula,
    pub orbit_radius: f32,
    /// Radians per second
    pub angular_speed: f32,
    pub duration_ms: u64,
    #[serde(default)]
    pub hit_policy: HitPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BounceSpec {
    pub max_bounces: u32,
    pub cooldown_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileSpec {
    pub damage: Formula,
    pub speed: Formula,
    pub max_distance: Formula,
    #[serde(default)]
    pub aim: AimMode,
    /// Projectiles fired per volley, fanned out by `spread_deg`
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default = "default_spread")]
    pub spread_deg: f32,
    /// Volleys fired in total, `burst_interval_ms` apart
    #[serde(default = "default_count")]
    pub burst: u32,
    #[serde(default = "default_burst_interval")]
    pub burst_interval_ms: u64,
    #[serde(default)]
    pub piercing: bool,
    #[serde(default)]
    pub bounce: Option<BounceSpec>,
    #[serde(default)]
    pub tracking: bool,
    #[serde(default)]
    pub grapple: bool,
    #[serde(default)]
    pub knockback: Formula,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaSpec {
    #[serde(default)]
    pub placement: Placement,
    pub diameter: Formula,
    pub duration_ms: u64,
    #[serde(default = "default_pulse")]
    pub interval_ms: u64,
    #[serde(default)]
    pub damage: Option<Formula>,
    #[serde(default)]
    pub heal: Option<Formula>,
    /// When false each occupant is affected by the pulse at most once
    #[serde(default = "default_true")]
    pub periodic: bool,
    #[serde(default)]
    pub buff_id: Option<BuffId>,
    #[serde(default)]
    pub locks_movement: bool,
    #[serde(default)]
    pub scope: Option<TargetScope>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrapSpec {
    #[serde(default)]
    pub placement: Placement,
    pub radius: f32,
    pub damage: Formula,
    pub duration_ms: u64,
    #[serde(default = "default_pulse")]
    pub interval_ms: u64,
    #[serde(default)]
    pub buff_id: Option<BuffId>,
    #[serde(default)]
    pub buff_duration_secs: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeSpec {
    pub buff_id: BuffId,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmountSpec {
    pub amount: Formula,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuffSpec {
    pub buff_id: BuffId,
    pub duration_secs: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShieldSpec {
    pub amount: Formula,
    pub duration_ms: u64,
}

/// One step of a skill cast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SkillEffect {
    SpawnOrbit(OrbitSpec),
    SpawnProjectile(ProjectileSpec),
    SpawnArea(AreaSpec),
    DamageArea(AreaSpec),
    HealingArea(AreaSpec),
    ChargeEnemy(ChargeSpec),
    HealLowestHp(AmountSpec),
    BuffAlly(BuffSpec),
    BuffSelf(BuffSpec),
    BuffEnemy(BuffSpec),
    ShieldAlly(ShieldSpec),
    ShieldAllAllies(ShieldSpec),
    SpawnTrap(TrapSpec),
    SpawnSpikeTrap(TrapSpec),
    SoulInfusion(AmountSpec),
}

impl SkillEffect {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SpawnOrbit(_) => "spawn_orbit",
            Self::SpawnProjectile(_) => "spawn_projectile",
            Self::SpawnArea(_) => "spawn_area",
            Self::DamageArea(_) => "damage_area",
            Self::HealingArea(_) => "healing_area",
            Self::ChargeEnemy(_) => "charge_enemy",
            Self::HealLowestHp(_) => "heal_lowest_hp",
            Self::BuffAlly(_) => "buff_ally",
            Self::BuffSelf(_) => "buff_self",
            Self::BuffEnemy(_) => "buff_enemy",
            Self::ShieldAlly(_) => "shield_ally",
            Self::ShieldAllAllies(_) => "shield_all_allies",
            Self::SpawnTrap(_) => "spawn_trap",
            Self::SpawnSpikeTrap(_) => "spawn_spike_trap",
            Self::SoulInfusion(_) => "soul_infusion",
        }
    }
}

/// Active skill cast when the owner's MP is full
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub id: SkillId,
    #[serde(default)]
    pub name: String,
    /// Eligible for echo re-casts against a second target
    #[serde(default)]
    pub single_target: bool,
    pub effects: Vec<SkillEffect>,
}

/// Passive behaviors resolved onto an actor at spawn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PassiveEffect {
    /// Every `collisions`-th collision primes a guaranteed crit
    CritCounter { collisions: u32 },
    /// Grants a short buff on every collision
    CollisionBuff { buff_id: BuffId, duration_secs: f32 },
    /// Reduces incoming damage, more while shielded
    IronFortress {
        reduction_pct: f32,
        shielded_reduction_pct: f32,
    },
    /// Aura giving nearby allies a chance to nullify a hit
    DivineProclamation { radius: f32, nullify_chance_pct: f32 },
    /// Chance to refund part of max MP after a cast
    ManaRefund { chance_pct: f32, refund_pct: f32 },
    /// Single-target skills fire again at a different target
    EchoCast { delay_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassiveSkill {
    pub id: SkillId,
    #[serde(default)]
    pub name: String,
    pub effects: Vec<PassiveEffect>,
}

fn default_count() -> u32 {
    1
}

fn default_spread() -> f32 {
    15.0
}

fn default_burst_interval() -> u64 {
    150
}

fn default_pulse() -> u64 {
    DEFAULT_PULSE_MS
}

fn default_true() -> bool {
    true
}
