//! Simulation state definitions
//!
//! Contains all entities (actors, transient skill effects, resource nodes),
//! the arena bounds and the session progression state.

use hashbrown::HashMap;
use rand::Rng;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use uuid::Uuid;

use crate::config::PartyMember;
use crate::game::constants::{actor, collision, movement, progression};
use crate::game::error::SimError;
use crate::game::events::SimEvent;
use crate::game::scheduler::Scheduler;
use crate::game::skill::{HitPolicy, PassiveEffect, Scaling, TargetScope};
use crate::util::vec2::Vec2;

/// Unique actor identifier
pub type ActorId = Uuid;

/// Identifier for non-actor entities (effects, nodes)
pub type EntityId = u64;

pub type SkillId = String;
pub type BuffId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Faction {
    Ally,
    Enemy,
}

impl Faction {
    pub fn opposite(self) -> Self {
        match self {
            Self::Ally => Self::Enemy,
            Self::Enemy => Self::Ally,
        }
    }

    /// Resolve a scope relative to this faction
    pub fn scoped(self, scope: TargetScope) -> Self {
        match scope {
            TargetScope::Hostile => self.opposite(),
            TargetScope::Friendly => self,
        }
    }
}

/// Stat a buff can modify
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatAttribute {
    Attack,
    Defense,
    MoveSpeed,
    DodgeRate,
    CritRate,
    CritDamage,
    Resistance,
    MagicPower,
    Weight,
}

/// Combat stats. Rates and crit damage are percentages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatStats {
    pub attack: f32,
    pub defense: f32,
    pub move_speed: f32,
    pub dodge_rate: f32,
    pub crit_rate: f32,
    pub crit_damage: f32,
    pub resistance: f32,
    pub magic_power: f32,
    pub weight: f32,
}

impl Default for CombatStats {
    fn default() -> Self {
        Self {
            attack: 10.0,
            defense: 0.0,
            move_speed: 40.0,
            dodge_rate: 0.0,
            crit_rate: 0.0,
            crit_damage: actor::DEFAULT_CRIT_DAMAGE,
            resistance: 0.0,
            magic_power: 0.0,
            weight: 10.0,
        }
    }
}

impl CombatStats {
    pub fn get(&self, attribute: StatAttribute) -> f32 {
        match attribute {
            StatAttribute::Attack => self.attack,
            StatAttribute::Defense => self.defense,
            StatAttribute::MoveSpeed => self.move_speed,
            StatAttribute::DodgeRate => self.dodge_rate,
            StatAttribute::CritRate => self.crit_rate,
            StatAttribute::CritDamage => self.crit_damage,
            StatAttribute::Resistance => self.resistance,
            StatAttribute::MagicPower => self.magic_power,
            StatAttribute::Weight => self.weight,
        }
    }

    pub fn set(&mut self, attribute: StatAttribute, value: f32) {
        let slot = match attribute {
            StatAttribute::Attack => &mut self.attack,
            StatAttribute::Defense => &mut self.defense,
            StatAttribute::MoveSpeed => &mut self.move_speed,
            StatAttribute::DodgeRate => &mut self.dodge_rate,
            StatAttribute::CritRate => &mut self.crit_rate,
            StatAttribute::CritDamage => &mut self.crit_damage,
            StatAttribute::Resistance => &mut self.resistance,
            StatAttribute::MagicPower => &mut self.magic_power,
            StatAttribute::Weight => &mut self.weight,
        };
        *slot = value;
    }
}

/// Primary attributes used by skill formulas
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attributes {
    pub strength: f32,
    pub agility: f32,
    pub wisdom: f32,
    pub skill: f32,
}

/// HP, MP and shield pools
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    pub hp: f32,
    pub max_hp: f32,
    pub mp: f32,
    pub max_mp: f32,
    pub shield: f32,
}

impl Vitals {
    pub fn full(max_hp: f32, max_mp: f32) -> Self {
        Self {
            hp: max_hp,
            max_hp,
            mp: 0.0,
            max_mp,
            shield: 0.0,
        }
    }

    /// Shield absorbs first, overflow goes to HP. Returns the amount the shield absorbed.
    pub fn absorb(&mut self, damage: f32) -> f32 {
        let absorbed = damage.min(self.shield);
        self.shield -= absorbed;
        self.hp = (self.hp - (damage - absorbed)).max(0.0);
        absorbed
    }

    /// Returns HP actually restored
    pub fn heal(&mut self, amount: f32) -> f32 {
        let before = self.hp;
        self.hp = (self.hp + amount.max(0.0)).min(self.max_hp);
        self.hp - before
    }

    /// Returns MP actually restored
    pub fn restore_mp(&mut self, amount: f32) -> f32 {
        let before = self.mp;
        self.mp = (self.mp + amount.max(0.0)).min(self.max_mp);
        self.mp - before
    }

    pub fn add_shield(&mut self, amount: f32) {
        self.shield += amount.max(0.0);
    }

    /// Removes a previously granted amount, never below zero
    pub fn remove_shield(&mut self, amount: f32) {
        self.shield = (self.shield - amount).max(0.0);
    }

    pub fn mp_full(&self) -> bool {
        self.max_mp > 0.0 && self.mp >= self.max_mp
    }

    pub fn hp_ratio(&self) -> f32 {
        if self.max_hp > 0.0 {
            self.hp / self.max_hp
        } else {
            0.0
        }
    }
}

/// Alive/injured/dead. A single enum so an actor can never be both dead and injured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LifeState {
    #[default]
    Alive,
    /// Ally-only; revives when `revive_at_ms` passes
    Injured,
    /// Enemy-only and terminal; the actor is about to leave the registry
    Dead,
}

/// Active charge started by `charge_enemy`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeState {
    pub expires_at_ms: u64,
    pub buff_id: BuffId,
    pub target: Option<ActorId>,
}

/// One-shot flags and counters fed by passive skills
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PassiveState {
    /// Next hit this actor lands is a guaranteed crit
    pub guaranteed_crit: bool,
    /// Next hit this actor takes is a guaranteed crit
    pub exposed_weakness: bool,
    /// Collisions counted toward the crit counter passive
    pub collision_streak: u32,
}

/// Spawn description supplied by the encounter director or the party roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorTemplate {
    pub template_id: String,
    #[serde(default)]
    pub name: String,
    pub max_hp: f32,
    #[serde(default = "default_max_mp")]
    pub max_mp: f32,
    #[serde(default)]
    pub stats: CombatStats,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default = "default_size_scale")]
    pub size_scale: f32,
    #[serde(default)]
    pub active_skill: Option<SkillId>,
    #[serde(default)]
    pub passive_skills: Vec<SkillId>,
    #[serde(default)]
    pub job_skill: Option<SkillId>,
    #[serde(default)]
    pub drop_table: Option<String>,
    #[serde(default)]
    pub exp_reward: u64,
}

fn default_max_mp() -> f32 {
    100.0
}

fn default_size_scale() -> f32 {
    1.0
}

/// Combatant state
///
/// Hot fields (read every movement/collision pass) are grouped first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    // === HOT FIELDS ===
    pub position: Vec2,
    pub velocity: Vec2,
    pub size_scale: f32,
    pub life: LifeState,
    pub can_move: bool,
    /// Live stats; always derived from `base_stats` plus active buffs
    pub stats: CombatStats,
    pub vitals: Vitals,

    // === WARM FIELDS ===
    /// Immutable pre-buff snapshot captured at spawn
    pub base_stats: CombatStats,
    pub attributes: Attributes,
    pub passive: PassiveState,
    pub charge: Option<ChargeState>,
    pub slipping: bool,
    /// Number of zones currently holding this actor in place
    pub area_locks: u32,
    /// Zone-granted buffs and how many zones currently grant each
    pub zone_buffs: HashMap<BuffId, u32>,
    pub last_regen_ms: u64,
    pub last_collision_ms: Option<u64>,
    pub next_direction_change_ms: u64,
    pub revive_at_ms: Option<u64>,

    // === COLD FIELDS ===
    pub id: ActorId,
    pub name: String,
    pub faction: Faction,
    pub is_boss: bool,
    pub template_id: String,
    pub active_skill: Option<SkillId>,
    pub passives: SmallVec<[PassiveEffect; 4]>,
    pub drop_table: Option<String>,
    pub exp_reward: u64,
}

impl Actor {
    pub fn new(id: ActorId, name: &str, faction: Faction, position: Vec2) -> Self {
        let stats = CombatStats::default();
        Self {
            position,
            velocity: Vec2::ZERO,
            size_scale: 1.0,
            life: LifeState::Alive,
            can_move: true,
            stats,
            vitals: Vitals::full(100.0, default_max_mp()),
            base_stats: stats,
            attributes: Attributes::default(),
            passive: PassiveState::default(),
            charge: None,
            slipping: false,
            area_locks: 0,
            zone_buffs: HashMap::new(),
            last_regen_ms: 0,
            last_collision_ms: None,
            next_direction_change_ms: 0,
            revive_at_ms: None,
            id,
            name: name.to_string(),
            faction,
            is_boss: false,
            template_id: String::new(),
            active_skill: None,
            passives: SmallVec::new(),
            drop_table: None,
            exp_reward: 0,
        }
    }

    /// Build an actor from a template. Passives are resolved separately.
    pub fn from_template(id: ActorId, template: &ActorTemplate, faction: Faction, position: Vec2) -> Self {
        let name = if template.name.is_empty() {
            template.template_id.as_str()
        } else {
            template.name.as_str()
        };
        let mut actor = Self::new(id, name, faction, position).with_stats(
            template.stats,
            template.attributes,
            template.max_hp,
            template.max_mp,
        );
        actor.size_scale = template.size_scale.max(0.1);
        actor.template_id = template.template_id.clone();
        actor.active_skill = template.active_skill.clone();
        actor.drop_table = template.drop_table.clone();
        actor.exp_reward = template.exp_reward;
        actor
    }

    /// Replace stats; the base snapshot is taken from the same values
    pub fn with_stats(mut self, stats: CombatStats, attributes: Attributes, max_hp: f32, max_mp: f32) -> Self {
        self.stats = stats;
        self.base_stats = stats;
        self.attributes = attributes;
        self.vitals = Vitals::full(max_hp.max(1.0), max_mp.max(0.0));
        self
    }

    pub fn radius(&self) -> f32 {
        actor::BASE_RADIUS * self.size_scale
    }

    pub fn is_alive(&self) -> bool {
        self.life == LifeState::Alive
    }

    pub fn is_injured(&self) -> bool {
        self.life == LifeState::Injured
    }

    pub fn is_dead(&self) -> bool {
        self.life == LifeState::Dead
    }

    pub fn is_charging(&self) -> bool {
        self.charge.is_some()
    }

    /// Within the post-collision window in which velocity is left to the knockback
    pub fn in_knockback(&self, now_ms: u64) -> bool {
        self.since_collision(now_ms)
            .map(|elapsed| elapsed < collision::KNOCKBACK_RECOVERY_MS)
            .unwrap_or(false)
    }

    pub fn since_collision(&self, now_ms: u64) -> Option<u64> {
        self.last_collision_ms.map(|t| now_ms.saturating_sub(t))
    }

    /// Cruising speed derived from live stats
    pub fn target_speed(&self) -> f32 {
        let speed = movement::BASE_SPEED + self.stats.move_speed.max(0.0);
        if self.is_charging() {
            speed * movement::CHARGE_MULTIPLIER
        } else {
            speed
        }
    }

    pub fn scaling_value(&self, scaling: Scaling) -> f32 {
        match scaling {
            Scaling::Attack => self.stats.attack,
            Scaling::Defense => self.stats.defense,
            Scaling::MagicPower => self.stats.magic_power,
            Scaling::Weight => self.stats.weight,
            Scaling::Strength => self.attributes.strength,
            Scaling::Agility => self.attributes.agility,
            Scaling::Wisdom => self.attributes.wisdom,
            Scaling::Skill => self.attributes.skill,
            Scaling::MaxHp => self.vitals.max_hp,
            Scaling::MaxMp => self.vitals.max_mp,
        }
    }

    pub fn overlaps(&self, point: Vec2, radius: f32) -> bool {
        let reach = self.radius() + radius;
        self.position.distance_sq_to(point) < reach * reach
    }
}

/// Axis-aligned playfield with its origin at the top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Arena {
    pub width: f32,
    pub height: f32,
}

impl Arena {
    pub fn new(width: f32, height: f32) -> Result<Self, SimError> {
        if !(width.is_finite() && height.is_finite()) || width <= 0.0 || height <= 0.0 {
            return Err(SimError::InvalidArena { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.width * 0.5, self.height * 0.5)
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= 0.0 && point.x <= self.width && point.y >= 0.0 && point.y <= self.height
    }

    /// Clamp a point inside the arena, keeping `margin` from every edge when it fits
    pub fn clamp(&self, point: Vec2, margin: f32) -> Vec2 {
        let mx = margin.min(self.width * 0.5);
        let my = margin.min(self.height * 0.5);
        Vec2::new(
            point.x.clamp(mx, self.width - mx),
            point.y.clamp(my, self.height - my),
        )
    }

    pub fn random_point<R: Rng + ?Sized>(&self, rng: &mut R, margin: f32) -> Vec2 {
        let mx = margin.min(self.width * 0.5);
        let my = margin.min(self.height * 0.5);
        Vec2::new(
            if self.width - mx > mx { rng.gen_range(mx..self.width - mx) } else { self.width * 0.5 },
            if self.height - my > my { rng.gen_range(my..self.height - my) } else { self.height * 0.5 },
        )
    }
}

/// Per-entity record of when each target was last hit
#[derive(Debug, Clone, Default)]
pub struct HitTracker {
    policy: HitPolicy,
    last_hit: FxHashMap<ActorId, u64>,
}

impl HitTracker {
    pub fn new(policy: HitPolicy) -> Self {
        Self {
            policy,
            last_hit: FxHashMap::default(),
        }
    }

    pub fn can_hit(&self, target: ActorId, now_ms: u64) -> bool {
        match (self.policy, self.last_hit.get(&target)) {
            (_, None) => true,
            (HitPolicy::Once, Some(_)) => false,
            (HitPolicy::Cooldown { ms }, Some(&at)) => now_ms.saturating_sub(at) >= ms,
        }
    }

    /// Records the hit if allowed; returns whether it was allowed
    pub fn try_hit(&mut self, target: ActorId, now_ms: u64) -> bool {
        if !self.can_hit(target, now_ms) {
            return false;
        }
        self.last_hit.insert(target, now_ms);
        true
    }

    pub fn hit_count(&self) -> usize {
        self.last_hit.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Orbit,
    Projectile,
    Zone,
    Trap,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrbitBody {
    pub angle: f32,
    pub orbit_radius: f32,
    pub angular_speed: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GrapplePhase {
    Flying,
    Dragging { anchor: Vec2, started_ms: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectileBody {
    pub direction: Vec2,
    pub speed: f32,
    pub traveled: f32,
    pub max_distance: f32,
    pub piercing: bool,
    pub bounces_left: Option<u32>,
    pub tracking: Option<ActorId>,
    pub grapple: Option<GrapplePhase>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneBody {
    pub follow_owner: bool,
    pub scope: TargetScope,
    pub interval_ms: u64,
    pub next_pulse_ms: u64,
    pub heal: f32,
    pub periodic: bool,
    pub buff_id: Option<BuffId>,
    pub locks_movement: bool,
    pub occupants: SmallVec<[ActorId; 8]>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrapBody {
    pub one_shot: bool,
    pub interval_ms: u64,
    pub next_pulse_ms: u64,
    pub buff_id: Option<BuffId>,
    pub buff_duration_secs: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EffectBody {
    Orbit(OrbitBody),
    Projectile(ProjectileBody),
    Zone(ZoneBody),
    Trap(TrapBody),
}

/// Short-lived entity spawned by a skill cast
#[derive(Debug, Clone)]
pub struct TransientEffect {
    pub id: EntityId,
    pub owner: ActorId,
    /// Owner's faction at cast time
    pub faction: Faction,
    pub skill_id: SkillId,
    pub position: Vec2,
    pub radius: f32,
    /// Resolved pre-mitigation damage per hit
    pub damage: f32,
    pub knockback: f32,
    pub expires_at_ms: u64,
    pub hits: HitTracker,
    pub body: EffectBody,
    pub expired: bool,
}

impl TransientEffect {
    pub fn kind(&self) -> EffectKind {
        match self.body {
            EffectBody::Orbit(_) => EffectKind::Orbit,
            EffectBody::Projectile(_) => EffectKind::Projectile,
            EffectBody::Zone(_) => EffectKind::Zone,
            EffectBody::Trap(_) => EffectKind::Trap,
        }
    }
}

/// Harvestable resource node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    pub id: EntityId,
    pub node_type: String,
    pub position: Vec2,
    pub hp: u32,
    pub max_hp: u32,
    pub radius: f32,
    pub invincible_until_ms: u64,
}

/// Session-level progression bookkeeping
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// Crisis meter in percent, 0..=100
    pub crisis: u32,
    pub boss_spawned: bool,
    pub boss_id: Option<ActorId>,
    pub total_kills: u64,
    /// Ordered party roster for EXP distribution
    pub party: Vec<PartyMember>,
    pub experience: HashMap<ActorId, u64>,
    pub affinity: HashMap<ActorId, u32>,
    pub next_enemy_spawn_ms: u64,
    pub next_node_spawn_ms: u64,
}

impl SessionState {
    pub fn new(party: Vec<PartyMember>) -> Self {
        Self {
            party,
            ..Self::default()
        }
    }

    /// Crisis value shown to observers; locked at 0 while a boss is up
    pub fn reported_crisis(&self) -> u32 {
        if self.boss_spawned {
            0
        } else {
            self.crisis.min(progression::CRISIS_MAX)
        }
    }

    pub fn party_member(&self, id: ActorId) -> Option<&PartyMember> {
        self.party.iter().find(|m| m.id == id)
    }
}

/// Complete simulation state
#[derive(Debug)]
pub struct SimState {
    /// Simulated clock in milliseconds
    pub now_ms: u64,
    pub tick: u64,
    pub stage: String,
    pub arena: Arena,
    pub actors: HashMap<ActorId, Actor>,
    pub effects: Vec<TransientEffect>,
    pub nodes: Vec<ResourceNode>,
    pub session: SessionState,
    pub scheduler: Scheduler,
    /// Last collision time per unordered actor pair
    pub pair_cooldowns: FxHashMap<(ActorId, ActorId), u64>,
    /// Sub-millisecond time not yet folded into `now_ms`
    clock_remainder_ms: f64,
    events: Vec<SimEvent>,
    next_entity_id: EntityId,
}

impl SimState {
    pub fn new(arena: Arena, stage: &str, party: Vec<PartyMember>) -> Self {
        Self {
            now_ms: 0,
            tick: 0,
            stage: stage.to_string(),
            arena,
            actors: HashMap::new(),
            effects: Vec::new(),
            nodes: Vec::new(),
            session: SessionState::new(party),
            scheduler: Scheduler::new(),
            pair_cooldowns: FxHashMap::default(),
            clock_remainder_ms: 0.0,
            events: Vec::new(),
            next_entity_id: 1,
        }
    }

    /// Advance the simulated clock by `dt` seconds, carrying fractional milliseconds
    pub fn advance_clock(&mut self, dt: f32) {
        self.clock_remainder_ms += f64::from(dt) * 1000.0;
        let whole = (self.clock_remainder_ms + 1e-6).floor().max(0.0);
        self.clock_remainder_ms -= whole;
        self.now_ms += whole as u64;
    }

    /// Generate a new unique entity ID
    pub fn next_entity_id(&mut self) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        id
    }

    pub fn get_actor(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(&id)
    }

    pub fn get_actor_mut(&mut self, id: ActorId) -> Option<&mut Actor> {
        self.actors.get_mut(&id)
    }

    pub fn add_actor(&mut self, actor: Actor) -> Result<ActorId, SimError> {
        let id = actor.id;
        if self.actors.contains_key(&id) {
            return Err(SimError::AlreadyPresent(id));
        }
        self.actors.insert(id, actor);
        Ok(id)
    }

    pub fn remove_actor(&mut self, id: ActorId) -> Option<Actor> {
        self.actors.remove(&id)
    }

    /// Alive actors of one faction
    pub fn alive_of(&self, faction: Faction) -> impl Iterator<Item = &Actor> {
        self.actors
            .values()
            .filter(move |a| a.faction == faction && a.is_alive())
    }

    pub fn alive_count(&self, faction: Faction) -> usize {
        self.alive_of(faction).count()
    }

    /// Regular (non-boss) enemies currently in play
    pub fn regular_enemy_count(&self) -> usize {
        self.actors
            .values()
            .filter(|a| a.faction == Faction::Enemy && !a.is_boss)
            .count()
    }

    pub fn boss_alive(&self) -> bool {
        self.actors.values().any(|a| a.is_boss && a.is_alive())
    }

    pub fn is_combat_stage(&self) -> bool {
        !progression::NON_COMBAT_STAGES.contains(&self.stage.as_str())
    }

    pub fn emit(&mut self, event: SimEvent) {
        self.events.push(event);
    }

    /// Events emitted since the last drain
    pub fn pending_events(&self) -> &[SimEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Unordered key for a pair of actors
pub fn pair_key(a: ActorId, b: ActorId) -> (ActorId, ActorId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
