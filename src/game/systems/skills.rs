//! Skill casting
//!
//! Allies regenerate MP over time and from collisions; a full bar fires the
//! actor's active skill. Each effect in the skill is dispatched by variant,
//! then the caster's passive hooks (MP refund, echo cast) run once the whole
//! cast has resolved.

use rand::seq::SliceRandom;

use crate::game::constants::collision::CHARGE_END_DEFER_MS;
use crate::game::constants::mana::{REGEN_AMOUNT, REGEN_INTERVAL_MS};
use crate::game::constants::skills::MAX_FORCED_CAST_DEPTH;
use crate::game::error::SimError;
use crate::game::events::SimEvent;
use crate::game::scheduler::ScheduledTask;
use crate::game::skill::{AreaSpec, PassiveEffect, Placement, ProjectileSpec, Skill, SkillEffect, TargetScope, TrapSpec};
use crate::game::state::{Actor, ActorId, ChargeState, Faction, SimState};
use crate::game::systems::damage::roll_percent;
use crate::game::systems::effects::{self, ProjectileVolley, TrapParams, ZoneParams};
use crate::game::systems::{buffs, combat};
use crate::services::Services;
use crate::util::vec2::Vec2;

/// How a cast was triggered
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CastOptions {
    /// Triggered from inside another cast
    pub forced: bool,
    /// Delayed repeat from the echo passive; costs no MP
    pub echo: bool,
    pub depth: u8,
    /// Target single-target effects must not pick
    pub exclude: Option<ActorId>,
}

/// Per-cast scratch state shared by the effect handlers
struct CastContext {
    caster: ActorId,
    skill_id: String,
    depth: u8,
    exclude: Option<ActorId>,
    /// First single target an effect picked
    primary: Option<ActorId>,
}

impl CastContext {
    fn record(&mut self, target: Option<ActorId>) {
        if self.primary.is_none() {
            self.primary = target;
        }
    }
}

/// MP regeneration, full-bar casts and charge upkeep
pub fn update(state: &mut SimState, services: &mut Services) {
    regenerate(state);

    if state.is_combat_stage() {
        let ready: Vec<ActorId> = state
            .alive_of(Faction::Ally)
            .filter(|a| a.active_skill.is_some() && a.vitals.mp_full())
            .map(|a| a.id)
            .collect();
        for id in ready {
            // a forced cast earlier in this pass may have spent the bar
            let still_ready = state
                .get_actor(id)
                .map(|a| a.is_alive() && a.vitals.mp_full())
                .unwrap_or(false);
            if !still_ready {
                continue;
            }
            if let Err(e) = cast(state, services, id, CastOptions::default()) {
                tracing::warn!(actor = %id, error = %e, "Cast skipped");
            }
        }
    }

    update_charges(state, services);
}

fn regenerate(state: &mut SimState) {
    let now = state.now_ms;
    let due: Vec<ActorId> = state
        .alive_of(Faction::Ally)
        .filter(|a| a.active_skill.is_some() && now.saturating_sub(a.last_regen_ms) >= REGEN_INTERVAL_MS)
        .map(|a| a.id)
        .collect();

    for id in due {
        if let Some(actor) = state.get_actor_mut(id) {
            actor.last_regen_ms = now;
        }
        combat::restore_mp(state, id, REGEN_AMOUNT);
    }
}

/// Cast the actor's active skill
///
/// Returns Ok(false) when the actor cannot cast right now (not alive, no
/// active skill, or a non-combat stage).
pub fn cast(state: &mut SimState, services: &mut Services, caster: ActorId, options: CastOptions) -> Result<bool, SimError> {
    let actor = state.get_actor(caster).ok_or(SimError::UnknownActor(caster))?;
    let Some(skill_id) = actor.active_skill.clone() else {
        return Ok(false);
    };
    cast_skill(state, services, caster, &skill_id, options)
}

/// Cast a specific skill on behalf of `caster`
pub fn cast_skill(
    state: &mut SimState,
    services: &mut Services,
    caster: ActorId,
    skill_id: &str,
    options: CastOptions,
) -> Result<bool, SimError> {
    let actor = state.get_actor(caster).ok_or(SimError::UnknownActor(caster))?;
    if !actor.is_alive() || !state.is_combat_stage() {
        return Ok(false);
    }
    let Some(skill) = services.skills.active_skill(skill_id) else {
        return Err(SimError::UnknownSkill(skill_id.to_string()));
    };

    if !options.echo {
        if let Some(actor) = state.get_actor_mut(caster) {
            actor.vitals.mp = 0.0;
            let max_mp = actor.vitals.max_mp;
            state.emit(SimEvent::ManaChanged {
                actor: caster,
                mp: 0.0,
                max_mp,
            });
        }
    }

    state.emit(SimEvent::SkillCast {
        caster,
        skill: skill.id.clone(),
        forced: options.forced,
        echo: options.echo,
    });
    tracing::debug!(actor = %caster, skill = %skill.id, forced = options.forced, echo = options.echo, "Skill cast");

    let mut ctx = CastContext {
        caster,
        skill_id: skill.id.clone(),
        depth: options.depth,
        exclude: options.exclude,
        primary: None,
    };
    for effect in &skill.effects {
        apply_effect(state, services, &mut ctx, effect);
    }

    after_cast(state, caster, &skill, &options, ctx.primary);
    Ok(true)
}

/// Damage and healing scale with the caster's magic power
fn power(caster: &Actor) -> f32 {
    1.0 + caster.stats.magic_power.max(0.0) / 100.0
}

fn apply_effect(state: &mut SimState, services: &mut Services, ctx: &mut CastContext, effect: &SkillEffect) {
    // Each effect sees the caster as the previous one left it
    let Some(caster) = state.get_actor(ctx.caster).filter(|a| a.is_alive()).cloned() else {
        return;
    };

    match effect {
        SkillEffect::SpawnOrbit(spec) => {
            let damage = spec.damage.evaluate(&caster) * power(&caster);
            let knockback = spec.knockback.evaluate(&caster);
            effects::spawn_orbits(state, ctx.caster, &ctx.skill_id, spec, damage, knockback);
        }
        SkillEffect::SpawnProjectile(spec) => {
            let target = fire_projectiles(state, ctx, &caster, spec);
            ctx.record(target);
        }
        SkillEffect::SpawnArea(spec) => {
            let scope = if spec.heal.is_some() && spec.damage.is_none() {
                TargetScope::Friendly
            } else {
                TargetScope::Hostile
            };
            spawn_area(state, ctx, &caster, spec, scope);
        }
        SkillEffect::DamageArea(spec) => spawn_area(state, ctx, &caster, spec, TargetScope::Hostile),
        SkillEffect::HealingArea(spec) => spawn_area(state, ctx, &caster, spec, TargetScope::Friendly),
        SkillEffect::ChargeEnemy(spec) => {
            let target = start_charge(state, services, &caster, &spec.buff_id, spec.duration_ms);
            ctx.record(target);
        }
        SkillEffect::HealLowestHp(spec) => {
            let target = state
                .alive_of(caster.faction)
                .filter(|a| Some(a.id) != ctx.exclude)
                .min_by(|a, b| a.vitals.hp_ratio().total_cmp(&b.vitals.hp_ratio()))
                .map(|a| a.id);
            if let Some(target) = target {
                combat::heal(state, target, spec.amount.evaluate(&caster) * power(&caster));
            }
            ctx.record(target);
        }
        SkillEffect::BuffAlly(spec) => {
            let target = random_target(state, caster.faction, ctx.exclude, None);
            if let Some(target) = target {
                buffs::apply(state, services, target, &spec.buff_id, spec.duration_secs);
            }
            ctx.record(target);
        }
        SkillEffect::BuffSelf(spec) => {
            buffs::apply(state, services, ctx.caster, &spec.buff_id, spec.duration_secs);
        }
        SkillEffect::BuffEnemy(spec) => {
            let target = random_target(state, caster.faction.opposite(), ctx.exclude, None);
            if let Some(target) = target {
                buffs::apply(state, services, target, &spec.buff_id, spec.duration_secs);
            }
            ctx.record(target);
        }
        SkillEffect::ShieldAlly(spec) => {
            let target = random_target(state, caster.faction, ctx.exclude, None);
            if let Some(target) = target {
                combat::grant_shield(state, target, spec.amount.evaluate(&caster), spec.duration_ms);
            }
            ctx.record(target);
        }
        SkillEffect::ShieldAllAllies(spec) => {
            let amount = spec.amount.evaluate(&caster);
            let allies: Vec<ActorId> = state.alive_of(caster.faction).map(|a| a.id).collect();
            for ally in allies {
                combat::grant_shield(state, ally, amount, spec.duration_ms);
            }
        }
        SkillEffect::SpawnTrap(spec) => spawn_trap(state, ctx, &caster, spec, true),
        SkillEffect::SpawnSpikeTrap(spec) => spawn_trap(state, ctx, &caster, spec, false),
        SkillEffect::SoulInfusion(spec) => {
            let target = random_target(state, caster.faction, ctx.exclude, Some(ctx.caster));
            if let Some(target) = target {
                infuse(state, services, ctx, target, spec.amount.evaluate(&caster));
            }
            ctx.record(target);
        }
    }
}

/// Random alive member of `faction`, never `exclude` or `skip`
fn random_target(state: &SimState, faction: Faction, exclude: Option<ActorId>, skip: Option<ActorId>) -> Option<ActorId> {
    let candidates: Vec<ActorId> = state
        .alive_of(faction)
        .map(|a| a.id)
        .filter(|id| Some(*id) != exclude && Some(*id) != skip)
        .collect();
    candidates.choose(&mut rand::thread_rng()).copied()
}

fn fire_projectiles(state: &mut SimState, ctx: &CastContext, caster: &Actor, spec: &ProjectileSpec) -> Option<ActorId> {
    let volley = ProjectileVolley {
        skill_id: ctx.skill_id.clone(),
        damage: spec.damage.evaluate(caster) * power(caster),
        speed: spec.speed.evaluate(caster),
        max_distance: spec.max_distance.evaluate(caster),
        knockback: spec.knockback.evaluate(caster),
        aim: spec.aim,
        count: spec.count,
        spread_deg: spec.spread_deg,
        piercing: spec.piercing,
        bounce: spec.bounce,
        tracking: spec.tracking,
        grapple: spec.grapple,
        exclude: ctx.exclude,
    };
    let target = effects::fire_volley(state, ctx.caster, &volley);

    let now = state.now_ms;
    for i in 1..spec.burst.max(1) {
        state.scheduler.schedule(
            now + spec.burst_interval_ms * u64::from(i),
            ScheduledTask::BurstVolley {
                caster: ctx.caster,
                volley: volley.clone(),
            },
        );
    }
    target
}

fn spawn_area(state: &mut SimState, ctx: &CastContext, caster: &Actor, spec: &AreaSpec, default_scope: TargetScope) {
    let position = effects::resolve_placement(state, caster, spec.placement, &mut rand::thread_rng());
    let scale = power(caster);
    effects::spawn_zone(
        state,
        ctx.caster,
        ZoneParams {
            skill_id: ctx.skill_id.clone(),
            position,
            follow_owner: spec.placement == Placement::FollowCaster,
            radius: spec.diameter.evaluate(caster) * 0.5,
            duration_ms: spec.duration_ms,
            interval_ms: spec.interval_ms,
            damage: spec.damage.map(|f| f.evaluate(caster) * scale).unwrap_or(0.0),
            heal: spec.heal.map(|f| f.evaluate(caster) * scale).unwrap_or(0.0),
            periodic: spec.periodic,
            scope: spec.scope.unwrap_or(default_scope),
            buff_id: spec.buff_id.clone(),
            locks_movement: spec.locks_movement,
        },
    );
}

fn spawn_trap(state: &mut SimState, ctx: &CastContext, caster: &Actor, spec: &TrapSpec, one_shot: bool) {
    let position = effects::resolve_placement(state, caster, spec.placement, &mut rand::thread_rng());
    effects::spawn_trap(
        state,
        ctx.caster,
        TrapParams {
            skill_id: ctx.skill_id.clone(),
            position,
            radius: spec.radius,
            damage: spec.damage.evaluate(caster) * power(caster),
            duration_ms: spec.duration_ms,
            interval_ms: spec.interval_ms,
            one_shot,
            buff_id: spec.buff_id.clone(),
            buff_duration_secs: spec.buff_duration_secs,
        },
    );
}

/// Rush the nearest hostile at double speed until the charge runs out
fn start_charge(
    state: &mut SimState,
    services: &mut Services,
    caster: &Actor,
    buff_id: &str,
    duration_ms: u64,
) -> Option<ActorId> {
    let (target, target_pos) = state
        .alive_of(caster.faction.opposite())
        .min_by(|a, b| {
            caster
                .position
                .distance_sq_to(a.position)
                .total_cmp(&caster.position.distance_sq_to(b.position))
        })
        .map(|a| (a.id, a.position))?;

    let expires_at_ms = state.now_ms + duration_ms;
    // The buff outlives the charge so a deferred end never sees it lapse
    let buff_secs = (duration_ms + CHARGE_END_DEFER_MS) as f32 / 1000.0;
    buffs::apply(state, services, caster.id, buff_id, buff_secs);

    let actor = state.get_actor_mut(caster.id)?;
    actor.charge = Some(ChargeState {
        expires_at_ms,
        buff_id: buff_id.to_string(),
        target: Some(target),
    });
    let mut heading = actor.position.direction_to(target_pos);
    if heading.is_zero(f32::EPSILON) {
        heading = Vec2::from_angle(0.0);
    }
    actor.velocity = heading * actor.target_speed();
    actor.next_direction_change_ms = expires_at_ms;
    Some(target)
}

/// Soul infusion: top up an ally's MP and let a full bar fire immediately
fn infuse(state: &mut SimState, services: &mut Services, ctx: &CastContext, target: ActorId, amount: f32) {
    combat::restore_mp(state, target, amount);

    let ready = state
        .get_actor(target)
        .map(|a| a.is_alive() && a.active_skill.is_some() && a.vitals.mp_full())
        .unwrap_or(false);
    if !ready || ctx.depth >= MAX_FORCED_CAST_DEPTH {
        return;
    }

    let options = CastOptions {
        forced: true,
        echo: false,
        depth: ctx.depth + 1,
        exclude: None,
    };
    if let Err(e) = cast(state, services, target, options) {
        tracing::warn!(actor = %target, error = %e, "Forced cast skipped");
    }
}

/// Caster-side passive hooks that run once the cast has resolved
fn after_cast(state: &mut SimState, caster: ActorId, skill: &Skill, options: &CastOptions, primary: Option<ActorId>) {
    if options.echo {
        return;
    }
    let Some(actor) = state.get_actor(caster) else {
        return;
    };
    let passives = actor.passives.clone();
    let max_mp = actor.vitals.max_mp;
    let mut rng = rand::thread_rng();

    for passive in passives {
        match passive {
            PassiveEffect::ManaRefund { chance_pct, refund_pct } => {
                if roll_percent(&mut rng, chance_pct) {
                    let refunded = combat::restore_mp(state, caster, max_mp * refund_pct / 100.0);
                    tracing::debug!(actor = %caster, refunded, "Mana refunded");
                }
            }
            PassiveEffect::EchoCast { delay_ms } if skill.single_target => {
                let due = state.now_ms + delay_ms;
                state.scheduler.schedule(
                    due,
                    ScheduledTask::Recast {
                        caster,
                        skill: skill.id.clone(),
                        exclude: primary,
                    },
                );
            }
            _ => {}
        }
    }
}

/// Emit afterimages for active charges and end the ones that ran out
///
/// A charge that ran out within the post-collision window is held until the
/// window closes so the knockback plays out first.
pub fn update_charges(state: &mut SimState, services: &mut Services) {
    let now = state.now_ms;
    let mut trails = Vec::new();
    let mut ended = Vec::new();

    for actor in state.actors.values() {
        let Some(charge) = &actor.charge else {
            continue;
        };
        let deferred = actor
            .since_collision(now)
            .map(|elapsed| elapsed < CHARGE_END_DEFER_MS)
            .unwrap_or(false);
        if !actor.is_alive() || (now >= charge.expires_at_ms && !deferred) {
            ended.push((actor.id, charge.buff_id.clone()));
        } else {
            trails.push((actor.id, actor.position));
        }
    }

    for (actor, position) in trails {
        state.emit(SimEvent::Afterimage { actor, position });
    }
    for (id, buff_id) in ended {
        if let Some(actor) = state.get_actor_mut(id) {
            actor.charge = None;
        }
        if !buffs::remove(state, services, id, &buff_id) {
            buffs::recompute(state, services, id);
        }
        tracing::trace!(actor = %id, "Charge ended");
    }
}

/// Run every scheduled task that has come due
pub fn run_scheduled(state: &mut SimState, services: &mut Services) {
    for task in state.scheduler.pop_due(state.now_ms) {
        match task {
            ScheduledTask::ExpireShield { actor, amount } => combat::expire_shield(state, actor, amount),
            ScheduledTask::Recast { caster, skill, exclude } => {
                let options = CastOptions {
                    forced: false,
                    echo: true,
                    depth: 0,
                    exclude,
                };
                if let Err(e) = cast_skill(state, services, caster, &skill, options) {
                    tracing::warn!(actor = %caster, error = %e, "Echo cast skipped");
                }
            }
            ScheduledTask::BurstVolley { caster, volley } => {
                effects::fire_volley(state, caster, &volley);
            }
        }
    }
}
