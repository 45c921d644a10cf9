//! Transient skill effects
//!
//! Orbiting blades, projectiles, zones and traps. Each live effect is polled
//! once per tick against the simulated clock. An effect whose owner has left
//! the registry expires on its next poll, even if the owner's despawn already
//! missed it.

use std::f32::consts::{FRAC_PI_2, TAU};

use rand::seq::SliceRandom;
use rand::Rng;
use smallvec::SmallVec;

use crate::game::constants::arena::EDGE_MARGIN;
use crate::game::constants::skills::{
    GRAPPLE_ARRIVAL_DISTANCE, GRAPPLE_MAX_DRAG_MS, GRAPPLE_PULL_SPEED, GRAPPLE_SWEEP_KNOCKBACK, ORBIT_RADIUS,
    PROJECTILE_MAX_LIFETIME_MS, PROJECTILE_RADIUS,
};
use crate::game::events::{HitSource, SimEvent};
use crate::game::skill::{AimMode, BounceSpec, Compass, HitPolicy, OrbitSpec, Placement, TargetScope};
use crate::game::state::{
    Actor, ActorId, BuffId, EffectBody, EffectKind, EntityId, Faction, GrapplePhase, HitTracker, OrbitBody, ProjectileBody,
    SimState, SkillId, TrapBody, TransientEffect, ZoneBody,
};
use crate::game::systems::{buffs, combat};
use crate::services::Services;
use crate::util::vec2::Vec2;

/// Resolved parameters for one volley of a projectile skill
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectileVolley {
    pub skill_id: SkillId,
    pub damage: f32,
    pub speed: f32,
    pub max_distance: f32,
    pub knockback: f32,
    pub aim: AimMode,
    pub count: u32,
    pub spread_deg: f32,
    pub piercing: bool,
    pub bounce: Option<BounceSpec>,
    pub tracking: bool,
    pub grapple: bool,
    /// Target the aim must never pick
    pub exclude: Option<ActorId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneParams {
    pub skill_id: SkillId,
    pub position: Vec2,
    pub follow_owner: bool,
    pub radius: f32,
    pub duration_ms: u64,
    pub interval_ms: u64,
    pub damage: f32,
    pub heal: f32,
    pub periodic: bool,
    pub scope: TargetScope,
    pub buff_id: Option<BuffId>,
    pub locks_movement: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrapParams {
    pub skill_id: SkillId,
    pub position: Vec2,
    pub radius: f32,
    pub damage: f32,
    pub duration_ms: u64,
    pub interval_ms: u64,
    /// Fires on the first hostile to step in, then disappears
    pub one_shot: bool,
    pub buff_id: Option<BuffId>,
    pub buff_duration_secs: f32,
}

// ============================================================================
// Spawning
// ============================================================================

fn push_effect(state: &mut SimState, effect: TransientEffect) -> EntityId {
    let id = effect.id;
    state.emit(SimEvent::EffectSpawned {
        effect: id,
        owner: effect.owner,
        kind: effect.kind(),
        position: effect.position,
    });
    tracing::trace!(effect = id, owner = %effect.owner, kind = ?effect.kind(), "Effect spawned");
    state.effects.push(effect);
    id
}

/// Spread `spec.count` blades evenly around the caster
pub fn spawn_orbits(
    state: &mut SimState,
    owner: ActorId,
    skill_id: &str,
    spec: &OrbitSpec,
    damage: f32,
    knockback: f32,
) -> usize {
    let Some(caster) = state.get_actor(owner) else {
        return 0;
    };
    let (origin, faction) = (caster.position, caster.faction);
    let count = spec.count.max(1);
    let expires_at_ms = state.now_ms + spec.duration_ms;

    for i in 0..count {
        let angle = TAU * i as f32 / count as f32;
        let id = state.next_entity_id();
        push_effect(
            state,
            TransientEffect {
                id,
                owner,
                faction,
                skill_id: skill_id.to_string(),
                position: origin + Vec2::from_angle(angle) * spec.orbit_radius,
                radius: ORBIT_RADIUS,
                damage,
                knockback,
                expires_at_ms,
                hits: HitTracker::new(spec.hit_policy),
                body: EffectBody::Orbit(OrbitBody {
                    angle,
                    orbit_radius: spec.orbit_radius,
                    angular_speed: spec.angular_speed,
                }),
                expired: false,
            },
        );
    }
    count as usize
}

/// Fire one volley from the caster. Returns the actor the volley was aimed at.
pub fn fire_volley(state: &mut SimState, owner: ActorId, volley: &ProjectileVolley) -> Option<ActorId> {
    let caster = state.get_actor(owner)?;
    if !caster.is_alive() {
        return None;
    }
    let (origin, faction) = (caster.position, caster.faction);
    let mut rng = rand::thread_rng();
    let (heading, target) = aim(state, origin, faction.opposite(), volley.aim, volley.exclude, &mut rng);

    let count = volley.count.max(1);
    let spread = volley.spread_deg.to_radians();
    let policy = volley
        .bounce
        .map(|b| HitPolicy::Cooldown { ms: b.cooldown_ms })
        .unwrap_or(HitPolicy::Once);
    let expires_at_ms = state.now_ms + PROJECTILE_MAX_LIFETIME_MS;

    for i in 0..count {
        let offset = (i as f32 - (count - 1) as f32 * 0.5) * spread;
        let id = state.next_entity_id();
        push_effect(
            state,
            TransientEffect {
                id,
                owner,
                faction,
                skill_id: volley.skill_id.clone(),
                position: origin,
                radius: PROJECTILE_RADIUS,
                damage: volley.damage,
                knockback: volley.knockback,
                expires_at_ms,
                hits: HitTracker::new(policy),
                body: EffectBody::Projectile(ProjectileBody {
                    direction: heading.rotate(offset),
                    speed: volley.speed.max(0.0),
                    traveled: 0.0,
                    max_distance: volley.max_distance,
                    piercing: volley.piercing || volley.grapple,
                    bounces_left: volley.bounce.map(|b| b.max_bounces),
                    tracking: if volley.tracking { target } else { None },
                    grapple: volley.grapple.then_some(GrapplePhase::Flying),
                }),
                expired: false,
            },
        );
    }
    target
}

pub fn spawn_zone(state: &mut SimState, owner: ActorId, params: ZoneParams) -> Option<EntityId> {
    let faction = state.get_actor(owner)?.faction;
    let id = state.next_entity_id();
    let now = state.now_ms;
    Some(push_effect(
        state,
        TransientEffect {
            id,
            owner,
            faction,
            skill_id: params.skill_id,
            position: params.position,
            radius: params.radius.max(0.0),
            damage: params.damage,
            knockback: 0.0,
            expires_at_ms: now + params.duration_ms,
            hits: HitTracker::new(HitPolicy::Once),
            body: EffectBody::Zone(ZoneBody {
                follow_owner: params.follow_owner,
                scope: params.scope,
                interval_ms: params.interval_ms.max(1),
                next_pulse_ms: now,
                heal: params.heal,
                periodic: params.periodic,
                buff_id: params.buff_id,
                locks_movement: params.locks_movement,
                occupants: SmallVec::new(),
            }),
            expired: false,
        },
    ))
}

pub fn spawn_trap(state: &mut SimState, owner: ActorId, params: TrapParams) -> Option<EntityId> {
    let faction = state.get_actor(owner)?.faction;
    let id = state.next_entity_id();
    let now = state.now_ms;
    Some(push_effect(
        state,
        TransientEffect {
            id,
            owner,
            faction,
            skill_id: params.skill_id,
            position: params.position,
            radius: params.radius.max(0.0),
            damage: params.damage,
            knockback: 0.0,
            expires_at_ms: now + params.duration_ms,
            hits: HitTracker::new(HitPolicy::Once),
            body: EffectBody::Trap(TrapBody {
                one_shot: params.one_shot,
                interval_ms: params.interval_ms.max(1),
                next_pulse_ms: now,
                buff_id: params.buff_id,
                buff_duration_secs: params.buff_duration_secs,
            }),
            expired: false,
        },
    ))
}

/// Where a zone or trap cast by `caster` lands
pub fn resolve_placement<R: Rng + ?Sized>(state: &SimState, caster: &Actor, placement: Placement, rng: &mut R) -> Vec2 {
    match placement {
        Placement::Caster | Placement::FollowCaster => caster.position,
        Placement::LowestHpAlly => state
            .alive_of(caster.faction)
            .min_by(|a, b| a.vitals.hp_ratio().total_cmp(&b.vitals.hp_ratio()))
            .map(|a| a.position)
            .unwrap_or(caster.position),
        Placement::Random => state.arena.random_point(rng, EDGE_MARGIN),
    }
}

fn compass(direction: Compass) -> Vec2 {
    match direction {
        Compass::North => Vec2::NORTH,
        Compass::South => Vec2::SOUTH,
        Compass::East => Vec2::EAST,
        Compass::West => Vec2::WEST,
    }
}

fn random_heading<R: Rng + ?Sized>(rng: &mut R) -> Vec2 {
    Vec2::from_angle(rng.gen_range(0.0..TAU))
}

/// Initial heading for a volley plus the target it was aimed at, if any
fn aim<R: Rng + ?Sized>(
    state: &SimState,
    origin: Vec2,
    hostile: Faction,
    mode: AimMode,
    exclude: Option<ActorId>,
    rng: &mut R,
) -> (Vec2, Option<ActorId>) {
    let candidates: Vec<(ActorId, Vec2)> = state
        .alive_of(hostile)
        .filter(|a| Some(a.id) != exclude)
        .map(|a| (a.id, a.position))
        .collect();

    let by_distance = |a: &&(ActorId, Vec2), b: &&(ActorId, Vec2)| {
        origin.distance_sq_to(a.1).total_cmp(&origin.distance_sq_to(b.1))
    };
    let picked = match mode {
        AimMode::Fixed(direction) => return (compass(direction), None),
        AimMode::RandomDirection => return (random_heading(rng), None),
        AimMode::Nearest => candidates.iter().min_by(by_distance),
        AimMode::Farthest => candidates.iter().max_by(by_distance),
        AimMode::RandomTarget => candidates.choose(rng),
    };

    match picked {
        Some(&(id, position)) => {
            let heading = origin.direction_to(position);
            if heading.is_zero(f32::EPSILON) {
                (random_heading(rng), Some(id))
            } else {
                (heading, Some(id))
            }
        }
        None => (random_heading(rng), None),
    }
}

// ============================================================================
// Per-tick update
// ============================================================================

/// Advance every live effect by one tick and drop the expired ones
pub fn update(state: &mut SimState, services: &mut Services, dt: f32) {
    let mut active = std::mem::take(&mut state.effects);

    for effect in active.iter_mut() {
        if effect.expired {
            continue;
        }
        if state.get_actor(effect.owner).is_none() || state.now_ms >= effect.expires_at_ms {
            effect.expired = true;
        } else {
            match effect.kind() {
                EffectKind::Orbit => step_orbit(state, services, effect, dt),
                EffectKind::Projectile => step_projectile(state, services, effect, dt),
                EffectKind::Zone => step_zone(state, services, effect),
                EffectKind::Trap => step_trap(state, services, effect),
            }
        }
        if effect.expired {
            retire(state, services, effect);
        }
    }

    // Owners that left mid-pass
    for effect in active.iter_mut() {
        if !effect.expired && state.get_actor(effect.owner).is_none() {
            effect.expired = true;
            retire(state, services, effect);
        }
    }

    let spawned = std::mem::take(&mut state.effects);
    active.retain(|e| !e.expired);
    active.extend(spawned);
    state.effects = active;
}

/// Expire everything `owner` has in play
pub fn dispose_owned(state: &mut SimState, services: &mut Services, owner: ActorId) -> usize {
    let (mut owned, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut state.effects)
        .into_iter()
        .partition(|e| e.owner == owner);
    state.effects = rest;

    for effect in owned.iter_mut().filter(|e| !e.expired) {
        effect.expired = true;
        retire(state, services, effect);
    }
    owned.len()
}

fn retire(state: &mut SimState, services: &mut Services, effect: &mut TransientEffect) {
    if let EffectBody::Zone(zone) = &mut effect.body {
        let occupants = std::mem::take(&mut zone.occupants);
        let buff_id = zone.buff_id.clone();
        let locks = zone.locks_movement;
        for id in occupants {
            release_occupant(state, services, id, buff_id.as_deref(), locks);
        }
    }
    state.emit(SimEvent::EffectExpired {
        effect: effect.id,
        owner: effect.owner,
        kind: effect.kind(),
    });
}

fn overlapping(state: &SimState, faction: Faction, point: Vec2, radius: f32) -> SmallVec<[ActorId; 8]> {
    state
        .alive_of(faction)
        .filter(|a| a.overlaps(point, radius))
        .map(|a| a.id)
        .collect()
}

fn skill_hit(state: &mut SimState, services: &mut Services, effect: &TransientEffect, target: ActorId) {
    if effect.damage <= 0.0 {
        return;
    }
    combat::strike_and_settle(
        state,
        services,
        effect.owner,
        target,
        Some(effect.damage),
        HitSource::Skill(effect.skill_id.clone()),
    );
}

fn step_orbit(state: &mut SimState, services: &mut Services, effect: &mut TransientEffect, dt: f32) {
    let EffectBody::Orbit(orbit) = &mut effect.body else {
        return;
    };
    let Some(owner) = state.get_actor(effect.owner) else {
        effect.expired = true;
        return;
    };
    let center = owner.position;
    orbit.angle = (orbit.angle + orbit.angular_speed * dt) % TAU;
    effect.position = center + Vec2::from_angle(orbit.angle) * orbit.orbit_radius;

    let now = state.now_ms;
    for target in overlapping(state, effect.faction.opposite(), effect.position, effect.radius) {
        if !effect.hits.try_hit(target, now) {
            continue;
        }
        skill_hit(state, services, effect, target);
        combat::knock_away(state, target, center, effect.knockback);
    }
}

fn step_projectile(state: &mut SimState, services: &mut Services, effect: &mut TransientEffect, dt: f32) {
    let now = state.now_ms;
    let EffectBody::Projectile(body) = &mut effect.body else {
        return;
    };
    if let Some(GrapplePhase::Dragging { anchor, .. }) = body.grapple {
        drag_owner(state, services, effect, anchor, dt);
        return;
    }

    if let Some(target) = body.tracking {
        match state.get_actor(target).filter(|a| a.is_alive()) {
            Some(t) => {
                let heading = effect.position.direction_to(t.position);
                if !heading.is_zero(f32::EPSILON) {
                    body.direction = heading;
                }
            }
            None => body.tracking = None,
        }
    }

    let step = body.speed * dt;
    effect.position += body.direction * step;
    body.traveled += step;
    let spent = body.traveled >= body.max_distance;

    for target in overlapping(state, effect.faction.opposite(), effect.position, effect.radius) {
        if !effect.hits.try_hit(target, now) {
            continue;
        }
        skill_hit(state, services, effect, target);
        combat::knock_away(state, target, effect.position, effect.knockback);
        if !continue_after_hit(state, effect, target) {
            effect.expired = true;
            return;
        }
    }

    if spent {
        effect.expired = true;
        return;
    }
    if state.arena.contains(effect.position) {
        return;
    }

    let EffectBody::Projectile(body) = &mut effect.body else {
        return;
    };
    if body.grapple == Some(GrapplePhase::Flying) {
        let anchor = state.arena.clamp(effect.position, EDGE_MARGIN);
        body.grapple = Some(GrapplePhase::Dragging {
            anchor,
            started_ms: now,
        });
        effect.position = anchor;
        effect.expires_at_ms = now + GRAPPLE_MAX_DRAG_MS;
        tracing::trace!(effect = effect.id, owner = %effect.owner, "Grapple anchored");
    } else {
        effect.expired = true;
    }
}

/// Bounce or pierce after a hit. Returns false when the projectile is spent.
fn continue_after_hit(state: &SimState, effect: &mut TransientEffect, hit: ActorId) -> bool {
    let EffectBody::Projectile(body) = &mut effect.body else {
        return false;
    };
    match body.bounces_left {
        Some(0) => false,
        Some(left) => {
            let others: Vec<(ActorId, Vec2)> = state
                .alive_of(effect.faction.opposite())
                .filter(|a| a.id != hit)
                .map(|a| (a.id, a.position))
                .collect();
            let Some(&(next, position)) = others.choose(&mut rand::thread_rng()) else {
                return false;
            };
            body.bounces_left = Some(left - 1);
            body.direction = effect.position.direction_to(position);
            if body.tracking.is_some() {
                body.tracking = Some(next);
            }
            true
        }
        None => body.piercing,
    }
}

/// Pull the owner toward the grapple anchor, sweeping hostiles aside
fn drag_owner(state: &mut SimState, services: &mut Services, effect: &mut TransientEffect, anchor: Vec2, dt: f32) {
    let now = state.now_ms;
    let Some(owner) = state.get_actor_mut(effect.owner) else {
        effect.expired = true;
        return;
    };
    let to_anchor = anchor - owner.position;
    let (heading, distance) = to_anchor.normalize_with_length();
    let step = GRAPPLE_PULL_SPEED * dt;
    if distance <= step.max(GRAPPLE_ARRIVAL_DISTANCE) {
        owner.position = anchor;
        effect.expired = true;
    } else {
        owner.position += heading * step;
    }
    let (center, reach) = (owner.position, owner.radius());
    effect.position = center;

    let side = heading.rotate(FRAC_PI_2);
    for target in overlapping(state, effect.faction.opposite(), center, reach) {
        if !effect.hits.try_hit(target, now) {
            continue;
        }
        let Some(offset) = state.get_actor(target).map(|t| t.position - center) else {
            continue;
        };
        skill_hit(state, services, effect, target);
        let shove = if side.dot(offset) >= 0.0 { side } else { -side };
        if state.get_actor(target).is_some() {
            combat::knock(state, target, shove * GRAPPLE_SWEEP_KNOCKBACK);
        }
    }
}

fn step_zone(state: &mut SimState, services: &mut Services, effect: &mut TransientEffect) {
    let now = state.now_ms;
    let EffectBody::Zone(zone) = &mut effect.body else {
        return;
    };
    if zone.follow_owner {
        if let Some(owner) = state.get_actor(effect.owner) {
            effect.position = owner.position;
        }
    }

    let inside = overlapping(state, effect.faction.scoped(zone.scope), effect.position, effect.radius);
    let left: SmallVec<[ActorId; 8]> = zone.occupants.iter().copied().filter(|id| !inside.contains(id)).collect();
    let entered: SmallVec<[ActorId; 8]> = inside.iter().copied().filter(|id| !zone.occupants.contains(id)).collect();
    zone.occupants.retain(|id| inside.contains(id));
    zone.occupants.extend(entered.iter().copied());

    let buff_id = zone.buff_id.clone();
    let locks = zone.locks_movement;
    let remaining_secs = effect.expires_at_ms.saturating_sub(now) as f32 / 1000.0;

    for id in left {
        release_occupant(state, services, id, buff_id.as_deref(), locks);
    }
    for id in entered {
        admit_occupant(state, services, id, buff_id.as_deref(), locks, remaining_secs);
    }

    let EffectBody::Zone(zone) = &mut effect.body else {
        return;
    };
    let mut pulses = 0;
    while now >= zone.next_pulse_ms {
        zone.next_pulse_ms += zone.interval_ms;
        pulses += 1;
    }
    let (periodic, heal) = (zone.periodic, zone.heal);
    let occupants = zone.occupants.clone();

    for _ in 0..pulses {
        for &id in &occupants {
            if !periodic && !effect.hits.try_hit(id, now) {
                continue;
            }
            skill_hit(state, services, effect, id);
            if heal > 0.0 {
                combat::heal(state, id, heal);
            }
        }
    }
}

fn admit_occupant(
    state: &mut SimState,
    services: &mut Services,
    id: ActorId,
    buff_id: Option<&str>,
    locks: bool,
    duration_secs: f32,
) {
    if let Some(buff) = buff_id {
        if let Some(actor) = state.get_actor_mut(id) {
            *actor.zone_buffs.entry(buff.to_string()).or_insert(0) += 1;
        }
        buffs::apply(state, services, id, buff, duration_secs);
    }
    if locks {
        if let Some(actor) = state.get_actor_mut(id) {
            actor.area_locks += 1;
        }
        buffs::recompute(state, services, id);
    }
}

fn release_occupant(state: &mut SimState, services: &mut Services, id: ActorId, buff_id: Option<&str>, locks: bool) {
    if let Some(buff) = buff_id {
        // another zone may still be granting the same buff
        let held_elsewhere = state
            .get_actor_mut(id)
            .and_then(|actor| {
                let count = actor.zone_buffs.get_mut(buff)?;
                *count = count.saturating_sub(1);
                let remaining = *count;
                if remaining == 0 {
                    actor.zone_buffs.remove(buff);
                }
                Some(remaining > 0)
            })
            .unwrap_or(false);
        if !held_elsewhere {
            buffs::remove(state, services, id, buff);
        }
    }
    if locks {
        if let Some(actor) = state.get_actor_mut(id) {
            actor.area_locks = actor.area_locks.saturating_sub(1);
        }
        buffs::recompute(state, services, id);
    }
}

fn step_trap(state: &mut SimState, services: &mut Services, effect: &mut TransientEffect) {
    let now = state.now_ms;
    let EffectBody::Trap(trap) = &mut effect.body else {
        return;
    };
    let one_shot = trap.one_shot;
    if !one_shot {
        if now < trap.next_pulse_ms {
            return;
        }
        trap.next_pulse_ms = now + trap.interval_ms;
    }
    let buff_id = trap.buff_id.clone();
    let buff_secs = trap.buff_duration_secs;

    let mut victims = overlapping(state, effect.faction.opposite(), effect.position, effect.radius);
    if victims.is_empty() {
        return;
    }
    if one_shot {
        victims.truncate(1);
        effect.expired = true;
    }
    for victim in victims {
        skill_hit(state, services, effect, victim);
        if let Some(buff) = &buff_id {
            buffs::apply(state, services, victim, buff, buff_secs);
        }
    }
}
