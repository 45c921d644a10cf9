//! Opposite-faction collision resolution
//!
//! Pairwise over alive actors each tick. A colliding pair trades hits both
//! ways, feeds MP and collision passives, is knocked apart and then settled,
//! each side credited to the other.

use crate::game::constants::collision::{
    HEAVIER_SHARE, KNOCKBACK_BASE, KNOCKBACK_SCALE, KNOCKBACK_WEIGHT_FACTOR, PAIR_COOLDOWN_MS, WEIGHT_EPSILON,
};
use crate::game::constants::mana::COLLISION_GAIN;
use crate::game::events::HitSource;
use crate::game::skill::PassiveEffect;
use crate::game::state::{pair_key, ActorId, Faction, SimState};
use crate::game::systems::{buffs, combat, lifecycle};
use crate::services::Services;
use crate::util::vec2::Vec2;

/// Knockback magnitudes for (a, b); the heavier side takes the smaller share
pub fn knockback_impulses(weight_a: f32, weight_b: f32) -> (f32, f32) {
    let delta = (weight_a - weight_b).abs();
    let magnitude = (KNOCKBACK_BASE + delta * KNOCKBACK_WEIGHT_FACTOR) * KNOCKBACK_SCALE;
    if delta < WEIGHT_EPSILON {
        (magnitude, magnitude)
    } else if weight_a > weight_b {
        (magnitude * HEAVIER_SHARE, magnitude)
    } else {
        (magnitude, magnitude * HEAVIER_SHARE)
    }
}

/// Find every touching opposite-faction pair not on cooldown
pub fn detect(state: &SimState) -> Vec<(ActorId, ActorId)> {
    let now = state.now_ms;
    let bodies: Vec<(ActorId, Faction, Vec2, f32)> = state
        .actors
        .values()
        .filter(|a| a.is_alive())
        .map(|a| (a.id, a.faction, a.position, a.radius()))
        .collect();

    let mut contacts = Vec::new();
    for (i, a) in bodies.iter().enumerate() {
        for b in &bodies[i + 1..] {
            if a.1 == b.1 {
                continue;
            }
            let reach = a.3 + b.3;
            if a.2.distance_sq_to(b.2) >= reach * reach {
                continue;
            }
            let cooling = state
                .pair_cooldowns
                .get(&pair_key(a.0, b.0))
                .map(|&at| now.saturating_sub(at) < PAIR_COOLDOWN_MS)
                .unwrap_or(false);
            if !cooling {
                contacts.push((a.0, b.0));
            }
        }
    }
    contacts
}

pub fn update(state: &mut SimState, services: &mut Services) {
    for (a, b) in detect(state) {
        resolve(state, services, a, b);
    }
}

fn resolve(state: &mut SimState, services: &mut Services, a: ActorId, b: ActorId) {
    // An earlier pair this tick may already have taken one of them out
    let both_alive = [a, b]
        .iter()
        .all(|id| state.get_actor(*id).map(|x| x.is_alive()).unwrap_or(false));
    if !both_alive {
        return;
    }
    let now = state.now_ms;
    state.pair_cooldowns.insert(pair_key(a, b), now);
    for id in [a, b] {
        if let Some(actor) = state.get_actor_mut(id) {
            actor.last_collision_ms = Some(now);
        }
    }

    combat::strike(state, a, b, None, HitSource::Collision);
    combat::strike(state, b, a, None, HitSource::Collision);

    for id in [a, b] {
        let gains_mp = state
            .get_actor(id)
            .map(|x| x.faction == Faction::Ally && x.active_skill.is_some())
            .unwrap_or(false);
        if gains_mp {
            combat::restore_mp(state, id, COLLISION_GAIN);
        }
        collision_passives(state, services, id);
    }

    push_apart(state, a, b);

    lifecycle::settle(state, services, b, Some(a));
    lifecycle::settle(state, services, a, Some(b));
}

fn collision_passives(state: &mut SimState, services: &mut Services, id: ActorId) {
    let Some(actor) = state.get_actor_mut(id) else {
        return;
    };
    let mut grants = Vec::new();
    for passive in &actor.passives {
        match passive {
            PassiveEffect::CritCounter { collisions } => {
                actor.passive.collision_streak += 1;
                if actor.passive.collision_streak >= (*collisions).max(1) {
                    actor.passive.collision_streak = 0;
                    actor.passive.guaranteed_crit = true;
                }
            }
            PassiveEffect::CollisionBuff { buff_id, duration_secs } => grants.push((buff_id.clone(), *duration_secs)),
            _ => {}
        }
    }
    for (buff_id, secs) in grants {
        buffs::apply(state, services, id, &buff_id, secs);
    }
}

fn push_apart(state: &mut SimState, a: ActorId, b: ActorId) {
    let (Some(actor_a), Some(actor_b)) = (state.get_actor(a), state.get_actor(b)) else {
        return;
    };
    let (impulse_a, impulse_b) = knockback_impulses(actor_a.stats.weight, actor_b.stats.weight);
    let mut away = actor_b.position.direction_to(actor_a.position);
    if away.is_zero(f32::EPSILON) {
        away = actor_a.velocity.normalize();
        if away.is_zero(f32::EPSILON) {
            away = Vec2::EAST;
        }
    }
    combat::knock(state, a, away * impulse_a);
    combat::knock(state, b, -away * impulse_b);
}
