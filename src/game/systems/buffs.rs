//! Buff integration layer
//!
//! The only code that talks to the external buff system. Live stats are
//! always rebuilt from the actor's base snapshot plus every buff active right
//! now; nothing is ever undone incrementally.

use hashbrown::HashMap;

use crate::game::events::SimEvent;
use crate::game::state::{ActorId, CombatStats, SimState, StatAttribute};
use crate::services::{ActiveBuff, BuffDefinition, ModifierKind, Services};

/// Apply a buff to an alive actor and refresh its stats
pub fn apply(state: &mut SimState, services: &mut Services, actor_id: ActorId, buff_id: &str, duration_secs: f32) -> bool {
    match state.get_actor(actor_id) {
        Some(actor) if actor.is_alive() => {}
        _ => return false,
    }
    let Some(definition) = services.buffs.buff_definition(buff_id) else {
        tracing::warn!(actor = %actor_id, buff = buff_id, "Unknown buff, skipping");
        return false;
    };
    if !services.buffs.apply_buff(actor_id, buff_id, duration_secs, state.now_ms) {
        return false;
    }

    if definition.exposes_weakness {
        if let Some(actor) = state.get_actor_mut(actor_id) {
            actor.passive.exposed_weakness = true;
        }
    }
    state.emit(SimEvent::BuffApplied {
        actor: actor_id,
        buff: buff_id.to_string(),
    });
    recompute(state, services, actor_id);
    true
}

/// Remove a buff and refresh stats. Returns false if it was not active.
pub fn remove(state: &mut SimState, services: &mut Services, actor_id: ActorId, buff_id: &str) -> bool {
    if !services.buffs.remove_buff(actor_id, buff_id) {
        return false;
    }
    on_removed(state, services, actor_id, buff_id);
    true
}

pub fn has(services: &Services, actor_id: ActorId, buff_id: &str) -> bool {
    services.buffs.has_buff(actor_id, buff_id)
}

pub fn active(services: &Services, actor_id: ActorId) -> Vec<ActiveBuff> {
    services.buffs.active_buffs(actor_id)
}

pub fn definition(services: &Services, buff_id: &str) -> Option<BuffDefinition> {
    services.buffs.buff_definition(buff_id)
}

/// Drain expirations from the buff system and refresh the affected actors
pub fn update(state: &mut SimState, services: &mut Services) {
    for (actor_id, buff_id) in services.buffs.expire(state.now_ms) {
        on_removed(state, services, actor_id, &buff_id);
    }
}

fn on_removed(state: &mut SimState, services: &mut Services, actor_id: ActorId, buff_id: &str) {
    let Some(actor) = state.get_actor_mut(actor_id) else {
        return;
    };
    let exposes = services
        .buffs
        .buff_definition(buff_id)
        .map(|d| d.exposes_weakness)
        .unwrap_or(false);
    if exposes && !services.buffs.has_buff(actor_id, buff_id) {
        actor.passive.exposed_weakness = false;
    }
    state.emit(SimEvent::BuffRemoved {
        actor: actor_id,
        buff: buff_id.to_string(),
    });
    recompute(state, services, actor_id);
}

/// Rebuild live stats and movement flags from the snapshot and current buffs
pub fn recompute(state: &mut SimState, services: &Services, actor_id: ActorId) {
    let active: Vec<(BuffDefinition, u32)> = services
        .buffs
        .active_buffs(actor_id)
        .into_iter()
        .filter_map(|b| services.buffs.buff_definition(&b.buff_id).map(|d| (d, b.stacks)))
        .collect();

    let Some(actor) = state.get_actor_mut(actor_id) else {
        return;
    };
    actor.stats = compute_stats(&actor.base_stats, &active);
    actor.slipping = active.iter().any(|(d, _)| d.slippery);

    let disabled = active.iter().any(|(d, _)| d.disable_movement);
    let can_move = !disabled && actor.area_locks == 0;
    if can_move != actor.can_move {
        actor.can_move = can_move;
        state.emit(SimEvent::MovementLockChanged {
            actor: actor_id,
            can_move,
        });
    }
}

/// `(base + sum of flat) * (1 + sum of percent / 100)`, per attribute
pub fn compute_stats(base: &CombatStats, active: &[(BuffDefinition, u32)]) -> CombatStats {
    let mut flat: HashMap<StatAttribute, f32> = HashMap::new();
    let mut percent: HashMap<StatAttribute, f32> = HashMap::new();

    for (definition, stacks) in active {
        let stacks = (*stacks).max(1) as f32;
        for effect in &definition.effects {
            let bucket = match effect.kind {
                ModifierKind::Flat => &mut flat,
                ModifierKind::Percentage => &mut percent,
            };
            *bucket.entry(effect.attribute).or_insert(0.0) += effect.value * stacks;
        }
    }

    let mut stats = *base;
    for attribute in flat.keys().chain(percent.keys()).copied().collect::<Vec<_>>() {
        let value = (base.get(attribute) + flat.get(&attribute).copied().unwrap_or(0.0))
            * (1.0 + percent.get(&attribute).copied().unwrap_or(0.0) / 100.0);
        stats.set(attribute, value);
    }
    stats.move_speed = stats.move_speed.max(0.0);
    stats
}
