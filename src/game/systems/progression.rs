//! Session progression: kills, crisis meter, boss spawn, EXP and affinity,
//! plus the capped periodic enemy spawner.

use crate::config::SimConfig;
use crate::game::constants::progression::{
    AFFINITY_PER_KILL, BOSS_BONUS_EXP, CRISIS_MAX, CRISIS_PER_KILL, KILLER_EXP_BONUS, LOW_CAP_AFFINITY_MULTIPLIER,
};
use crate::game::events::SimEvent;
use crate::game::state::{ActorId, Faction, SimState};
use crate::game::systems::{harvest, lifecycle};
use crate::services::Services;

/// What progression needs to know about a kill
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KillRecord {
    pub victim: ActorId,
    pub killer: Option<ActorId>,
    pub is_boss: bool,
    pub exp_reward: u64,
}

pub fn on_enemy_killed(state: &mut SimState, services: &mut Services, record: &KillRecord) {
    state.session.total_kills += 1;
    let total = state.session.total_kills;
    state.emit(SimEvent::KillCountChanged { total });

    if record.is_boss {
        state.session.boss_spawned = false;
        state.session.boss_id = None;
        state.emit(SimEvent::BossDefeated { actor: record.victim });
        tracing::info!(boss = %record.victim, "Boss defeated");
        distribute_exp(state, BOSS_BONUS_EXP, None);
    } else if !state.session.boss_spawned && !state.boss_alive() {
        add_crisis(state, services, CRISIS_PER_KILL);
    }

    distribute_exp(state, record.exp_reward, record.killer);
    award_affinity(state, record.killer);
}

/// Raise the crisis meter; a full meter resets and summons the boss
pub fn add_crisis(state: &mut SimState, services: &mut Services, amount: u32) {
    state.session.crisis = (state.session.crisis + amount).min(CRISIS_MAX);
    let value = state.session.reported_crisis();
    state.emit(SimEvent::CrisisChanged { value });

    if state.session.crisis < CRISIS_MAX {
        return;
    }
    state.session.crisis = 0;
    state.session.boss_spawned = true;
    trigger_boss_spawn(state, services);
    let value = state.session.reported_crisis();
    state.emit(SimEvent::CrisisChanged { value });
}

fn trigger_boss_spawn(state: &mut SimState, services: &mut Services) {
    let stage = state.stage.clone();
    let Some(template) = services.director.boss_for(&stage) else {
        state.session.boss_spawned = false;
        return;
    };
    match lifecycle::spawn_actor(state, services, &template, Faction::Enemy, true, None) {
        Ok(id) => {
            state.session.boss_id = Some(id);
            state.emit(SimEvent::BossSpawned { actor: id });
        }
        Err(e) => {
            tracing::warn!(error = %e, "Boss spawn failed");
            state.session.boss_spawned = false;
        }
    }
}

/// Base EXP to every party member, plus the killer's bonus share
pub fn distribute_exp(state: &mut SimState, base: u64, killer: Option<ActorId>) {
    if base == 0 {
        return;
    }
    let bonus = (base as f32 * KILLER_EXP_BONUS).round() as u64;
    let grants: Vec<(ActorId, u64)> = state
        .session
        .party
        .iter()
        .map(|m| (m.id, if Some(m.id) == killer { base + bonus } else { base }))
        .collect();

    for (member, amount) in grants {
        *state.session.experience.entry(member).or_insert(0) += amount;
        state.emit(SimEvent::ExperienceGained { member, amount });
    }
}

/// Affinity for the credited killer when it is a party member
pub fn award_affinity(state: &mut SimState, killer: Option<ActorId>) {
    let Some(member) = killer.and_then(|k| state.session.party_member(k)).copied() else {
        return;
    };
    // TODO: confirm whether the low level-cap multiplier is intended policy
    let amount = if member.is_low_cap() {
        AFFINITY_PER_KILL * LOW_CAP_AFFINITY_MULTIPLIER
    } else {
        AFFINITY_PER_KILL
    };
    *state.session.affinity.entry(member.id).or_insert(0) += amount;
    state.emit(SimEvent::AffinityGained {
        member: member.id,
        amount,
    });
}

/// Periodic spawn attempts, each checked against its cap first
pub fn update(state: &mut SimState, services: &mut Services, config: &SimConfig) {
    let now = state.now_ms;

    if now >= state.session.next_enemy_spawn_ms {
        state.session.next_enemy_spawn_ms = now + config.enemy_spawn_interval_ms;
        if state.is_combat_stage() {
            try_spawn_enemy(state, services, config.max_enemies);
        }
    }

    if now >= state.session.next_node_spawn_ms {
        state.session.next_node_spawn_ms = now + config.resource_spawn_interval_ms;
        harvest::try_spawn_node(state, services, config.max_resource_nodes);
    }
}

/// Spawn one regular enemy from the director if under the cap
pub fn try_spawn_enemy(state: &mut SimState, services: &mut Services, max_enemies: usize) -> Option<ActorId> {
    if state.regular_enemy_count() >= max_enemies {
        tracing::trace!(max_enemies, "Enemy cap reached");
        return None;
    }
    let stage = state.stage.clone();
    let template = services.director.next_enemy(&stage)?;
    match lifecycle::spawn_actor(state, services, &template, Faction::Enemy, false, None) {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::warn!(error = %e, "Enemy spawn failed");
            None
        }
    }
}
