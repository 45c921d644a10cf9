//! Actor lifecycle: spawn, death, injury, revive and despawn
//!
//! Every transition checks the current life state first, so calling
//! [`settle`] redundantly for the same actor within a tick is harmless.

use uuid::Uuid;

use crate::game::constants::lifecycle::{REVIVE_DELAY_MS, REVIVE_SAMPLES};
use crate::game::error::SimError;
use crate::game::events::SimEvent;
use crate::game::state::{Actor, ActorId, ActorTemplate, Faction, LifeState, SimState};
use crate::game::systems::arena::{farthest_position, safe_spawn_position};
use crate::game::systems::movement::start_wander;
use crate::game::systems::progression::{self, KillRecord};
use crate::game::systems::{buffs, effects};
use crate::services::Services;
use crate::util::vec2::Vec2;

/// Spawn an actor from a template at a clear position
pub fn spawn_actor(
    state: &mut SimState,
    services: &mut Services,
    template: &ActorTemplate,
    faction: Faction,
    is_boss: bool,
    id: Option<ActorId>,
) -> Result<ActorId, SimError> {
    let id = id.unwrap_or_else(Uuid::new_v4);
    if state.actors.contains_key(&id) {
        return Err(SimError::AlreadyPresent(id));
    }

    let occupied: Vec<Vec2> = state.actors.values().map(|a| a.position).collect();
    let hostiles: Vec<Vec2> = state.alive_of(faction.opposite()).map(|a| a.position).collect();
    let position = safe_spawn_position(&state.arena, &occupied, &hostiles);

    let mut actor = Actor::from_template(id, template, faction, position);
    actor.is_boss = is_boss;
    resolve_passives(&mut actor, template, services);

    if let Some(skill) = &template.active_skill {
        if services.skills.active_skill(skill).is_none() {
            tracing::warn!(actor = %id, skill = %skill, "Unknown active skill on template");
        }
    }

    let now = state.now_ms;
    actor.last_regen_ms = now;
    start_wander(&mut actor, now, &mut rand::thread_rng());

    state.add_actor(actor)?;
    state.emit(SimEvent::ActorSpawned {
        actor: id,
        faction,
        is_boss,
        position,
    });

    if is_boss {
        tracing::info!(actor = %id, template = %template.template_id, "Boss spawned");
    } else {
        tracing::debug!(actor = %id, template = %template.template_id, ?faction, "Actor spawned");
    }
    Ok(id)
}

fn resolve_passives(actor: &mut Actor, template: &ActorTemplate, services: &Services) {
    for passive_id in &template.passive_skills {
        match services.skills.passive_skill(passive_id) {
            Some(passive) => actor.passives.extend(passive.effects),
            None => tracing::warn!(actor = %actor.id, passive = %passive_id, "Unknown passive skill"),
        }
    }
    if let Some(job_id) = &template.job_skill {
        match services.skills.job_exclusive_skill(job_id) {
            Some(job) => actor.passives.extend(job.effects),
            None => tracing::warn!(actor = %actor.id, skill = %job_id, "Unknown job skill"),
        }
    }
}

/// Run the death or injury transition if the actor has no HP left
///
/// Returns true if a transition happened.
pub fn settle(state: &mut SimState, services: &mut Services, victim: ActorId, killer: Option<ActorId>) -> bool {
    let Some(actor) = state.get_actor(victim) else {
        return false;
    };
    if !actor.is_alive() || actor.vitals.hp > 0.0 {
        return false;
    }
    match actor.faction {
        Faction::Enemy => kill_enemy(state, services, victim, killer),
        Faction::Ally => injure_ally(state, services, victim),
    }
    true
}

fn kill_enemy(state: &mut SimState, services: &mut Services, victim: ActorId, killer: Option<ActorId>) {
    let Some(actor) = state.get_actor_mut(victim) else {
        return;
    };
    actor.life = LifeState::Dead;
    actor.velocity = Vec2::ZERO;
    let record = KillRecord {
        victim,
        killer,
        is_boss: actor.is_boss,
        exp_reward: actor.exp_reward,
    };
    let position = actor.position;
    let drop_table = actor.drop_table.clone();
    let source = actor.template_id.clone();

    state.emit(SimEvent::Died {
        actor: victim,
        killer,
        is_boss: record.is_boss,
    });
    tracing::debug!(actor = %victim, killer = ?killer, "Enemy died");

    if let Some(table) = drop_table {
        if let Some(loot) = services.loot.generate_loot(&source, &table, position.x, position.y) {
            state.emit(SimEvent::LootDropped { source: victim, loot });
        }
    }

    progression::on_enemy_killed(state, services, &record);
    despawn(state, services, victim);
}

fn injure_ally(state: &mut SimState, services: &mut Services, victim: ActorId) {
    let revive_at_ms = state.now_ms + REVIVE_DELAY_MS;
    let Some(actor) = state.get_actor_mut(victim) else {
        return;
    };
    actor.life = LifeState::Injured;
    actor.vitals.hp = 0.0;
    actor.vitals.shield = 0.0;
    actor.velocity = Vec2::ZERO;
    let charge = actor.charge.take();
    actor.revive_at_ms = Some(revive_at_ms);

    if let Some(charge) = charge {
        buffs::remove(state, services, victim, &charge.buff_id);
    }

    state.emit(SimEvent::Injured {
        actor: victim,
        revive_at_ms,
    });
    tracing::info!(actor = %victim, revive_at_ms, "Ally injured");
}

/// Revive every injured ally whose timer has run out
pub fn update(state: &mut SimState, services: &mut Services) {
    let now = state.now_ms;
    let due: Vec<ActorId> = state
        .actors
        .values()
        .filter(|a| a.is_injured() && a.revive_at_ms.map(|t| now >= t).unwrap_or(false))
        .map(|a| a.id)
        .collect();

    for id in due {
        revive(state, services, id);
    }
}

fn revive(state: &mut SimState, services: &mut Services, id: ActorId) {
    let threats: Vec<Vec2> = state.alive_of(Faction::Enemy).map(|a| a.position).collect();
    let position = farthest_position(&state.arena, &threats, REVIVE_SAMPLES);
    let now = state.now_ms;

    let Some(actor) = state.get_actor_mut(id) else {
        return;
    };
    if !actor.is_injured() {
        return;
    }
    actor.life = LifeState::Alive;
    actor.revive_at_ms = None;
    actor.vitals.hp = actor.vitals.max_hp;
    actor.position = position;
    actor.last_collision_ms = None;
    start_wander(actor, now, &mut rand::thread_rng());

    state.emit(SimEvent::Revived { actor: id, position });
    tracing::info!(actor = %id, "Ally revived");
    buffs::recompute(state, services, id);
}

/// Remove an actor and everything it owns. A second call is a no-op.
pub fn despawn(state: &mut SimState, services: &mut Services, id: ActorId) -> bool {
    let Some(actor) = state.remove_actor(id) else {
        return false;
    };

    effects::dispose_owned(state, services, id);
    let cancelled = state.scheduler.cancel_owner(id);
    services.buffs.clear_actor(id);
    state.pair_cooldowns.retain(|(a, b), _| *a != id && *b != id);

    // A boss leaving without dying must not wedge the crisis meter
    if state.session.boss_id == Some(id) && !actor.is_dead() {
        state.session.boss_spawned = false;
        state.session.boss_id = None;
    }

    state.emit(SimEvent::Despawned { actor: id });
    tracing::debug!(actor = %id, cancelled, "Actor despawned");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::ChargeState;
    use crate::game::test_support::{create_test_services, spawn_test_actor, test_state};

    #[test]
    fn test_spawn_resolves_passives() {
        let mut state = test_state();
        let mut services = create_test_services();
        let catalog = crate::services::Catalog::builtin().unwrap();
        let knight = catalog.party_template("knight").unwrap();

        let id = spawn_actor(&mut state, &mut services, knight, Faction::Ally, false, None).unwrap();
        let actor = state.get_actor(id).unwrap();
        // battle_rhythm + two knight_oath effects
        assert_eq!(actor.passives.len(), 3);
        assert_eq!(actor.base_stats, actor.stats);
        assert!(actor.velocity.length() > 0.0);
    }

    #[test]
    fn test_spawn_duplicate_id_rejected() {
        let mut state = test_state();
        let mut services = create_test_services();
        let catalog = crate::services::Catalog::builtin().unwrap();
        let knight = catalog.party_template("knight").unwrap();
        let id = Uuid::new_v4();
        spawn_actor(&mut state, &mut services, knight, Faction::Ally, false, Some(id)).unwrap();
        assert_eq!(
            spawn_actor(&mut state, &mut services, knight, Faction::Ally, false, Some(id)),
            Err(SimError::AlreadyPresent(id))
        );
    }

    #[test]
    fn test_settle_ignores_healthy() {
        let mut state = test_state();
        let mut services = create_test_services();
        let id = spawn_test_actor(&mut state, Faction::Enemy, Vec2::new(100.0, 100.0));
        assert!(!settle(&mut state, &mut services, id, None));
        assert!(state.get_actor(id).is_some());
    }

    #[test]
    fn test_enemy_death_removes_and_counts_once() {
        let mut state = test_state();
        let mut services = create_test_services();
        let killer = spawn_test_actor(&mut state, Faction::Ally, Vec2::new(100.0, 100.0));
        let id = spawn_test_actor(&mut state, Faction::Enemy, Vec2::new(140.0, 100.0));
        state.get_actor_mut(id).unwrap().vitals.hp = 0.0;

        assert!(settle(&mut state, &mut services, id, Some(killer)));
        assert!(!settle(&mut state, &mut services, id, Some(killer)));
        assert!(state.get_actor(id).is_none());
        assert_eq!(state.session.total_kills, 1);
        assert_eq!(state.session.crisis, 5);
    }

    #[test]
    fn test_ally_injury_and_revive_timer() {
        let mut state = test_state();
        let mut services = create_test_services();
        let id = spawn_test_actor(&mut state, Faction::Ally, Vec2::new(100.0, 100.0));
        state.now_ms = 5_000;
        state.get_actor_mut(id).unwrap().vitals.hp = 0.0;

        assert!(settle(&mut state, &mut services, id, None));
        assert!(!settle(&mut state, &mut services, id, None));
        let actor = state.get_actor(id).unwrap();
        assert!(actor.is_injured() && !actor.is_dead());
        assert_eq!(actor.revive_at_ms, Some(65_000));

        state.now_ms = 64_999;
        update(&mut state, &mut services);
        assert!(state.get_actor(id).unwrap().is_injured());

        state.now_ms = 65_000;
        update(&mut state, &mut services);
        let actor = state.get_actor(id).unwrap();
        assert!(actor.is_alive());
        assert_eq!(actor.vitals.hp, actor.vitals.max_hp);
        assert!(actor.velocity.length() > 0.0);
    }

    #[test]
    fn test_injury_drops_charge_buff() {
        let mut state = test_state();
        let mut services = create_test_services();
        let id = spawn_test_actor(&mut state, Faction::Ally, Vec2::new(100.0, 100.0));
        let base_attack = state.get_actor(id).unwrap().stats.attack;
        assert!(buffs::apply(&mut state, &mut services, id, "charge", 10.0));
        {
            let actor = state.get_actor_mut(id).unwrap();
            assert!(actor.stats.attack > base_attack);
            actor.charge = Some(ChargeState {
                expires_at_ms: 10_000,
                buff_id: "charge".into(),
                target: None,
            });
            actor.vitals.hp = 0.0;
        }

        assert!(settle(&mut state, &mut services, id, None));
        let actor = state.get_actor(id).unwrap();
        assert!(actor.charge.is_none());
        assert_eq!(actor.stats.attack, base_attack);
        assert!(!buffs::has(&services, id, "charge"));
    }

    #[test]
    fn test_despawn_idempotent_and_cleans_up() {
        let mut state = test_state();
        let mut services = create_test_services();
        let id = spawn_test_actor(&mut state, Faction::Ally, Vec2::new(100.0, 100.0));
        crate::game::systems::combat::grant_shield(&mut state, id, 10.0, 1_000);
        buffs::apply(&mut state, &mut services, id, "haste", 5.0);

        assert!(despawn(&mut state, &mut services, id));
        assert!(!despawn(&mut state, &mut services, id));
        assert!(state.scheduler.is_empty());
        assert!(!buffs::has(&services, id, "haste"));
    }

    #[test]
    fn test_boss_despawn_without_death_resets_session() {
        let mut state = test_state();
        let mut services = create_test_services();
        let id = spawn_test_actor(&mut state, Faction::Enemy, Vec2::new(100.0, 100.0));
        state.session.boss_spawned = true;
        state.session.boss_id = Some(id);
        despawn(&mut state, &mut services, id);
        assert!(!state.session.boss_spawned);
        assert!(state.session.boss_id.is_none());
    }
}
