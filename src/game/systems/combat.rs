//! Shared combat helpers used by collisions, skills and transient effects

use smallvec::SmallVec;

use crate::game::constants::collision::KNOCKBACK_RECOVERY_MS;
use crate::game::events::{HitSource, SimEvent};
use crate::game::scheduler::ScheduledTask;
use crate::game::skill::PassiveEffect;
use crate::game::state::{Actor, ActorId, SimState};
use crate::game::systems::damage::{self, Attack, DamageOutcome, DefenseModifiers, HitKind, Protector};
use crate::game::systems::lifecycle;
use crate::services::Services;
use crate::util::vec2::Vec2;

/// Gather the defender-side passives that apply to a hit on `target`
pub fn defense_modifiers(state: &SimState, target: &Actor) -> DefenseModifiers {
    let iron_fortress = target
        .passives
        .iter()
        .filter_map(|p| match p {
            PassiveEffect::IronFortress {
                reduction_pct,
                shielded_reduction_pct,
            } => Some((*reduction_pct, *shielded_reduction_pct)),
            _ => None,
        })
        .max_by(|a, b| a.1.total_cmp(&b.1));

    let protectors: SmallVec<[Protector; 4]> = state
        .alive_of(target.faction)
        .flat_map(|ally| {
            ally.passives.iter().filter_map(move |p| match p {
                PassiveEffect::DivineProclamation {
                    radius,
                    nullify_chance_pct,
                } if ally.position.distance_to(target.position) <= *radius => Some(Protector {
                    id: ally.id,
                    chance_pct: *nullify_chance_pct,
                }),
                _ => None,
            })
        })
        .collect();

    DefenseModifiers {
        iron_fortress,
        protectors,
    }
}

/// Run one hit through the damage pipeline without settling death
///
/// Returns None when either side is missing or the target cannot be hit.
pub fn strike(
    state: &mut SimState,
    attacker_id: ActorId,
    target_id: ActorId,
    base: Option<f32>,
    source: HitSource,
) -> Option<DamageOutcome> {
    let attack = Attack::from_actor(state.get_actor(attacker_id)?, base);
    let target = state.get_actor(target_id)?;
    if !target.is_alive() {
        return None;
    }
    let modifiers = defense_modifiers(state, target);

    let mut rng = rand::thread_rng();
    let target = state.get_actor_mut(target_id)?;
    let outcome = damage::resolve(&mut rng, &attack, target, &modifiers);
    let hp = target.vitals.hp;

    if outcome.used_guaranteed_crit {
        if let Some(attacker) = state.get_actor_mut(attacker_id) {
            attacker.passive.guaranteed_crit = false;
        }
    }

    let event = match outcome.kind {
        HitKind::Miss => SimEvent::Missed {
            attacker: attacker_id,
            target: target_id,
        },
        HitKind::Nullified { protector } => SimEvent::Nullified {
            attacker: attacker_id,
            target: target_id,
            protector,
        },
        HitKind::Landed => SimEvent::Damaged {
            attacker: attacker_id,
            target: target_id,
            amount: outcome.damage,
            absorbed: outcome.absorbed,
            is_critical: outcome.is_critical,
            hp,
            source,
        },
    };
    tracing::trace!(?event, "Hit resolved");
    state.emit(event);
    Some(outcome)
}

/// Strike, then run the lethal check on the target
pub fn strike_and_settle(
    state: &mut SimState,
    services: &mut Services,
    attacker_id: ActorId,
    target_id: ActorId,
    base: Option<f32>,
    source: HitSource,
) -> Option<DamageOutcome> {
    let outcome = strike(state, attacker_id, target_id, base, source)?;
    if outcome.kind == HitKind::Landed {
        lifecycle::settle(state, services, target_id, Some(attacker_id));
    }
    Some(outcome)
}

/// Restore HP to an alive actor. Returns the amount restored.
pub fn heal(state: &mut SimState, target_id: ActorId, amount: f32) -> f32 {
    let Some(target) = state.get_actor_mut(target_id) else {
        return 0.0;
    };
    if !target.is_alive() {
        return 0.0;
    }
    let restored = target.vitals.heal(amount);
    let hp = target.vitals.hp;
    if restored > 0.0 {
        state.emit(SimEvent::Healed {
            target: target_id,
            amount: restored,
            hp,
        });
    }
    restored
}

/// Restore MP to an alive actor. Returns the amount restored.
pub fn restore_mp(state: &mut SimState, target_id: ActorId, amount: f32) -> f32 {
    let Some(target) = state.get_actor_mut(target_id) else {
        return 0.0;
    };
    if !target.is_alive() {
        return 0.0;
    }
    let restored = target.vitals.restore_mp(amount);
    let (mp, max_mp) = (target.vitals.mp, target.vitals.max_mp);
    if restored > 0.0 {
        state.emit(SimEvent::ManaChanged {
            actor: target_id,
            mp,
            max_mp,
        });
    }
    restored
}

/// Grant a shield that decays by the same amount after `duration_ms`
pub fn grant_shield(state: &mut SimState, target_id: ActorId, amount: f32, duration_ms: u64) {
    let Some(target) = state.get_actor_mut(target_id) else {
        return;
    };
    if !target.is_alive() || amount <= 0.0 {
        return;
    }
    target.vitals.add_shield(amount);
    let shield = target.vitals.shield;
    state.emit(SimEvent::ShieldChanged {
        actor: target_id,
        shield,
    });
    let due = state.now_ms + duration_ms;
    state.scheduler.schedule(
        due,
        ScheduledTask::ExpireShield {
            actor: target_id,
            amount,
        },
    );
}

/// Take back a previously granted shield amount
pub fn expire_shield(state: &mut SimState, target_id: ActorId, amount: f32) {
    let Some(target) = state.get_actor_mut(target_id) else {
        return;
    };
    target.vitals.remove_shield(amount);
    let shield = target.vitals.shield;
    state.emit(SimEvent::ShieldChanged {
        actor: target_id,
        shield,
    });
}

/// Replace the actor's velocity with an impulse and hold it for the recovery window
pub fn knock(state: &mut SimState, target_id: ActorId, impulse: Vec2) {
    let now = state.now_ms;
    let Some(target) = state.get_actor_mut(target_id) else {
        return;
    };
    if !target.is_alive() {
        return;
    }
    target.velocity = impulse;
    target.last_collision_ms = Some(now);
    target.next_direction_change_ms = now + KNOCKBACK_RECOVERY_MS;
    state.emit(SimEvent::Knockback {
        actor: target_id,
        velocity: impulse,
    });
}

/// Push `target_id` directly away from `from` with the given magnitude
pub fn knock_away(state: &mut SimState, target_id: ActorId, from: Vec2, magnitude: f32) {
    if magnitude <= 0.0 {
        return;
    }
    let Some(target) = state.get_actor(target_id) else {
        return;
    };
    let mut dir = from.direction_to(target.position);
    if dir.is_zero(f32::EPSILON) {
        dir = target.velocity.normalize();
    }
    knock(state, target_id, dir * magnitude);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::Faction;
    use crate::game::test_support::{create_test_services, spawn_test_actor, test_state};

    #[test]
    fn test_strike_emits_damage() {
        let mut state = test_state();
        let a = spawn_test_actor(&mut state, Faction::Ally, Vec2::new(100.0, 100.0));
        let b = spawn_test_actor(&mut state, Faction::Enemy, Vec2::new(140.0, 100.0));

        let outcome = strike(&mut state, a, b, Some(25.0), HitSource::Collision).unwrap();
        assert_eq!(outcome.damage, 25);
        assert!(state
            .pending_events()
            .iter()
            .any(|e| matches!(e, SimEvent::Damaged { amount: 25, .. })));
    }

    #[test]
    fn test_guaranteed_crit_consumed_after_one_hit() {
        let mut state = test_state();
        let a = spawn_test_actor(&mut state, Faction::Ally, Vec2::new(100.0, 100.0));
        let b = spawn_test_actor(&mut state, Faction::Enemy, Vec2::new(140.0, 100.0));
        state.get_actor_mut(a).unwrap().passive.guaranteed_crit = true;

        let first = strike(&mut state, a, b, None, HitSource::Collision).unwrap();
        assert!(first.is_critical);
        assert!(!state.get_actor(a).unwrap().passive.guaranteed_crit);

        let second = strike(&mut state, a, b, None, HitSource::Collision).unwrap();
        assert!(!second.is_critical);
    }

    #[test]
    fn test_injured_target_not_struck() {
        let mut state = test_state();
        let a = spawn_test_actor(&mut state, Faction::Enemy, Vec2::new(100.0, 100.0));
        let b = spawn_test_actor(&mut state, Faction::Ally, Vec2::new(140.0, 100.0));
        state.get_actor_mut(b).unwrap().life = crate::game::state::LifeState::Injured;
        assert!(strike(&mut state, a, b, None, HitSource::Collision).is_none());
    }

    #[test]
    fn test_divine_proclamation_in_range_only() {
        let mut state = test_state();
        let near = spawn_test_actor(&mut state, Faction::Ally, Vec2::new(100.0, 100.0));
        let far = spawn_test_actor(&mut state, Faction::Ally, Vec2::new(900.0, 700.0));
        for id in [near, far] {
            state.get_actor_mut(id).unwrap().passives.push(PassiveEffect::DivineProclamation {
                radius: 150.0,
                nullify_chance_pct: 100.0,
            });
        }
        let target = state.get_actor(near).unwrap().clone();
        let modifiers = defense_modifiers(&state, &target);
        assert_eq!(modifiers.protectors.len(), 1);
        assert_eq!(modifiers.protectors[0].id, near);
    }

    #[test]
    fn test_lethal_strike_settles() {
        let mut state = test_state();
        let mut services = create_test_services();
        let a = spawn_test_actor(&mut state, Faction::Ally, Vec2::new(100.0, 100.0));
        let b = spawn_test_actor(&mut state, Faction::Enemy, Vec2::new(140.0, 100.0));
        strike_and_settle(&mut state, &mut services, a, b, Some(10_000.0), HitSource::Collision);
        assert!(state.get_actor(b).is_none());
        assert_eq!(state.session.total_kills, 1);
    }

    #[test]
    fn test_shield_expires_by_granted_amount() {
        let mut state = test_state();
        let a = spawn_test_actor(&mut state, Faction::Ally, Vec2::new(100.0, 100.0));
        grant_shield(&mut state, a, 20.0, 1_000);
        grant_shield(&mut state, a, 30.0, 5_000);
        assert_eq!(state.get_actor(a).unwrap().vitals.shield, 50.0);

        for task in state.scheduler.pop_due(1_000) {
            if let ScheduledTask::ExpireShield { actor, amount } = task {
                expire_shield(&mut state, actor, amount);
            }
        }
        assert_eq!(state.get_actor(a).unwrap().vitals.shield, 30.0);
    }

    #[test]
    fn test_heal_and_mana_capped() {
        let mut state = test_state();
        let a = spawn_test_actor(&mut state, Faction::Ally, Vec2::new(100.0, 100.0));
        state.get_actor_mut(a).unwrap().vitals.hp = 50.0;
        assert_eq!(heal(&mut state, a, 1_000.0), 50.0);
        let max_mp = state.get_actor(a).unwrap().vitals.max_mp;
        assert_eq!(restore_mp(&mut state, a, 1_000.0), max_mp);
    }

    #[test]
    fn test_knock_away_direction() {
        let mut state = test_state();
        let a = spawn_test_actor(&mut state, Faction::Enemy, Vec2::new(200.0, 100.0));
        knock_away(&mut state, a, Vec2::new(100.0, 100.0), 150.0);
        let actor = state.get_actor(a).unwrap();
        assert!(actor.velocity.approx_eq(Vec2::new(150.0, 0.0), 1e-3));
        assert!(actor.in_knockback(state.now_ms));
    }
}
