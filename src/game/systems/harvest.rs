//! Resource node harvesting and spawning

use rand::seq::SliceRandom;

use crate::game::constants::harvest::{ACTOR_KNOCKBACK, HIT_DAMAGE, INVINCIBILITY_MS};
use crate::game::events::SimEvent;
use crate::game::state::{ActorId, EntityId, Faction, ResourceNode, SimState};
use crate::game::systems::arena::safe_spawn_position;
use crate::game::systems::combat;
use crate::services::Services;
use crate::util::vec2::Vec2;

/// Any alive ally touching a vulnerable node hits it once
pub fn update(state: &mut SimState, services: &mut Services) {
    let now = state.now_ms;
    let contacts: Vec<(EntityId, ActorId)> = state
        .nodes
        .iter()
        .filter(|node| now >= node.invincible_until_ms)
        .filter_map(|node| {
            state
                .alive_of(Faction::Ally)
                .find(|a| a.overlaps(node.position, node.radius))
                .map(|a| (node.id, a.id))
        })
        .collect();

    for (node, harvester) in contacts {
        hit_node(state, services, node, harvester);
    }
}

/// Returns true if the hit depleted the node
pub fn hit_node(state: &mut SimState, services: &mut Services, node_id: EntityId, harvester: ActorId) -> bool {
    let now = state.now_ms;
    let Some(index) = state.nodes.iter().position(|n| n.id == node_id) else {
        return false;
    };
    let node = &mut state.nodes[index];
    if now < node.invincible_until_ms {
        return false;
    }
    node.hp = node.hp.saturating_sub(HIT_DAMAGE);
    node.invincible_until_ms = now + INVINCIBILITY_MS;
    let (hp, position) = (node.hp, node.position);

    combat::knock_away(state, harvester, position, ACTOR_KNOCKBACK);
    state.emit(SimEvent::NodeHit {
        node: node_id,
        harvester,
        hp,
    });
    if hp > 0 {
        return false;
    }

    let node = state.nodes.swap_remove(index);
    let drops = services.nodes.roll_drops(&node.node_type, &state.stage, node.position);
    tracing::debug!(node = node.id, node_type = %node.node_type, drops = drops.len(), "Node harvested");
    state.emit(SimEvent::ResourceHarvested {
        node: node.id,
        node_type: node.node_type,
        harvester,
        drops,
    });
    true
}

/// Place one node of a type allowed on the current stage, if under the cap
pub fn try_spawn_node(state: &mut SimState, services: &mut Services, max_nodes: usize) -> Option<EntityId> {
    if state.nodes.len() >= max_nodes {
        return None;
    }
    let types = services.nodes.node_types_for_stage(&state.stage);
    let node_type = types.choose(&mut rand::thread_rng())?.clone();
    let Some(definition) = services.nodes.node_definition(&node_type) else {
        tracing::warn!(node_type = %node_type, stage = %state.stage, "Unknown node type for stage");
        return None;
    };

    let occupied: Vec<Vec2> = state
        .actors
        .values()
        .map(|a| a.position)
        .chain(state.nodes.iter().map(|n| n.position))
        .collect();
    let position = safe_spawn_position(&state.arena, &occupied, &[]);

    let id = state.next_entity_id();
    state.nodes.push(ResourceNode {
        id,
        node_type: definition.node_type.clone(),
        position,
        hp: definition.max_hp.max(1),
        max_hp: definition.max_hp.max(1),
        radius: definition.radius,
        invincible_until_ms: 0,
    });
    state.emit(SimEvent::NodeSpawned {
        node: id,
        node_type: definition.node_type,
        position,
    });
    Some(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::Arena;
    use crate::game::test_support::{create_test_services, spawn_test_actor, test_state};

    fn place_node(state: &mut SimState, node_type: &str, hp: u32, position: Vec2) -> EntityId {
        let id = state.next_entity_id();
        state.nodes.push(ResourceNode {
            id,
            node_type: node_type.into(),
            position,
            hp,
            max_hp: hp,
            radius: 30.0,
            invincible_until_ms: 0,
        });
        id
    }

    #[test]
    fn test_hit_then_invincible() {
        let mut state = test_state();
        let mut services = create_test_services();
        let node = place_node(&mut state, "oak", 3, Vec2::new(300.0, 300.0));
        let ally = spawn_test_actor(&mut state, Faction::Ally, Vec2::new(340.0, 300.0));

        update(&mut state, &mut services);
        assert_eq!(state.nodes[0].hp, 2);
        let pushed = state.get_actor(ally).unwrap().velocity;
        assert!((pushed.length() - ACTOR_KNOCKBACK).abs() < 1e-3);
        assert!(pushed.x > 0.0);

        state.now_ms = INVINCIBILITY_MS - 1;
        update(&mut state, &mut services);
        assert_eq!(state.nodes[0].hp, 2);

        state.now_ms = INVINCIBILITY_MS;
        update(&mut state, &mut services);
        assert_eq!(state.nodes[0].hp, 1);
        assert_eq!(state.nodes[0].id, node);
    }

    #[test]
    fn test_depletion_removes_and_reports() {
        let mut state = test_state();
        let mut services = create_test_services();
        let node = place_node(&mut state, "herb_patch", 1, Vec2::new(300.0, 300.0));
        let ally = spawn_test_actor(&mut state, Faction::Ally, Vec2::new(320.0, 300.0));

        assert!(hit_node(&mut state, &mut services, node, ally));
        assert!(state.nodes.is_empty());
        assert!(state.pending_events().iter().any(|e| matches!(
            e,
            SimEvent::ResourceHarvested { node: n, harvester, .. } if *n == node && *harvester == ally
        )));
        assert!(!hit_node(&mut state, &mut services, node, ally));
    }

    #[test]
    fn test_enemies_do_not_harvest() {
        let mut state = test_state();
        let mut services = create_test_services();
        place_node(&mut state, "oak", 3, Vec2::new(300.0, 300.0));
        spawn_test_actor(&mut state, Faction::Enemy, Vec2::new(310.0, 300.0));

        update(&mut state, &mut services);
        assert_eq!(state.nodes[0].hp, 3);
    }

    #[test]
    fn test_spawn_respects_cap() {
        let mut state = test_state();
        let mut services = create_test_services();
        assert!(try_spawn_node(&mut state, &mut services, 2).is_some());
        assert!(try_spawn_node(&mut state, &mut services, 2).is_some());
        assert!(try_spawn_node(&mut state, &mut services, 2).is_none());

        let allowed = ["oak", "herb_patch"];
        assert!(state.nodes.iter().all(|n| allowed.contains(&n.node_type.as_str())));
        assert!(state.nodes.iter().all(|n| state.arena.contains(n.position)));
    }

    #[test]
    fn test_stage_without_nodes() {
        let mut state = SimState::new(Arena::new(1000.0, 800.0).unwrap(), "guild_hall", Vec::new());
        let mut services = create_test_services();
        assert!(try_spawn_node(&mut state, &mut services, 5).is_none());
        assert!(state.nodes.is_empty());
    }
}
