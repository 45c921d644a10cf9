use hashbrown::HashMap;

use super::{ActiveBuff, BuffDefinition, BuffSystem};
use crate::game::state::{ActorId, BuffId};

#[derive(Debug, Clone)]
struct BuffInstance {
    buff_id: BuffId,
    stacks: u32,
    expires_at_ms: u64,
}

/// Buff storage keyed by actor, in application order
#[derive(Debug, Clone, Default)]
pub struct MemoryBuffSystem {
    definitions: HashMap<BuffId, BuffDefinition>,
    active: HashMap<ActorId, Vec<BuffInstance>>,
}

impl MemoryBuffSystem {
    pub fn new(definitions: impl IntoIterator<Item = BuffDefinition>) -> Self {
        Self {
            definitions: definitions.into_iter().map(|d| (d.id.clone(), d)).collect(),
            active: HashMap::new(),
        }
    }

    pub fn define(&mut self, definition: BuffDefinition) {
        self.definitions.insert(definition.id.clone(), definition);
    }
}

impl BuffSystem for MemoryBuffSystem {
    fn apply_buff(&mut self, actor: ActorId, buff_id: &str, duration_secs: f32, now_ms: u64) -> bool {
        let Some(def) = self.definitions.get(buff_id) else {
            return false;
        };
        let expires_at_ms = now_ms + (duration_secs.max(0.0) * 1000.0).round() as u64;
        let list = self.active.entry(actor).or_default();
        match list.iter_mut().find(|b| b.buff_id == buff_id) {
            Some(existing) => {
                existing.stacks = (existing.stacks + 1).min(def.max_stacks.max(1));
                existing.expires_at_ms = existing.expires_at_ms.max(expires_at_ms);
            }
            None => list.push(BuffInstance {
                buff_id: buff_id.to_string(),
                stacks: 1,
                expires_at_ms,
            }),
        }
        true
    }

    fn remove_buff(&mut self, actor: ActorId, buff_id: &str) -> bool {
        let Some(list) = self.active.get_mut(&actor) else {
            return false;
        };
        let before = list.len();
        list.retain(|b| b.buff_id != buff_id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.active.remove(&actor);
        }
        removed
    }

    fn has_buff(&self, actor: ActorId, buff_id: &str) -> bool {
        self.active
            .get(&actor)
            .map(|list| list.iter().any(|b| b.buff_id == buff_id))
            .unwrap_or(false)
    }

    fn active_buffs(&self, actor: ActorId) -> Vec<ActiveBuff> {
        self.active
            .get(&actor)
            .map(|list| {
                list.iter()
                    .map(|b| ActiveBuff {
                        buff_id: b.buff_id.clone(),
                        stacks: b.stacks,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn buff_definition(&self, buff_id: &str) -> Option<BuffDefinition> {
        self.definitions.get(buff_id).cloned()
    }

    fn expire(&mut self, now_ms: u64) -> Vec<(ActorId, BuffId)> {
        let mut expired = Vec::new();
        for (actor, list) in self.active.iter_mut() {
            list.retain(|b| {
                if b.expires_at_ms <= now_ms {
                    expired.push((*actor, b.buff_id.clone()));
                    false
                } else {
                    true
                }
            });
        }
        self.active.retain(|_, list| !list.is_empty());
        expired
    }

    fn clear_actor(&mut self, actor: ActorId) {
        self.active.remove(&actor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::StatAttribute;
    use crate::services::{BuffEffect, ModifierKind};
    use uuid::Uuid;

    fn create_test_system() -> MemoryBuffSystem {
        MemoryBuffSystem::new([BuffDefinition {
            id: "rage".into(),
            effects: vec![BuffEffect {
                attribute: StatAttribute::Attack,
                kind: ModifierKind::Percentage,
                value: 20.0,
            }],
            disable_movement: false,
            exposes_weakness: false,
            slippery: false,
            max_stacks: 3,
        }])
    }

    #[test]
    fn test_unknown_buff_rejected() {
        let mut buffs = create_test_system();
        assert!(!buffs.apply_buff(Uuid::new_v4(), "nope", 1.0, 0));
    }

    #[test]
    fn test_stacks_capped() {
        let mut buffs = create_test_system();
        let actor = Uuid::new_v4();
        for _ in 0..5 {
            assert!(buffs.apply_buff(actor, "rage", 2.0, 0));
        }
        assert_eq!(buffs.active_buffs(actor)[0].stacks, 3);
    }

    #[test]
    fn test_expire_reports_removed() {
        let mut buffs = create_test_system();
        let actor = Uuid::new_v4();
        buffs.apply_buff(actor, "rage", 1.0, 0);

        assert!(buffs.expire(999).is_empty());
        assert_eq!(buffs.expire(1_000), vec![(actor, "rage".to_string())]);
        assert!(!buffs.has_buff(actor, "rage"));
    }

    #[test]
    fn test_refresh_extends_expiry() {
        let mut buffs = create_test_system();
        let actor = Uuid::new_v4();
        buffs.apply_buff(actor, "rage", 1.0, 0);
        buffs.apply_buff(actor, "rage", 1.0, 800);
        assert!(buffs.expire(1_000).is_empty());
        assert_eq!(buffs.expire(1_800).len(), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut buffs = create_test_system();
        let actor = Uuid::new_v4();
        buffs.apply_buff(actor, "rage", 5.0, 0);
        assert!(buffs.remove_buff(actor, "rage"));
        assert!(!buffs.remove_buff(actor, "rage"));

        buffs.apply_buff(actor, "rage", 5.0, 0);
        buffs.clear_actor(actor);
        assert!(buffs.active_buffs(actor).is_empty());
    }
}
