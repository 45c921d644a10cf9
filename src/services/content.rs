//! Embedded content catalog
//!
//! Skills, passives, buffs, actor templates, loot tables and resource nodes in
//! one JSON document. The catalog answers [`SkillProvider`] lookups directly
//! and builds the other in-memory collaborators.

use hashbrown::HashMap;
use serde::Deserialize;

use super::loot::DropEntry;
use super::{
    BuffDefinition, DropTableLoot, MemoryBuffSystem, NodeCatalog, NodeDefinition, RosterDirector,
    SkillProvider,
};
use crate::game::skill::{PassiveSkill, Skill};
use crate::game::state::ActorTemplate;

const BUILTIN_CATALOG: &str = include_str!("../../content/catalog.json");

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Catalog {
    pub skills: Vec<Skill>,
    pub passives: Vec<PassiveSkill>,
    pub job_skills: Vec<PassiveSkill>,
    pub buffs: Vec<BuffDefinition>,
    pub party: Vec<ActorTemplate>,
    pub enemies: Vec<ActorTemplate>,
    pub bosses: Vec<ActorTemplate>,
    pub loot_tables: HashMap<String, Vec<DropEntry>>,
    pub nodes: Vec<NodeDefinition>,
    pub stage_nodes: HashMap<String, Vec<String>>,
    pub node_drops: HashMap<String, Vec<DropEntry>>,
}

impl Catalog {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Catalog shipped with the crate
    pub fn builtin() -> Result<Self, serde_json::Error> {
        Self::from_json(BUILTIN_CATALOG)
    }

    pub fn party_template(&self, template_id: &str) -> Option<&ActorTemplate> {
        self.party.iter().find(|t| t.template_id == template_id)
    }

    pub fn enemy_template(&self, template_id: &str) -> Option<&ActorTemplate> {
        self.enemies
            .iter()
            .chain(self.bosses.iter())
            .find(|t| t.template_id == template_id)
    }

    pub fn buff_system(&self) -> MemoryBuffSystem {
        MemoryBuffSystem::new(self.buffs.iter().cloned())
    }

    pub fn loot(&self) -> DropTableLoot {
        DropTableLoot::new(self.loot_tables.clone())
    }

    pub fn node_catalog(&self) -> NodeCatalog {
        NodeCatalog::new(
            self.nodes.iter().cloned(),
            self.stage_nodes.clone(),
            self.node_drops.clone(),
        )
    }

    pub fn director(&self) -> RosterDirector {
        RosterDirector::new(self.enemies.clone(), self.bosses.clone())
    }
}

impl SkillProvider for Catalog {
    fn active_skill(&self, id: &str) -> Option<Skill> {
        self.skills.iter().find(|s| s.id == id).cloned()
    }

    fn passive_skill(&self, id: &str) -> Option<PassiveSkill> {
        self.passives.iter().find(|s| s.id == id).cloned()
    }

    fn job_exclusive_skill(&self, id: &str) -> Option<PassiveSkill> {
        self.job_skills.iter().find(|s| s.id == id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::skill::SkillEffect;
    use std::collections::HashSet;

    #[test]
    fn test_builtin_parses() {
        let catalog = Catalog::builtin().unwrap();
        assert!(!catalog.skills.is_empty());
        assert!(!catalog.party.is_empty());
        assert!(!catalog.enemies.is_empty());
        assert_eq!(catalog.bosses.len(), 1);
    }

    #[test]
    fn test_builtin_covers_every_effect_kind() {
        let catalog = Catalog::builtin().unwrap();
        let kinds: HashSet<&str> = catalog
            .skills
            .iter()
            .flat_map(|s| s.effects.iter().map(SkillEffect::kind))
            .collect();
        assert_eq!(kinds.len(), 15, "missing kinds, have {:?}", kinds);
    }

    #[test]
    fn test_builtin_references_resolve() {
        let catalog = Catalog::builtin().unwrap();
        let buffs = catalog.buff_system();
        for template in catalog.party.iter().chain(&catalog.enemies).chain(&catalog.bosses) {
            if let Some(skill) = &template.active_skill {
                assert!(catalog.active_skill(skill).is_some(), "skill {}", skill);
            }
            for passive in &template.passive_skills {
                assert!(catalog.passive_skill(passive).is_some(), "passive {}", passive);
            }
            if let Some(job) = &template.job_skill {
                assert!(catalog.job_exclusive_skill(job).is_some(), "job skill {}", job);
            }
            if let Some(table) = &template.drop_table {
                assert!(catalog.loot_tables.contains_key(table), "table {}", table);
            }
        }
        use crate::services::BuffSystem;
        for skill in &catalog.skills {
            for effect in &skill.effects {
                let buff = match effect {
                    SkillEffect::BuffAlly(s) | SkillEffect::BuffSelf(s) | SkillEffect::BuffEnemy(s) => {
                        Some(s.buff_id.as_str())
                    }
                    SkillEffect::ChargeEnemy(s) => Some(s.buff_id.as_str()),
                    SkillEffect::SpawnArea(s) | SkillEffect::DamageArea(s) | SkillEffect::HealingArea(s) => {
                        s.buff_id.as_deref()
                    }
                    SkillEffect::SpawnTrap(s) | SkillEffect::SpawnSpikeTrap(s) => s.buff_id.as_deref(),
                    _ => None,
                };
                if let Some(id) = buff {
                    assert!(buffs.buff_definition(id).is_some(), "buff {}", id);
                }
            }
        }
    }

    #[test]
    fn test_unknown_lookups() {
        let catalog = Catalog::builtin().unwrap();
        assert!(catalog.active_skill("does_not_exist").is_none());
        assert!(catalog.passive_skill("war_cry").is_none());
        assert!(catalog.party_template("slime").is_none());
        assert!(catalog.enemy_template("ogre_chieftain").is_some());
    }
}
