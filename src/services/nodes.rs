use hashbrown::HashMap;

use super::loot::DropEntry;
use super::{DroppedLoot, NodeDefinition, ResourceNodeSystem};
use crate::util::vec2::Vec2;

/// Node definitions, per-stage spawn lists and per-type drop rolls
#[derive(Debug, Clone, Default)]
pub struct NodeCatalog {
    definitions: HashMap<String, NodeDefinition>,
    stages: HashMap<String, Vec<String>>,
    drops: HashMap<String, Vec<DropEntry>>,
}

impl NodeCatalog {
    pub fn new(
        definitions: impl IntoIterator<Item = NodeDefinition>,
        stages: HashMap<String, Vec<String>>,
        drops: HashMap<String, Vec<DropEntry>>,
    ) -> Self {
        Self {
            definitions: definitions
                .into_iter()
                .map(|d| (d.node_type.clone(), d))
                .collect(),
            stages,
            drops,
        }
    }
}

impl ResourceNodeSystem for NodeCatalog {
    fn node_definition(&self, node_type: &str) -> Option<NodeDefinition> {
        self.definitions.get(node_type).cloned()
    }

    fn node_types_for_stage(&self, stage: &str) -> Vec<String> {
        self.stages.get(stage).cloned().unwrap_or_default()
    }

    /// Every entry rolls independently
    fn roll_drops(&mut self, node_type: &str, stage: &str, position: Vec2) -> Vec<DroppedLoot> {
        let Some(entries) = self.drops.get(node_type) else {
            tracing::debug!(node_type, stage, "Node type has no drops");
            return Vec::new();
        };
        let mut rng = rand::thread_rng();
        entries
            .iter()
            .filter_map(|entry| {
                entry.roll(&mut rng).map(|quantity| DroppedLoot {
                    item_id: entry.item_id.clone(),
                    quantity,
                    position,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_catalog() -> NodeCatalog {
        let mut stages = HashMap::new();
        stages.insert("forest".to_string(), vec!["oak".to_string()]);
        let mut drops = HashMap::new();
        drops.insert(
            "oak".to_string(),
            vec![
                DropEntry {
                    item_id: "log".into(),
                    chance_pct: 100.0,
                    min_qty: 1,
                    max_qty: 3,
                },
                DropEntry {
                    item_id: "acorn".into(),
                    chance_pct: 100.0,
                    min_qty: 1,
                    max_qty: 1,
                },
            ],
        );
        NodeCatalog::new(
            [NodeDefinition {
                node_type: "oak".into(),
                max_hp: 3,
                radius: 30.0,
            }],
            stages,
            drops,
        )
    }

    #[test]
    fn test_stage_lookup() {
        let catalog = create_test_catalog();
        assert_eq!(catalog.node_types_for_stage("forest"), vec!["oak".to_string()]);
        assert!(catalog.node_types_for_stage("desert").is_empty());
    }

    #[test]
    fn test_roll_drops_all_entries() {
        let mut catalog = create_test_catalog();
        let drops = catalog.roll_drops("oak", "forest", Vec2::new(5.0, 5.0));
        assert_eq!(drops.len(), 2);
        assert!(drops.iter().all(|d| d.position == Vec2::new(5.0, 5.0)));
    }

    #[test]
    fn test_unknown_node_type() {
        let mut catalog = create_test_catalog();
        assert!(catalog.node_definition("granite").is_none());
        assert!(catalog.roll_drops("granite", "forest", Vec2::ZERO).is_empty());
    }
}
