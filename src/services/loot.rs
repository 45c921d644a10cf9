use hashbrown::HashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{DroppedLoot, LootSystem};
use crate::util::vec2::Vec2;

/// One row of a drop table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropEntry {
    pub item_id: String,
    /// Chance in percent
    pub chance_pct: f32,
    #[serde(default = "default_quantity")]
    pub min_qty: u32,
    #[serde(default = "default_quantity")]
    pub max_qty: u32,
}

fn default_quantity() -> u32 {
    1
}

impl DropEntry {
    /// Roll this entry; returns the quantity on success
    pub fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<u32> {
        if rng.gen_range(0.0..100.0) >= self.chance_pct {
            return None;
        }
        let lo = self.min_qty.max(1);
        let hi = self.max_qty.max(lo);
        Some(rng.gen_range(lo..=hi))
    }
}

/// Loot tables keyed by name. The first entry that rolls wins.
#[derive(Debug, Clone, Default)]
pub struct DropTableLoot {
    tables: HashMap<String, Vec<DropEntry>>,
}

impl DropTableLoot {
    pub fn new(tables: HashMap<String, Vec<DropEntry>>) -> Self {
        Self { tables }
    }
}

impl LootSystem for DropTableLoot {
    fn generate_loot(&mut self, source_id: &str, drop_table: &str, x: f32, y: f32) -> Option<DroppedLoot> {
        let Some(entries) = self.tables.get(drop_table) else {
            tracing::warn!(source = source_id, table = drop_table, "Unknown drop table");
            return None;
        };
        let mut rng = rand::thread_rng();
        entries.iter().find_map(|entry| {
            entry.roll(&mut rng).map(|quantity| DroppedLoot {
                item_id: entry.item_id.clone(),
                quantity,
                position: Vec2::new(x, y),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_loot() -> DropTableLoot {
        let mut tables = HashMap::new();
        tables.insert(
            "slime".to_string(),
            vec![
                DropEntry {
                    item_id: "gel".into(),
                    chance_pct: 100.0,
                    min_qty: 2,
                    max_qty: 4,
                },
                DropEntry {
                    item_id: "never".into(),
                    chance_pct: 100.0,
                    min_qty: 1,
                    max_qty: 1,
                },
            ],
        );
        tables.insert(
            "empty".to_string(),
            vec![DropEntry {
                item_id: "ghost".into(),
                chance_pct: 0.0,
                min_qty: 1,
                max_qty: 1,
            }],
        );
        DropTableLoot::new(tables)
    }

    #[test]
    fn test_first_successful_entry_wins() {
        let mut loot = create_test_loot();
        let drop = loot.generate_loot("slime_01", "slime", 10.0, 20.0).unwrap();
        assert_eq!(drop.item_id, "gel");
        assert!((2..=4).contains(&drop.quantity));
        assert_eq!(drop.position, Vec2::new(10.0, 20.0));
    }

    #[test]
    fn test_zero_chance_drops_nothing() {
        let mut loot = create_test_loot();
        assert!(loot.generate_loot("x", "empty", 0.0, 0.0).is_none());
    }

    #[test]
    fn test_unknown_table() {
        let mut loot = create_test_loot();
        assert!(loot.generate_loot("x", "missing", 0.0, 0.0).is_none());
    }
}
