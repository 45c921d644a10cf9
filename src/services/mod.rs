//! External collaborators consumed by the simulation
//!
//! The simulation is constructed with a full [`Services`] set; there are no
//! late-bound or optional system references. Each trait is narrow
//! and every module here also carries a small in-memory implementation used by
//! the headless driver and the tests.

use serde::{Deserialize, Serialize};

use crate::game::skill::{PassiveSkill, Skill};
use crate::game::state::{ActorId, ActorTemplate, BuffId, StatAttribute};
use crate::util::vec2::Vec2;

pub mod buffs;
pub mod content;
pub mod director;
pub mod loot;
pub mod nodes;

pub use buffs::MemoryBuffSystem;
pub use content::Catalog;
pub use director::RosterDirector;
pub use loot::{DropEntry, DropTableLoot};
pub use nodes::NodeCatalog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierKind {
    Flat,
    Percentage,
}

/// One stat modifier carried by a buff
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BuffEffect {
    pub attribute: StatAttribute,
    #[serde(rename = "type")]
    pub kind: ModifierKind,
    pub value: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuffDefinition {
    pub id: BuffId,
    #[serde(default)]
    pub effects: Vec<BuffEffect>,
    #[serde(default)]
    pub disable_movement: bool,
    /// Marks the holder so the next hit it takes is a guaranteed crit
    #[serde(default)]
    pub exposes_weakness: bool,
    /// Shortens the holder's wander re-roll interval
    #[serde(default)]
    pub slippery: bool,
    #[serde(default = "default_max_stacks")]
    pub max_stacks: u32,
}

fn default_max_stacks() -> u32 {
    1
}

/// Snapshot of one active buff on an actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveBuff {
    pub buff_id: BuffId,
    pub stacks: u32,
}

/// Timed stat modifiers. Storage and timing belong to the implementation.
pub trait BuffSystem: Send {
    /// Apply or refresh a buff. Returns false for an unknown buff id.
    fn apply_buff(&mut self, actor: ActorId, buff_id: &str, duration_secs: f32, now_ms: u64) -> bool;
    fn remove_buff(&mut self, actor: ActorId, buff_id: &str) -> bool;
    fn has_buff(&self, actor: ActorId, buff_id: &str) -> bool;
    /// Active buffs in application order
    fn active_buffs(&self, actor: ActorId) -> Vec<ActiveBuff>;
    fn buff_definition(&self, buff_id: &str) -> Option<BuffDefinition>;
    /// Remove every buff that has run out and report what was removed
    fn expire(&mut self, now_ms: u64) -> Vec<(ActorId, BuffId)>;
    /// Drop all buffs held by an actor
    fn clear_actor(&mut self, actor: ActorId);
}

/// Skill and NPC data lookups
pub trait SkillProvider: Send {
    fn active_skill(&self, id: &str) -> Option<Skill>;
    fn passive_skill(&self, id: &str) -> Option<PassiveSkill>;
    fn job_exclusive_skill(&self, id: &str) -> Option<PassiveSkill>;
}

/// Item dropped into the arena
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedLoot {
    pub item_id: String,
    pub quantity: u32,
    pub position: Vec2,
}

pub trait LootSystem: Send {
    fn generate_loot(&mut self, source_id: &str, drop_table: &str, x: f32, y: f32) -> Option<DroppedLoot>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub node_type: String,
    pub max_hp: u32,
    pub radius: f32,
}

pub trait ResourceNodeSystem: Send {
    fn node_definition(&self, node_type: &str) -> Option<NodeDefinition>;
    /// Node types that may spawn on a stage; empty means none
    fn node_types_for_stage(&self, stage: &str) -> Vec<String>;
    /// Items produced when a node is depleted
    fn roll_drops(&mut self, node_type: &str, stage: &str, position: Vec2) -> Vec<DroppedLoot>;
}

/// Supplies enemies for periodic spawns and performs the boss spawn decision
pub trait EncounterDirector: Send {
    fn next_enemy(&mut self, stage: &str) -> Option<ActorTemplate>;
    /// Called once each time the crisis meter fills
    fn boss_for(&mut self, stage: &str) -> Option<ActorTemplate>;
}

/// Full collaborator set injected at construction
pub struct Services {
    pub buffs: Box<dyn BuffSystem>,
    pub skills: Box<dyn SkillProvider>,
    pub loot: Box<dyn LootSystem>,
    pub nodes: Box<dyn ResourceNodeSystem>,
    pub director: Box<dyn EncounterDirector>,
}

impl Services {
    pub fn new(
        buffs: Box<dyn BuffSystem>,
        skills: Box<dyn SkillProvider>,
        loot: Box<dyn LootSystem>,
        nodes: Box<dyn ResourceNodeSystem>,
        director: Box<dyn EncounterDirector>,
    ) -> Self {
        Self {
            buffs,
            skills,
            loot,
            nodes,
            director,
        }
    }

    /// In-memory collaborators backed by the embedded catalog
    pub fn from_catalog(catalog: &Catalog) -> Self {
        Self::new(
            Box::new(catalog.buff_system()),
            Box::new(catalog.clone()),
            Box::new(catalog.loot()),
            Box::new(catalog.node_catalog()),
            Box::new(catalog.director()),
        )
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}
