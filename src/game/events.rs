//! Simulation events and the observer bus they are published on
//!
//! The core never calls into presentation code. Every observable change is
//! pushed onto the state's outbox during the tick and published once the tick
//! completes, either to in-process closures or to channel receivers that can
//! live on other threads.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::Serialize;

use crate::game::state::{ActorId, BuffId, EffectKind, EntityId, Faction, SkillId};
use crate::services::DroppedLoot;
use crate::util::vec2::Vec2;

/// What dealt a hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum HitSource {
    Collision,
    Skill(SkillId),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SimEvent {
    // Lifecycle
    ActorSpawned { actor: ActorId, faction: Faction, is_boss: bool, position: Vec2 },
    Died { actor: ActorId, killer: Option<ActorId>, is_boss: bool },
    Injured { actor: ActorId, revive_at_ms: u64 },
    Revived { actor: ActorId, position: Vec2 },
    Despawned { actor: ActorId },

    // Motion and render hooks
    Motion { actor: ActorId, position: Vec2, velocity: Vec2 },
    Knockback { actor: ActorId, velocity: Vec2 },
    Afterimage { actor: ActorId, position: Vec2 },

    // Combat
    Damaged {
        attacker: ActorId,
        target: ActorId,
        amount: u32,
        absorbed: u32,
        is_critical: bool,
        hp: f32,
        source: HitSource,
    },
    Missed { attacker: ActorId, target: ActorId },
    Nullified { attacker: ActorId, target: ActorId, protector: ActorId },
    Healed { target: ActorId, amount: f32, hp: f32 },
    ShieldChanged { actor: ActorId, shield: f32 },
    ManaChanged { actor: ActorId, mp: f32, max_mp: f32 },

    // Skills and effects
    SkillCast { caster: ActorId, skill: SkillId, forced: bool, echo: bool },
    EffectSpawned { effect: EntityId, owner: ActorId, kind: EffectKind, position: Vec2 },
    EffectExpired { effect: EntityId, owner: ActorId, kind: EffectKind },

    // Buffs
    BuffApplied { actor: ActorId, buff: BuffId },
    BuffRemoved { actor: ActorId, buff: BuffId },
    MovementLockChanged { actor: ActorId, can_move: bool },

    // Session progression
    KillCountChanged { total: u64 },
    CrisisChanged { value: u32 },
    BossSpawned { actor: ActorId },
    BossDefeated { actor: ActorId },
    ExperienceGained { member: ActorId, amount: u64 },
    AffinityGained { member: ActorId, amount: u32 },
    LootDropped { source: ActorId, loot: DroppedLoot },

    // Resource nodes
    NodeSpawned { node: EntityId, node_type: String, position: Vec2 },
    NodeHit { node: EntityId, harvester: ActorId, hp: u32 },
    ResourceHarvested { node: EntityId, node_type: String, harvester: ActorId, drops: Vec<DroppedLoot> },
}

type Subscriber = Box<dyn FnMut(&SimEvent) + Send>;

/// Observer registry for simulation events
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Subscriber>,
    channels: Vec<Sender<SimEvent>>,
    dropped: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a closure called for every published event
    pub fn subscribe<F>(&mut self, f: F)
    where
        F: FnMut(&SimEvent) + Send + 'static,
    {
        self.subscribers.push(Box::new(f));
    }

    /// Open a bounded channel receiving every published event
    ///
    /// A full receiver drops events rather than stalling the tick; a
    /// disconnected receiver is forgotten on the next publish.
    pub fn channel(&mut self, capacity: usize) -> Receiver<SimEvent> {
        let (tx, rx) = bounded(capacity.max(1));
        self.channels.push(tx);
        rx
    }

    pub fn publish(&mut self, events: &[SimEvent]) {
        if events.is_empty() {
            return;
        }
        for subscriber in self.subscribers.iter_mut() {
            for event in events {
                subscriber(event);
            }
        }

        let mut dropped = 0u64;
        self.channels.retain(|tx| {
            for event in events {
                match tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => dropped += 1,
                    Err(TrySendError::Disconnected(_)) => return false,
                }
            }
            true
        });
        if dropped > 0 {
            tracing::debug!(dropped, "Event receiver full, events dropped");
            self.dropped += dropped;
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len() + self.channels.len()
    }

    /// Events dropped because a channel receiver was full
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .field("channels", &self.channels.len())
            .field("dropped", &self.dropped)
            .finish()
    }
}
