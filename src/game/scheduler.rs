//! Timestamp-keyed queue of deferred work
//!
//! Delayed re-casts, burst volleys and shield decay are queued here and
//! polled once per tick against the simulated clock. Cancelling everything an
//! actor owns is a single filter over the queue.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::game::state::{ActorId, SkillId};
use crate::game::systems::effects::ProjectileVolley;

#[derive(Debug, Clone, PartialEq)]
pub enum ScheduledTask {
    /// Take back a previously granted shield amount
    ExpireShield { actor: ActorId, amount: f32 },
    /// Cast `skill` again, avoiding `exclude` when picking a target
    Recast {
        caster: ActorId,
        skill: SkillId,
        exclude: Option<ActorId>,
    },
    /// Fire one more volley of a burst projectile skill
    BurstVolley { caster: ActorId, volley: ProjectileVolley },
}

impl ScheduledTask {
    /// Actor whose despawn cancels this task
    pub fn owner(&self) -> ActorId {
        match self {
            Self::ExpireShield { actor, .. } => *actor,
            Self::Recast { caster, .. } => *caster,
            Self::BurstVolley { caster, .. } => *caster,
        }
    }
}

#[derive(Debug)]
struct Entry {
    due_ms: u64,
    seq: u64,
    task: ScheduledTask,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due_ms == other.due_ms && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due_ms, self.seq).cmp(&(other.due_ms, other.seq))
    }
}

/// Min-heap of tasks ordered by due time, then insertion order
#[derive(Debug, Default)]
pub struct Scheduler {
    queue: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due_ms: u64, task: ScheduledTask) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(Entry { due_ms, seq, task }));
    }

    /// Remove and return every task due at or before `now_ms`, earliest first
    pub fn pop_due(&mut self, now_ms: u64) -> Vec<ScheduledTask> {
        let mut due = Vec::new();
        while let Some(Reverse(entry)) = self.queue.peek() {
            if entry.due_ms > now_ms {
                break;
            }
            if let Some(Reverse(entry)) = self.queue.pop() {
                due.push(entry.task);
            }
        }
        due
    }

    /// Drop every task owned by `actor`. Returns how many were removed.
    pub fn cancel_owner(&mut self, actor: ActorId) -> usize {
        let before = self.queue.len();
        self.queue.retain(|Reverse(entry)| entry.task.owner() != actor);
        before - self.queue.len()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn shield_task(actor: ActorId, amount: f32) -> ScheduledTask {
        ScheduledTask::ExpireShield { actor, amount }
    }

    #[test]
    fn test_pop_due_in_time_order() {
        let mut scheduler = Scheduler::new();
        let actor = Uuid::new_v4();
        scheduler.schedule(300, shield_task(actor, 3.0));
        scheduler.schedule(100, shield_task(actor, 1.0));
        scheduler.schedule(200, shield_task(actor, 2.0));

        assert!(scheduler.pop_due(50).is_empty());
        let due = scheduler.pop_due(250);
        assert_eq!(due, vec![shield_task(actor, 1.0), shield_task(actor, 2.0)]);
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_same_due_time_keeps_insertion_order() {
        let mut scheduler = Scheduler::new();
        let actor = Uuid::new_v4();
        for i in 0..5 {
            scheduler.schedule(100, shield_task(actor, i as f32));
        }
        let due = scheduler.pop_due(100);
        let amounts: Vec<f32> = due
            .iter()
            .map(|t| match t {
                ScheduledTask::ExpireShield { amount, .. } => *amount,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(amounts, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_cancel_owner() {
        let mut scheduler = Scheduler::new();
        let gone = Uuid::new_v4();
        let stays = Uuid::new_v4();
        scheduler.schedule(100, shield_task(gone, 1.0));
        scheduler.schedule(
            100,
            ScheduledTask::Recast {
                caster: gone,
                skill: "bolt".into(),
                exclude: None,
            },
        );
        scheduler.schedule(100, shield_task(stays, 1.0));

        assert_eq!(scheduler.cancel_owner(gone), 2);
        assert_eq!(scheduler.pop_due(100), vec![shield_task(stays, 1.0)]);
        assert!(scheduler.is_empty());
    }
}
