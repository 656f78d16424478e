//! One-shot effect queue
//!
//! Bounded set of in-flight effect pipelines keyed by id, oldest first.
//! Entries leave the queue when their pipeline reports completion.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Default number of concurrent effects
pub const DEFAULT_EFFECT_CAPACITY: usize = 8;

/// What happens when an effect is requested while the queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectOverflow {
    /// Reject the new effect
    #[default]
    DropNewest,
    /// Stop the oldest effect and start the new one
    EvictOldest,
}

/// Result of [`EffectQueue::make_room`]
#[derive(Debug)]
pub enum Room<T> {
    /// Queue had space
    Available,
    /// Oldest entry was removed to make space
    Evicted(Uuid, T),
    /// Queue is full and the policy keeps existing entries
    Full,
}

/// Bounded FIFO of effect entries
#[derive(Debug)]
pub struct EffectQueue<T> {
    entries: VecDeque<(Uuid, T)>,
    capacity: usize,
}

impl<T> EffectQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Ensure one free place, applying `policy` when full.
    pub fn make_room(&mut self, policy: EffectOverflow) -> Room<T> {
        if self.entries.len() < self.capacity {
            return Room::Available;
        }
        match policy {
            EffectOverflow::DropNewest => Room::Full,
            EffectOverflow::EvictOldest => match self.entries.pop_front() {
                Some((id, entry)) => Room::Evicted(id, entry),
                None => Room::Full,
            },
        }
    }

    /// Add an entry. Returns it back if the queue is full.
    pub fn insert(&mut self, id: Uuid, entry: T) -> Result<(), T> {
        if self.entries.len() >= self.capacity {
            return Err(entry);
        }
        self.entries.push_back((id, entry));
        Ok(())
    }

    pub fn remove(&mut self, id: Uuid) -> Option<T> {
        let pos = self.entries.iter().position(|(entry_id, _)| *entry_id == id)?;
        self.entries.remove(pos).map(|(_, entry)| entry)
    }

    pub fn get(&self, id: Uuid) -> Option<&T> {
        self.entries
            .iter()
            .find(|(entry_id, _)| *entry_id == id)
            .map(|(_, entry)| entry)
    }

    /// Remove every entry, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = (Uuid, T)> + '_ {
        self.entries.drain(..)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Uuid, &T)> {
        self.entries.iter().map(|(id, entry)| (id, entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(capacity: usize) -> (EffectQueue<&'static str>, Vec<Uuid>) {
        let mut queue = EffectQueue::new(capacity);
        let names = ["a", "b", "c", "d"];
        let ids: Vec<Uuid> = (0..capacity).map(|_| Uuid::new_v4()).collect();
        for (id, name) in ids.iter().zip(names.iter()) {
            queue.insert(*id, *name).unwrap();
        }
        (queue, ids)
    }

    #[test]
    fn test_drop_newest_keeps_entries() {
        let (mut queue, _) = filled(2);
        assert!(matches!(queue.make_room(EffectOverflow::DropNewest), Room::Full));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.insert(Uuid::new_v4(), "x"), Err("x"));
    }

    #[test]
    fn test_evict_oldest() {
        let (mut queue, ids) = filled(2);
        match queue.make_room(EffectOverflow::EvictOldest) {
            Room::Evicted(id, entry) => {
                assert_eq!(id, ids[0]);
                assert_eq!(entry, "a");
            }
            other => panic!("expected eviction, got {:?}", other),
        }
        queue.insert(Uuid::new_v4(), "c").unwrap();
        assert_eq!(queue.len(), 2);
        assert!(queue.get(ids[1]).is_some());
    }

    #[test]
    fn test_room_available_when_not_full() {
        let (mut queue, _) = filled(1);
        queue.drain().for_each(drop);
        assert!(matches!(queue.make_room(EffectOverflow::DropNewest), Room::Available));
    }

    #[test]
    fn test_remove_by_id() {
        let (mut queue, ids) = filled(3);
        assert_eq!(queue.remove(ids[1]), Some("b"));
        assert_eq!(queue.remove(ids[1]), None);
        let order: Vec<_> = queue.iter().map(|(_, name)| *name).collect();
        assert_eq!(order, vec!["a", "c"]);
    }
}
