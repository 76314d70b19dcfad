//! The live set: which entities are currently in the world.

use std::collections::HashSet;

use crate::entity::EntityId;

/// Tracks live entities in insertion order.
///
/// An entity can exist in the world's arena without being live; only live
/// entities are seen by systems and by the transform pass.
#[derive(Debug, Default)]
pub struct EntityManager {
    order: Vec<EntityId>,
    members: HashSet<EntityId>,
}

impl EntityManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` live. Returns false if it already was.
    pub fn insert(&mut self, id: EntityId) -> bool {
        if !self.members.insert(id) {
            return false;
        }
        self.order.push(id);
        true
    }

    /// Mark `id` not live. Returns false if it wasn't.
    pub fn remove(&mut self, id: EntityId) -> bool {
        if !self.members.remove(&id) {
            return false;
        }
        self.order.retain(|&e| e != id);
        true
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.members.contains(&id)
    }

    /// Live ids in the order they became live.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.order.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
