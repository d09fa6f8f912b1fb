use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::EntityId;

/// Generational index allocator.
///
/// Freed slots are reused lowest-index first so that two runs issuing the
/// same spawn/despawn sequence hand out identical ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityAllocator {
    generations: Vec<u32>,
    alive: Vec<bool>,
    free: BTreeSet<u32>,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> EntityId {
        if let Some(index) = self.free.pop_first() {
            let idx = index as usize;
            self.generations[idx] = self.generations[idx].wrapping_add(1);
            self.alive[idx] = true;
            return EntityId::new(index, self.generations[idx]);
        }
        let index = self.generations.len() as u32;
        self.generations.push(0);
        self.alive.push(true);
        EntityId::new(index, 0)
    }

    /// Returns false when the id is stale or was already released.
    pub fn deallocate(&mut self, id: EntityId) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        self.alive[id.index as usize] = false;
        self.free.insert(id.index);
        true
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        let idx = id.index as usize;
        idx < self.alive.len() && self.alive[idx] && self.generations[idx] == id.generation
    }

    pub fn alive_count(&self) -> usize {
        self.alive.iter().filter(|&&a| a).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_returns_increasing_indices() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        assert_eq!((a.index, a.generation), (0, 0));
        assert_eq!((b.index, b.generation), (1, 0));
    }

    #[test]
    fn reuse_bumps_generation_and_prefers_lowest_slot() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        let _c = alloc.allocate();
        assert!(alloc.deallocate(b));
        assert!(alloc.deallocate(a));

        let d = alloc.allocate();
        assert_eq!(d.index, a.index);
        assert_eq!(d.generation, a.generation + 1);
        assert!(!alloc.is_alive(a));
        assert!(alloc.is_alive(d));
    }

    #[test]
    fn double_deallocate_returns_false() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.allocate();
        assert!(alloc.deallocate(a));
        assert!(!alloc.deallocate(a));
    }

    #[test]
    fn json_roundtrip_keeps_alive_set() {
        let mut alloc = EntityAllocator::new();
        let _a = alloc.allocate();
        let b = alloc.allocate();
        alloc.deallocate(b);

        let text = serde_json::to_string(&alloc).unwrap();
        let restored: EntityAllocator = serde_json::from_str(&text).unwrap();
        assert_eq!(restored.alive_count(), 1);
        assert!(!restored.is_alive(b));
    }
}
