use std::collections::BTreeMap;

use ecs_adapter::EntityId;

/// Per-round event queues keyed by recipient entity.
#[derive(Debug)]
pub struct EventBus<E> {
    queues: BTreeMap<EntityId, Vec<E>>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            queues: BTreeMap::new(),
        }
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, recipient: EntityId, event: E) {
        self.queues.entry(recipient).or_default().push(event);
    }

    /// Drain all events for one recipient, in emission order.
    pub fn drain(&mut self, recipient: EntityId) -> Vec<E> {
        self.queues.remove(&recipient).unwrap_or_default()
    }

    /// Drain every queue, sorted by recipient for determinism.
    pub fn drain_all(&mut self) -> Vec<(EntityId, Vec<E>)> {
        std::mem::take(&mut self.queues).into_iter().collect()
    }

    pub fn pending(&self, recipient: EntityId) -> usize {
        self.queues.get(&recipient).map(Vec::len).unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.queues.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.queues.values().all(Vec::is_empty)
    }
}
