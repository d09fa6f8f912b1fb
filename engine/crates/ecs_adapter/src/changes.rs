use std::any::TypeId;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use bevy_ecs::component::Component;

use crate::bevy_backend::EcsAdapter;
use crate::types::{CollectorId, EntityId};

/// The component type a collector listens to.
#[derive(Debug, Clone, Copy)]
pub struct Trigger {
    type_id: TypeId,
    type_name: &'static str,
    holds: fn(&EcsAdapter, EntityId) -> bool,
}

impl Trigger {
    pub fn added<C: Component>() -> Self {
        Self {
            type_id: TypeId::of::<C>(),
            type_name: short_type_name(std::any::type_name::<C>()),
            holds: |ecs, entity| ecs.has_component::<C>(entity),
        }
    }

    /// Whether the entity still carries the trigger component.
    pub fn holds(&self, ecs: &EcsAdapter, entity: EntityId) -> bool {
        (self.holds)(ecs, entity)
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

fn short_type_name(full: &'static str) -> &'static str {
    full.rsplit("::").next().unwrap_or(full)
}

#[derive(Debug)]
struct Collector {
    trigger: Trigger,
    pending: BTreeSet<EntityId>,
}

/// Add-only change tracking.
///
/// Every collector accumulates entities that gained its trigger component
/// (absent → present) since the collector was last drained. Overwriting a
/// component that is already present is not an addition.
#[derive(Debug, Default)]
pub struct ChangeCollectors {
    collectors: BTreeMap<CollectorId, Collector>,
    by_type: HashMap<TypeId, Vec<CollectorId>>,
    next_id: u32,
}

impl ChangeCollectors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, trigger: Trigger) -> CollectorId {
        let id = CollectorId(self.next_id);
        self.next_id += 1;
        self.collectors.insert(
            id,
            Collector {
                trigger,
                pending: BTreeSet::new(),
            },
        );
        self.by_type.entry(trigger.type_id()).or_default().push(id);
        id
    }

    pub fn record_added(&mut self, type_id: TypeId, entity: EntityId) {
        let Some(ids) = self.by_type.get(&type_id) else {
            return;
        };
        for id in ids {
            if let Some(collector) = self.collectors.get_mut(id) {
                collector.pending.insert(entity);
            }
        }
    }

    /// Forget a despawned entity everywhere.
    pub fn forget(&mut self, entity: EntityId) {
        for collector in self.collectors.values_mut() {
            collector.pending.remove(&entity);
        }
    }

    /// Take the pending batch of a collector, sorted by id.
    pub fn drain(&mut self, id: CollectorId) -> Option<Vec<EntityId>> {
        self.collectors
            .get_mut(&id)
            .map(|c| std::mem::take(&mut c.pending).into_iter().collect())
    }

    pub fn pending_len(&self, id: CollectorId) -> usize {
        self.collectors.get(&id).map(|c| c.pending.len()).unwrap_or(0)
    }

    pub fn trigger(&self, id: CollectorId) -> Option<Trigger> {
        self.collectors.get(&id).map(|c| c.trigger)
    }
}
