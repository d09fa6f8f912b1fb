use std::any::TypeId;
use std::collections::BTreeMap;
use std::collections::HashMap;

use bevy_ecs::prelude::*;

use crate::allocator::EntityAllocator;
use crate::changes::{ChangeCollectors, Trigger};
use crate::error::EcsError;
use crate::types::{CollectorId, EntityId};

/// Maps between our stable EntityId and bevy's internal Entity.
#[derive(Debug, Default)]
struct EntityMapping {
    to_bevy: BTreeMap<EntityId, Entity>,
    from_bevy: HashMap<Entity, EntityId>,
}

impl EntityMapping {
    fn insert(&mut self, eid: EntityId, bevy: Entity) {
        self.to_bevy.insert(eid, bevy);
        self.from_bevy.insert(bevy, eid);
    }

    fn remove_by_eid(&mut self, eid: &EntityId) -> Option<Entity> {
        let bevy = self.to_bevy.remove(eid)?;
        self.from_bevy.remove(&bevy);
        Some(bevy)
    }

    fn get_bevy(&self, eid: &EntityId) -> Option<Entity> {
        self.to_bevy.get(eid).copied()
    }
}

fn component_name<C>() -> &'static str {
    let full = std::any::type_name::<C>();
    full.rsplit("::").next().unwrap_or(full)
}

/// Public ECS adapter that hides bevy_ecs internals.
///
/// Components are treated as immutable records: callers replace them with
/// [`EcsAdapter::set_component`] rather than mutating in place. Every
/// absent → present transition is reported to the change collectors.
pub struct EcsAdapter {
    world: World,
    mapping: EntityMapping,
    allocator: EntityAllocator,
    changes: ChangeCollectors,
}

impl EcsAdapter {
    pub fn new() -> Self {
        Self {
            world: World::new(),
            mapping: EntityMapping::default(),
            allocator: EntityAllocator::new(),
            changes: ChangeCollectors::new(),
        }
    }

    pub fn allocator(&self) -> &EntityAllocator {
        &self.allocator
    }

    /// Spawn a new entity, returning a stable EntityId.
    pub fn spawn_entity(&mut self) -> EntityId {
        let eid = self.allocator.allocate();
        let bevy_entity = self.world.spawn_empty().id();
        self.mapping.insert(eid, bevy_entity);
        tracing::trace!(entity = %eid, "spawned entity");
        eid
    }

    /// Despawn an entity. Despawning twice is an error.
    pub fn despawn_entity(&mut self, eid: EntityId) -> Result<(), EcsError> {
        if !self.allocator.is_alive(eid) {
            return Err(EcsError::EntityNotFound(eid));
        }
        let bevy_entity = self
            .mapping
            .remove_by_eid(&eid)
            .ok_or(EcsError::EntityNotFound(eid))?;
        self.world.despawn(bevy_entity);
        self.allocator.deallocate(eid);
        self.changes.forget(eid);
        Ok(())
    }

    pub fn is_alive(&self, eid: EntityId) -> bool {
        self.allocator.is_alive(eid)
    }

    /// Get a component reference for an entity.
    pub fn get_component<C: Component>(&self, eid: EntityId) -> Result<&C, EcsError> {
        let bevy_entity = self
            .mapping
            .get_bevy(&eid)
            .ok_or(EcsError::EntityNotFound(eid))?;
        self.world
            .get::<C>(bevy_entity)
            .ok_or(EcsError::ComponentNotFound {
                entity: eid,
                component: component_name::<C>(),
            })
    }

    /// Like [`EcsAdapter::get_component`] but yields `None` for any failure.
    pub fn try_component<C: Component>(&self, eid: EntityId) -> Option<&C> {
        self.get_component::<C>(eid).ok()
    }

    /// Set (insert or overwrite) a component on an entity.
    pub fn set_component<C: Component>(&mut self, eid: EntityId, component: C) -> Result<(), EcsError> {
        let bevy_entity = self
            .mapping
            .get_bevy(&eid)
            .ok_or(EcsError::EntityNotFound(eid))?;
        let mut entity = self.world.entity_mut(bevy_entity);
        let added = !entity.contains::<C>();
        entity.insert(component);
        if added {
            self.changes.record_added(TypeId::of::<C>(), eid);
        }
        Ok(())
    }

    /// Replace a component with a modified copy of itself.
    pub fn update_component<C, F>(&mut self, eid: EntityId, update: F) -> Result<(), EcsError>
    where
        C: Component + Clone,
        F: FnOnce(&mut C),
    {
        let mut component = self.get_component::<C>(eid)?.clone();
        update(&mut component);
        self.set_component(eid, component)
    }

    /// Remove a component from an entity. Removing an absent component is not an error.
    pub fn remove_component<C: Component>(&mut self, eid: EntityId) -> Result<(), EcsError> {
        let bevy_entity = self
            .mapping
            .get_bevy(&eid)
            .ok_or(EcsError::EntityNotFound(eid))?;
        self.world.entity_mut(bevy_entity).remove::<C>();
        Ok(())
    }

    /// Check if an entity has a specific component.
    pub fn has_component<C: Component>(&self, eid: EntityId) -> bool {
        self.mapping
            .get_bevy(&eid)
            .map(|bevy_entity| self.world.entity(bevy_entity).contains::<C>())
            .unwrap_or(false)
    }

    /// Collect all alive EntityIds that have a specific component, sorted.
    pub fn entities_with<C: Component>(&self) -> Vec<EntityId> {
        self.mapping
            .to_bevy
            .iter()
            .filter(|(_, &bevy_entity)| self.world.entity(bevy_entity).contains::<C>())
            .map(|(&eid, _)| eid)
            .collect()
    }

    /// Number of alive entities.
    pub fn entity_count(&self) -> usize {
        self.allocator.alive_count()
    }

    /// Get all alive entity IDs (sorted for determinism).
    pub fn all_entities(&self) -> Vec<EntityId> {
        self.mapping.to_bevy.keys().copied().collect()
    }

    /// Register an add-only collector for the trigger's component type.
    pub fn subscribe(&mut self, trigger: Trigger) -> CollectorId {
        let id = self.changes.subscribe(trigger);
        tracing::debug!(collector = %id, component = trigger.type_name(), "collector registered");
        id
    }

    /// Take every entity added to the collector since its last drain.
    /// Entities despawned in the meantime are already gone from the batch.
    pub fn drain_collector(&mut self, id: CollectorId) -> Result<Vec<EntityId>, EcsError> {
        self.changes.drain(id).ok_or(EcsError::UnknownCollector(id))
    }

    pub fn changes(&self) -> &ChangeCollectors {
        &self.changes
    }
}

impl Default for EcsAdapter {
    fn default() -> Self {
        Self::new()
    }
}
