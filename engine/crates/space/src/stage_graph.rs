use std::collections::{BTreeMap, BTreeSet, HashMap};

use ecs_adapter::EntityId;
use serde::{Deserialize, Serialize};

use crate::model::MoveError;

#[derive(Debug, Clone, Default)]
struct StageNode {
    exits: Vec<String>,
    occupants: BTreeSet<EntityId>,
}

/// Name-keyed stage graph with an O(1) "who is in stage X" index.
///
/// Actors name their stage by string; the index is the single source of
/// truth for co-location and is re-validated on every move.
#[derive(Debug, Default)]
pub struct StageGraphSpace {
    stages: BTreeMap<String, StageNode>,
    entity_to_stage: HashMap<EntityId, String>,
}

impl StageGraphSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stage with its outgoing edges. An empty edge list means
    /// the stage does not restrict where its occupants may go.
    pub fn register_stage(&mut self, name: &str, exits: Vec<String>) {
        let node = self.stages.entry(name.to_string()).or_default();
        node.exits = exits;
    }

    pub fn stage_exists(&self, name: &str) -> bool {
        self.stages.contains_key(name)
    }

    /// All stage names, sorted.
    pub fn all_stages(&self) -> Vec<String> {
        self.stages.keys().cloned().collect()
    }

    pub fn exits(&self, stage: &str) -> Result<&[String], MoveError> {
        self.stages
            .get(stage)
            .map(|n| n.exits.as_slice())
            .ok_or_else(|| MoveError::StageNotFound(stage.to_string()))
    }

    /// Sorted occupants of a stage; empty for unknown stages.
    pub fn occupants(&self, stage: &str) -> Vec<EntityId> {
        self.stages
            .get(stage)
            .map(|n| n.occupants.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn entity_stage(&self, entity: EntityId) -> Option<&str> {
        self.entity_to_stage.get(&entity).map(String::as_str)
    }

    pub fn same_stage(&self, a: EntityId, b: EntityId) -> bool {
        match (self.entity_stage(a), self.entity_stage(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    /// Initial placement, no edge check.
    pub fn place_entity(&mut self, entity: EntityId, stage: &str) -> Result<(), MoveError> {
        if self.entity_to_stage.contains_key(&entity) {
            return Err(MoveError::AlreadyPlaced(entity));
        }
        let node = self
            .stages
            .get_mut(stage)
            .ok_or_else(|| MoveError::StageNotFound(stage.to_string()))?;
        node.occupants.insert(entity);
        self.entity_to_stage.insert(entity, stage.to_string());
        Ok(())
    }

    /// Check whether `entity` could move to `target` without moving it.
    pub fn check_move(&self, entity: EntityId, target: &str) -> Result<&str, MoveError> {
        let current = self
            .entity_to_stage
            .get(&entity)
            .ok_or(MoveError::EntityNotInStage(entity))?;
        if !self.stages.contains_key(target) {
            return Err(MoveError::StageNotFound(target.to_string()));
        }
        if current == target {
            return Err(MoveError::SameStage {
                entity,
                stage: target.to_string(),
            });
        }
        let exits = self.exits(current)?;
        if !exits.is_empty() && !exits.iter().any(|e| e == target) {
            return Err(MoveError::NoExit {
                from: current.clone(),
                to: target.to_string(),
            });
        }
        Ok(current.as_str())
    }

    /// Move an entity, returning the stage it left.
    pub fn move_entity(&mut self, entity: EntityId, target: &str) -> Result<String, MoveError> {
        let previous = self.check_move(entity, target)?.to_string();
        if let Some(node) = self.stages.get_mut(&previous) {
            node.occupants.remove(&entity);
        }
        if let Some(node) = self.stages.get_mut(target) {
            node.occupants.insert(entity);
        }
        self.entity_to_stage.insert(entity, target.to_string());
        tracing::debug!(entity = %entity, from = %previous, to = %target, "entity moved");
        Ok(previous)
    }

    /// Remove an entity from its current stage, returning that stage.
    pub fn remove_entity(&mut self, entity: EntityId) -> Result<String, MoveError> {
        let stage = self
            .entity_to_stage
            .remove(&entity)
            .ok_or(MoveError::EntityNotInStage(entity))?;
        if let Some(node) = self.stages.get_mut(&stage) {
            node.occupants.remove(&entity);
        }
        Ok(stage)
    }

    /// Stage → occupants, both sorted.
    pub fn snapshot(&self) -> StageSnapshot {
        StageSnapshot {
            stages: self
                .stages
                .iter()
                .map(|(name, node)| (name.clone(), node.occupants.iter().copied().collect()))
                .collect(),
        }
    }
}

/// Serializable view of the co-location index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageSnapshot {
    pub stages: BTreeMap<String, Vec<EntityId>>,
}
