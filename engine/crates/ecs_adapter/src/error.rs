use crate::types::{CollectorId, EntityId};

#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("component {component} not found for entity {entity}")]
    ComponentNotFound {
        entity: EntityId,
        component: &'static str,
    },

    #[error("unknown change collector: {0}")]
    UnknownCollector(CollectorId),
}
