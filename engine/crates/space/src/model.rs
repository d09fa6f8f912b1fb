use ecs_adapter::EntityId;

#[derive(Debug, thiserror::Error)]
pub enum MoveError {
    #[error("entity {0} is not in any stage")]
    EntityNotInStage(EntityId),

    #[error("stage {0} does not exist")]
    StageNotFound(String),

    #[error("no path from stage {from} to stage {to}")]
    NoExit { from: String, to: String },

    #[error("entity {0} already placed in a stage")]
    AlreadyPlaced(EntityId),

    #[error("entity {entity} is already in stage {stage}")]
    SameStage { entity: EntityId, stage: String },
}
