use async_trait::async_trait;
use ecs_adapter::{EcsAdapter, EcsError, EntityId, Trigger};

#[derive(Debug, thiserror::Error)]
pub enum PhaseError {
    /// Stops the pipeline.
    #[error("fatal: {0}")]
    Fatal(String),

    #[error("ecs error: {0}")]
    Ecs(#[from] EcsError),

    /// The phase gave up for this round; the round continues.
    #[error("{0}")]
    Failed(String),
}

impl PhaseError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, PhaseError::Fatal(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    Initializer,
    Executor,
    Reactor,
    Teardown,
}

/// What the pipeline needs from the world it drives.
pub trait WorldContext {
    fn ecs(&self) -> &EcsAdapter;
    fn ecs_mut(&mut self) -> &mut EcsAdapter;

    /// Called before the first phase of every round.
    fn begin_round(&mut self, _round: u64) {}

    /// Checked between rounds; `true` stops scheduling.
    fn should_stop(&self) -> bool {
        false
    }

    /// Agent requests issued and failed since the previous call.
    fn take_request_counts(&mut self) -> (usize, usize) {
        (0, 0)
    }
}

/// Runs once before the first round.
#[async_trait(?Send)]
pub trait Initializer<C> {
    fn name(&self) -> &'static str;
    async fn initialize(&mut self, ctx: &mut C) -> Result<(), PhaseError>;
}

/// Runs every round: `pre_execute`, `execute`, then `post_execute`.
#[async_trait(?Send)]
pub trait Executor<C> {
    fn name(&self) -> &'static str;

    async fn pre_execute(&mut self, _ctx: &mut C) -> Result<(), PhaseError> {
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut C) -> Result<(), PhaseError>;

    async fn post_execute(&mut self, _ctx: &mut C) -> Result<(), PhaseError> {
        Ok(())
    }
}

/// Reacts to entities that gained the trigger component since the
/// reactor last ran. `react` is skipped when the filtered batch is empty.
#[async_trait(?Send)]
pub trait Reactor<C> {
    fn name(&self) -> &'static str;
    fn trigger(&self) -> Trigger;

    fn filter(&self, _ctx: &C, _entity: EntityId) -> bool {
        true
    }

    async fn react(&mut self, ctx: &mut C, entities: Vec<EntityId>) -> Result<(), PhaseError>;
}

/// Runs once on shutdown.
#[async_trait(?Send)]
pub trait Teardown<C> {
    fn name(&self) -> &'static str;
    async fn teardown(&mut self, ctx: &mut C) -> Result<(), PhaseError>;
}
