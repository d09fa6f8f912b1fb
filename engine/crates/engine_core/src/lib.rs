pub mod events;
pub mod phase;
pub mod pipeline;

pub use events::EventBus;
pub use phase::{Executor, Initializer, PhaseError, PhaseKind, Reactor, Teardown, WorldContext};
pub use pipeline::{Pipeline, PipelineConfig, PipelineError};
