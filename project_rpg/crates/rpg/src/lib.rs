//! Multi-agent RPG: every stage, actor and world system is driven by an
//! LLM agent, and one round runs a fixed order of planning and action
//! phases over a shared ECS world.

pub mod actions;
pub mod chaos;
pub mod command;
pub mod components;
pub mod context;
pub mod events;
pub mod format;
pub mod game;
pub mod prompts;
pub mod scenario;
pub mod systems;
pub mod validation;

#[cfg(test)]
mod testing;

pub use actions::ActionKind;
pub use chaos::{ChaosEngineering, DropEveryNth, NoChaos};
pub use command::{parse_command, PlayerCommand};
pub use context::{PrePlanningPolicy, RpgContext, RpgOptions, Runtime};
pub use events::AgentEvent;
pub use game::{build_pipeline, Game};
pub use scenario::{build_world, ScenarioError, ScenarioFile};
pub use systems::{ClientFactory, ConnectSystem};
