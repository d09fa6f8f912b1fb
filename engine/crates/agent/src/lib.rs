//! Agent I/O: per-agent conversation histories, LLM clients, concurrent
//! request batches and plan parsing.

pub mod agent;
pub mod client;
pub mod error;
pub mod message;
pub mod plan;
pub mod scripted;
pub mod system;
pub mod task;

pub use agent::Agent;
pub use client::{AgentClient, HttpAgentClient, HttpClientConfig};
pub use error::AgentError;
pub use message::ChatMessage;
pub use plan::{parse_plan, strip_json_fence, PlanError, PlanMap};
pub use scripted::ScriptedAgentClient;
pub use system::AgentSystem;
pub use task::{gather, AgentTask, TaskMode};
