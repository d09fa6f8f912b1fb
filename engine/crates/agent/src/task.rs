use std::collections::BTreeSet;
use std::time::Instant;

use futures_util::future::join_all;
use observability::GatherMetrics;

use crate::error::AgentError;
use crate::message::ChatMessage;
use crate::system::AgentSystem;

/// How a task interacts with its agent's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskMode {
    /// No history read, nothing appended.
    Standalone,
    /// History is sent but the exchange is not appended.
    InputOnly,
    /// History is sent and both sides are appended on success.
    Full,
}

/// One queued request against a named agent.
#[derive(Debug, Clone)]
pub struct AgentTask {
    agent_name: String,
    prompt: String,
    mode: TaskMode,
    response: Option<String>,
    error: Option<String>,
}

impl AgentTask {
    pub fn new(agent_name: impl Into<String>, prompt: impl Into<String>, mode: TaskMode) -> Self {
        Self {
            agent_name: agent_name.into(),
            prompt: prompt.into(),
            mode,
            response: None,
            error: None,
        }
    }

    pub fn standalone(agent_name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::new(agent_name, prompt, TaskMode::Standalone)
    }

    pub fn input_only(agent_name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::new(agent_name, prompt, TaskMode::InputOnly)
    }

    pub fn full(agent_name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::new(agent_name, prompt, TaskMode::Full)
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn mode(&self) -> TaskMode {
        self.mode
    }

    pub fn response(&self) -> Option<&str> {
        self.response.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn succeeded(&self) -> bool {
        self.response.is_some()
    }
}

/// Dispatch every task concurrently and wait for all of them.
///
/// Failures are per task and never cancel siblings. When `deadline` passes,
/// unfinished tasks fail with [`AgentError::DeadlineExpired`]. Results are
/// committed in task order, so identical replies yield identical histories
/// whatever order the endpoints answered in. Two history-reading tasks for
/// the same agent in one batch are not allowed: the later one fails.
pub async fn gather(
    system: &mut AgentSystem,
    tasks: &mut [AgentTask],
    deadline: Option<tokio::time::Instant>,
    label: &str,
) -> GatherMetrics {
    let start = Instant::now();
    if tasks.is_empty() {
        return GatherMetrics {
            label: label.to_string(),
            ..GatherMetrics::default()
        };
    }

    let mut claimed = BTreeSet::new();
    let busy: Vec<bool> = tasks
        .iter()
        .map(|t| t.mode != TaskMode::Standalone && !claimed.insert(t.agent_name.clone()))
        .collect();

    let results: Vec<Result<String, AgentError>> = {
        let system_ref: &AgentSystem = system;
        let calls = tasks.iter().zip(busy.iter()).map(|(task, &busy)| async move {
            if busy {
                return Err(AgentError::Busy(task.agent_name.clone()));
            }
            let agent = system_ref
                .get(&task.agent_name)
                .ok_or_else(|| AgentError::UnknownAgent(task.agent_name.clone()))?;
            let client = agent
                .client()
                .ok_or_else(|| AgentError::Offline(task.agent_name.clone()))?;
            let history: &[ChatMessage] = match task.mode {
                TaskMode::Standalone => &[],
                TaskMode::InputOnly | TaskMode::Full => agent.history(),
            };
            let call = client.invoke(&task.prompt, history);
            let reply = match deadline {
                Some(at) => tokio::time::timeout_at(at, call)
                    .await
                    .map_err(|_| AgentError::DeadlineExpired(task.agent_name.clone()))??,
                None => call.await?,
            };
            if reply.trim().is_empty() {
                return Err(AgentError::EmptyReply(task.agent_name.clone()));
            }
            Ok::<String, AgentError>(reply)
        });
        join_all(calls).await
    };

    let mut succeeded = 0;
    for (task, result) in tasks.iter_mut().zip(results) {
        match result {
            Ok(reply) => {
                if task.mode == TaskMode::Full {
                    if let Some(agent) = system.get_mut(&task.agent_name) {
                        agent.append_human(task.prompt.clone());
                        agent.append_ai(reply.clone());
                    }
                }
                task.response = Some(reply);
                task.error = None;
                succeeded += 1;
            }
            Err(e) => {
                tracing::warn!(agent = %task.agent_name, label, error = %e, "agent request failed");
                task.response = None;
                task.error = Some(e.to_string());
            }
        }
    }

    let failed = tasks.len() - succeeded;
    system.record_requests(tasks.len(), failed);
    let metrics = GatherMetrics {
        label: label.to_string(),
        tasks: tasks.len(),
        succeeded,
        failed,
        duration_us: start.elapsed().as_micros(),
    };
    metrics.log();
    metrics
}
