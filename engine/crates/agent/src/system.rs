use std::collections::BTreeMap;
use std::sync::Arc;

use crate::agent::Agent;
use crate::client::AgentClient;
use crate::error::AgentError;
use crate::message::ChatMessage;

/// Registry of every agent in the world, keyed by name.
#[derive(Debug, Default)]
pub struct AgentSystem {
    agents: BTreeMap<String, Agent>,
    requests: usize,
    failed_requests: usize,
}

impl AgentSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent; re-registering keeps the existing history.
    pub fn register(&mut self, name: &str, endpoint: Option<String>) {
        self.agents
            .entry(name.to_string())
            .or_insert_with(|| Agent::new(name, endpoint));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Agent> {
        self.agents.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Agent> {
        self.agents.get_mut(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    pub fn attach_client(&mut self, name: &str, client: Arc<dyn AgentClient>) -> Result<(), AgentError> {
        let agent = self
            .agents
            .get_mut(name)
            .ok_or_else(|| AgentError::UnknownAgent(name.to_string()))?;
        agent.set_client(client);
        Ok(())
    }

    /// Build a client for every agent that has an endpoint and no client yet.
    /// Returns the names that ended up connected.
    pub fn connect_all<F>(&mut self, mut factory: F) -> Vec<String>
    where
        F: FnMut(&str, &str) -> Result<Arc<dyn AgentClient>, AgentError>,
    {
        let mut connected = Vec::new();
        for agent in self.agents.values_mut() {
            if agent.is_connected() {
                connected.push(agent.name().to_string());
                continue;
            }
            let Some(url) = agent.endpoint().map(str::to_string) else {
                tracing::warn!(agent = agent.name(), "agent has no endpoint, skipped");
                continue;
            };
            match factory(agent.name(), &url) {
                Ok(client) => {
                    agent.set_client(client);
                    tracing::info!(agent = agent.name(), url = %url, "agent connected");
                    connected.push(agent.name().to_string());
                }
                Err(e) => {
                    tracing::warn!(agent = agent.name(), url = %url, error = %e, "agent connect failed");
                }
            }
        }
        connected
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.agents.get(name).map(Agent::is_connected).unwrap_or(false)
    }

    pub fn history(&self, name: &str) -> &[ChatMessage] {
        self.agents.get(name).map(Agent::history).unwrap_or(&[])
    }

    pub fn append_human(&mut self, name: &str, text: impl Into<String>) -> bool {
        match self.agents.get_mut(name) {
            Some(agent) => {
                agent.append_human(text);
                true
            }
            None => false,
        }
    }

    pub(crate) fn record_requests(&mut self, issued: usize, failed: usize) {
        self.requests += issued;
        self.failed_requests += failed;
    }

    /// Requests issued and failed since the last call.
    pub fn take_request_counts(&mut self) -> (usize, usize) {
        let counts = (self.requests, self.failed_requests);
        self.requests = 0;
        self.failed_requests = 0;
        counts
    }
}
