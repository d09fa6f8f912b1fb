use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::client::AgentClient;
use crate::error::AgentError;
use crate::message::ChatMessage;

type Responder = dyn Fn(&str, &[ChatMessage]) -> Option<String> + Send + Sync;

/// In-process client that answers from a responder closure or a queue of
/// canned replies. Every call is recorded for later inspection.
#[derive(Clone)]
pub struct ScriptedAgentClient {
    name: String,
    replies: Arc<Mutex<VecDeque<Option<String>>>>,
    responder: Option<Arc<Responder>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedAgentClient {
    /// Replies are consumed in order; `None` simulates a failed request.
    pub fn with_replies<I>(name: impl Into<String>, replies: I) -> Self
    where
        I: IntoIterator<Item = Option<String>>,
    {
        Self {
            name: name.into(),
            replies: Arc::new(Mutex::new(replies.into_iter().collect())),
            responder: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answer every prompt with the closure; `None` simulates a failure.
    pub fn with_responder<F>(name: impl Into<String>, responder: F) -> Self
    where
        F: Fn(&str, &[ChatMessage]) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            replies: Arc::new(Mutex::new(VecDeque::new())),
            responder: Some(Arc::new(responder)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A client that always answers `{}`.
    pub fn silent(name: impl Into<String>) -> Self {
        Self::with_responder(name, |_, _| Some("{}".to_string()))
    }

    pub fn push_reply(&self, reply: Option<String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    /// Prompts received so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AgentClient for ScriptedAgentClient {
    async fn invoke(&self, prompt: &str, history: &[ChatMessage]) -> Result<String, AgentError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(prompt.to_string());
        }

        let queued = self
            .replies
            .lock()
            .map_err(|_| AgentError::Script(format!("{} reply queue poisoned", self.name)))?
            .pop_front();

        let reply = match (queued, &self.responder) {
            (Some(reply), _) => reply,
            (None, Some(responder)) => responder(prompt, history),
            (None, None) => return Err(AgentError::Script(format!("{} has no reply left", self.name))),
        };
        reply.ok_or_else(|| AgentError::Offline(self.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queued_replies_then_exhaustion() {
        let client = ScriptedAgentClient::with_replies("A", [Some("one".to_string()), None]);
        assert_eq!(client.invoke("p1", &[]).await.unwrap(), "one");
        assert!(matches!(client.invoke("p2", &[]).await, Err(AgentError::Offline(_))));
        assert!(matches!(client.invoke("p3", &[]).await, Err(AgentError::Script(_))));
        assert_eq!(client.calls(), vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn queue_takes_priority_over_responder() {
        let client = ScriptedAgentClient::with_responder("A", |prompt, history| {
            Some(format!("{prompt}:{}", history.len()))
        });
        client.push_reply(Some("queued".into()));
        assert_eq!(client.invoke("x", &[]).await.unwrap(), "queued");
        assert_eq!(
            client.invoke("y", &[ChatMessage::human("h")]).await.unwrap(),
            "y:1"
        );
    }
}
