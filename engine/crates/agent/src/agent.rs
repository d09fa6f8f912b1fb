use std::sync::Arc;

use crate::client::AgentClient;
use crate::message::ChatMessage;

/// A named LLM endpoint with its own conversation history.
pub struct Agent {
    name: String,
    endpoint: Option<String>,
    client: Option<Arc<dyn AgentClient>>,
    history: Vec<ChatMessage>,
}

impl Agent {
    pub fn new(name: impl Into<String>, endpoint: Option<String>) -> Self {
        Self {
            name: name.into(),
            endpoint,
            client: None,
            history: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn client(&self) -> Option<&Arc<dyn AgentClient>> {
        self.client.as_ref()
    }

    pub fn set_client(&mut self, client: Arc<dyn AgentClient>) {
        self.client = Some(client);
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn append_human(&mut self, text: impl Into<String>) {
        self.history.push(ChatMessage::human(text));
    }

    pub fn append_ai(&mut self, text: impl Into<String>) {
        self.history.push(ChatMessage::ai(text));
    }

    /// Drop the trailing human/AI exchange. Returns false (and leaves the
    /// history alone) when the history does not end with such a pair.
    pub fn discard_last_exchange(&mut self) -> bool {
        let n = self.history.len();
        if n < 2 || !matches!(self.history[n - 1], ChatMessage::Ai(_)) || !self.history[n - 2].is_human() {
            return false;
        }
        self.history.truncate(n - 2);
        true
    }

    /// Remove every human message containing `tag`; returns how many went.
    pub fn excise_tagged(&mut self, tag: &str) -> usize {
        let before = self.history.len();
        self.history.retain(|m| !(m.is_human() && m.text().contains(tag)));
        before - self.history.len()
    }

    /// Replace every human message containing `tag`, except the most recent
    /// one, with `stub`. The history keeps its length.
    pub fn compress_tagged(&mut self, tag: &str, stub: &str) -> usize {
        let tagged: Vec<usize> = self
            .history
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_human() && m.text().contains(tag))
            .map(|(i, _)| i)
            .collect();
        let Some((_, older)) = tagged.split_last() else {
            return 0;
        };
        let mut replaced = 0;
        for &i in older {
            if self.history[i].text() != stub {
                self.history[i] = ChatMessage::human(stub);
                replaced += 1;
            }
        }
        replaced
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("connected", &self.client.is_some())
            .field("history_len", &self.history.len())
            .finish()
    }
}
