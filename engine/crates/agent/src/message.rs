use serde::{Deserialize, Serialize};

/// One entry of an agent's conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content")]
pub enum ChatMessage {
    #[serde(rename = "human")]
    Human(String),
    #[serde(rename = "ai")]
    Ai(String),
}

impl ChatMessage {
    pub fn human(text: impl Into<String>) -> Self {
        ChatMessage::Human(text.into())
    }

    pub fn ai(text: impl Into<String>) -> Self {
        ChatMessage::Ai(text.into())
    }

    pub fn text(&self) -> &str {
        match self {
            ChatMessage::Human(t) | ChatMessage::Ai(t) => t,
        }
    }

    pub fn is_human(&self) -> bool {
        matches!(self, ChatMessage::Human(_))
    }

    /// Role name used by chat-completion style endpoints.
    pub fn role(&self) -> &'static str {
        match self {
            ChatMessage::Human(_) => "user",
            ChatMessage::Ai(_) => "assistant",
        }
    }
}
