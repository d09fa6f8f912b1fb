use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::message::ChatMessage;

/// Anything that can answer `Invoke(prompt, history)`.
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn invoke(&self, prompt: &str, history: &[ChatMessage]) -> Result<String, AgentError>;
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub model: String,
    pub temperature: f32,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            api_key: None,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completion client bound to one agent endpoint.
pub struct HttpAgentClient {
    name: String,
    url: String,
    config: HttpClientConfig,
    http: reqwest::Client,
}

impl HttpAgentClient {
    pub fn new(name: impl Into<String>, url: impl Into<String>, config: HttpClientConfig) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            name: name.into(),
            url: url.into(),
            config,
            http,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn invoke(&self, prompt: &str, history: &[ChatMessage]) -> Result<String, AgentError> {
        let mut messages: Vec<WireMessage<'_>> = history
            .iter()
            .map(|m| WireMessage {
                role: m.role(),
                content: m.text(),
            })
            .collect();
        messages.push(WireMessage {
            role: "user",
            content: prompt,
        });

        let req = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
        };

        let mut builder = self.http.post(&self.url).json(&req);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AgentError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = resp.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(AgentError::EmptyReply(self.name.clone()));
        }
        Ok(content)
    }
}
