use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::memory::types::{ConversationTurn, Role};

/// Everything the completion service needs for one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub history: Vec<ConversationTurn>,
    pub user: String,
}

impl CompletionRequest {
    /// Flattens the request into an ordered message list: system, history, user.
    pub fn messages(&self) -> Vec<ConversationTurn> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(ConversationTurn::system(self.system.clone()));
        messages.extend(self.history.iter().cloned());
        messages.push(ConversationTurn::human(self.user.clone()));
        messages
    }
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4".to_string(),
            temperature: 1.0,
        }
    }
}

#[derive(Clone)]
pub struct OpenAiChatClient {
    client: Client,
    config: OpenAiConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::Human => "user",
        Role::Assistant => "assistant",
    }
}

impl OpenAiChatClient {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl CompletionService for OpenAiChatClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let messages = request.messages();
        let body = ChatRequest {
            model: &self.config.model,
            temperature: self.config.temperature,
            messages: messages
                .iter()
                .map(|turn| ChatMessage {
                    role: wire_role(turn.role),
                    content: &turn.content,
                })
                .collect(),
        };

        let url = format!("{}/v1/chat/completions", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("Completion server error: {} {}", status, detail.trim()));
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("Completion response contained no message"))?;
        Ok(content.trim().to_string())
    }
}
