//! Provider seam shared by every chat model binding.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AIRole {
    System,
    User,
}

impl AIRole {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
        }
    }
}

/// One turn of a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIMessage {
    pub role: AIRole,
    pub content: String,
}

/// Token accounting reported by the provider, zero when it reports none.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

/// A completed generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIResponse {
    pub text: String,
    pub usage: TokenUsage,
    pub model: String,
    pub provider: String,
}

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Let the model consult the live web before answering.
    pub web_search: bool,
}

/// A chat model reachable over HTTP.
#[async_trait]
pub trait AIProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Environment variable holding the provider's key.
    fn api_key_env_var(&self) -> &'static str;

    fn is_configured(&self) -> bool;

    async fn generate_text(
        &self,
        model: &str,
        messages: &[AIMessage],
        options: &GenerateOptions,
    ) -> LlmResult<AIResponse>;
}

/// Collects a system prompt and user turns in order.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    messages: Vec<AIMessage>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, role: AIRole, content: impl Into<String>) -> Self {
        self.messages.push(AIMessage {
            role,
            content: content.into(),
        });
        self
    }

    #[must_use]
    pub fn system(self, content: impl Into<String>) -> Self {
        self.push(AIRole::System, content)
    }

    #[must_use]
    pub fn user(self, content: impl Into<String>) -> Self {
        self.push(AIRole::User, content)
    }

    pub fn build(self) -> Vec<AIMessage> {
        self.messages
    }
}
