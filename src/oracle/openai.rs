//! OpenAI-compatible chat completions oracle (OpenAI, OpenRouter).

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{prompt, Oracle, OracleRequest};
use crate::config::{OracleConfig, Provider};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Chat completions client
pub struct OpenAiOracle {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: Option<u32>,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAiOracle {
    /// Create from stage configuration
    pub fn from_config(config: &OracleConfig) -> Result<Self> {
        let (name, default_url) = match config.provider {
            Provider::Openrouter => ("openrouter", OPENROUTER_BASE_URL),
            _ => ("openai", OPENAI_BASE_URL),
        };

        let model = match (&config.model, config.provider) {
            (Some(model), _) => model.clone(),
            (None, Provider::Openai) => "gpt-5".to_string(),
            (None, _) => anyhow::bail!("{} oracle requires a model", name),
        };

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            name: name.to_string(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| default_url.to_string()),
            api_key: config.api_key()?,
            model,
            max_tokens: config.max_tokens,
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Oracle for OpenAiOracle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, request: &OracleRequest) -> Result<String> {
        let rendered = prompt::render(request);

        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = rendered.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &rendered.user,
        });

        let body = ChatRequest {
            model: &self.model,
            messages,
            max_completion_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to reach {} chat completions", self.name))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("{} returned {}: {}", self.name, status, text.trim());
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to decode {} response", self.name))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .with_context(|| format!("{} response has no message content", self.name))
    }
}
