//! Language model abstraction.
//!
//! The answerer hands a fully rendered prompt to a [`LanguageModel`] and
//! takes its reply verbatim. Calls are made once; there is no retry here.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::error::GenerationServiceError;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Complete `prompt`, returning the model's text unchanged.
    async fn complete(&self, prompt: &str) -> Result<String, GenerationServiceError>;
}

pub fn create_language_model(config: &GenerationConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledModel)),
        "openai" => Ok(Arc::new(OpenAiChatModel::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

/// Always fails with [`GenerationServiceError::Disabled`].
pub struct DisabledModel;

#[async_trait]
impl LanguageModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _prompt: &str) -> Result<String, GenerationServiceError> {
        Err(GenerationServiceError::Disabled)
    }
}

/// Chat completions against the OpenAI API or a compatible server.
pub struct OpenAiChatModel {
    model: String,
    base_url: String,
    api_key: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAiChatModel {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let base_url = config
            .url
            .clone()
            .unwrap_or_else(|| OPENAI_BASE_URL.to_string());

        Ok(Self {
            model: config.model.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            temperature: config.temperature,
            client,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, GenerationServiceError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationServiceError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(GenerationServiceError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| GenerationServiceError::Malformed(e.to_string()))?;
        extract_content(parsed)
    }
}

fn extract_content(parsed: ChatResponse) -> Result<String, GenerationServiceError> {
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| GenerationServiceError::Malformed("response missing message content".into()))
}
