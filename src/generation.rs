//! Answer generation backends.
//!
//! A [`Generator`] turns the question plus retrieved context into the final
//! answer text:
//! - **[`ComposingGenerator`]** renders the context with the template
//!   composer in [`crate::compose`]. Deterministic, never fails.
//! - **[`ChatCompletionGenerator`]** calls an OpenAI-compatible
//!   `POST {base_url}/chat/completions` endpoint (Groq by default).
//!
//! | Config Value | Generator |
//! |-------------|-----------|
//! | `"disabled"` | [`ComposingGenerator`] |
//! | `"openai"` | [`ChatCompletionGenerator`] |
//!
//! Remote failures surface as [`BackendError`]; the pipeline then falls back
//! to the composer.

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use crate::compose;
use crate::config::GenerationConfig;
use crate::error::BackendError;
use crate::knowledge::PersonalInfo;
use crate::models::SearchResult;

const CHAT: &str = "chat completion";

/// Inputs for one generation call.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub query: &'a str,
    pub context: &'a [SearchResult],
    pub persona: &'a PersonalInfo,
}

#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    fn is_remote(&self) -> bool;

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, BackendError>;
}

// ============ Composing Generator ============

pub struct ComposingGenerator;

#[async_trait]
impl Generator for ComposingGenerator {
    fn name(&self) -> &str {
        "composer"
    }

    fn is_remote(&self) -> bool {
        false
    }

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, BackendError> {
        Ok(compose::compose(request.context, request.query))
    }
}

// ============ Chat Completion Generator ============

/// OpenAI-compatible chat completion client.
///
/// One attempt per call; the HTTP client is built once.
pub struct ChatCompletionGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl ChatCompletionGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self, BackendError> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| BackendError::NotConfigured {
                backend: CHAT,
                reason: "generation.model not set".to_string(),
            })?;
        let api_key = config
            .api_key()
            .ok_or_else(|| BackendError::NotConfigured {
                backend: CHAT,
                reason: format!("{} environment variable not set", config.api_key_env),
            })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|source| BackendError::Http {
                backend: CHAT,
                source,
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl Generator for ChatCompletionGenerator {
    fn name(&self) -> &str {
        &self.model
    }

    fn is_remote(&self) -> bool {
        true
    }

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, BackendError> {
        let (system, user) = build_prompt(request);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|source| BackendError::Http {
                backend: CHAT,
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                backend: CHAT,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| BackendError::Malformed {
            backend: CHAT,
            reason: e.to_string(),
        })?;
        extract_content(parsed)
    }
}

fn extract_content(response: ChatResponse) -> Result<String, BackendError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| BackendError::Malformed {
            backend: CHAT,
            reason: "no message content in choices[0]".to_string(),
        })
}

/// System and user messages for a generation call.
pub fn build_prompt(request: &GenerationRequest<'_>) -> (String, String) {
    let persona = &request.persona;
    let who = match (persona.name.trim(), persona.title.trim()) {
        ("", _) => "a professional".to_string(),
        (name, "") => name.to_string(),
        (name, title) => format!("{}, {}", name, title),
    };
    let system = format!(
        "You are {}, answering interview questions about your own career. \
         Speak in the first person. Use only the facts in the provided context; \
         if the context does not cover the question, say so briefly.",
        who
    );

    let mut user = String::from("Context:\n");
    if request.context.is_empty() {
        user.push_str("(none)\n");
    }
    for r in request.context {
        let _ = writeln!(user, "- [{}] {}", r.chunk.title, r.chunk.content);
    }
    let _ = write!(user, "\nQuestion: {}", request.query);
    (system, user)
}

/// Create the generator for `config`.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>, BackendError> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(ChatCompletionGenerator::new(config)?)),
        _ => Ok(Arc::new(ComposingGenerator)),
    }
}
