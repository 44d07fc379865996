//! OpenAI-compatible backend implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Together AI, and any
//! endpoint exposing `/v1/chat/completions`.
//!
//! In `react` mode the request is prefixed with a system message describing
//! the four-key reply protocol and a one-shot example exchange, which keeps
//! most chat models on strict JSON.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stepweave_core::error::BackendError;
use stepweave_core::provider::{GenerateOptions, Generation, ModelBackend, Usage};
use tracing::{debug, warn};

const REACT_SYSTEM_PROMPT: &str = "You are an assistant that follows the ReAct protocol. \
All replies MUST be valid JSON and use only the following keys:\n\
- thought (string)\n\
- action (string or null)\n\
- action_input (object or null)\n\
- final_answer (string or null)\n";

const REACT_EXAMPLE_USER: &str = "Question: Is 2+2 equal to 4?\n\
Respond with a short chain-of-thought as 'thought', then 'action': null and 'final_answer'.";

const REACT_EXAMPLE_ASSISTANT: &str = r#"{"thought":"This is basic arithmetic.","action":null,"action_input":null,"final_answer":"Yes, 2+2 equals 4."}"#;

const FALLBACK_MODEL: &str = "gpt-4o-mini";
const FALLBACK_MAX_TOKENS: u32 = 512;
const FALLBACK_TEMPERATURE: f32 = 0.2;

/// A model backend speaking the OpenAI chat completions protocol.
pub struct OpenAiCompatBackend {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatBackend {
    /// Create a new OpenAI-compatible backend.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_default();

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create an OpenAI backend (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create an Ollama backend (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    /// Chat messages for one prompt.
    fn to_api_messages(prompt: &str, options: &GenerateOptions) -> Vec<ApiMessage> {
        let mut messages = Vec::with_capacity(4);
        if options.is_react() {
            messages.push(ApiMessage::new("system", REACT_SYSTEM_PROMPT));
            messages.push(ApiMessage::new("user", REACT_EXAMPLE_USER));
            messages.push(ApiMessage::new("assistant", REACT_EXAMPLE_ASSISTANT));
        }
        messages.push(ApiMessage::new("user", prompt));
        messages
    }

    fn request_body(prompt: &str, options: &GenerateOptions) -> serde_json::Value {
        serde_json::json!({
            "model": options.model.as_deref().unwrap_or(FALLBACK_MODEL),
            "messages": Self::to_api_messages(prompt, options),
            "max_tokens": options.max_tokens.unwrap_or(FALLBACK_MAX_TOKENS),
            "temperature": options.temperature.unwrap_or(FALLBACK_TEMPERATURE),
            "stream": false,
        })
    }
}

#[async_trait]
impl ModelBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> std::result::Result<Generation, BackendError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(prompt, options);

        debug!(
            backend = %self.name,
            model = %body["model"],
            react = options.is_react(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout(e.to_string())
                } else {
                    BackendError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(BackendError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(BackendError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Backend returned error");
            return Err(BackendError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| BackendError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice =
            api_response
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| BackendError::ApiError {
                    status_code: 200,
                    message: "No choices in response".into(),
                })?;

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(Generation {
            text: choice.message.content.unwrap_or_default(),
            model: api_response.model,
            usage,
        })
    }

    async fn health_check(&self) -> std::result::Result<bool, BackendError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

// --- OpenAI API types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

impl ApiMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}
