//! Model backend trait: the abstraction over language models.
//!
//! A backend turns a prompt string into a text reply. The engine calls it once
//! per `text`/`json` step and once or twice per tool-use loop iteration, and
//! never inspects how the reply was produced.
//!
//! Implementations: deterministic mock, echo, scripted, OpenAI-compatible.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// Hint describing what kind of reply the caller expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// The caller wants a strict JSON object with the keys
    /// `thought`, `action`, `action_input`, `final_answer`.
    React,
}

/// Per-call generation options.
///
/// Every field is optional; backends fall back to their own defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// The model to use (e.g., "gpt-4o-mini")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Reply-shape hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<GenerationMode>,
}

impl GenerateOptions {
    /// Copy of these options with the mode hint set.
    pub fn with_mode(&self, mode: GenerationMode) -> Self {
        Self {
            mode: Some(mode),
            ..self.clone()
        }
    }

    pub fn is_react(&self) -> bool {
        self.mode == Some(GenerationMode::React)
    }
}

/// Token usage information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A complete reply from a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    /// The generated text
    pub text: String,

    /// Which model actually responded, when the backend reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl Generation {
    /// A bare text reply without model or usage metadata.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
            usage: None,
        }
    }
}

/// The core backend trait.
///
/// Every model integration implements this trait. The pipeline and the
/// tool-use loop call `generate()` without knowing which backend is in use.
/// Errors returned here are fatal to the run; malformed reply *text* is not an
/// error and must be returned as `Ok`.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// A human-readable name for this backend (e.g., "mock", "openai").
    fn name(&self) -> &str;

    /// Send a prompt and get a complete reply.
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> std::result::Result<Generation, BackendError>;

    /// Health check: can we reach the backend?
    async fn health_check(&self) -> std::result::Result<bool, BackendError> {
        Ok(true)
    }
}
