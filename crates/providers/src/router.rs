//! Backend selection from configuration.
//!
//! Resolves a backend name (`mock`, `echo`, `openai`, or any
//! OpenAI-compatible provider listed under `[providers]`) to a ready
//! [`ModelBackend`].

use std::sync::Arc;

use stepweave_config::{AppConfig, ConfigError};
use stepweave_core::provider::ModelBackend;
use tracing::debug;

use crate::echo::EchoBackend;
use crate::mock::MockBackend;
use crate::openai_compat::OpenAiCompatBackend;

/// Build the configured default backend.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn ModelBackend>, ConfigError> {
    build_named(&config.default_backend, config)
}

/// Build a backend by name, using `config` for keys and endpoints.
pub fn build_named(
    name: &str,
    config: &AppConfig,
) -> Result<Arc<dyn ModelBackend>, ConfigError> {
    debug!(backend = name, "Building model backend");
    match name {
        "mock" => Ok(Arc::new(MockBackend::new())),
        "echo" => Ok(Arc::new(EchoBackend::new())),
        _ => {
            let provider = config.providers.get(name);
            let known = provider.is_some() || well_known_base_url(name).is_some();
            if !known {
                return Err(ConfigError::ValidationError(format!(
                    "unknown backend '{name}' (expected mock, echo, or a configured provider)"
                )));
            }

            let base_url = provider
                .and_then(|p| p.api_url.clone())
                .or_else(|| well_known_base_url(name).map(String::from))
                .ok_or_else(|| {
                    ConfigError::ValidationError(format!("provider '{name}' has no api_url"))
                })?;

            let api_key = config.api_key_for(name);
            if api_key.is_none() && requires_key(name) {
                return Err(ConfigError::ValidationError(format!(
                    "backend '{name}' needs an API key (set STEPWEAVE_API_KEY or OPENAI_API_KEY)"
                )));
            }

            Ok(Arc::new(OpenAiCompatBackend::new(
                name,
                base_url,
                api_key.unwrap_or_default(),
            )))
        }
    }
}

/// Whether a provider refuses requests without a key.
fn requires_key(name: &str) -> bool {
    !matches!(name, "ollama" | "vllm" | "llamacpp")
}

/// Get the default base URL for well-known providers.
fn well_known_base_url(provider_name: &str) -> Option<&'static str> {
    match provider_name {
        "openai" => Some("https://api.openai.com/v1"),
        "openrouter" => Some("https://openrouter.ai/api/v1"),
        "ollama" => Some("http://localhost:11434/v1"),
        "groq" => Some("https://api.groq.com/openai/v1"),
        "together" => Some("https://api.together.xyz/v1"),
        "vllm" => Some("http://localhost:8000/v1"),
        "llamacpp" => Some("http://localhost:8080/v1"),
        _ => None,
    }
}
