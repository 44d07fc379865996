//! Backend that replies with the prompt itself.

use async_trait::async_trait;
use stepweave_core::error::BackendError;
use stepweave_core::provider::{GenerateOptions, Generation, ModelBackend};

/// Returns every prompt verbatim. Useful for checking what a template
/// rendered to, and for pipeline tests that assert on memory contents.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoBackend;

impl EchoBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ModelBackend for EchoBackend {
    fn name(&self) -> &str {
        "echo"
    }

    async fn generate(
        &self,
        prompt: &str,
        _options: &GenerateOptions,
    ) -> std::result::Result<Generation, BackendError> {
        Ok(Generation::text(prompt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_prompt() {
        let backend = EchoBackend::new();
        let reply = backend
            .generate("1", &GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(reply.text, "1");
        assert!(reply.usage.is_none());
    }
}
