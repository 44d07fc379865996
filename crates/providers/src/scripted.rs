//! Backend that plays back a queue of prepared replies.
//!
//! Each call to `generate` pops the next reply and records the prompt and
//! options it was called with. Used by tests and demos that need exact
//! control over what the model "says".

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use stepweave_core::error::BackendError;
use stepweave_core::provider::{GenerateOptions, Generation, ModelBackend};

/// One prepared reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Reply immediately with this text.
    Text(String),
    /// Fail the call with this error.
    Fail(BackendError),
    /// Sleep, then reply with the text.
    Delayed(Duration, String),
    /// Never resolve. The caller must be cancelled.
    Pending,
}

impl From<&str> for ScriptedReply {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for ScriptedReply {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// A prompt/options pair seen by the backend.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub prompt: String,
    pub options: GenerateOptions,
}

/// Replays [`ScriptedReply`] values in order. Once the queue is empty every
/// call fails with [`BackendError::Exhausted`].
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<ScriptedReply>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedBackend {
    pub fn new<I, R>(replies: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<ScriptedReply>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue another reply.
    pub fn push(&self, reply: impl Into<ScriptedReply>) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply.into());
    }

    /// Replies not yet consumed.
    pub fn remaining(&self) -> usize {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Every call made so far, oldest first.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Prompts of every call made so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.prompt).collect()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> std::result::Result<Generation, BackendError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                prompt: prompt.to_string(),
                options: options.clone(),
            });

        let next = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        match next {
            Some(ScriptedReply::Text(text)) => Ok(Generation::text(text)),
            Some(ScriptedReply::Fail(err)) => Err(err),
            Some(ScriptedReply::Delayed(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(Generation::text(text))
            }
            Some(ScriptedReply::Pending) => std::future::pending().await,
            None => Err(BackendError::Exhausted(format!(
                "no scripted reply for call #{}",
                self.call_count()
            ))),
        }
    }
}
