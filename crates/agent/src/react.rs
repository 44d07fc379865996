//! ReAct loop: Thought → Action → Observation, bounded by an iteration budget.
//!
//! Each iteration sends the original prompt plus the transcript of prior
//! observations to the backend in `react` mode, validates the reply against
//! the four-key schema, and then either finishes (final answer, or no action)
//! or invokes the named tool and records what it returned.
//!
//! # Terminal outcomes
//!
//! | Outcome                   | `final_answer` | `reason`              | `note`         |
//! |---------------------------|----------------|-----------------------|----------------|
//! | Non-empty final answer    | the answer     | -                     | -              |
//! | Empty or missing action   | `null`         | `"no action"`         | -              |
//! | Budget exhausted          | `null`         | `"max_iters_reached"` | -              |
//! | Reply never validated     | raw reply text | -                     | `invalid_json` |
//!
//! Every outcome is reported as a `final` event before `run` returns. Backend
//! and tool failures are not outcomes: they propagate as errors.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stepweave_core::event::{EventSink, LoopNote, RunEvent, StopReason};
use stepweave_core::provider::{GenerateOptions, GenerationMode, ModelBackend};
use stepweave_core::tool::ToolRegistry;
use tracing::{debug, info, warn};

use crate::payload::{Reply, parse_reply};

/// Default iteration budget.
pub const DEFAULT_MAX_ITERS: u32 = 6;

const JSON_REMINDER: &str = "Your previous reply was not valid JSON. \
Please respond with ONLY valid JSON with keys: thought (string), action (string|null), \
action_input (object|null), final_answer (string|null).";

/// The result of one loop run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactOutcome {
    pub final_answer: Option<String>,
    pub iterations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<StopReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<LoopNote>,
}

impl ReactOutcome {
    fn answered(answer: String, iterations: u32) -> Self {
        Self {
            final_answer: Some(answer),
            iterations,
            reason: None,
            note: None,
        }
    }

    fn stopped(reason: StopReason, iterations: u32) -> Self {
        Self {
            final_answer: None,
            iterations,
            reason: Some(reason),
            note: None,
        }
    }

    fn invalid_json(raw: String, iterations: u32) -> Self {
        Self {
            final_answer: Some(raw),
            iterations,
            reason: None,
            note: Some(LoopNote::InvalidJson),
        }
    }

    /// The `final` event reporting this outcome.
    fn to_event(&self) -> RunEvent {
        RunEvent::Final {
            final_answer: self.final_answer.clone(),
            iteration: self.iterations,
            reason: self.reason,
            note: self.note,
        }
    }
}

/// A tool-use agent over one backend and one tool registry.
pub struct ReactAgent {
    backend: Arc<dyn ModelBackend>,
    tools: Arc<ToolRegistry>,
    max_iters: u32,
    options: GenerateOptions,
}

impl ReactAgent {
    pub fn new(backend: Arc<dyn ModelBackend>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            backend,
            tools,
            max_iters: DEFAULT_MAX_ITERS,
            options: GenerateOptions::default(),
        }
    }

    /// Set max iterations.
    pub fn with_max_iters(mut self, max_iters: u32) -> Self {
        self.max_iters = max_iters;
        self
    }

    /// Set the base generation options. The mode is always forced to `react`.
    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn max_iters(&self) -> u32 {
        self.max_iters
    }

    /// Execute the loop for `prompt`, reporting progress into `sink`.
    pub async fn run(
        &self,
        prompt: &str,
        sink: &EventSink,
    ) -> Result<ReactOutcome, stepweave_core::Error> {
        let options = self.options.with_mode(GenerationMode::React);
        let mut history: Vec<String> = Vec::new();

        info!(
            backend = self.backend.name(),
            max_iters = self.max_iters,
            "ReAct loop starting"
        );

        for iteration in 1..=self.max_iters {
            debug!(iteration, "ReAct iteration");
            let composed = format!("{prompt}\n\nHistory:\n{}", history.join("\n"));

            let payload = match self.request_payload(&composed, &options).await? {
                Reply::Structured(payload) => payload,
                Reply::Unstructured(raw) => {
                    warn!(iteration, "Reply still not valid JSON after re-prompt");
                    return Ok(self.finish(ReactOutcome::invalid_json(raw, iteration), sink).await);
                }
            };

            sink.emit(RunEvent::Thought {
                thought: payload.thought.clone(),
                iteration,
            })
            .await;

            if let Some(answer) = payload.answer() {
                info!(iteration, "ReAct loop completed with final answer");
                let outcome = ReactOutcome::answered(answer.to_string(), iteration);
                return Ok(self.finish(outcome, sink).await);
            }

            let Some(action) = payload.requested_action() else {
                info!(iteration, "ReAct loop stopped: no action");
                let outcome = ReactOutcome::stopped(StopReason::NoAction, iteration);
                return Ok(self.finish(outcome, sink).await);
            };

            let action_input = payload
                .action_input
                .clone()
                .unwrap_or_else(|| serde_json::json!({}));

            sink.emit(RunEvent::Action {
                action: action.to_string(),
                action_input: action_input.clone(),
                iteration,
            })
            .await;

            let observation = match self.tools.get(action) {
                Some(tool) => {
                    debug!(iteration, action, "Invoking tool");
                    tool.invoke(action_input).await?
                }
                None => {
                    warn!(iteration, action, "Model requested unknown tool");
                    format!("Unknown tool: {action}")
                }
            };

            sink.emit(RunEvent::Observation {
                observation: observation.clone(),
                iteration,
            })
            .await;

            history.push(format!("Observation: {observation}"));
        }

        warn!("ReAct: max iterations reached ({})", self.max_iters);
        let outcome = ReactOutcome::stopped(StopReason::MaxItersReached, self.max_iters);
        Ok(self.finish(outcome, sink).await)
    }

    /// Ask the backend for a reply, re-prompting once if it does not validate.
    async fn request_payload(
        &self,
        composed: &str,
        options: &GenerateOptions,
    ) -> Result<Reply, stepweave_core::Error> {
        let first = self.backend.generate(composed, options).await?;
        let reply = parse_reply(&first.text);
        if reply.is_structured() {
            return Ok(reply);
        }

        debug!("Reply is not valid JSON, re-prompting");
        let retry_prompt = format!("{composed}\n\n{JSON_REMINDER}");
        let second = self.backend.generate(&retry_prompt, options).await?;
        Ok(parse_reply(&second.text))
    }

    async fn finish(&self, outcome: ReactOutcome, sink: &EventSink) -> ReactOutcome {
        sink.emit(outcome.to_event()).await;
        outcome
    }
}
