//! Run events: the ordered progress notifications of one workflow run.
//!
//! A run has exactly one producer (the pipeline, and the tool-use loop it
//! delegates to) writing into an [`EventSink`]. Consumers read the matching
//! `mpsc::Receiver` until a terminal event (`done`, `error`, `cancelled`).

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;

/// Why the tool-use loop stopped without an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// The model returned neither an answer nor an action.
    #[serde(rename = "no action")]
    NoAction,
    /// The iteration budget ran out.
    #[serde(rename = "max_iters_reached")]
    MaxItersReached,
}

/// Marks a loop outcome produced by a degradation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopNote {
    /// The model reply could not be validated, even after one re-prompt.
    InvalidJson,
}

/// Events emitted while a workflow run executes.
///
/// Wire protocol (one JSON object per event, tagged by `type`):
/// - `started`          — run accepted, carries the run id
/// - `step_start`       — a step is about to render its prompt
/// - `thought`          — tool-use loop reasoning for one iteration
/// - `action`           — tool-use loop is about to invoke a tool
/// - `observation`      — tool invocation resolved
/// - `final`            — tool-use loop terminated
/// - `step_end`         — a step finished, with its parsed result
/// - `done`             — run completed, with the final memory
/// - `error`            — run failed
/// - `cancelled`        — run was cancelled
/// - `cancel_requested` — a cancel request reached the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    Started {
        run_id: String,
    },

    StepStart {
        step_id: String,
        name: String,
    },

    Thought {
        thought: Option<String>,
        iteration: u32,
    },

    Action {
        action: String,
        action_input: serde_json::Value,
        iteration: u32,
    },

    Observation {
        observation: String,
        iteration: u32,
    },

    Final {
        final_answer: Option<String>,
        iteration: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<StopReason>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<LoopNote>,
    },

    StepEnd {
        step_id: String,
        parsed: serde_json::Value,
    },

    Done {
        result: serde_json::Value,
    },

    Error {
        error: String,
    },

    Cancelled {
        run_id: String,
    },

    CancelRequested {
        run_id: String,
    },
}

impl RunEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::StepStart { .. } => "step_start",
            Self::Thought { .. } => "thought",
            Self::Action { .. } => "action",
            Self::Observation { .. } => "observation",
            Self::Final { .. } => "final",
            Self::StepEnd { .. } => "step_end",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
            Self::Cancelled { .. } => "cancelled",
            Self::CancelRequested { .. } => "cancel_requested",
        }
    }

    /// Whether this event ends the run's stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done { .. } | Self::Error { .. } | Self::Cancelled { .. }
        )
    }
}

/// Write side of a run's event channel.
///
/// A disabled sink drops every event, which is how non-streamed runs execute
/// the same code path. Delivery failures (consumer gone) are swallowed: the
/// run keeps going whether or not anyone is listening.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<RunEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<RunEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Send an event, waiting for channel capacity.
    pub async fn emit(&self, event: RunEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        let kind = event.event_type();
        if tx.send(event).await.is_err() {
            trace!(event = kind, "Event consumer gone, dropping event");
        }
    }
}
