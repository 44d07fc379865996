//! Shared test helpers for loop tests.

use std::sync::Arc;
use stepweave_core::event::{EventSink, RunEvent};
use stepweave_core::tool::{FnTool, ToolRegistry};
use tokio::sync::mpsc;

/// A reply requesting `action` with `input`.
pub fn action_reply(action: &str, input: serde_json::Value) -> String {
    serde_json::json!({
        "thought": format!("I should use {action}"),
        "action": action,
        "action_input": input,
        "final_answer": null,
    })
    .to_string()
}

/// A reply carrying a final answer.
pub fn final_reply(answer: &str) -> String {
    serde_json::json!({
        "thought": "I know the answer",
        "action": null,
        "action_input": null,
        "final_answer": answer,
    })
    .to_string()
}

/// Registry with a `lookup` tool (echoes `value of <key>`) and a `search` stub.
pub fn tools() -> Arc<ToolRegistry> {
    let registry = ToolRegistry::new()
        .with(Arc::new(FnTool::new("lookup", "Look up a key", |input| {
            Ok(format!(
                "value of {}",
                input["key"].as_str().unwrap_or_default()
            ))
        })))
        .with(Arc::new(FnTool::new("search", "Search", |_| {
            Ok("Search results: nothing".to_string())
        })));
    Arc::new(registry)
}

/// An enabled sink and its receiver.
pub fn sink() -> (EventSink, mpsc::Receiver<RunEvent>) {
    let (tx, rx) = mpsc::channel(64);
    (EventSink::new(tx), rx)
}

/// Read every event until all senders are dropped.
pub async fn drain(mut rx: mpsc::Receiver<RunEvent>) -> Vec<RunEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

pub fn event_types(events: &[RunEvent]) -> Vec<&'static str> {
    events.iter().map(RunEvent::event_type).collect()
}
