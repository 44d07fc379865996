//! Deterministic offline backend for demos and tests.
//!
//! Inspects the prompt and returns a fixed reply chosen by keyword. The
//! replies are shaped so that the bundled hybrid workflow runs end to end:
//! a JSON summary, a two-iteration tool-use exchange (search, then answer),
//! and a Markdown report stitched from the earlier results.

use async_trait::async_trait;
use serde_json::json;
use stepweave_core::error::BackendError;
use stepweave_core::provider::{GenerateOptions, Generation, ModelBackend};
use tracing::trace;

const SUMMARY_REPLY: &str =
    r#"{"summary": "This function computes the factorial of a number recursively."}"#;

const TESTS_REPLY: &str = r#"{"tests": ["test_factorial_positive", "test_factorial_zero"]}"#;

const INVESTIGATION_ANSWER: &str = "Investigation result: The recursive factorial lacks a guard \
for negative inputs and may hit recursion limits for large n. Recommend adding input validation \
and an iterative implementation for large values.";

const FALLBACK_REPLY: &str = "I don't know exactly; please provide more details.";

/// Keyword-driven mock model.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockBackend;

impl MockBackend {
    pub fn new() -> Self {
        Self
    }

    /// The reply for a prompt. Rules are checked in order; first match wins.
    pub fn reply_for(prompt: &str) -> String {
        let lower = prompt.to_lowercase();

        if lower.contains("summarize") || lower.contains("summarise") {
            return SUMMARY_REPLY.to_string();
        }

        if lower.contains("generate tests") || lower.contains("test cases") {
            return TESTS_REPLY.to_string();
        }

        // A tool has already answered: close the loop.
        if lower.contains("observation:") {
            return json!({
                "thought": "I have enough information from the observation.",
                "action": null,
                "action_input": null,
                "final_answer": INVESTIGATION_ANSWER,
            })
            .to_string();
        }

        if lower.contains("react") || lower.contains("thought") {
            return json!({
                "thought": "I should search for known pitfalls of recursive factorial implementations.",
                "action": "search",
                "action_input": {"query": "recursive factorial common bugs"},
                "final_answer": null,
            })
            .to_string();
        }

        if lower.contains("short markdown report") {
            return markdown_report(prompt);
        }

        FALLBACK_REPLY.to_string()
    }
}

/// Assemble a report from the `Using the summary (...)` and
/// `investigation (...)` fragments of the prompt.
fn markdown_report(prompt: &str) -> String {
    let summary = extract_between(prompt, "Using the summary (", ")");
    let investigation = extract_between(prompt, "investigation (", ")");

    let mut md = String::from("# Report\n\n");
    if let Some(summary) = summary {
        md.push_str("## Summary\n");
        md.push_str(summary);
        md.push_str("\n\n");
    }
    if let Some(investigation) = investigation {
        md.push_str("## Investigation\n");
        md.push_str(investigation);
        md.push_str("\n\n");
    }
    if summary.is_none() && investigation.is_none() {
        md.push_str("No sufficient information available to produce a report.");
    }
    md
}

fn extract_between<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = text.find(start)? + start.len();
    let len = text[from..].find(end)?;
    let found = text[from..from + len].trim();
    (!found.is_empty()).then_some(found)
}

#[async_trait]
impl ModelBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(
        &self,
        prompt: &str,
        _options: &GenerateOptions,
    ) -> std::result::Result<Generation, BackendError> {
        let reply = Self::reply_for(prompt);
        trace!(prompt_len = prompt.len(), reply_len = reply.len(), "Mock reply");
        Ok(Generation {
            text: reply,
            model: Some("mock".into()),
            usage: None,
        })
    }
}
