//! Search tool: stub that returns canned search findings.
//!
//! The stub answers factorial-related queries with a known finding so the
//! demo workflow's tool-use step has something to observe, and everything
//! else with an empty result. No network access.

use async_trait::async_trait;
use stepweave_core::error::ToolError;
use stepweave_core::tool::Tool;
use tracing::debug;

const FACTORIAL_FINDING: &str = "Search results: recursive factorial may hit recursion limits \
and needs guard for negative inputs.";

const NO_RESULTS: &str = "Search results: no relevant results found.";

pub struct SearchTool;

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search for known issues and documentation. Input: {\"query\": string}."
    }

    async fn invoke(&self, input: serde_json::Value) -> Result<String, ToolError> {
        let query = input["query"].as_str().unwrap_or_default();
        debug!(query, "Running search");

        if query.to_lowercase().contains("factorial") {
            Ok(FACTORIAL_FINDING.into())
        } else {
            Ok(NO_RESULTS.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn factorial_query_finds_recursion_issue() {
        let out = SearchTool
            .invoke(serde_json::json!({"query": "Recursive Factorial common bugs"}))
            .await
            .unwrap();
        assert!(out.contains("recursion limits"));
    }

    #[tokio::test]
    async fn other_query_finds_nothing() {
        let out = SearchTool
            .invoke(serde_json::json!({"query": "rust lifetimes"}))
            .await
            .unwrap();
        assert_eq!(out, NO_RESULTS);
    }

    #[tokio::test]
    async fn missing_query_is_empty_search() {
        let out = SearchTool.invoke(serde_json::json!({})).await.unwrap();
        assert_eq!(out, NO_RESULTS);
    }
}
