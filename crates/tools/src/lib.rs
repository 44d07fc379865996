//! Built-in tool implementations for Stepweave.
//!
//! Tools are what the tool-use loop acts with: it names one in its `action`
//! and receives the tool's text output as the next observation.

pub mod search;

use std::sync::Arc;

use stepweave_core::tool::ToolRegistry;

pub use run_tests::RunTestsTool;
pub use search::SearchTool;

/// Create a default tool registry with all built-in tools.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(SearchTool));
    registry.register(Arc::new(RunTestsTool));
    registry
}
