//! Tool trait: named capabilities the tool-use loop can invoke.
//!
//! A tool maps a structured JSON input to an observation string. Tools may
//! suspend internally (network, subprocess) or return immediately; the loop
//! awaits both the same way.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ToolError;

/// The core Tool trait.
///
/// Tools are registered in the [`ToolRegistry`] under their [`Tool::name`]
/// and resolved by that key at call time.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "search", "run_tests").
    fn name(&self) -> &str;

    /// A description of what this tool does.
    fn description(&self) -> &str;

    /// Invoke the tool and produce the observation text.
    async fn invoke(&self, input: serde_json::Value) -> std::result::Result<String, ToolError>;
}

/// Name and description of a registered tool, for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

type SyncToolFn = dyn Fn(serde_json::Value) -> std::result::Result<String, ToolError> + Send + Sync;

/// A tool backed by a plain synchronous closure.
pub struct FnTool {
    name: String,
    description: String,
    func: Box<SyncToolFn>,
}

impl FnTool {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, func: F) -> Self
    where
        F: Fn(serde_json::Value) -> std::result::Result<String, ToolError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            func: Box::new(func),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(&self, input: serde_json::Value) -> std::result::Result<String, ToolError> {
        (self.func)(input)
    }
}

/// A registry of available tools, keyed by name.
///
/// A missing key is not an error at this layer: [`ToolRegistry::get`] returns
/// `None` and the caller decides what an unknown tool means.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Builder-style [`ToolRegistry::register`].
    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Name and description of every tool, sorted by name.
    pub fn describe(&self) -> Vec<ToolInfo> {
        let mut infos: Vec<ToolInfo> = self
            .tools
            .values()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
