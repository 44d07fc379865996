//! Workflow definitions: the declarative input of a run.
//!
//! ```json
//! {
//!   "entry_inputs": {"function_code": "def f(): ..."},
//!   "steps": [
//!     {"id": "summary", "name": "Summarize", "template": "Summarize {{ inputs.function_code }}",
//!      "parser": "json", "outputs": ["summary"]}
//!   ]
//! }
//! ```
//!
//! Definitions are read-only once loaded. Step ids are labels only; they are
//! not checked for uniqueness.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use stepweave_core::{Error, Result};

/// The demo workflow shipped with the binary: summary → investigation → report.
pub const BUNDLED_WORKFLOW: &str = include_str!("../../../workflows/hybrid_workflow.json");

/// How a step's model reply is turned into a result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserKind {
    /// Raw reply, captured as `{"_raw": text}`.
    #[default]
    Text,
    /// Reply parsed as JSON; `{"_raw": text}` when it does not parse.
    Json,
    /// The rendered prompt drives a tool-use loop instead of a single call.
    React,
}

/// One step of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    pub id: String,

    #[serde(default)]
    pub name: String,

    pub template: String,

    #[serde(default)]
    pub parser: ParserKind,

    /// Memory keys receiving the step's result, in order.
    #[serde(default)]
    pub outputs: Vec<String>,

    /// Iteration budget for `react` steps; the runner default otherwise.
    #[serde(
        default,
        alias = "maxIters",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_iters: Option<u32>,
}

/// A complete workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Initial memory, also exposed to templates as `inputs`.
    #[serde(default, alias = "entryInputs")]
    pub entry_inputs: Map<String, Value>,

    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

impl WorkflowDefinition {
    /// Parse a workflow from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let workflow: Self = serde_json::from_str(json).map_err(|e| Error::Workflow {
            message: format!("invalid workflow definition: {e}"),
        })?;
        workflow.validate()?;
        Ok(workflow)
    }

    /// Parse a workflow from an already-decoded JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        let workflow: Self = serde_json::from_value(value).map_err(|e| Error::Workflow {
            message: format!("invalid workflow definition: {e}"),
        })?;
        workflow.validate()?;
        Ok(workflow)
    }

    /// Reject definitions that cannot run: a step iteration budget of zero.
    pub fn validate(&self) -> Result<()> {
        if let Some(step) = self.steps.iter().find(|s| s.max_iters == Some(0)) {
            return Err(Error::Workflow {
                message: format!("step '{}': max_iters must be at least 1", step.id),
            });
        }
        Ok(())
    }

    /// Load a workflow from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Workflow {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        Self::from_json_str(&content)
    }

    /// The bundled demo workflow.
    pub fn bundled() -> Result<Self> {
        Self::from_json_str(BUNDLED_WORKFLOW)
    }

    /// Set (or replace) one entry input.
    pub fn set_input(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.entry_inputs.insert(name.into(), value.into());
    }

    /// Builder-style [`WorkflowDefinition::set_input`].
    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_input(name, value);
        self
    }

    /// Append a step.
    pub fn with_step(mut self, step: StepSpec) -> Self {
        self.steps.push(step);
        self
    }
}

impl StepSpec {
    pub fn new(id: impl Into<String>, template: impl Into<String>, parser: ParserKind) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            template: template.into(),
            parser,
            outputs: Vec::new(),
            max_iters: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_iters(mut self, max_iters: u32) -> Self {
        self.max_iters = Some(max_iters);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_minimal_step_defaults() {
        let wf = WorkflowDefinition::from_json_str(
            r#"{"entry_inputs":{"x":1},"steps":[{"id":"s1","template":"{{inputs.x}}"}]}"#,
        )
        .unwrap();
        let step = &wf.steps[0];
        assert_eq!(step.parser, ParserKind::Text);
        assert!(step.outputs.is_empty());
        assert_eq!(step.name, "");
        assert_eq!(step.max_iters, None);
        assert_eq!(wf.entry_inputs["x"], 1);
    }

    #[test]
    fn camel_case_aliases() {
        let wf = WorkflowDefinition::from_json_str(
            r#"{"entryInputs":{"x":1},"steps":[{"id":"r","template":"t","parser":"react","maxIters":2}]}"#,
        )
        .unwrap();
        assert_eq!(wf.entry_inputs["x"], 1);
        assert_eq!(wf.steps[0].parser, ParserKind::React);
        assert_eq!(wf.steps[0].max_iters, Some(2));
    }

    #[test]
    fn unknown_parser_rejected() {
        let err = WorkflowDefinition::from_json_str(
            r#"{"steps":[{"id":"s","template":"t","parser":"yaml"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Workflow { .. }));
    }

    #[test]
    fn zero_step_budget_rejected() {
        let err = WorkflowDefinition::from_json_str(
            r#"{"steps":[{"id":"inv","template":"t","parser":"react","max_iters":0}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Workflow { ref message } if message.contains("'inv'")));

        let err = WorkflowDefinition::from_value(serde_json::json!({
            "steps": [{"id": "inv", "template": "t", "maxIters": 0}]
        }))
        .unwrap_err();
        assert!(matches!(err, Error::Workflow { .. }));

        let wf = WorkflowDefinition::default().with_step(StepSpec::new("ok", "t", ParserKind::React).with_max_iters(1));
        assert!(wf.validate().is_ok());
    }

    #[test]
    fn missing_template_rejected() {
        assert!(WorkflowDefinition::from_json_str(r#"{"steps":[{"id":"s"}]}"#).is_err());
    }

    #[test]
    fn duplicate_ids_allowed() {
        let wf = WorkflowDefinition::from_json_str(
            r#"{"steps":[{"id":"s","template":"a"},{"id":"s","template":"b"}]}"#,
        )
        .unwrap();
        assert_eq!(wf.steps.len(), 2);
    }

    #[test]
    fn bundled_workflow_shape() {
        let wf = WorkflowDefinition::bundled().unwrap();
        let ids: Vec<&str> = wf.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["summary", "investigation", "report"]);
        assert_eq!(wf.steps[1].parser, ParserKind::React);
        assert!(wf.entry_inputs.contains_key("function_code"));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"entry_inputs":{{}},"steps":[{{"id":"a","template":"hi","outputs":["out"]}}]}}"#
        )
        .unwrap();
        let wf = WorkflowDefinition::load(file.path()).unwrap();
        assert_eq!(wf.steps[0].outputs, vec!["out"]);
    }

    #[test]
    fn load_missing_file() {
        let err = WorkflowDefinition::load(Path::new("/nonexistent/wf.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn builders_and_inputs() {
        let wf = WorkflowDefinition::default()
            .with_input("code", "fn main() {}")
            .with_step(
                StepSpec::new("s1", "{{ inputs.code }}", ParserKind::Json)
                    .with_name("Step one")
                    .with_outputs(["a", "b"])
                    .with_max_iters(3),
            );
        assert_eq!(wf.entry_inputs["code"], "fn main() {}");
        assert_eq!(wf.steps[0].outputs, vec!["a", "b"]);
        assert_eq!(wf.steps[0].max_iters, Some(3));
    }
}
