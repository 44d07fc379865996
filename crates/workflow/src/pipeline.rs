//! Step pipeline: executes a workflow's steps in order against one memory.
//!
//! Per step:
//! 1. `step_start`
//! 2. render the template with `{"memory": ..., "inputs": ...}`
//! 3. produce a result according to the step's parser
//!    (`text`/`json` call the backend once, `react` runs a tool-use loop)
//! 4. route the result into memory by the step's `outputs`
//! 5. `step_end` with the result
//!
//! A render, backend, or tool failure stops the run; memory written by
//! earlier steps is not rolled back.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use stepweave_agent::{DEFAULT_MAX_ITERS, ReactAgent};
use stepweave_core::event::{EventSink, RunEvent};
use stepweave_core::provider::{GenerateOptions, ModelBackend};
use stepweave_core::template::TemplateRenderer;
use stepweave_core::tool::ToolRegistry;
use stepweave_core::Result;
use tracing::{debug, info, warn};

use crate::model::{ParserKind, StepSpec, WorkflowDefinition};
use crate::template::TemplateEngine;

/// The run's shared state. Keys are only ever added or overwritten.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Memory(Map<String, Value>);

impl Memory {
    fn seeded(inputs: &Map<String, Value>) -> Self {
        Self(inputs.clone())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    fn insert(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_string(), value);
    }

    /// Write a step result into memory according to `outputs`.
    ///
    /// - no outputs: the result is dropped
    /// - one output: it receives the whole result
    /// - several outputs: each receives the same-named field of the result,
    ///   or `null` when absent; a non-object result goes to the first output
    ///   only and the others stay unset
    fn route(&mut self, step_id: &str, outputs: &[String], parsed: Value) {
        match outputs {
            [] => {}
            [only] => self.insert(only, parsed),
            [first, ..] => match parsed {
                Value::Object(fields) => {
                    for name in outputs {
                        let value = fields.get(name).cloned().unwrap_or(Value::Null);
                        self.insert(name, value);
                    }
                }
                other => {
                    warn!(
                        step_id,
                        outputs = ?outputs,
                        "Step result is not an object; assigning it to the first output only"
                    );
                    self.insert(first, other);
                }
            },
        }
    }
}

impl From<Memory> for Value {
    fn from(memory: Memory) -> Self {
        Value::Object(memory.0)
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub memory: Memory,
}

fn raw_capture(text: String) -> Value {
    json!({ "_raw": text })
}

/// Executes workflows against one backend and tool registry.
pub struct WorkflowRunner {
    backend: Arc<dyn ModelBackend>,
    tools: Arc<ToolRegistry>,
    renderer: Arc<dyn TemplateRenderer>,
    options: GenerateOptions,
    react_max_iters: u32,
}

impl WorkflowRunner {
    pub fn new(backend: Arc<dyn ModelBackend>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            backend,
            tools,
            renderer: Arc::new(TemplateEngine::new()),
            options: GenerateOptions::default(),
            react_max_iters: DEFAULT_MAX_ITERS,
        }
    }

    /// Replace the template renderer.
    pub fn with_renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Set the generation options passed to every backend call.
    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the iteration budget for `react` steps without their own.
    pub fn with_max_iters(mut self, max_iters: u32) -> Self {
        self.react_max_iters = max_iters;
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Run every step of `workflow` in order, reporting into `sink`.
    pub async fn run(&self, workflow: &WorkflowDefinition, sink: &EventSink) -> Result<RunOutput> {
        workflow.validate()?;
        let inputs = Value::Object(workflow.entry_inputs.clone());
        let mut memory = Memory::seeded(&workflow.entry_inputs);

        info!(
            steps = workflow.steps.len(),
            backend = self.backend.name(),
            "Workflow run starting"
        );

        for step in &workflow.steps {
            sink.emit(RunEvent::StepStart {
                step_id: step.id.clone(),
                name: step.name.clone(),
            })
            .await;

            let context = json!({
                "memory": Value::Object(memory.as_map().clone()),
                "inputs": inputs,
            });
            let prompt = self.renderer.render(&step.template, &context)?;
            debug!(step_id = %step.id, prompt_len = prompt.len(), "Rendered step prompt");

            let parsed = self.execute_step(step, &prompt, sink).await?;
            memory.route(&step.id, &step.outputs, parsed.clone());

            info!(step_id = %step.id, parser = ?step.parser, "Step completed");
            sink.emit(RunEvent::StepEnd {
                step_id: step.id.clone(),
                parsed,
            })
            .await;
        }

        info!(keys = memory.len(), "Workflow run completed");
        Ok(RunOutput { memory })
    }

    async fn execute_step(&self, step: &StepSpec, prompt: &str, sink: &EventSink) -> Result<Value> {
        match step.parser {
            ParserKind::Text => {
                let reply = self.backend.generate(prompt, &self.options).await?;
                Ok(raw_capture(reply.text))
            }
            ParserKind::Json => {
                let reply = self.backend.generate(prompt, &self.options).await?;
                match serde_json::from_str::<Value>(&reply.text) {
                    Ok(value) => Ok(value),
                    Err(e) => {
                        warn!(step_id = %step.id, error = %e, "Reply is not valid JSON, keeping raw text");
                        Ok(raw_capture(reply.text))
                    }
                }
            }
            ParserKind::React => {
                let agent = ReactAgent::new(self.backend.clone(), self.tools.clone())
                    .with_max_iters(step.max_iters.unwrap_or(self.react_max_iters))
                    .with_options(self.options.clone());
                let outcome = agent.run(prompt, sink).await?;
                Ok(json!({ "react_result": serde_json::to_value(&outcome)? }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepweave_core::error::{BackendError, TemplateError};
    use stepweave_providers::{EchoBackend, ScriptedBackend, ScriptedReply};
    use tokio::sync::mpsc;

    fn runner(backend: Arc<dyn ModelBackend>) -> WorkflowRunner {
        WorkflowRunner::new(backend, Arc::new(stepweave_tools::default_registry()))
    }

    async fn run_collecting(
        runner: &WorkflowRunner,
        workflow: &WorkflowDefinition,
    ) -> (Result<RunOutput>, Vec<RunEvent>) {
        let (tx, mut rx) = mpsc::channel(256);
        let sink = EventSink::new(tx);
        let result = runner.run(workflow, &sink).await;
        drop(sink);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (result, events)
    }

    #[tokio::test]
    async fn echo_scenario() {
        let wf = WorkflowDefinition::from_json_str(
            r#"{"entry_inputs":{"x":1},"steps":[{"id":"s1","template":"{{inputs.x}}","parser":"text","outputs":["echo"]}]}"#,
        )
        .unwrap();
        let output = runner(Arc::new(EchoBackend::new()))
            .run(&wf, &EventSink::disabled())
            .await
            .unwrap();
        assert_eq!(
            Value::from(output.memory),
            json!({"x": 1, "echo": {"_raw": "1"}})
        );
    }

    #[tokio::test]
    async fn json_step_falls_back_to_raw() {
        let wf = WorkflowDefinition::default().with_step(
            StepSpec::new("s", "give json", ParserKind::Json).with_outputs(["result"]),
        );
        let output = runner(Arc::new(ScriptedBackend::new(["not-json"])))
            .run(&wf, &EventSink::disabled())
            .await
            .unwrap();
        assert_eq!(output.memory.get("result"), Some(&json!({"_raw": "not-json"})));
    }

    #[tokio::test]
    async fn json_step_parses_reply() {
        let wf = WorkflowDefinition::default().with_step(
            StepSpec::new("s", "give json", ParserKind::Json).with_outputs(["result"]),
        );
        let output = runner(Arc::new(ScriptedBackend::new([r#"{"a": [1, 2]}"#])))
            .run(&wf, &EventSink::disabled())
            .await
            .unwrap();
        assert_eq!(output.memory.get("result"), Some(&json!({"a": [1, 2]})));
    }

    #[tokio::test]
    async fn zero_outputs_discard_result() {
        let wf = WorkflowDefinition::default()
            .with_input("x", 1)
            .with_step(StepSpec::new("s", "hi", ParserKind::Text));
        let output = runner(Arc::new(EchoBackend::new()))
            .run(&wf, &EventSink::disabled())
            .await
            .unwrap();
        assert_eq!(Value::from(output.memory), json!({"x": 1}));
    }

    #[tokio::test]
    async fn multiple_outputs_extract_fields() {
        let wf = WorkflowDefinition::default().with_step(
            StepSpec::new("s", "p", ParserKind::Json).with_outputs(["a", "b", "missing"]),
        );
        let output = runner(Arc::new(ScriptedBackend::new([r#"{"a": 1, "b": {"c": 2}, "extra": 3}"#])))
            .run(&wf, &EventSink::disabled())
            .await
            .unwrap();
        assert_eq!(
            Value::from(output.memory),
            json!({"a": 1, "b": {"c": 2}, "missing": null})
        );
    }

    #[tokio::test]
    async fn multiple_outputs_non_object_goes_to_first() {
        let wf = WorkflowDefinition::default().with_step(
            StepSpec::new("s", "p", ParserKind::Json).with_outputs(["a", "b"]),
        );
        let output = runner(Arc::new(ScriptedBackend::new(["[1, 2, 3]"])))
            .run(&wf, &EventSink::disabled())
            .await
            .unwrap();
        assert_eq!(output.memory.get("a"), Some(&json!([1, 2, 3])));
        assert!(!output.memory.contains_key("b"));
    }

    #[tokio::test]
    async fn later_steps_see_earlier_outputs() {
        let wf = WorkflowDefinition::default()
            .with_input("name", "world")
            .with_step(StepSpec::new("first", "hello {{ inputs.name }}", ParserKind::Text).with_outputs(["greeting"]))
            .with_step(
                StepSpec::new("second", "{{ memory.greeting._raw }}!", ParserKind::Text)
                    .with_outputs(["shout"]),
            );
        let output = runner(Arc::new(EchoBackend::new()))
            .run(&wf, &EventSink::disabled())
            .await
            .unwrap();
        assert_eq!(output.memory.get("shout"), Some(&json!({"_raw": "hello world!"})));
    }

    #[tokio::test]
    async fn outputs_overwrite_existing_keys() {
        let wf = WorkflowDefinition::default()
            .with_input("x", 1)
            .with_step(StepSpec::new("s", "new", ParserKind::Text).with_outputs(["x"]));
        let output = runner(Arc::new(EchoBackend::new()))
            .run(&wf, &EventSink::disabled())
            .await
            .unwrap();
        assert_eq!(output.memory.get("x"), Some(&json!({"_raw": "new"})));
    }

    #[tokio::test]
    async fn memory_keys_are_inputs_plus_outputs() {
        let wf = WorkflowDefinition::default()
            .with_input("a", 1)
            .with_input("b", 2)
            .with_step(StepSpec::new("s1", "x", ParserKind::Text).with_outputs(["c"]))
            .with_step(StepSpec::new("s2", "{}", ParserKind::Json).with_outputs(["d", "e"]))
            .with_step(StepSpec::new("s3", "y", ParserKind::Text));
        let output = runner(Arc::new(EchoBackend::new()))
            .run(&wf, &EventSink::disabled())
            .await
            .unwrap();
        let mut keys: Vec<&str> = output.memory.keys().collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn zero_step_budget_rejected_before_any_call() {
        let backend = Arc::new(ScriptedBackend::new(["unused"]));
        let wf = WorkflowDefinition::default()
            .with_step(StepSpec::new("r", "go", ParserKind::React).with_max_iters(0));
        let (result, events) = run_collecting(&runner(backend.clone()), &wf).await;

        assert!(matches!(result, Err(stepweave_core::Error::Workflow { .. })));
        assert_eq!(backend.call_count(), 0);
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn template_failure_stops_run() {
        let backend = Arc::new(ScriptedBackend::new(["one", "two"]));
        let wf = WorkflowDefinition::default()
            .with_step(StepSpec::new("ok", "fine", ParserKind::Text).with_outputs(["first"]))
            .with_step(StepSpec::new("bad", "{{ memory.nope }}", ParserKind::Text))
            .with_step(StepSpec::new("never", "unreached", ParserKind::Text));
        let (result, events) = run_collecting(&runner(backend.clone()), &wf).await;

        let err = result.unwrap_err();
        assert!(matches!(
            err,
            stepweave_core::Error::Template(TemplateError::Undefined(_))
        ));
        assert_eq!(backend.call_count(), 1);
        let types: Vec<&str> = events.iter().map(RunEvent::event_type).collect();
        assert_eq!(types, vec!["step_start", "step_end", "step_start"]);
    }

    #[tokio::test]
    async fn backend_failure_stops_run() {
        let backend = Arc::new(ScriptedBackend::new([ScriptedReply::Fail(
            BackendError::Network("down".into()),
        )]));
        let wf = WorkflowDefinition::default()
            .with_step(StepSpec::new("s", "p", ParserKind::Text).with_outputs(["a"]));
        let err = runner(backend).run(&wf, &EventSink::disabled()).await.unwrap_err();
        assert!(err.to_string().contains("down"));
    }

    #[tokio::test]
    async fn react_step_wraps_outcome_without_extra_call() {
        let backend = Arc::new(ScriptedBackend::new([
            r#"{"thought":"search","action":"search","action_input":{"query":"factorial"},"final_answer":null}"#,
            r#"{"thought":"done","action":null,"action_input":null,"final_answer":"add a guard"}"#,
        ]));
        let wf = WorkflowDefinition::default().with_step(
            StepSpec::new("inv", "Investigate", ParserKind::React)
                .with_name("Investigation")
                .with_outputs(["investigation"]),
        );
        let (result, events) = run_collecting(&runner(backend.clone()), &wf).await;
        let output = result.unwrap();

        assert_eq!(
            output.memory.get("investigation"),
            Some(&json!({"react_result": {"final_answer": "add a guard", "iterations": 2}}))
        );
        assert_eq!(backend.call_count(), 2);
        assert!(backend.calls().iter().all(|c| c.options.is_react()));

        let types: Vec<&str> = events.iter().map(RunEvent::event_type).collect();
        assert_eq!(
            types,
            vec![
                "step_start",
                "thought",
                "action",
                "observation",
                "thought",
                "final",
                "step_end"
            ]
        );
        assert_eq!(
            events[0],
            RunEvent::StepStart {
                step_id: "inv".into(),
                name: "Investigation".into()
            }
        );
    }

    #[tokio::test]
    async fn react_step_budget_from_step_then_runner() {
        let action = r#"{"thought":"t","action":"search","action_input":{"query":"q"}}"#;
        let wf = WorkflowDefinition::default().with_step(
            StepSpec::new("r", "p", ParserKind::React)
                .with_outputs(["out"])
                .with_max_iters(1),
        );
        let backend = Arc::new(ScriptedBackend::new([action]));
        let output = runner(backend.clone())
            .with_max_iters(5)
            .run(&wf, &EventSink::disabled())
            .await
            .unwrap();
        assert_eq!(
            output.memory.get("out"),
            Some(&json!({"react_result": {"final_answer": null, "iterations": 1, "reason": "max_iters_reached"}}))
        );

        let wf = WorkflowDefinition::default()
            .with_step(StepSpec::new("r", "p", ParserKind::React).with_outputs(["out"]));
        let backend = Arc::new(ScriptedBackend::new([action, action]));
        let output = runner(backend.clone())
            .with_max_iters(2)
            .run(&wf, &EventSink::disabled())
            .await
            .unwrap();
        assert_eq!(output.memory.get("out").unwrap()["react_result"]["iterations"], 2);
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn step_events_wrap_each_step() {
        let wf = WorkflowDefinition::default()
            .with_input("x", 1)
            .with_step(StepSpec::new("a", "{{ inputs.x }}", ParserKind::Text).with_outputs(["a"]))
            .with_step(StepSpec::new("b", "2", ParserKind::Json).with_outputs(["b"]));
        let (result, events) = run_collecting(&runner(Arc::new(EchoBackend::new())), &wf).await;
        result.unwrap();

        assert_eq!(
            events,
            vec![
                RunEvent::StepStart { step_id: "a".into(), name: String::new() },
                RunEvent::StepEnd { step_id: "a".into(), parsed: json!({"_raw": "1"}) },
                RunEvent::StepStart { step_id: "b".into(), name: String::new() },
                RunEvent::StepEnd { step_id: "b".into(), parsed: json!(2) },
            ]
        );
    }

    #[tokio::test]
    async fn generation_options_forwarded() {
        let backend = Arc::new(ScriptedBackend::new(["ok"]));
        let wf = WorkflowDefinition::default().with_step(StepSpec::new("s", "p", ParserKind::Text));
        runner(backend.clone())
            .with_options(GenerateOptions {
                temperature: Some(0.0),
                ..Default::default()
            })
            .run(&wf, &EventSink::disabled())
            .await
            .unwrap();
        let call = &backend.calls()[0];
        assert_eq!(call.options.temperature, Some(0.0));
        assert!(!call.options.is_react());
    }

    #[tokio::test]
    async fn custom_renderer() {
        struct Upper;
        impl TemplateRenderer for Upper {
            fn render(&self, template: &str, _context: &Value) -> std::result::Result<String, TemplateError> {
                Ok(template.to_uppercase())
            }
        }
        let wf = WorkflowDefinition::default()
            .with_step(StepSpec::new("s", "shout", ParserKind::Text).with_outputs(["out"]));
        let output = runner(Arc::new(EchoBackend::new()))
            .with_renderer(Arc::new(Upper))
            .run(&wf, &EventSink::disabled())
            .await
            .unwrap();
        assert_eq!(output.memory.get("out"), Some(&json!({"_raw": "SHOUT"})));
    }

    #[test]
    fn run_output_serializes_memory_object() {
        let mut memory = Memory::default();
        memory.insert("k", json!("v"));
        let output = RunOutput { memory };
        assert_eq!(
            serde_json::to_value(&output).unwrap(),
            json!({"memory": {"k": "v"}})
        );
    }
}
