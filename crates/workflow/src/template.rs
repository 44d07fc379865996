//! Prompt template engine.
//!
//! Templates are Jinja, rendered with minijinja against the step context
//! `{"memory": {...}, "inputs": {...}}`:
//!
//! ```text
//! Summarize:\n{{ inputs.function_code }}
//! Answer: {{ get(memory, 'investigation.react_result.final_answer', 'n/a') }}
//! ```
//!
//! Undefined values are strict: printing or descending into a key that does
//! not exist is an error, which aborts the run. Use `get(obj, 'a.b', default)`
//! for optional values; it never fails on a missing key.
//!
//! Output: `none` renders as the empty string, maps and sequences as compact
//! JSON, everything else the way minijinja prints it.

use std::fmt::Write;

use minijinja::value::{Value, ValueKind};
use minijinja::{Environment, ErrorKind, Output, State, UndefinedBehavior};
use stepweave_core::error::TemplateError;
use stepweave_core::template::{TemplateRenderer, safe_get};

/// The built-in [`TemplateRenderer`].
#[derive(Debug, Clone)]
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_formatter(format_value);
        env.add_function("get", get);
        Self { env }
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer for TemplateEngine {
    fn render(&self, template: &str, context: &serde_json::Value) -> Result<String, TemplateError> {
        self.env
            .render_str(template, context)
            .map_err(|e| template_error(&e, template))
    }
}

/// `get(obj, path, default = none)`
fn get(object: Value, path: &str, default: Option<Value>) -> Value {
    let default = default.map(to_json).unwrap_or(serde_json::Value::Null);
    if object.is_undefined() || object.is_none() {
        return Value::from_serialize(&default);
    }
    Value::from_serialize(safe_get(&to_json(object), path, default))
}

fn to_json(value: Value) -> serde_json::Value {
    serde_json::to_value(&value).unwrap_or(serde_json::Value::Null)
}

fn format_value(out: &mut Output<'_>, state: &State<'_, '_>, value: &Value) -> Result<(), minijinja::Error> {
    match value.kind() {
        ValueKind::None => Ok(()),
        ValueKind::Map | ValueKind::Seq => {
            let json = serde_json::to_string(value)
                .map_err(|e| minijinja::Error::new(ErrorKind::BadSerialization, e.to_string()))?;
            out.write_str(&json)
                .map_err(|e| minijinja::Error::new(ErrorKind::WriteFailure, e.to_string()))
        }
        _ => minijinja::escape_formatter(out, state, value),
    }
}

/// Map a minijinja failure onto the renderer's error type, naming the
/// offending source text where minijinja reports a span.
fn template_error(err: &minijinja::Error, template: &str) -> TemplateError {
    let range = err.range();
    let source = range
        .clone()
        .and_then(|r| template.get(r))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let detail = err.detail().map(str::to_string);

    match err.kind() {
        ErrorKind::SyntaxError => TemplateError::Syntax {
            offset: range.map_or(0, |r| r.start),
            message: detail.unwrap_or_else(|| err.to_string()),
        },
        ErrorKind::UndefinedError => TemplateError::Undefined(source.unwrap_or_else(|| err.to_string())),
        ErrorKind::UnknownFunction | ErrorKind::UnknownFilter | ErrorKind::UnknownTest => {
            TemplateError::UnknownFunction(source.unwrap_or_else(|| err.to_string()))
        }
        ErrorKind::MissingArgument | ErrorKind::TooManyArguments | ErrorKind::InvalidOperation => {
            TemplateError::InvalidArguments {
                function: source.unwrap_or_else(|| "template".into()),
                reason: detail.unwrap_or_else(|| err.to_string()),
            }
        }
        _ => TemplateError::Render(err.to_string()),
    }
}
