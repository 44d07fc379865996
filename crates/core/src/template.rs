//! Template rendering seam.
//!
//! The pipeline renders each step's prompt from a context of the form
//! `{"memory": {...}, "inputs": {...}}`. Renderers must be pure: the same
//! template and context always produce the same text.

use serde_json::Value;

use crate::error::TemplateError;

/// Renders prompt templates against a JSON context.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, context: &Value) -> std::result::Result<String, TemplateError>;
}

/// Look up a dotted path (`"a.b.c"`) inside `value`.
///
/// Returns `default` when any segment is absent, when the traversal reaches a
/// non-object before the path is exhausted, or when the value found is `null`.
pub fn safe_get(value: &Value, path: &str, default: Value) -> Value {
    let mut current = value;
    for segment in path.split('.') {
        match current {
            Value::Object(map) => match map.get(segment) {
                Some(next) => current = next,
                None => return default,
            },
            _ => return default,
        }
    }
    if current.is_null() {
        default
    } else {
        current.clone()
    }
}
