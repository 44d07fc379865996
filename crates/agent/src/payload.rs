//! The four-key reply schema of the tool-use loop.
//!
//! Every loop reply must be a JSON object using only the keys `thought`,
//! `action`, `action_input`, and `final_answer`, each of the expected type.
//! Text that does not validate becomes [`Reply::Unstructured`] instead of an
//! error, so the loop can re-prompt or degrade.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A validated loop reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReactPayload {
    #[serde(default)]
    pub thought: Option<String>,

    #[serde(default)]
    pub action: Option<String>,

    #[serde(default, alias = "actionInput")]
    pub action_input: Option<Value>,

    #[serde(default, alias = "finalAnswer")]
    pub final_answer: Option<String>,
}

impl ReactPayload {
    /// The final answer, if present and non-empty.
    pub fn answer(&self) -> Option<&str> {
        self.final_answer.as_deref().filter(|a| !a.is_empty())
    }

    /// The requested action, if present and non-empty.
    pub fn requested_action(&self) -> Option<&str> {
        self.action.as_deref().filter(|a| !a.is_empty())
    }
}

/// Outcome of validating one model reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Structured(ReactPayload),
    /// The raw text, kept verbatim.
    Unstructured(String),
}

impl Reply {
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Structured(_))
    }
}

/// Validate a model reply against the four-key schema.
///
/// A reply wrapped in a single Markdown code fence is unwrapped first.
pub fn parse_reply(text: &str) -> Reply {
    let body = strip_code_fence(text);
    let payload = serde_json::from_str::<Value>(body)
        .ok()
        .filter(Value::is_object)
        .and_then(|value| serde_json::from_value::<ReactPayload>(value).ok());

    match payload {
        Some(payload) => Reply::Structured(payload),
        None => Reply::Unstructured(text.to_string()),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    else {
        return trimmed;
    };
    inner.strip_prefix("json").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_action_reply() {
        let reply = parse_reply(
            r#"{"thought":"look it up","action":"search","action_input":{"query":"q"},"final_answer":null}"#,
        );
        let Reply::Structured(payload) = reply else {
            panic!("expected structured reply");
        };
        assert_eq!(payload.requested_action(), Some("search"));
        assert_eq!(payload.action_input, Some(json!({"query": "q"})));
        assert_eq!(payload.answer(), None);
    }

    #[test]
    fn camel_case_keys_accepted() {
        let reply = parse_reply(r#"{"thought":"t","actionInput":{"a":1},"finalAnswer":"done"}"#);
        let Reply::Structured(payload) = reply else {
            panic!("expected structured reply");
        };
        assert_eq!(payload.answer(), Some("done"));
        assert_eq!(payload.action_input, Some(json!({"a": 1})));
    }

    #[test]
    fn missing_keys_are_absent() {
        let Reply::Structured(payload) = parse_reply("{}") else {
            panic!("expected structured reply");
        };
        assert_eq!(payload, ReactPayload::default());
    }

    #[test]
    fn empty_strings_do_not_count() {
        let Reply::Structured(payload) = parse_reply(r#"{"action":"","final_answer":""}"#) else {
            panic!("expected structured reply");
        };
        assert_eq!(payload.answer(), None);
        assert_eq!(payload.requested_action(), None);
    }

    #[test]
    fn invalid_json_is_unstructured() {
        assert_eq!(
            parse_reply("I think we should search"),
            Reply::Unstructured("I think we should search".into())
        );
    }

    #[test]
    fn non_object_json_is_unstructured() {
        assert!(!parse_reply("[1, 2]").is_structured());
        assert!(!parse_reply("\"final\"").is_structured());
        assert!(!parse_reply("null").is_structured());
    }

    #[test]
    fn wrong_types_are_unstructured() {
        assert!(!parse_reply(r#"{"thought": 42}"#).is_structured());
        assert!(!parse_reply(r#"{"action": ["search"]}"#).is_structured());
    }

    #[test]
    fn unknown_keys_are_unstructured() {
        assert!(!parse_reply(r#"{"thought":"t","tool":"search"}"#).is_structured());
    }

    #[test]
    fn code_fence_is_unwrapped() {
        let reply = parse_reply("```json\n{\"final_answer\": \"42\"}\n```");
        let Reply::Structured(payload) = reply else {
            panic!("expected structured reply");
        };
        assert_eq!(payload.answer(), Some("42"));

        assert!(parse_reply("```\n{\"action\": \"search\"}\n```").is_structured());
    }

    #[test]
    fn unstructured_keeps_raw_text() {
        let raw = "```json\nnot json\n```";
        assert_eq!(parse_reply(raw), Reply::Unstructured(raw.into()));
    }
}
