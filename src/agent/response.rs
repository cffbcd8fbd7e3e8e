//! Model turn parsing.
//!
//! A model turn is either native tool calls, a JSON object carrying
//! `tool_calls` in its text content, or a plain reply. Text that looks like
//! JSON but does not parse is kept as a plain reply; the raw output is logged
//! so the failure can be diagnosed.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::providers::{LLMResponse, LLMToolCall};
use crate::utils::string::{preview, strip_code_fences};

/// What the model asked for in one step.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedTurn {
    /// Text for the user; may be empty when only tool calls were returned
    pub reply: String,
    /// Calls to run, in the order the model returned them
    pub tool_calls: Vec<LLMToolCall>,
}

#[derive(Debug, Deserialize)]
struct JsonToolCall {
    #[serde(alias = "name")]
    tool_name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct JsonTurn {
    #[serde(default)]
    tool_calls: Vec<JsonToolCall>,
    #[serde(default, alias = "response")]
    content: Option<String>,
}

impl ParsedTurn {
    pub fn from_response(response: &LLMResponse) -> Self {
        if response.has_tool_calls() {
            return Self {
                reply: response.content.clone(),
                tool_calls: response.tool_calls.clone(),
            };
        }

        let body = strip_code_fences(&response.content);
        if !body.starts_with('{') {
            return Self::plain(&response.content);
        }

        match serde_json::from_str::<JsonTurn>(body) {
            Ok(turn) if !turn.tool_calls.is_empty() => Self {
                reply: turn.content.unwrap_or_default(),
                tool_calls: turn
                    .tool_calls
                    .into_iter()
                    .map(|call| {
                        let arguments = match call.arguments {
                            Value::Null => "{}".to_string(),
                            Value::String(raw) => raw,
                            other => other.to_string(),
                        };
                        let id = format!("call_{}", uuid::Uuid::new_v4().simple());
                        LLMToolCall::new(&id, &call.tool_name, &arguments)
                    })
                    .collect(),
            },
            Ok(turn) => match turn.content {
                Some(content) => Self::plain(&content),
                None => Self::plain(&response.content),
            },
            Err(e) => {
                warn!(
                    error = %e,
                    raw = %preview(&response.content, 500),
                    "Model output looked like JSON but did not parse; treating as plain reply"
                );
                Self::plain(&response.content)
            }
        }
    }

    fn plain(text: &str) -> Self {
        Self {
            reply: text.to_string(),
            tool_calls: Vec::new(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_tool_calls_win() {
        let response = LLMResponse::with_tools(
            "checking",
            vec![LLMToolCall::new("c1", "get_weather", r#"{"location":"Paris"}"#)],
        );
        let turn = ParsedTurn::from_response(&response);
        assert_eq!(turn.reply, "checking");
        assert_eq!(turn.tool_calls[0].id, "c1");
    }

    #[test]
    fn test_json_tool_calls_in_content() {
        let response = LLMResponse::text(
            "```json\n{\"content\": \"One moment\", \"tool_calls\": [{\"tool_name\": \"get_weather\", \"arguments\": {\"location\": \"Paris\"}}]}\n```",
        );
        let turn = ParsedTurn::from_response(&response);
        assert_eq!(turn.reply, "One moment");
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_calls[0].name, "get_weather");
        assert_eq!(
            turn.tool_calls[0].parse_arguments().unwrap()["location"],
            "Paris"
        );
        assert!(turn.tool_calls[0].id.starts_with("call_"));
    }

    #[test]
    fn test_json_without_calls_uses_response_field() {
        let response = LLMResponse::text(r#"{"response": "It is 15°C.", "tool_calls": []}"#);
        let turn = ParsedTurn::from_response(&response);
        assert_eq!(turn.reply, "It is 15°C.");
        assert!(!turn.has_tool_calls());
    }

    #[test]
    fn test_broken_json_is_plain_reply() {
        let raw = r#"{"tool_calls": [{"tool_name": "get_weather", "#;
        let turn = ParsedTurn::from_response(&LLMResponse::text(raw));
        assert_eq!(turn.reply, raw);
        assert!(turn.tool_calls.is_empty());
    }

    #[test]
    fn test_plain_text() {
        let turn = ParsedTurn::from_response(&LLMResponse::text("It is 15°C in Paris."));
        assert_eq!(turn.reply, "It is 15°C in Paris.");
        assert!(!turn.has_tool_calls());
    }
}
