//! OpenAI-compatible chat backend.
//!
//! Serialises history turns straight into the Chat Completions wire format
//! by borrowing from [`Message`]. Tool-result turns (user turns carrying a
//! `tool_call_id`) go out with the `tool` role so the backend can pair them
//! with the assistant turn that proposed the call.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::DEFAULT_MODEL;
use crate::error::{ProviderError, Result, VosError};
use crate::session::{Message, Role, ToolCall};

use super::{ChatOptions, LLMProvider, LLMResponse, LLMToolCall, ToolDefinition};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

// ============================================================================
// Outgoing wire format
// ============================================================================

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Turn<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<FunctionTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// One history turn as the API expects it, tagged by role.
#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum Turn<'a> {
    System {
        content: &'a str,
    },
    User {
        content: &'a str,
    },
    Assistant {
        /// Null when the turn only proposes tool calls
        content: Option<&'a str>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<FunctionCall<'a>>,
    },
    Tool {
        tool_call_id: &'a str,
        content: &'a str,
    },
}

impl<'a> From<&'a Message> for Turn<'a> {
    fn from(msg: &'a Message) -> Self {
        let content = msg.content.as_str();
        match (msg.role, msg.tool_call_id.as_deref()) {
            (Role::System, _) => Turn::System { content },
            (Role::User, Some(tool_call_id)) => Turn::Tool {
                tool_call_id,
                content,
            },
            (Role::User, None) => Turn::User { content },
            (Role::Assistant, _) => {
                let tool_calls: Vec<FunctionCall<'a>> = msg
                    .tool_calls
                    .iter()
                    .flatten()
                    .map(FunctionCall::from)
                    .collect();
                let content = match (content.is_empty(), tool_calls.is_empty()) {
                    (true, false) => None,
                    _ => Some(content),
                };
                Turn::Assistant {
                    content,
                    tool_calls,
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct FunctionCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: CallTarget<'a>,
}

#[derive(Debug, Serialize)]
struct CallTarget<'a> {
    name: &'a str,
    arguments: &'a str,
}

impl<'a> From<&'a ToolCall> for FunctionCall<'a> {
    fn from(call: &'a ToolCall) -> Self {
        Self {
            id: &call.id,
            kind: "function",
            function: CallTarget {
                name: &call.name,
                arguments: &call.arguments,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct FunctionTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDefinition,
}

// ============================================================================
// Incoming wire format
// ============================================================================

#[derive(Debug, Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ProposedCall>>,
}

#[derive(Debug, Deserialize)]
struct ProposedCall {
    id: String,
    function: ProposedTarget,
}

#[derive(Debug, Deserialize)]
struct ProposedTarget {
    name: String,
    #[serde(default)]
    arguments: String,
}

impl From<Completion> for LLMResponse {
    /// Only the first choice is used; an empty completion is an empty reply.
    fn from(completion: Completion) -> Self {
        let Some(choice) = completion.choices.into_iter().next() else {
            return LLMResponse::default();
        };
        let content = choice.message.content.unwrap_or_default();
        let calls: Vec<LLMToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|c| LLMToolCall {
                id: c.id,
                name: c.function.name,
                arguments: c.function.arguments,
            })
            .collect();
        LLMResponse {
            content,
            tool_calls: calls,
        }
    }
}

// ============================================================================
// Provider
// ============================================================================

/// Chat Completions client for OpenAI or any compatible endpoint.
pub struct OpenAIProvider {
    api_key: String,
    api_base: String,
    client: Client,
}

impl OpenAIProvider {
    /// Provider for the public OpenAI endpoint.
    ///
    /// ```
    /// use vos_agent::providers::openai::OpenAIProvider;
    /// use vos_agent::providers::LLMProvider;
    ///
    /// let provider = OpenAIProvider::new("sk-xxx");
    /// assert_eq!(provider.name(), "openai");
    /// ```
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, OPENAI_API_URL)
    }

    /// Provider for a compatible endpoint; a trailing slash is dropped.
    pub fn with_base_url(api_key: &str, api_base: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

fn build_request<'a>(
    model: &'a str,
    messages: &'a [Message],
    tools: &'a [ToolDefinition],
    options: &ChatOptions,
) -> CompletionRequest<'a> {
    CompletionRequest {
        model,
        messages: messages.iter().map(Turn::from).collect(),
        tools: tools
            .iter()
            .map(|function| FunctionTool {
                kind: "function",
                function,
            })
            .collect(),
        max_tokens: options.max_tokens,
        temperature: options.temperature,
    }
}

/// Classify a non-2xx response, using `error.type` and `error.message`
/// from the body when it has them.
fn map_error_response(status: u16, body: &str) -> ProviderError {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            let error = v.get("error")?;
            let message = error.get("message")?.as_str()?;
            let kind = error.get("type").and_then(Value::as_str).unwrap_or("error");
            Some(format!("{} - {}", kind, message))
        })
        .unwrap_or_else(|| body.to_string());
    ProviderError::from_status(status, &format!("OpenAI API error ({}): {}", status, detail))
}

fn map_send_error(e: reqwest::Error) -> VosError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string()).into()
    } else {
        VosError::Provider(format!("OpenAI request failed: connection error: {}", e))
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn chat(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<LLMResponse> {
        let model = model.unwrap_or(DEFAULT_MODEL);
        let request = build_request(model, &messages, &tools, &options);
        debug!(model, turns = request.messages.len(), tools = request.tools.len(), "OpenAI request");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_error_response(status.as_u16(), &body).into());
        }

        let completion: Completion = response.json().await.map_err(|e| {
            VosError::from(ProviderError::Format(format!(
                "Failed to parse OpenAI response: {}",
                e
            )))
        })?;
        Ok(completion.into())
    }

    fn default_model(&self) -> &str {
        DEFAULT_MODEL
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_base_url_trailing_slash_dropped() {
        let provider = OpenAIProvider::with_base_url("k", "http://localhost:8080/v1/");
        assert_eq!(provider.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_tool_cycle_serialises_with_tool_role() {
        let history = vec![
            Message::system("You are weather_agent"),
            Message::user("Weather in Paris?"),
            Message::assistant_with_tools(
                "",
                vec![ToolCall::new("call_1", "get_weather", r#"{"location":"Paris"}"#)],
            ),
            Message::tool_result("call_1", r#"{"tool_name":"get_weather","status":"SUCCESS"}"#),
            Message::assistant("It is 15°C."),
        ];
        let body = serde_json::to_value(build_request(
            "gpt-4o-mini",
            &history,
            &[],
            &ChatOptions::new().with_temperature(0.0),
        ))
        .unwrap();

        let turns = body["messages"].as_array().unwrap();
        let roles: Vec<&str> = turns.iter().map(|t| t["role"].as_str().unwrap()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool", "assistant"]);

        assert_eq!(turns[2]["content"], Value::Null);
        assert_eq!(
            turns[2]["tool_calls"],
            json!([{
                "id": "call_1",
                "type": "function",
                "function": {"name": "get_weather", "arguments": "{\"location\":\"Paris\"}"}
            }])
        );
        assert_eq!(turns[3]["tool_call_id"], "call_1");
        assert!(turns[4].get("tool_calls").is_none());

        assert!(body.get("tools").is_none());
        assert!(body.get("max_tokens").is_none());
        assert_eq!(body["temperature"], 0.0);
    }

    #[test]
    fn test_tools_wrapped_as_functions() {
        let tools = vec![ToolDefinition::new(
            "search_memories",
            "Search stored memories",
            json!({"type": "object", "properties": {"query": {"type": "string"}}}),
        )];
        let body = serde_json::to_value(build_request("m", &[], &tools, &ChatOptions::new())).unwrap();
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "search_memories");
        assert_eq!(body["tools"][0]["function"]["parameters"]["type"], "object");
    }

    #[test]
    fn test_completion_with_tool_calls() {
        let completion: Completion = serde_json::from_value(json!({
            "choices": [{"message": {
                "content": null,
                "tool_calls": [{
                    "id": "call_9",
                    "type": "function",
                    "function": {"name": "get_weather", "arguments": "{\"location\":\"Paris\"}"}
                }]
            }}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        }))
        .unwrap();
        let response = LLMResponse::from(completion);
        assert_eq!(response.content, "");
        assert_eq!(
            response.tool_calls,
            vec![LLMToolCall::new("call_9", "get_weather", r#"{"location":"Paris"}"#)]
        );
    }

    #[test]
    fn test_empty_completion_is_empty_reply() {
        let completion: Completion = serde_json::from_str("{}").unwrap();
        assert_eq!(LLMResponse::from(completion), LLMResponse::default());
    }

    #[test]
    fn test_error_response_classification() {
        let body = r#"{"error":{"message":"slow down","type":"rate_limit_exceeded"}}"#;
        let err = map_error_response(429, body);
        assert!(err.is_retryable());
        assert!(err.to_string().contains("rate_limit_exceeded - slow down"));

        let err = map_error_response(401, "bad key");
        assert!(matches!(err, ProviderError::Auth(_)));
        assert!(err.to_string().contains("bad key"));
        assert!(!VosError::from(err).is_transient());

        assert!(map_error_response(503, "").is_retryable());
    }
}
