//! Provider types
//!
//! This module defines the `LLMProvider` trait, chat options and response
//! types shared by the agent loop and the memory modules.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::session::{Message, ToolCall};

/// Definition of a tool that can be called by the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The name of the tool (must be unique)
    pub name: String,
    /// Human-readable description of what the tool does
    pub description: String,
    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(name: &str, description: &str, parameters: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// Trait for language model providers.
///
/// The provider translates between history turns and the backend's API
/// format. It keeps no conversation state of its own.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Send a chat completion request.
    ///
    /// # Arguments
    /// * `messages` - System instructions followed by the conversation
    /// * `tools` - Tools the model may call (empty for decision prompts)
    /// * `model` - Optional model override (uses default if None)
    /// * `options` - Sampling options
    async fn chat(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<LLMResponse>;

    /// The model used when none is requested.
    fn default_model(&self) -> &str;

    /// Provider name for logs.
    fn name(&self) -> &str;
}

/// Sampling options for a chat request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ChatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Response from a chat request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LLMResponse {
    /// Text content (may be empty when only tool calls are returned)
    pub content: String,
    /// Native tool calls requested by the model
    #[serde(default)]
    pub tool_calls: Vec<LLMToolCall>,
}

impl LLMResponse {
    /// A text-only response.
    ///
    /// # Example
    /// ```
    /// use vos_agent::providers::LLMResponse;
    ///
    /// let response = LLMResponse::text("It is 15°C in Paris.");
    /// assert!(!response.has_tool_calls());
    /// ```
    pub fn text(content: &str) -> Self {
        Self {
            content: content.to_string(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tools(content: &str, tool_calls: Vec<LLMToolCall>) -> Self {
        Self {
            content: content.to_string(),
            tool_calls,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LLMToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded arguments, exactly as the model produced them
    pub arguments: String,
}

impl LLMToolCall {
    pub fn new(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    /// Parse the arguments into a JSON value.
    pub fn parse_arguments(&self) -> serde_json::Result<serde_json::Value> {
        if self.arguments.trim().is_empty() {
            return Ok(serde_json::Value::Object(Default::default()));
        }
        serde_json::from_str(&self.arguments)
    }
}

impl From<LLMToolCall> for ToolCall {
    fn from(call: LLMToolCall) -> Self {
        ToolCall {
            id: call.id,
            name: call.name,
            arguments: call.arguments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_options_builder() {
        let options = ChatOptions::new()
            .with_max_tokens(256)
            .with_temperature(0.1);
        assert_eq!(options.max_tokens, Some(256));
        assert_eq!(options.temperature, Some(0.1));
        assert_eq!(ChatOptions::new().max_tokens, None);
    }

    #[test]
    fn test_response_with_tools() {
        let call = LLMToolCall::new("c1", "get_weather", r#"{"location":"Paris"}"#);
        let response = LLMResponse::with_tools("", vec![call]);
        assert!(response.has_tool_calls());
        let args = response.tool_calls[0].parse_arguments().unwrap();
        assert_eq!(args, json!({"location": "Paris"}));
    }

    #[test]
    fn test_empty_arguments_parse_as_object() {
        let call = LLMToolCall::new("c1", "list", "  ");
        assert_eq!(call.parse_arguments().unwrap(), json!({}));
    }

    #[test]
    fn test_invalid_arguments_fail_to_parse() {
        let call = LLMToolCall::new("c1", "list", "{oops");
        assert!(call.parse_arguments().is_err());
    }
}
