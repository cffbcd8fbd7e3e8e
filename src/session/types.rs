//! History types
//!
//! A [`Message`] is one turn in an agent's append-only conversation log.
//! Tool traffic rides on ordinary turns: the assistant turn that proposes
//! calls carries `tool_calls`, and each result comes back as a user turn
//! carrying the matching `tool_call_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Author of a history turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A tool call proposed by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier linking the call to its result turn
    pub id: String,
    /// Tool name
    pub name: String,
    /// JSON-encoded arguments as produced by the model
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }
}

/// One turn in an agent's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Stable identifier. `<correlation_id>:<seq>` for turns written by a
    /// processing cycle, which makes re-appending after redelivery a no-op.
    pub id: String,
    /// Owning agent
    #[serde(default)]
    pub agent_id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Notification id of the cycle that wrote this turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Tool calls proposed by the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Set on user turns that carry a tool result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn with_role(role: Role, content: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id: String::new(),
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
            correlation_id: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a new user message.
    ///
    /// # Example
    /// ```
    /// use vos_agent::session::{Message, Role};
    ///
    /// let msg = Message::user("Hello, assistant!").for_agent("notes_agent");
    /// assert_eq!(msg.role, Role::User);
    /// assert_eq!(msg.agent_id, "notes_agent");
    /// ```
    pub fn user(content: &str) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: &str) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn system(content: &str) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Assistant turn proposing tool calls.
    pub fn assistant_with_tools(content: &str, tool_calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::with_role(Role::Assistant, content);
        msg.tool_calls = Some(tool_calls);
        msg
    }

    /// User turn carrying the serialized result of one tool call.
    pub fn tool_result(tool_call_id: &str, content: &str) -> Self {
        let mut msg = Self::with_role(Role::User, content);
        msg.tool_call_id = Some(tool_call_id.to_string());
        msg
    }

    pub fn for_agent(mut self, agent_id: &str) -> Self {
        self.agent_id = agent_id.to_string();
        self
    }

    /// Tie the turn to a cycle and give it the stable id `<correlation_id>:<seq>`.
    pub fn with_correlation(mut self, correlation_id: &str, seq: u32) -> Self {
        self.id = format!("{}:{}", correlation_id, seq);
        self.correlation_id = Some(correlation_id.to_string());
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|c| !c.is_empty())
    }

    pub fn is_tool_result(&self) -> bool {
        self.tool_call_id.is_some()
    }

    /// Plain conversation turn: user or assistant text with no tool traffic.
    pub fn is_conversational(&self) -> bool {
        matches!(self.role, Role::User | Role::Assistant)
            && !self.has_tool_calls()
            && !self.is_tool_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_set_roles() {
        assert_eq!(Message::user("a").role, Role::User);
        assert_eq!(Message::assistant("b").role, Role::Assistant);
        assert_eq!(Message::system("c").role, Role::System);
    }

    #[test]
    fn test_with_correlation_is_deterministic() {
        let a = Message::user("hi").with_correlation("n-42", 0);
        let b = Message::user("hi").with_correlation("n-42", 0);
        assert_eq!(a.id, "n-42:0");
        assert_eq!(a.id, b.id);
        assert_eq!(a.correlation_id.as_deref(), Some("n-42"));
    }

    #[test]
    fn test_tool_traffic_flags() {
        let call = ToolCall::new("c1", "get_weather", r#"{"location":"Paris"}"#);
        let proposing = Message::assistant_with_tools("", vec![call]);
        assert!(proposing.has_tool_calls());
        assert!(!proposing.is_conversational());

        let result = Message::tool_result("c1", r#"{"status":"SUCCESS"}"#);
        assert_eq!(result.role, Role::User);
        assert!(result.is_tool_result());
        assert!(!result.is_conversational());

        assert!(Message::assistant("done").is_conversational());
        assert!(!Message::system("rules").is_conversational());
    }

    #[test]
    fn test_message_serde_skips_empty_optionals() {
        let msg = Message::user("hello").for_agent("a");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("tool_calls"));
        assert!(!json.contains("tool_call_id"));
        assert!(json.contains("\"role\":\"user\""));
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
