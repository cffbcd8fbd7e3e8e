//! Notification envelope exchanged between producers and agents.
//!
//! The wire format is JSON:
//!
//! ```json
//! {
//!   "id": "6f0d...",
//!   "timestamp": "2026-10-18T09:30:00Z",
//!   "recipient_agent_id": "weather_agent",
//!   "notification_type": "user_message",
//!   "source": "gateway",
//!   "payload": {"content": "What's the weather in Paris?"}
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Result, VosError};

/// Kind of notification. Determines how the agent loop routes it.
///
/// Unrecognized strings are kept in [`NotificationType::Unknown`] so newer
/// producers never make older agents reject a whole envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationType {
    /// Direct message from a user
    UserMessage,
    /// Direct message from another agent
    AgentMessage,
    /// Task handed to this agent
    TaskAssignment,
    /// Result of an asynchronous tool or delegated action
    ToolResult,
    /// System alert that needs the agent's attention
    SystemAlert,
    /// Informational status change of another component
    StatusUpdate,
    /// Another agent announcing its capabilities
    CapabilityBroadcast,
    /// Any type this build does not know about
    Unknown(String),
}

impl NotificationType {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationType::UserMessage => "user_message",
            NotificationType::AgentMessage => "agent_message",
            NotificationType::TaskAssignment => "task_assignment",
            NotificationType::ToolResult => "tool_result",
            NotificationType::SystemAlert => "system_alert",
            NotificationType::StatusUpdate => "status_update",
            NotificationType::CapabilityBroadcast => "capability_broadcast",
            NotificationType::Unknown(raw) => raw,
        }
    }
}

impl From<String> for NotificationType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "user_message" => NotificationType::UserMessage,
            "agent_message" => NotificationType::AgentMessage,
            "task_assignment" => NotificationType::TaskAssignment,
            "tool_result" => NotificationType::ToolResult,
            "system_alert" => NotificationType::SystemAlert,
            "status_update" => NotificationType::StatusUpdate,
            "capability_broadcast" => NotificationType::CapabilityBroadcast,
            _ => NotificationType::Unknown(raw),
        }
    }
}

impl From<NotificationType> for String {
    fn from(kind: NotificationType) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An addressed, typed event delivered at-least-once via the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub recipient_agent_id: String,
    pub notification_type: NotificationType,
    pub source: String,
    #[serde(default)]
    pub payload: Value,
}

impl Notification {
    /// Creates a new notification with a fresh id and the current timestamp.
    ///
    /// # Example
    /// ```
    /// use vos_agent::bus::{Notification, NotificationType};
    /// use serde_json::json;
    ///
    /// let n = Notification::new(
    ///     "weather_agent",
    ///     NotificationType::UserMessage,
    ///     "gateway",
    ///     json!({"content": "hi"}),
    /// );
    /// assert_eq!(n.recipient_agent_id, "weather_agent");
    /// assert_eq!(n.text(), "hi");
    /// ```
    pub fn new(
        recipient_agent_id: &str,
        notification_type: NotificationType,
        source: &str,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            recipient_agent_id: recipient_agent_id.to_string(),
            notification_type,
            source: source.to_string(),
            payload,
        }
    }

    /// Shorthand for a user message with a `{"content": ...}` payload.
    pub fn user_message(recipient_agent_id: &str, source: &str, content: &str) -> Self {
        Self::new(
            recipient_agent_id,
            NotificationType::UserMessage,
            source,
            serde_json::json!({ "content": content }),
        )
    }

    /// Decode and sanity-check an envelope.
    ///
    /// Any failure is reported as [`VosError::MalformedNotification`], which
    /// the agent loop drops without requeueing.
    pub fn from_json(body: &str) -> Result<Self> {
        let notification: Notification = serde_json::from_str(body)
            .map_err(|e| VosError::MalformedNotification(e.to_string()))?;
        if notification.id.trim().is_empty() {
            return Err(VosError::MalformedNotification("empty id".into()));
        }
        if notification.recipient_agent_id.trim().is_empty() {
            return Err(VosError::MalformedNotification(
                "empty recipient_agent_id".into(),
            ));
        }
        Ok(notification)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Human-readable text carried by the payload.
    ///
    /// Plain string payloads are returned as-is. Object payloads yield their
    /// `content`, `message` or `text` field, otherwise the compact JSON.
    pub fn text(&self) -> String {
        match &self.payload {
            Value::String(s) => s.clone(),
            Value::Object(map) => ["content", "message", "text"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
                .map(str::to_string)
                .unwrap_or_else(|| self.payload.to_string()),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_notification_type_roundtrip_known() {
        for kind in [
            NotificationType::UserMessage,
            NotificationType::AgentMessage,
            NotificationType::TaskAssignment,
            NotificationType::ToolResult,
            NotificationType::SystemAlert,
            NotificationType::StatusUpdate,
            NotificationType::CapabilityBroadcast,
        ] {
            let s = serde_json::to_string(&kind).unwrap();
            let back: NotificationType = serde_json::from_str(&s).unwrap();
            assert_eq!(back, kind);
        }
    }

    #[test]
    fn test_notification_type_unknown_preserved() {
        let kind: NotificationType = serde_json::from_str("\"calendar_reminder\"").unwrap();
        assert_eq!(kind, NotificationType::Unknown("calendar_reminder".into()));
        assert_eq!(kind.to_string(), "calendar_reminder");
    }

    #[test]
    fn test_from_json_valid() {
        let body = json!({
            "id": "n-1",
            "timestamp": "2026-10-18T09:30:00Z",
            "recipient_agent_id": "weather_agent",
            "notification_type": "user_message",
            "source": "gateway",
            "payload": {"content": "What's the weather in Paris?"}
        })
        .to_string();
        let n = Notification::from_json(&body).unwrap();
        assert_eq!(n.id, "n-1");
        assert_eq!(n.notification_type, NotificationType::UserMessage);
        assert_eq!(n.text(), "What's the weather in Paris?");
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = Notification::from_json("not json").unwrap_err();
        assert!(matches!(err, VosError::MalformedNotification(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_from_json_rejects_empty_recipient() {
        let mut n = Notification::user_message("a", "gateway", "hi");
        n.recipient_agent_id = "  ".into();
        let err = Notification::from_json(&n.to_json().unwrap()).unwrap_err();
        assert!(err.to_string().contains("recipient"));
    }

    #[test]
    fn test_missing_payload_defaults_to_null() {
        let body = r#"{"id":"x","timestamp":"2026-10-18T09:30:00Z","recipient_agent_id":"a",
            "notification_type":"system_alert","source":"cron"}"#;
        let n = Notification::from_json(body).unwrap();
        assert!(n.payload.is_null());
        assert_eq!(n.text(), "");
    }

    #[test]
    fn test_text_variants() {
        let mut n = Notification::new("a", NotificationType::AgentMessage, "b", json!("plain"));
        assert_eq!(n.text(), "plain");
        n.payload = json!({"message": "from field"});
        assert_eq!(n.text(), "from field");
        n.payload = json!({"count": 2});
        assert_eq!(n.text(), "{\"count\":2}");
    }
}
