//! Outbound reply type.
//!
//! When a cycle finishes with assistant text, the agent loop can publish an
//! [`AgentReply`] on an outbound channel so a front end (the CLI, a gateway)
//! can deliver it. Replies are best effort: the history log is the record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Final assistant text produced by one processing cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReply {
    /// Agent that produced the reply
    pub agent_id: String,
    /// Notification that triggered the cycle
    pub notification_id: String,
    /// Producer of the triggering notification, for routing the reply back
    pub reply_to: String,
    /// Final assistant content
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl AgentReply {
    pub fn new(agent_id: &str, notification_id: &str, reply_to: &str, content: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            notification_id: notification_id.to_string(),
            reply_to: reply_to.to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_reply_new() {
        let reply = AgentReply::new("weather_agent", "n-1", "gateway", "It is 15°C in Paris.");
        assert_eq!(reply.agent_id, "weather_agent");
        assert_eq!(reply.notification_id, "n-1");
        assert_eq!(reply.reply_to, "gateway");
        assert!(reply.content.contains("15°C"));
    }

    #[test]
    fn test_agent_reply_serde() {
        let reply = AgentReply::new("a", "n", "cli", "done");
        let json = serde_json::to_string(&reply).unwrap();
        let back: AgentReply = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reply);
    }
}
