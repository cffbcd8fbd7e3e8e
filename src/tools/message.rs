//! Agent-to-agent messaging tool.
//!
//! `send_agent_message` enqueues an `agent_message` notification on another
//! agent's queue and returns immediately. Any reply arrives later as a fresh
//! notification and starts a new cycle for the sender.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::bus::{Broker, Notification, NotificationType};
use crate::error::{Result, VosError};

use super::{ParamType, Tool, ToolContext, ToolSchema};

/// Tool for delegating work to, or informing, another agent.
pub struct SendAgentMessageTool {
    broker: Arc<dyn Broker>,
}

impl SendAgentMessageTool {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl Tool for SendAgentMessageTool {
    fn name(&self) -> &str {
        "send_agent_message"
    }

    fn description(&self) -> &str {
        "Send a message to another agent. Does not wait for an answer; \
         replies arrive later as new messages."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new()
            .required("recipient", ParamType::String, "Id of the receiving agent")
            .required("content", ParamType::String, "Message text")
    }

    fn validate(&self, args: &Value) -> std::result::Result<(), String> {
        let recipient = args.get("recipient").and_then(Value::as_str).unwrap_or("");
        if recipient.trim().is_empty() {
            return Err("recipient must not be empty".to_string());
        }
        Ok(())
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value> {
        let recipient = args
            .get("recipient")
            .and_then(Value::as_str)
            .map(str::trim)
            .ok_or_else(|| VosError::Tool("Missing 'recipient' parameter".to_string()))?;
        let content = args
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| VosError::Tool("Missing 'content' parameter".to_string()))?;

        if recipient == ctx.agent_id {
            return Err(VosError::Tool(
                "An agent cannot send a message to itself".to_string(),
            ));
        }

        let notification = Notification::new(
            recipient,
            NotificationType::AgentMessage,
            &ctx.agent_id,
            json!({
                "content": content,
                "correlation_id": ctx.correlation_id,
            }),
        );
        self.broker.publish(&notification).await?;

        info!(
            from = %ctx.agent_id,
            to = %recipient,
            notification_id = %notification.id,
            "Agent message enqueued"
        );
        Ok(json!({
            "delivered_to_queue": recipient,
            "notification_id": notification.id,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBroker;

    #[tokio::test]
    async fn test_send_enqueues_agent_message() {
        let broker = Arc::new(InMemoryBroker::new());
        let tool = SendAgentMessageTool::new(broker.clone());
        let ctx = ToolContext::new("planner").with_correlation("n-7");

        let out = tool
            .execute(
                json!({"recipient": "calendar_agent", "content": "Book Friday 10:00"}),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(out["delivered_to_queue"], "calendar_agent");

        let delivery = broker.consume("calendar_agent").await.unwrap();
        let n = Notification::from_json(&delivery.body).unwrap();
        assert_eq!(n.notification_type, NotificationType::AgentMessage);
        assert_eq!(n.source, "planner");
        assert_eq!(n.text(), "Book Friday 10:00");
        assert_eq!(n.payload["correlation_id"], "n-7");
        assert_eq!(out["notification_id"], n.id);
    }

    #[tokio::test]
    async fn test_self_message_rejected() {
        let broker = Arc::new(InMemoryBroker::new());
        let tool = SendAgentMessageTool::new(broker.clone());
        let err = tool
            .execute(
                json!({"recipient": "planner", "content": "hi"}),
                &ToolContext::new("planner"),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("itself"));
        assert_eq!(broker.ready_count("planner").await, 0);
    }

    #[test]
    fn test_blank_recipient_fails_validation() {
        let tool = SendAgentMessageTool::new(Arc::new(InMemoryBroker::new()));
        assert!(tool.validate(&json!({"recipient": " ", "content": "x"})).is_err());
    }
}
