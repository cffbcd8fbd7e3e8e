//! Context builder for agent cycles
//!
//! Turns the stored history window into the message list sent to the model,
//! and renders the two kinds of turns the loop writes on its own behalf: the
//! triggering notification and the proactive memories block.

use serde_json::{json, Value};

use crate::bus::{Notification, NotificationType};
use crate::memory::MemoryRecord;
use crate::session::Message;

/// Instructions appended to the system prompt when tools are available.
///
/// Providers with native function calling ignore the JSON fallback; plain
/// completion endpoints rely on it.
const TOOL_INSTRUCTIONS: &str = r#"## Tools

Call tools when they help. If you cannot use native function calls, reply with JSON only:
{"content": "<optional text>", "tool_calls": [{"tool_name": "<name>", "arguments": {...}}]}

Tool results come back as JSON with "status" SUCCESS or FAILURE. When you have what you need, answer in plain text."#;

/// Builds the model input for one step of a cycle.
///
/// # Example
///
/// ```rust
/// use vos_agent::agent::ContextBuilder;
/// use vos_agent::session::{Message, Role};
///
/// let builder = ContextBuilder::new("You are a weather agent.");
/// let messages = builder.build_messages(vec![Message::user("Weather in Paris?")]);
/// assert_eq!(messages[0].role, Role::System);
/// assert_eq!(messages.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    system_prompt: String,
    tool_declarations: Vec<Value>,
}

impl ContextBuilder {
    pub fn new(system_prompt: &str) -> Self {
        Self {
            system_prompt: system_prompt.to_string(),
            tool_declarations: Vec::new(),
        }
    }

    /// List these tool declarations in the system prompt.
    pub fn with_tools(mut self, declarations: Vec<Value>) -> Self {
        self.tool_declarations = declarations;
        self
    }

    pub fn system_prompt(&self) -> String {
        if self.tool_declarations.is_empty() {
            return self.system_prompt.clone();
        }
        let declarations = serde_json::to_string_pretty(&self.tool_declarations)
            .unwrap_or_else(|_| "[]".to_string());
        format!(
            "{}\n\n{}\n\nAvailable tools:\n{}",
            self.system_prompt, TOOL_INSTRUCTIONS, declarations
        )
    }

    /// System prompt followed by the history window.
    pub fn build_messages(&self, history: Vec<Message>) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(&self.system_prompt()));
        messages.extend(history);
        messages
    }
}

/// Text of the history turn recording a notification.
///
/// User messages are stored verbatim; anything else is prefixed with its
/// type and source so the model can tell who is talking.
pub fn notification_turn(notification: &Notification) -> String {
    let text = notification.text();
    match notification.notification_type {
        NotificationType::UserMessage => text,
        _ => format!(
            "[{} from {}] {}",
            notification.notification_type, notification.source, text
        ),
    }
}

/// Text of the user turn carrying retrieved memories.
pub fn proactive_memories_turn(memories: &[MemoryRecord]) -> String {
    let memories: Vec<Value> = memories.iter().map(MemoryRecord::summary).collect();
    json!({
        "type": "proactive_memories",
        "memories": memories,
    })
    .to_string()
}
