//! Tools module - capability handlers the model can call
//!
//! # Overview
//!
//! - `Tool` trait: the interface every capability implements
//! - `ToolSchema`: declared parameters, checked before a handler runs
//! - `ToolRegistry`: name lookup, validation and failure-isolated execution
//! - `ToolResult`: the `{tool_name, status, result|error_message}` record
//!
//! # Built-in Tools
//!
//! - `SearchMemoriesTool`, `CreateMemoryTool`, `UpdateMemoryTool`: long-term memory
//! - `SendAgentMessageTool`: fire-and-forget message to another agent
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use vos_agent::tools::{ParamType, ToolContext, ToolRegistry, ToolSchema, ToolStatus};
//!
//! # tokio_test::block_on(async {
//! let mut registry = ToolRegistry::new();
//! registry.register_fn(
//!     "echo",
//!     "Echo the message back",
//!     ToolSchema::new().required("message", ParamType::String, "Text to echo"),
//!     |args, _ctx| async move { Ok(json!({"echo": args["message"]})) },
//! );
//!
//! let ctx = ToolContext::new("demo_agent");
//! let ok = registry.execute("echo", json!({"message": "hi"}), &ctx).await;
//! assert_eq!(ok.status, ToolStatus::Success);
//!
//! let rejected = registry.execute("echo", json!({}), &ctx).await;
//! assert_eq!(rejected.status, ToolStatus::Failure);
//! # });
//! ```

pub mod memory;
pub mod message;
mod registry;
mod types;

pub use memory::{CreateMemoryTool, SearchMemoriesTool, UpdateMemoryTool};
pub use message::SendAgentMessageTool;
pub use registry::ToolRegistry;
pub use types::{ParamSpec, ParamType, Tool, ToolContext, ToolResult, ToolSchema, ToolStatus};

use std::sync::Arc;

use crate::bus::Broker;
use crate::memory::MemoryService;

/// Register the built-in memory and messaging tools.
pub fn register_builtin(
    registry: &mut ToolRegistry,
    memory: Option<&MemoryService>,
    broker: Arc<dyn Broker>,
) {
    if let Some(memory) = memory {
        registry.register(Arc::new(SearchMemoriesTool::new(memory.clone())));
        registry.register(Arc::new(CreateMemoryTool::new(memory.clone())));
        registry.register(Arc::new(UpdateMemoryTool::new(memory.clone())));
    }
    registry.register(Arc::new(SendAgentMessageTool::new(broker)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBroker;
    use crate::memory::{HashEmbedder, InMemoryVectorStore};

    #[test]
    fn test_register_builtin() {
        let mut registry = ToolRegistry::new();
        register_builtin(&mut registry, None, Arc::new(InMemoryBroker::new()));
        assert_eq!(registry.names(), vec!["send_agent_message"]);

        let memory = MemoryService::new(
            Arc::new(HashEmbedder::default()),
            Arc::new(InMemoryVectorStore::new()),
        );
        register_builtin(&mut registry, Some(&memory), Arc::new(InMemoryBroker::new()));
        assert_eq!(
            registry.names(),
            vec![
                "create_memory",
                "search_memories",
                "send_agent_message",
                "update_memory"
            ]
        );
    }
}
