//! vos-agent - notification-driven agent runtime with long-term memory
//!
//! Each agent consumes notifications from its own broker queue, runs one
//! model/tool cycle per notification and keeps a persistent history plus a
//! status record. Two memory modules run around every cycle: a retriever
//! that surfaces stored memories before the model is called and a creator
//! that decides whether the finished exchange is worth remembering.

pub mod agent;
pub mod bus;
pub mod config;
pub mod error;
pub mod memory;
pub mod providers;
pub mod session;
pub mod state;
pub mod tools;
pub mod utils;

pub use agent::{AgentDeps, AgentHandle, AgentLoop, CycleOutcome};
pub use bus::{AgentReply, Broker, InMemoryBroker, Notification, NotificationType};
pub use config::{AgentSettings, Config};
pub use error::{ProviderError, Result, VosError};
pub use memory::{MemoryCreator, MemoryRetriever, MemoryService};
pub use providers::{ChatOptions, LLMProvider, LLMResponse, LLMToolCall, ToolDefinition};
pub use session::{Message, MessageHistory, Role, ToolCall};
pub use state::{AgentStatusRecord, LifecycleStatus, ProcessingState, StatusTracker};
pub use tools::{Tool, ToolContext, ToolRegistry, ToolResult, ToolStatus};
