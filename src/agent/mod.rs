//! Agent module - the notification-driven execution core
//!
//! An agent owns one broker queue and one status record. For each
//! notification it:
//!
//! - records the notification in its history
//! - asks the memory retriever for relevant long-term memories
//! - calls the model, executing requested tools until it stops asking
//! - records the final reply and lets the memory creator distill new memories
//! - settles the delivery (ack, requeue or dead-letter)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Broker    │────>│  AgentLoop  │────>│ LLMProvider │
//! │ (per agent) │<────│             │     │             │
//! └─────────────┘ ack └─────────────┘     └─────────────┘
//!                       │    │    │
//!          ┌────────────┘    │    └────────────┐
//!          ▼                 ▼                 ▼
//!   ┌─────────────┐   ┌─────────────┐   ┌─────────────┐
//!   │   History   │   │    Tools    │   │   Memory    │
//!   │             │   │  Registry   │   │ retr./creat.│
//!   └─────────────┘   └─────────────┘   └─────────────┘
//! ```

mod context;
mod r#loop;
mod response;

pub use context::{notification_turn, proactive_memories_turn, ContextBuilder};
pub use r#loop::{AgentDeps, AgentHandle, AgentLoop, CycleOutcome};
pub use response::ParsedTurn;
