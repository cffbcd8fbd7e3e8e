//! Notification broker
//!
//! Agents consume notifications from per-agent queues with explicit
//! acknowledgment. The [`Broker`] trait is the boundary to the real message
//! broker; [`InMemoryBroker`] implements the same queue semantics inside one
//! process for tests and single-node runs.
//!
//! # Delivery semantics
//!
//! ```text
//!  publish ──> [ ready queue ] ──consume──> unacked (max 1 per agent)
//!                   ▲                          │
//!                   │ nack(requeue=true)       ├── ack ──────────> done
//!                   └──────────────────────────┤
//!                                              └── nack(requeue=false) ──> dead letters
//! ```
//!
//! - Delivery is at-least-once: an unacknowledged delivery can be seen again.
//! - Each agent has at most one unacknowledged delivery (prefetch = 1), which
//!   is what serializes an agent's processing cycles.
//! - A requeued delivery goes back to the head of its queue with `attempt + 1`.
//!
//! # Example
//!
//! ```
//! use vos_agent::bus::{Broker, InMemoryBroker, Notification};
//!
//! #[tokio::main]
//! async fn main() {
//!     let broker = InMemoryBroker::new();
//!     let n = Notification::user_message("notes_agent", "gateway", "remember milk");
//!     broker.publish(&n).await.unwrap();
//!
//!     let delivery = broker.consume("notes_agent").await.unwrap();
//!     assert_eq!(broker.unacked_count("notes_agent").await, 1);
//!     broker.ack(&delivery).await.unwrap();
//!     assert_eq!(broker.unacked_count("notes_agent").await, 0);
//! }
//! ```

pub mod message;
pub mod notification;

pub use message::AgentReply;
pub use notification::{Notification, NotificationType};

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::error::{Result, VosError};

/// A message handed to a consumer and awaiting acknowledgment.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Broker-assigned tag, unique per delivery
    pub delivery_tag: u64,
    /// Queue the delivery came from
    pub agent_id: String,
    /// Raw envelope body
    pub body: String,
    /// 0 on first delivery, incremented on each requeue
    pub attempt: u32,
}

/// A message that was rejected without requeue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub body: String,
    /// Deliveries made before the message was dead-lettered
    pub attempts: u32,
    pub dead_lettered_at: DateTime<Utc>,
}

/// Per-agent durable queues with explicit acknowledgment.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Enqueue a notification on its recipient's queue.
    async fn publish(&self, notification: &Notification) -> Result<()> {
        let body = notification.to_json()?;
        self.publish_raw(&notification.recipient_agent_id, body).await
    }

    /// Enqueue a raw body on an agent's queue without validating it.
    async fn publish_raw(&self, agent_id: &str, body: String) -> Result<()>;

    /// Wait for the next delivery on an agent's queue.
    ///
    /// Blocks while the agent already holds an unacknowledged delivery.
    async fn consume(&self, agent_id: &str) -> Result<Delivery>;

    /// Acknowledge a delivery; it will not be seen again.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Reject a delivery, either back to the queue head or to the dead letters.
    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()>;

    /// Number of unacknowledged deliveries held by an agent (0 or 1).
    async fn unacked_count(&self, agent_id: &str) -> usize;

    /// Messages dead-lettered from an agent's queue.
    async fn dead_letters(&self, agent_id: &str) -> Vec<DeadLetter>;
}

#[derive(Debug)]
struct Pending {
    body: String,
    attempt: u32,
}

#[derive(Debug, Default)]
struct AgentQueue {
    ready: VecDeque<Pending>,
    unacked: Option<Delivery>,
    dead: Vec<DeadLetter>,
}

#[derive(Debug, Default)]
struct BrokerState {
    queues: HashMap<String, AgentQueue>,
    next_tag: u64,
    closed: bool,
}

/// In-process broker with per-agent queues, prefetch 1 and dead letters.
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
    changed: Notify,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the broker. Waiting and future consumers get a broker error.
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
        self.changed.notify_waiters();
    }

    /// Messages waiting in an agent's queue, excluding the unacked one.
    pub async fn ready_count(&self, agent_id: &str) -> usize {
        self.state
            .lock()
            .await
            .queues
            .get(agent_id)
            .map_or(0, |q| q.ready.len())
    }

    fn take_unacked(queue: &mut AgentQueue, delivery: &Delivery) -> Result<Delivery> {
        match queue.unacked.take() {
            Some(current) if current.delivery_tag == delivery.delivery_tag => Ok(current),
            other => {
                queue.unacked = other;
                Err(VosError::Broker(format!(
                    "unknown delivery tag {}",
                    delivery.delivery_tag
                )))
            }
        }
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish_raw(&self, agent_id: &str, body: String) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(VosError::Broker("broker closed".into()));
            }
            state
                .queues
                .entry(agent_id.to_string())
                .or_default()
                .ready
                .push_back(Pending { body, attempt: 0 });
        }
        debug!(agent_id = %agent_id, "Notification enqueued");
        self.changed.notify_waiters();
        Ok(())
    }

    async fn consume(&self, agent_id: &str) -> Result<Delivery> {
        loop {
            // Register interest before inspecting state so a concurrent
            // publish/ack between the check and the await is not missed.
            let changed = self.changed.notified();
            {
                let mut state = self.state.lock().await;
                if state.closed {
                    return Err(VosError::Broker("broker closed".into()));
                }
                let tag = state.next_tag + 1;
                let queue = state.queues.entry(agent_id.to_string()).or_default();
                if queue.unacked.is_none() {
                    if let Some(pending) = queue.ready.pop_front() {
                        let delivery = Delivery {
                            delivery_tag: tag,
                            agent_id: agent_id.to_string(),
                            body: pending.body,
                            attempt: pending.attempt,
                        };
                        queue.unacked = Some(delivery.clone());
                        state.next_tag = tag;
                        return Ok(delivery);
                    }
                }
            }
            changed.await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            let queue = state
                .queues
                .get_mut(&delivery.agent_id)
                .ok_or_else(|| VosError::Broker(format!("unknown queue {}", delivery.agent_id)))?;
            Self::take_unacked(queue, delivery)?;
        }
        self.changed.notify_waiters();
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            let queue = state
                .queues
                .get_mut(&delivery.agent_id)
                .ok_or_else(|| VosError::Broker(format!("unknown queue {}", delivery.agent_id)))?;
            let taken = Self::take_unacked(queue, delivery)?;
            if requeue {
                queue.ready.push_front(Pending {
                    body: taken.body,
                    attempt: taken.attempt + 1,
                });
            } else {
                queue.dead.push(DeadLetter {
                    body: taken.body,
                    attempts: taken.attempt + 1,
                    dead_lettered_at: Utc::now(),
                });
            }
        }
        self.changed.notify_waiters();
        Ok(())
    }

    async fn unacked_count(&self, agent_id: &str) -> usize {
        self.state
            .lock()
            .await
            .queues
            .get(agent_id)
            .map_or(0, |q| usize::from(q.unacked.is_some()))
    }

    async fn dead_letters(&self, agent_id: &str) -> Vec<DeadLetter> {
        self.state
            .lock()
            .await
            .queues
            .get(agent_id)
            .map(|q| q.dead.clone())
            .unwrap_or_default()
    }
}
