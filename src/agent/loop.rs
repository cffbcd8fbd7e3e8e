//! Agent loop implementation
//!
//! One [`AgentLoop`] owns one agent: it consumes the agent's queue, runs each
//! notification through a processing cycle and settles the delivery.
//!
//! ```text
//!  consume ──> thinking ──> retriever ──> model ──┬──> reply ──> creator ──> idle ──> ack
//!                              ▲                  │
//!                              └── executing_tools┘  (until no calls or step ceiling)
//! ```
//!
//! Every cycle ends in `idle`, whatever happened inside it. Failures are
//! settled by kind: malformed input is dead-lettered at once, transient
//! infrastructure errors are requeued until `max_retries`, anything else is
//! dead-lettered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch, MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::bus::{AgentReply, Broker, Delivery, Notification, NotificationType};
use crate::config::AgentSettings;
use crate::error::{Result, VosError};
use crate::log_component;
use crate::memory::{CreatorOutcome, MemoryCreator, MemoryRetriever};
use crate::providers::retry::compute_delay;
use crate::providers::{ChatOptions, LLMProvider, LLMToolCall};
use crate::session::{Message, MessageHistory, ToolCall};
use crate::state::{
    AgentStatusRecord, LifecycleStatus, ProcessingState, StatusStore, StatusTracker,
};
use crate::tools::{ToolContext, ToolRegistry, ToolResult};

use super::context::{notification_turn, proactive_memories_turn, ContextBuilder};
use super::response::ParsedTurn;

/// Final content used when the step ceiling is hit with nothing to say.
const STEP_CEILING_NOTICE: &str =
    "I stopped before finishing because I reached the maximum number of tool steps.";

/// Collaborators an agent loop runs against.
pub struct AgentDeps {
    pub broker: Arc<dyn Broker>,
    pub history: MessageHistory,
    pub status_store: Arc<dyn StatusStore>,
    pub provider: Arc<dyn LLMProvider>,
    pub tools: ToolRegistry,
    pub retriever: Option<MemoryRetriever>,
    pub creator: Option<MemoryCreator>,
    /// Receives the final reply of each completed cycle
    pub outbound: Option<mpsc::Sender<AgentReply>>,
}

/// Requested lifecycle state, set through an [`AgentHandle`].
#[derive(Debug, Clone, Copy, PartialEq)]
enum Control {
    Active,
    Sleeping { until: Option<DateTime<Utc>> },
    Off,
}

/// Cooperative lifecycle controls for a running agent.
///
/// Commands take effect between cycles; an in-flight cycle always completes.
#[derive(Clone)]
pub struct AgentHandle {
    control: Arc<watch::Sender<Control>>,
}

impl AgentHandle {
    /// Mark the agent sleeping. The timer or a fresh notification wakes it.
    pub fn sleep(&self, duration: Duration) {
        let until = chrono::Duration::from_std(duration)
            .ok()
            .map(|d| Utc::now() + d);
        self.control.send_replace(Control::Sleeping { until });
    }

    pub fn wake(&self) {
        self.control.send_replace(Control::Active);
    }

    /// Set the agent `off`; the loop stops polling after the current cycle.
    pub fn shutdown(&self) {
        self.control.send_replace(Control::Off);
    }
}

/// How one delivery was settled.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The model was invoked and the notification acknowledged
    Completed {
        reply: String,
        /// Tool-execution steps taken
        steps: u32,
        tool_calls: usize,
    },
    /// Informational notification written to history without a model call
    Recorded,
    /// Notification type this build does not handle; acknowledged
    Ignored,
    /// Unparseable or misaddressed envelope, dead-lettered without retry
    Dropped(String),
    /// Transient failure; requeued for another attempt
    Requeued { attempt: u32 },
    /// Failure after retries, or a permanent one
    DeadLettered(String),
}

/// The per-agent processing loop.
///
/// # Example
///
/// ```rust,ignore
/// let agent = Arc::new(AgentLoop::new(settings, deps));
/// let handle = agent.handle();
/// tokio::spawn({
///     let agent = agent.clone();
///     async move { agent.run().await }
/// });
/// // later
/// handle.shutdown();
/// ```
pub struct AgentLoop {
    settings: AgentSettings,
    broker: Arc<dyn Broker>,
    history: MessageHistory,
    status_store: Arc<dyn StatusStore>,
    provider: Arc<dyn LLMProvider>,
    tools: ToolRegistry,
    retriever: Option<MemoryRetriever>,
    creator: Option<MemoryCreator>,
    outbound: Option<mpsc::Sender<AgentReply>>,
    context_builder: ContextBuilder,
    tracker: Mutex<Option<StatusTracker>>,
    running: AtomicBool,
    control: Arc<watch::Sender<Control>>,
}

impl AgentLoop {
    pub fn new(settings: AgentSettings, deps: AgentDeps) -> Self {
        let context_builder =
            ContextBuilder::new(&settings.system_prompt).with_tools(deps.tools.declarations());
        let (control, _) = watch::channel(Control::Active);
        Self {
            settings,
            broker: deps.broker,
            history: deps.history,
            status_store: deps.status_store,
            provider: deps.provider,
            tools: deps.tools,
            retriever: deps.retriever,
            creator: deps.creator,
            outbound: deps.outbound,
            context_builder,
            tracker: Mutex::new(None),
            running: AtomicBool::new(false),
            control: Arc::new(control),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.settings.agent_id
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn handle(&self) -> AgentHandle {
        AgentHandle {
            control: self.control.clone(),
        }
    }

    /// Stop the loop after the current cycle. Same as [`AgentHandle::shutdown`].
    pub fn stop(&self) {
        info!(agent_id = %self.settings.agent_id, "Stopping agent loop");
        self.handle().shutdown();
    }

    /// Current status row as the loop sees it.
    pub async fn status_record(&self) -> Result<AgentStatusRecord> {
        Ok(self.tracker().await?.record().clone())
    }

    /// The loop's status tracker, opened (and recovered) on first use.
    async fn tracker(&self) -> Result<MappedMutexGuard<'_, StatusTracker>> {
        let mut guard = self.tracker.lock().await;
        if guard.is_none() {
            let tracker = StatusTracker::open(
                &self.settings.agent_id,
                self.status_store.clone(),
                self.settings.stale_state_secs,
            )
            .await?;
            *guard = Some(tracker);
        }
        MutexGuard::try_map(guard, Option::as_mut)
            .map_err(|_| VosError::Store("status tracker unavailable".to_string()))
    }

    /// Consume and process notifications until shut down.
    ///
    /// Broker failures are retried with backoff; after
    /// `max_reconnect_attempts` consecutive failures the last error is
    /// returned.
    pub async fn run(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(VosError::Config("Agent loop already running".into()));
        }
        let agent_id = self.settings.agent_id.clone();
        let result = self.run_inner(&agent_id).await;
        self.running.store(false, Ordering::SeqCst);
        info!(agent_id = %agent_id, "Agent loop stopped");
        result
    }

    async fn run_inner(&self, agent_id: &str) -> Result<()> {
        log_component!(info, "agent", "Starting agent loop", agent_id = %agent_id);
        let mut control = self.control.subscribe();
        // A shutdown left over from a previous run does not apply to this one.
        if *control.borrow_and_update() == Control::Off {
            self.control.send_replace(Control::Active);
            control.borrow_and_update();
        }
        self.persist_control(Control::Active).await?;

        let broker_cfg = &self.settings.broker;
        let mut reconnect_attempts: u32 = 0;

        loop {
            let requested = *control.borrow_and_update();
            self.persist_control(requested).await?;
            if requested == Control::Off {
                return Ok(());
            }
            let wake_in = match requested {
                Control::Sleeping { until: Some(until) } => {
                    Some((until - Utc::now()).to_std().unwrap_or(Duration::ZERO))
                }
                _ => None,
            };

            tokio::select! {
                changed = control.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
                _ = tokio::time::sleep(wake_in.unwrap_or(Duration::from_secs(86_400))), if wake_in.is_some() => {
                    info!(agent_id = %agent_id, "Sleep timer elapsed, waking");
                    self.control.send_replace(Control::Active);
                }
                delivery = self.broker.consume(agent_id) => match delivery {
                    Ok(delivery) => {
                        reconnect_attempts = 0;
                        if matches!(requested, Control::Sleeping { .. }) {
                            info!(agent_id = %agent_id, "Notification arrived, waking");
                            self.control.send_replace(Control::Active);
                            control.borrow_and_update();
                            self.persist_control(Control::Active).await?;
                        }
                        let outcome = self.process_delivery(delivery).await;
                        debug!(agent_id = %agent_id, ?outcome, "Delivery settled");
                    }
                    Err(e) => {
                        reconnect_attempts += 1;
                        if reconnect_attempts > broker_cfg.max_reconnect_attempts {
                            error!(
                                agent_id = %agent_id,
                                attempts = reconnect_attempts - 1,
                                error = %e,
                                "Broker unreachable; giving up"
                            );
                            return Err(e);
                        }
                        let delay = compute_delay(
                            reconnect_attempts - 1,
                            broker_cfg.reconnect_base_delay_ms,
                            broker_cfg.reconnect_max_delay_ms,
                            0,
                        );
                        warn!(
                            agent_id = %agent_id,
                            attempt = reconnect_attempts,
                            delay_ms = delay,
                            error = %e,
                            "Broker consume failed; reconnecting"
                        );
                        tokio::select! {
                            _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
                            _ = control.changed() => {}
                        }
                    }
                }
            }
        }
    }

    /// [`Self::apply_control`] with backoff on transient store errors.
    async fn persist_control(&self, requested: Control) -> Result<()> {
        let cfg = &self.settings.broker;
        let mut attempt: u32 = 0;
        loop {
            match self.apply_control(requested).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < cfg.max_reconnect_attempts => {
                    let delay = compute_delay(
                        attempt,
                        cfg.reconnect_base_delay_ms,
                        cfg.reconnect_max_delay_ms,
                        0,
                    );
                    attempt += 1;
                    warn!(
                        agent_id = %self.settings.agent_id,
                        attempt,
                        delay_ms = delay,
                        error = %e,
                        "Status write failed; retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => {
                    error!(agent_id = %self.settings.agent_id, error = %e, "Status write failed; giving up");
                    return Err(e);
                }
            }
        }
    }

    /// Persist a requested lifecycle state if it differs from the record.
    async fn apply_control(&self, requested: Control) -> Result<()> {
        let mut tracker = self.tracker().await?;
        let (status, until) = match requested {
            Control::Active => (LifecycleStatus::Active, None),
            Control::Sleeping { until } => (LifecycleStatus::Sleeping, until),
            Control::Off => (LifecycleStatus::Off, None),
        };
        if tracker.status() != status || tracker.record().sleep_until != until {
            tracker.set_status(status, until).await?;
        } else if tracker.has_unsaved_changes() {
            tracker.save().await?;
        }
        Ok(())
    }

    /// Run one delivery through a cycle and settle it with the broker.
    pub async fn process_delivery(&self, delivery: Delivery) -> CycleOutcome {
        let agent_id = self.settings.agent_id.as_str();

        let notification = match Notification::from_json(&delivery.body) {
            Ok(n) if n.recipient_agent_id == agent_id => n,
            Ok(n) => {
                let reason = format!("addressed to '{}'", n.recipient_agent_id);
                warn!(agent_id = %agent_id, notification_id = %n.id, %reason, "Misrouted notification");
                self.settle(&delivery, false).await;
                return CycleOutcome::Dropped(reason);
            }
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e, "Dropping malformed notification");
                self.settle(&delivery, false).await;
                return CycleOutcome::Dropped(e.to_string());
            }
        };

        let span = info_span!(
            "cycle",
            agent_id = %agent_id,
            notification_id = %notification.id,
            notification_type = %notification.notification_type,
            attempt = delivery.attempt,
        );

        async {
            let result = self.run_cycle(&notification).await;
            self.return_to_idle().await;

            match result {
                Ok(outcome) => {
                    if let Err(e) = self.broker.ack(&delivery).await {
                        error!(error = %e, "Failed to acknowledge notification");
                    }
                    outcome
                }
                Err(e) => self.settle_failure(&delivery, e).await,
            }
        }
        .instrument(span)
        .await
    }

    async fn settle(&self, delivery: &Delivery, requeue: bool) {
        if let Err(e) = self.broker.nack(delivery, requeue).await {
            error!(agent_id = %delivery.agent_id, error = %e, requeue, "Failed to reject delivery");
        }
    }

    async fn settle_failure(&self, delivery: &Delivery, err: VosError) -> CycleOutcome {
        let max_retries = self.settings.max_retries;
        if err.is_transient() && delivery.attempt < max_retries {
            let delay = compute_delay(
                delivery.attempt,
                self.settings.broker.retry_delay_ms,
                self.settings.broker.reconnect_max_delay_ms,
                0,
            );
            warn!(
                error = %err,
                attempt = delivery.attempt + 1,
                max_retries,
                delay_ms = delay,
                "Transient failure; requeueing notification"
            );
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.settle(delivery, true).await;
            CycleOutcome::Requeued {
                attempt: delivery.attempt + 1,
            }
        } else {
            error!(
                error = %err,
                attempts = delivery.attempt + 1,
                transient = err.is_transient(),
                "Cycle failed; dead-lettering notification"
            );
            self.settle(delivery, false).await;
            CycleOutcome::DeadLettered(err.to_string())
        }
    }

    async fn return_to_idle(&self) {
        let result = match self.tracker().await {
            Ok(mut tracker) => tracker.set_processing(ProcessingState::Idle).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!(error = %e, "Failed to persist idle state");
        }
    }

    async fn set_processing(&self, state: ProcessingState) -> Result<()> {
        self.tracker().await?.set_processing(state).await
    }

    async fn run_cycle(&self, notification: &Notification) -> Result<CycleOutcome> {
        let agent_id = self.settings.agent_id.as_str();
        let correlation_id = notification.id.as_str();
        // The opening turn keeps seq 0 so a redelivery replays it in place.
        // Later turns continue after whatever an earlier attempt wrote.
        let opening = Message::user(&notification_turn(notification))
            .for_agent(agent_id)
            .with_correlation(correlation_id, 0);
        let written = self.history.correlated_count(agent_id, correlation_id).await?;
        let mut seq = u32::try_from(written).unwrap_or(u32::MAX).max(1);
        if written > 0 {
            debug!(written, "Resuming redelivered notification");
        }
        let mut stamp = |message: Message| {
            let message = message.for_agent(agent_id).with_correlation(correlation_id, seq);
            seq += 1;
            message
        };

        match &notification.notification_type {
            NotificationType::Unknown(kind) => {
                warn!(kind = %kind, "Unhandled notification type; acknowledging");
                return Ok(CycleOutcome::Ignored);
            }
            NotificationType::StatusUpdate | NotificationType::CapabilityBroadcast => {
                self.history.append(opening).await?;
                self.tracker().await?.heartbeat().await?;
                debug!("Informational notification recorded");
                return Ok(CycleOutcome::Recorded);
            }
            _ => {}
        }

        self.set_processing(ProcessingState::Thinking).await?;
        let turn = self.tracker().await?.next_turn().await?;
        info!(turn, "Processing notification");

        self.history.append(opening).await?;

        if let Some(retriever) = &self.retriever {
            let retrieval = retriever.retrieve(agent_id, turn).await;
            debug!(
                iterations = retrieval.iterations,
                memories = retrieval.memories.len(),
                end = ?retrieval.end,
                "Memory retrieval finished"
            );
            if !retrieval.memories.is_empty() {
                self.history
                    .append(stamp(Message::user(&proactive_memories_turn(
                        &retrieval.memories,
                    ))))
                    .await?;
            }
        }

        let definitions = self.tools.definitions();
        let options = ChatOptions::new()
            .with_max_tokens(self.settings.max_tokens)
            .with_temperature(self.settings.temperature);
        let model = Some(self.settings.model.as_str());
        let tool_ctx = ToolContext::new(agent_id).with_correlation(correlation_id);
        let max_steps = self.settings.max_tool_iterations;

        let mut steps: u32 = 0;
        let mut tool_calls = 0usize;
        let final_reply = loop {
            let window = self
                .history
                .read_context(agent_id, self.settings.context_window)
                .await?;
            let messages = self.context_builder.build_messages(window);
            let response = self
                .provider
                .chat(messages, definitions.clone(), model, options.clone())
                .await?;
            let parsed = ParsedTurn::from_response(&response);

            if !parsed.has_tool_calls() {
                break parsed.reply;
            }

            steps += 1;
            tool_calls += parsed.tool_calls.len();
            self.set_processing(ProcessingState::ExecutingTools).await?;

            let calls: Vec<ToolCall> = parsed.tool_calls.iter().cloned().map(ToolCall::from).collect();
            self.history
                .append(stamp(Message::assistant_with_tools(&parsed.reply, calls)))
                .await?;

            for call in &parsed.tool_calls {
                let result = self.execute_call(call, &tool_ctx).await;
                self.history
                    .append(stamp(Message::tool_result(&call.id, &result.to_content())))
                    .await?;
            }
            self.set_processing(ProcessingState::Thinking).await?;

            if steps >= max_steps {
                warn!(steps, max_steps, "Step ceiling reached; ending cycle");
                break if parsed.reply.trim().is_empty() {
                    STEP_CEILING_NOTICE.to_string()
                } else {
                    parsed.reply
                };
            }
        };

        self.history
            .append(stamp(Message::assistant(&final_reply)))
            .await?;

        if let Some(outbound) = &self.outbound {
            let reply = AgentReply::new(agent_id, &notification.id, &notification.source, &final_reply);
            if outbound.send(reply).await.is_err() {
                debug!("Outbound reply channel closed");
            }
        }

        if let Some(creator) = &self.creator {
            match creator.create(agent_id, turn).await {
                CreatorOutcome::Failed(reason) => {
                    warn!(reason = %reason, "Memory creation failed")
                }
                outcome => debug!(?outcome, "Memory creation finished"),
            }
        }

        info!(steps, tool_calls, "Cycle completed");
        Ok(CycleOutcome::Completed {
            reply: final_reply,
            steps,
            tool_calls,
        })
    }

    async fn execute_call(&self, call: &LLMToolCall, ctx: &ToolContext) -> ToolResult {
        info!(tool = %call.name, id = %call.id, "Executing tool");
        match call.parse_arguments() {
            Ok(args) => self.tools.execute(&call.name, args, ctx).await,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Invalid JSON in tool arguments");
                ToolResult::failure(&call.name, format!("invalid arguments JSON: {}", e))
            }
        }
    }
}
