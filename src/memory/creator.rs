//! Post-turn memory creation.
//!
//! After a cycle, a decision model reviews the recent conversation, the
//! agent's pending wait topic and its last few created memories, then picks
//! exactly one of:
//!
//! - `IGNORE`: nothing worth keeping; a pending wait topic is cleared
//! - `WAIT(topic)`: something is being shared but is incomplete; the topic
//!   is stored in the agent's metadata (replacing any previous one) and shown
//!   to the model on the next run, including after a restart
//! - `CREATE_NOW(memories)`: embed and insert each new memory, then clear the
//!   wait topic
//!
//! Every proposal is embedded before any is inserted, so model or embedding
//! failures leave everything as it was, wait topic included. If the store
//! fails after some inserts, those memories are kept and reported as created.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::CreatorConfig;
use crate::error::Result;
use crate::log_component;
use crate::providers::{ChatOptions, LLMProvider};
use crate::session::{Message, MessageHistory};
use crate::state::{AgentMetadata, StatusStore};

use super::decision::{parse_decision, RawDecision};
use super::service::MemoryService;
use super::types::{
    cosine_similarity, normalize_content, MemoryRecord, MemoryScope, MemorySource, MemoryType,
    NewMemory,
};
use super::{render_window, should_run};

const CREATOR_PROMPT: &str = r#"You are the memory creation step of an autonomous agent. Decide whether the latest conversation contains something worth remembering long term.

Create memories only for explicit preferences or corrections, personal facts about the user, project context or goals that will matter later, and procedures that clearly worked or failed.
Never create memories for general knowledge, small talk, temporary context, or anything already covered by "Recently created memories".

Memory types: user_preference, user_fact, conversation_context, agent_procedure, knowledge, event_pattern, error_handling, proactive_action.

Decisions:
- CREATE_NOW: complete, valuable information that is not already stored.
- WAIT: the user started sharing something important but has not finished. Describe it in "topic".
- IGNORE: nothing significant, or already stored. This should be the most common decision.

Reply with JSON only:
{"reflection": "<short reasoning>", "decision": "CREATE_NOW" | "WAIT" | "IGNORE", "memories": [{"content": "<standalone statement>", "memory_type": "<type>", "importance": 0.0-1.0, "confidence": 0.0-1.0, "tags": ["..."], "scope": "shared" | "individual"}], "topic": "<description>"}"#;

/// What a creator run did.
#[derive(Debug, Clone, PartialEq)]
pub enum CreatorOutcome {
    /// Disabled or not due on this turn
    Skipped,
    Ignored { cleared_wait: bool },
    Waiting { topic: String },
    Created {
        ids: Vec<String>,
        /// Entries skipped as duplicates of recent memories
        duplicates: usize,
        /// Entries skipped because they failed validation
        rejected: usize,
    },
    /// Model, parse or store failure; nothing changed
    Failed(String),
}

/// Distills long-term memories from conversation after each eligible turn.
pub struct MemoryCreator {
    provider: Arc<dyn LLMProvider>,
    memory: MemoryService,
    history: MessageHistory,
    status_store: Arc<dyn StatusStore>,
    config: CreatorConfig,
    model: Option<String>,
}

impl MemoryCreator {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        memory: MemoryService,
        history: MessageHistory,
        status_store: Arc<dyn StatusStore>,
        config: CreatorConfig,
    ) -> Self {
        Self {
            provider,
            memory,
            history,
            status_store,
            config,
            model: None,
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    pub fn config(&self) -> &CreatorConfig {
        &self.config
    }

    pub fn should_run(&self, turn: u64) -> bool {
        should_run(self.config.enabled, self.config.every_n_turns, turn)
    }

    /// Run if enabled and due on `turn`.
    pub async fn create(&self, agent_id: &str, turn: u64) -> CreatorOutcome {
        if !self.should_run(turn) {
            debug!(agent_id = %agent_id, turn, "Memory creator not due");
            return CreatorOutcome::Skipped;
        }
        self.run(agent_id).await
    }

    /// Run one decision unconditionally.
    pub async fn run(&self, agent_id: &str) -> CreatorOutcome {
        let metadata = AgentMetadata::new(self.status_store.clone(), agent_id);
        let wait_topic = metadata.get_wait_topic().await.unwrap_or_else(|e| {
            warn!(agent_id = %agent_id, error = %e, "Could not read wait topic");
            None
        });

        let window = match self
            .history
            .read_module_window(agent_id, self.config.context_messages)
            .await
        {
            Ok(window) => window,
            Err(e) => return self.failed(agent_id, "history read", e.to_string()),
        };
        let recent = match self
            .memory
            .recent_created(agent_id, self.config.recent_memories)
            .await
        {
            Ok(recent) => recent,
            Err(e) => return self.failed(agent_id, "recent memories", e.to_string()),
        };

        let prompt = build_prompt(&window, &recent, wait_topic.as_deref());
        let reply = match self.ask(prompt).await {
            Ok(reply) => reply,
            Err(e) => return self.failed(agent_id, "model call", e.to_string()),
        };
        let Some(decision) = parse_decision(&reply) else {
            return self.failed(agent_id, "decision", "unparseable decision".to_string());
        };

        match decision.kind.as_str() {
            "CREATE_NOW" => self.create_now(agent_id, &decision, recent, &metadata).await,
            "WAIT" => {
                let topic = decision.str_field("topic").unwrap_or_default().trim();
                if topic.is_empty() {
                    return self.failed(agent_id, "decision", "WAIT without topic".to_string());
                }
                if let Err(e) = metadata.set_wait_topic(topic).await {
                    return self.failed(agent_id, "wait topic write", e.to_string());
                }
                log_component!(info, "creator", "WAIT", agent_id = %agent_id, topic = %topic);
                CreatorOutcome::Waiting {
                    topic: topic.to_string(),
                }
            }
            other => {
                if other != "IGNORE" {
                    warn!(agent_id = %agent_id, decision = %other, "Unknown decision, ignoring");
                }
                let cleared_wait = clear_wait(&metadata, agent_id).await;
                log_component!(debug, "creator", "IGNORE", agent_id = %agent_id, cleared_wait = cleared_wait);
                CreatorOutcome::Ignored { cleared_wait }
            }
        }
    }

    async fn create_now(
        &self,
        agent_id: &str,
        decision: &RawDecision,
        recent: Vec<MemoryRecord>,
        metadata: &AgentMetadata,
    ) -> CreatorOutcome {
        let entries = decision.array_field("memories").cloned().unwrap_or_default();
        let mut accepted: Vec<(NewMemory, Vec<f32>)> = Vec::new();
        let mut duplicates = 0;
        let mut rejected = 0;

        // Embed the whole batch first so an embedder outage inserts nothing.
        for entry in &entries {
            let proposal = match proposal_from(agent_id, entry) {
                Ok(proposal) => proposal,
                Err(reason) => {
                    warn!(agent_id = %agent_id, reason = %reason, "Skipping invalid memory proposal");
                    rejected += 1;
                    continue;
                }
            };
            let embedding = match self.memory.embed(&proposal.content).await {
                Ok(embedding) => embedding,
                Err(e) => return self.failed(agent_id, "embedding", e.to_string()),
            };
            let known = recent
                .iter()
                .map(|r| (r.content.as_str(), r.embedding.as_slice()))
                .chain(accepted.iter().map(|(m, e)| (m.content.as_str(), e.as_slice())));
            if self.is_duplicate(&proposal.content, &embedding, known) {
                debug!(agent_id = %agent_id, content = %proposal.content, "Skipping duplicate memory");
                duplicates += 1;
                continue;
            }
            accepted.push((proposal, embedding));
        }

        let mut ids = Vec::new();
        for (proposal, embedding) in accepted {
            match self.memory.create_with_embedding(proposal, embedding).await {
                Ok(record) => ids.push(record.id),
                Err(e) if ids.is_empty() => {
                    return self.failed(agent_id, "memory insert", e.to_string());
                }
                Err(e) => {
                    warn!(
                        agent_id = %agent_id,
                        created = ids.len(),
                        error = %e,
                        "Memory insert failed part way; keeping what was stored"
                    );
                    break;
                }
            }
        }

        clear_wait(metadata, agent_id).await;
        log_component!(
            info,
            "creator",
            "CREATE_NOW",
            agent_id = %agent_id,
            created = ids.len(),
            duplicates = duplicates,
            rejected = rejected
        );
        CreatorOutcome::Created {
            ids,
            duplicates,
            rejected,
        }
    }

    fn is_duplicate<'a>(
        &self,
        content: &str,
        embedding: &[f32],
        mut known: impl Iterator<Item = (&'a str, &'a [f32])>,
    ) -> bool {
        let normalized = normalize_content(content);
        known.any(|(c, e)| {
            normalize_content(c) == normalized
                || cosine_similarity(embedding, e) >= self.config.duplicate_threshold
        })
    }

    async fn ask(&self, prompt: String) -> Result<String> {
        let messages = vec![Message::system(CREATOR_PROMPT), Message::user(&prompt)];
        let options = ChatOptions::new().with_temperature(0.0).with_max_tokens(1024);
        let response = self
            .provider
            .chat(messages, Vec::new(), self.model.as_deref(), options)
            .await?;
        Ok(response.content)
    }

    fn failed(&self, agent_id: &str, stage: &str, reason: String) -> CreatorOutcome {
        warn!(agent_id = %agent_id, stage = %stage, reason = %reason, "Memory creator made no changes");
        CreatorOutcome::Failed(format!("{}: {}", stage, reason))
    }
}

async fn clear_wait(metadata: &AgentMetadata, agent_id: &str) -> bool {
    metadata.clear_wait_topic().await.unwrap_or_else(|e| {
        warn!(agent_id = %agent_id, error = %e, "Could not clear wait topic");
        false
    })
}

fn build_prompt(window: &[Message], recent: &[MemoryRecord], wait_topic: Option<&str>) -> String {
    let recent_json: Vec<Value> = recent.iter().map(MemoryRecord::summary).collect();
    let mut prompt = format!(
        "# Recent conversation\n{}\n\n# Recently created memories\n{}\n",
        render_window(window),
        Value::Array(recent_json)
    );
    if let Some(topic) = wait_topic {
        prompt.push_str(&format!("\n# Waiting on topic\n{}\n", topic));
    }
    prompt
}

/// Turn one CREATE_NOW entry into a validated proposal.
fn proposal_from(agent_id: &str, entry: &Value) -> std::result::Result<NewMemory, String> {
    let content = entry
        .get("content")
        .and_then(Value::as_str)
        .ok_or("missing content")?;
    let memory_type: MemoryType = entry
        .get("memory_type")
        .and_then(Value::as_str)
        .ok_or("missing memory_type")?
        .parse()
        .map_err(|e: crate::error::VosError| e.to_string())?;

    let mut proposal = NewMemory::new(agent_id, memory_type, content.trim())
        .with_source(MemorySource::Inferred);
    if let Some(scope) = entry.get("scope").and_then(Value::as_str) {
        proposal.scope = scope
            .parse::<MemoryScope>()
            .map_err(|e| e.to_string())?;
    }
    if let Some(importance) = entry.get("importance").and_then(Value::as_f64) {
        proposal.importance = importance as f32;
    }
    if let Some(confidence) = entry.get("confidence").and_then(Value::as_f64) {
        proposal.confidence = confidence as f32;
    }
    if let Some(tags) = entry.get("tags").and_then(Value::as_array) {
        proposal.tags = tags
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
    }
    proposal.validate().map_err(|e| e.to_string())?;
    Ok(proposal)
}
