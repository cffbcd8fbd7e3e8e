//! Pre-turn memory retrieval.
//!
//! Before the agent reasons about a notification, a decision model looks at
//! the recent conversation and chooses between `IGNORE`, `GET_MEMORIES`
//! (run one or more searches and look again) and `GIVE_MEMORIES` (hand the
//! chosen candidates to the agent). The loop is capped at `max_iterations`
//! model calls; running out of iterations returns nothing.
//!
//! The retriever only reads. Apart from the vector store's access
//! bookkeeping it never writes agent state, history or memory content.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::RetrieverConfig;
use crate::error::Result;
use crate::log_component;
use crate::providers::{ChatOptions, LLMProvider};
use crate::session::{Message, MessageHistory};

use super::decision::{parse_decision, RawDecision};
use super::service::MemoryService;
use super::types::{cosine_similarity, MemoryRecord, ScoredMemory, SearchFilters};
use super::{render_window, should_run};

const RETRIEVER_PROMPT: &str = r#"You are the memory retrieval step of an autonomous agent. Decide whether long-term memories would help the agent answer the latest messages.

Search when the conversation involves the user personally (identity, preferences, facts about them), refers to earlier conversations or decisions, or would benefit from personal context.
Ignore when the request is purely factual, the context is already present, or the relevant memories appear under "Recently provided memories".

Decisions:
- GET_MEMORIES: run searches. Provide 1-5 queries. A query is a string or {"text": "...", "filters": {"memory_type": "...", "min_importance": 0.7, "tags": ["..."], "created_after": "<RFC 3339>", "created_before": "<RFC 3339>"}}.
- GIVE_MEMORIES: hand candidate memories to the agent. Provide their ids in "memory_ids". Only ids listed under "Candidate memories" are accepted. Never select near-duplicates.
- IGNORE: no memories are needed.

Reply with JSON only:
{"reflection": "<short reasoning>", "decision": "GET_MEMORIES" | "GIVE_MEMORIES" | "IGNORE", "queries": [...], "memory_ids": [...]}"#;

/// How a retrieval run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalEnd {
    /// Disabled or not due on this turn
    Skipped,
    Ignored,
    Given,
    /// Ran out of iterations without a terminal decision
    IterationLimit,
    /// A model or store failure; the run degraded to returning nothing
    Failed(String),
}

/// Result of one retrieval run.
#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    pub memories: Vec<MemoryRecord>,
    /// Decision-model calls made
    pub iterations: u32,
    pub end: RetrievalEnd,
}

impl RetrievalOutcome {
    fn empty(iterations: u32, end: RetrievalEnd) -> Self {
        Self {
            memories: Vec::new(),
            iterations,
            end,
        }
    }
}

/// Decides whether, and which, long-term memories to surface before a turn.
pub struct MemoryRetriever {
    provider: Arc<dyn LLMProvider>,
    memory: MemoryService,
    history: MessageHistory,
    config: RetrieverConfig,
    model: Option<String>,
}

impl MemoryRetriever {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        memory: MemoryService,
        history: MessageHistory,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            provider,
            memory,
            history,
            config,
            model: None,
        }
    }

    /// Use a specific model for retrieval decisions.
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    pub fn should_run(&self, turn: u64) -> bool {
        should_run(self.config.enabled, self.config.every_n_turns, turn)
    }

    /// Run if enabled and due on `turn`.
    pub async fn retrieve(&self, agent_id: &str, turn: u64) -> RetrievalOutcome {
        if !self.should_run(turn) {
            debug!(agent_id = %agent_id, turn, "Memory retriever not due");
            return RetrievalOutcome::empty(0, RetrievalEnd::Skipped);
        }
        self.run(agent_id).await
    }

    /// Run the decision loop unconditionally.
    pub async fn run(&self, agent_id: &str) -> RetrievalOutcome {
        let window = match self
            .history
            .read_module_window(agent_id, self.config.context_messages)
            .await
        {
            Ok(window) => window,
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e, "Memory retriever could not read history");
                return RetrievalOutcome::empty(0, RetrievalEnd::Failed(e.to_string()));
            }
        };

        let past = self
            .memory
            .recently_provided(agent_id, self.config.past_provided)
            .await
            .unwrap_or_else(|e| {
                warn!(agent_id = %agent_id, error = %e, "Could not load recently provided memories");
                Vec::new()
            });
        let past_ids: HashSet<String> = past.iter().map(|m| m.id.clone()).collect();

        let mut pool: Vec<ScoredMemory> = Vec::new();
        let mut iterations = 0u32;

        while iterations < self.config.max_iterations {
            let prompt = self.build_prompt(&window, &past, &pool, iterations);
            let reply = match self.ask(prompt).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(agent_id = %agent_id, error = %e, "Memory retriever model call failed");
                    return RetrievalOutcome::empty(iterations, RetrievalEnd::Failed(e.to_string()));
                }
            };
            iterations += 1;

            let Some(decision) = parse_decision(&reply) else {
                log_component!(warn, "retriever", "Unparseable decision, ignoring", agent_id = %agent_id);
                return RetrievalOutcome::empty(iterations, RetrievalEnd::Ignored);
            };

            match decision.kind.as_str() {
                "GET_MEMORIES" => {
                    let queries = parse_queries(&decision);
                    if queries.is_empty() || queries.len() > self.config.max_queries {
                        warn!(
                            agent_id = %agent_id,
                            count = queries.len(),
                            "Invalid query count, ignoring"
                        );
                        return RetrievalOutcome::empty(iterations, RetrievalEnd::Ignored);
                    }
                    log_component!(
                        info,
                        "retriever",
                        "GET_MEMORIES",
                        agent_id = %agent_id,
                        iteration = iterations,
                        queries = queries.len()
                    );
                    for (text, filters) in &queries {
                        let hits = match self
                            .memory
                            .search_text(text, filters, agent_id, self.config.top_k)
                            .await
                        {
                            Ok(hits) => hits,
                            Err(e) => {
                                warn!(agent_id = %agent_id, error = %e, "Memory search failed");
                                return RetrievalOutcome::empty(
                                    iterations,
                                    RetrievalEnd::Failed(e.to_string()),
                                );
                            }
                        };
                        for hit in hits {
                            let known = pool.iter().any(|p| p.record.id == hit.record.id);
                            if !known && !past_ids.contains(&hit.record.id) {
                                pool.push(hit);
                            }
                        }
                    }
                }
                "GIVE_MEMORIES" => {
                    let memories = self.select(&decision, &pool);
                    let ids: Vec<String> = memories.iter().map(|m| m.id.clone()).collect();
                    if let Err(e) = self.memory.mark_provided(agent_id, &ids).await {
                        warn!(agent_id = %agent_id, error = %e, "Could not record memory access");
                    }
                    log_component!(
                        info,
                        "retriever",
                        "GIVE_MEMORIES",
                        agent_id = %agent_id,
                        iteration = iterations,
                        selected = memories.len()
                    );
                    return RetrievalOutcome {
                        memories,
                        iterations,
                        end: RetrievalEnd::Given,
                    };
                }
                other => {
                    if other != "IGNORE" {
                        warn!(agent_id = %agent_id, decision = %other, "Unknown decision, ignoring");
                    }
                    debug!(agent_id = %agent_id, iteration = iterations, "Memory retriever ignored");
                    return RetrievalOutcome::empty(iterations, RetrievalEnd::Ignored);
                }
            }
        }

        info!(
            agent_id = %agent_id,
            iterations,
            "Memory retriever reached its iteration limit"
        );
        RetrievalOutcome::empty(iterations, RetrievalEnd::IterationLimit)
    }

    async fn ask(&self, prompt: String) -> Result<String> {
        let messages = vec![Message::system(RETRIEVER_PROMPT), Message::user(&prompt)];
        let options = ChatOptions::new().with_temperature(0.0).with_max_tokens(1024);
        let response = self
            .provider
            .chat(messages, Vec::new(), self.model.as_deref(), options)
            .await?;
        Ok(response.content)
    }

    fn build_prompt(
        &self,
        window: &[Message],
        past: &[MemoryRecord],
        pool: &[ScoredMemory],
        iteration: u32,
    ) -> String {
        let past_json: Vec<Value> = past.iter().map(MemoryRecord::summary).collect();
        let mut prompt = format!(
            "# Recent conversation\n{}\n\n# Recently provided memories\n{}\n",
            render_window(window),
            Value::Array(past_json)
        );
        if !pool.is_empty() {
            let candidates: Vec<Value> = pool
                .iter()
                .map(|hit| {
                    let mut summary = hit.record.summary();
                    summary["distance"] = json!(hit.distance);
                    summary
                })
                .collect();
            prompt.push_str(&format!(
                "\n# Candidate memories\n{}\n",
                Value::Array(candidates)
            ));
        }
        prompt.push_str(&format!(
            "\n# Iteration {} of {}\n",
            iteration + 1,
            self.config.max_iterations
        ));
        prompt
    }

    /// Resolve selected ids against the pool, dropping near-duplicates.
    fn select(&self, decision: &RawDecision, pool: &[ScoredMemory]) -> Vec<MemoryRecord> {
        let ids: Vec<&str> = decision
            .array_field("memory_ids")
            .map(|ids| ids.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut selected: Vec<MemoryRecord> = Vec::new();
        for id in ids {
            if selected.len() >= self.config.max_selected {
                break;
            }
            let Some(hit) = pool.iter().find(|p| p.record.id == id) else {
                debug!(memory_id = %id, "Selected id not among candidates");
                continue;
            };
            let duplicate = selected.iter().any(|s| {
                s.id == hit.record.id
                    || cosine_similarity(&s.embedding, &hit.record.embedding)
                        >= self.config.dedup_threshold
            });
            if !duplicate {
                selected.push(hit.record.clone());
            }
        }
        selected
    }
}

/// Extract `(text, filters)` pairs. Bad filter objects fall back to no filters.
fn parse_queries(decision: &RawDecision) -> Vec<(String, SearchFilters)> {
    let Some(queries) = decision.array_field("queries") else {
        return Vec::new();
    };
    queries
        .iter()
        .filter_map(|q| match q {
            Value::String(text) => Some((text.clone(), SearchFilters::default())),
            Value::Object(obj) => {
                let text = obj.get("text").and_then(Value::as_str)?.to_string();
                let filters = obj
                    .get("filters")
                    .cloned()
                    .map(|f| {
                        serde_json::from_value::<SearchFilters>(f).unwrap_or_else(|e| {
                            warn!(error = %e, "Ignoring invalid query filters");
                            SearchFilters::default()
                        })
                    })
                    .unwrap_or_default();
                Some((text, filters))
            }
            _ => None,
        })
        .filter(|(text, _)| !text.trim().is_empty())
        .collect()
}
