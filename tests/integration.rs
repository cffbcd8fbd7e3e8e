//! Integration tests for vos-agent
//!
//! These tests wire the agent loop, broker, history, status store and the two
//! memory modules together and check the behaviour that only shows up when
//! they run as one system: delivery discipline, context bounds, memory flow
//! and state that has to survive a restart.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::tempdir;

use vos_agent::agent::{AgentDeps, AgentLoop, CycleOutcome};
use vos_agent::bus::{Broker, InMemoryBroker, Notification, NotificationType};
use vos_agent::config::{AgentSettings, CreatorConfig, RetrieverConfig};
use vos_agent::memory::{
    CreatorOutcome, HashEmbedder, InMemoryVectorStore, MemoryCreator, MemoryRetriever,
    MemoryService, MemoryType, NewMemory, RetrievalEnd,
};
use vos_agent::providers::{ChatOptions, LLMProvider, LLMResponse, LLMToolCall, ToolDefinition};
use vos_agent::session::{FileHistoryStore, InMemoryHistoryStore, Message, MessageHistory};
use vos_agent::state::{
    AgentMetadata, FileStatusStore, InMemoryStatusStore, ProcessingState, StatusStore,
};
use vos_agent::tools::{register_builtin, ToolRegistry};
use vos_agent::Result;

// ============================================================================
// Test provider
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Route {
    Retriever,
    Creator,
    Agent,
}

/// Answers the retriever, creator and agent from separate scripts.
///
/// Requests are routed on the system prompt. Exhausted scripts answer
/// `IGNORE` (memory modules) or a plain `done` (agent).
#[derive(Default)]
struct RoutingProvider {
    retriever: Mutex<VecDeque<String>>,
    creator: Mutex<VecDeque<String>>,
    agent: Mutex<VecDeque<LLMResponse>>,
    requests: Mutex<Vec<(Route, Vec<Message>)>>,
    delay: Option<Duration>,
    broker: Option<Arc<InMemoryBroker>>,
    max_unacked: Mutex<usize>,
}

impl RoutingProvider {
    fn new() -> Self {
        Self::default()
    }

    fn retriever_says(self, replies: &[&str]) -> Self {
        self.retriever
            .lock()
            .unwrap()
            .extend(replies.iter().map(|r| r.to_string()));
        self
    }

    fn creator_says(self, replies: &[&str]) -> Self {
        self.creator
            .lock()
            .unwrap()
            .extend(replies.iter().map(|r| r.to_string()));
        self
    }

    fn agent_says(self, replies: Vec<LLMResponse>) -> Self {
        self.agent.lock().unwrap().extend(replies);
        self
    }

    /// Sleep inside every agent call and record the broker's unacked count.
    fn watching(mut self, broker: Arc<InMemoryBroker>, delay: Duration) -> Self {
        self.broker = Some(broker);
        self.delay = Some(delay);
        self
    }

    fn requests_for(&self, route: Route) -> Vec<Vec<Message>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| *r == route)
            .map(|(_, m)| m.clone())
            .collect()
    }

    fn route(messages: &[Message]) -> Route {
        let system = messages.first().map(|m| m.content.as_str()).unwrap_or("");
        if system.starts_with("You are the memory retrieval step") {
            Route::Retriever
        } else if system.starts_with("You are the memory creation step") {
            Route::Creator
        } else {
            Route::Agent
        }
    }
}

#[async_trait]
impl LLMProvider for RoutingProvider {
    async fn chat(
        &self,
        messages: Vec<Message>,
        _tools: Vec<ToolDefinition>,
        _model: Option<&str>,
        _options: ChatOptions,
    ) -> Result<LLMResponse> {
        let route = Self::route(&messages);
        self.requests.lock().unwrap().push((route, messages));

        match route {
            Route::Retriever => {
                let reply = self.retriever.lock().unwrap().pop_front();
                Ok(LLMResponse::text(
                    &reply.unwrap_or_else(|| r#"{"decision":"IGNORE"}"#.into()),
                ))
            }
            Route::Creator => {
                let reply = self.creator.lock().unwrap().pop_front();
                Ok(LLMResponse::text(
                    &reply.unwrap_or_else(|| r#"{"decision":"IGNORE"}"#.into()),
                ))
            }
            Route::Agent => {
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                if let Some(broker) = &self.broker {
                    let unacked = broker.unacked_count("worker").await;
                    let mut max = self.max_unacked.lock().unwrap();
                    *max = (*max).max(unacked);
                }
                let reply = self.agent.lock().unwrap().pop_front();
                Ok(reply.unwrap_or_else(|| LLMResponse::text("done")))
            }
        }
    }

    fn default_model(&self) -> &str {
        "routing"
    }

    fn name(&self) -> &str {
        "routing"
    }
}

fn memory_service() -> (MemoryService, Arc<InMemoryVectorStore>) {
    let store = Arc::new(InMemoryVectorStore::new());
    let service = MemoryService::new(Arc::new(HashEmbedder::default()), store.clone());
    (service, store)
}

fn in_memory_history() -> MessageHistory {
    MessageHistory::new(Arc::new(InMemoryHistoryStore::new()))
}

fn bare_deps(
    broker: Arc<InMemoryBroker>,
    history: MessageHistory,
    provider: Arc<RoutingProvider>,
) -> AgentDeps {
    AgentDeps {
        broker,
        history,
        status_store: Arc::new(InMemoryStatusStore::new()),
        provider,
        tools: ToolRegistry::new(),
        retriever: None,
        creator: None,
        outbound: None,
    }
}

async fn wait_for<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// ============================================================================
// Delivery discipline
// ============================================================================

#[tokio::test]
async fn test_at_most_one_notification_in_flight() {
    let broker = Arc::new(InMemoryBroker::new());
    let history = in_memory_history();
    let provider = Arc::new(
        RoutingProvider::new().watching(broker.clone(), Duration::from_millis(20)),
    );
    let agent = Arc::new(AgentLoop::new(
        AgentSettings::with_defaults("worker"),
        bare_deps(broker.clone(), history.clone(), provider.clone()),
    ));

    for text in ["first", "second", "third"] {
        broker
            .publish(&Notification::user_message("worker", "gateway", text))
            .await
            .unwrap();
    }

    let runner = {
        let agent = agent.clone();
        tokio::spawn(async move { agent.run().await })
    };

    wait_for(|| {
        let history = history.clone();
        async move { history.count("worker").await.unwrap() == 6 }
    })
    .await;
    agent.stop();
    runner.await.unwrap().unwrap();

    assert_eq!(*provider.max_unacked.lock().unwrap(), 1);
    assert_eq!(broker.unacked_count("worker").await, 0);
    assert_eq!(broker.ready_count("worker").await, 0);

    // Turns land in publish order, one cycle at a time.
    let log = history.read_full("worker").await.unwrap();
    let users: Vec<&str> = log
        .iter()
        .filter(|m| m.correlation_id.is_some() && m.id.ends_with(":0"))
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(users, vec!["first", "second", "third"]);

    let record = agent.status_record().await.unwrap();
    assert_eq!(record.processing_state, ProcessingState::Idle);
    assert_eq!(record.total_turns, 3);
}

#[tokio::test]
async fn test_delegation_reaches_other_agent_queue() {
    let broker = Arc::new(InMemoryBroker::new());
    let mut tools = ToolRegistry::new();
    register_builtin(&mut tools, None, broker.clone());

    let provider = Arc::new(RoutingProvider::new().agent_says(vec![
        LLMResponse::with_tools(
            "",
            vec![LLMToolCall::new(
                "c1",
                "send_agent_message",
                r#"{"recipient":"calendar_agent","content":"Book Friday 10:00"}"#,
            )],
        ),
        LLMResponse::text("I asked the calendar agent to book it."),
    ]));
    let mut deps = bare_deps(broker.clone(), in_memory_history(), provider);
    deps.tools = tools;
    let agent = AgentLoop::new(AgentSettings::with_defaults("planner"), deps);

    broker
        .publish(&Notification::user_message("planner", "gateway", "book a meeting friday"))
        .await
        .unwrap();
    let delivery = broker.consume("planner").await.unwrap();
    let outcome = agent.process_delivery(delivery).await;
    assert!(matches!(outcome, CycleOutcome::Completed { tool_calls: 1, .. }));

    let forwarded = broker.consume("calendar_agent").await.unwrap();
    let n = Notification::from_json(&forwarded.body).unwrap();
    assert_eq!(n.notification_type, NotificationType::AgentMessage);
    assert_eq!(n.source, "planner");
    assert_eq!(n.text(), "Book Friday 10:00");
}

// ============================================================================
// History
// ============================================================================

#[tokio::test]
async fn test_context_window_bounds_model_view() {
    let broker = Arc::new(InMemoryBroker::new());
    let history = in_memory_history();
    for i in 0..50 {
        let msg = if i % 2 == 0 {
            Message::user(&format!("question {}", i))
        } else {
            Message::assistant(&format!("answer {}", i))
        };
        history.append(msg.for_agent("worker")).await.unwrap();
    }

    let provider = Arc::new(RoutingProvider::new());
    let mut settings = AgentSettings::with_defaults("worker");
    settings.context_window = 10;
    let agent = AgentLoop::new(settings, bare_deps(broker.clone(), history.clone(), provider.clone()));

    broker
        .publish(&Notification::user_message("worker", "gateway", "newest"))
        .await
        .unwrap();
    let delivery = broker.consume("worker").await.unwrap();
    agent.process_delivery(delivery).await;

    let request = &provider.requests_for(Route::Agent)[0];
    // System prompt plus the last ten turns, ending with the new notification.
    assert_eq!(request.len(), 11);
    assert_eq!(request.last().unwrap().content, "newest");
    assert_eq!(request[1].content, "answer 41");

    // The stored log is never truncated.
    assert_eq!(history.read_full("worker").await.unwrap().len(), 52);
}

#[tokio::test]
async fn test_file_history_survives_restart() {
    let dir = tempdir().unwrap();
    {
        let history = MessageHistory::new(Arc::new(FileHistoryStore::with_path(dir.path()).unwrap()));
        for i in 0..50 {
            history
                .append(Message::user(&format!("turn {}", i)).for_agent("notes_agent"))
                .await
                .unwrap();
        }
    }

    let history = MessageHistory::new(Arc::new(FileHistoryStore::with_path(dir.path()).unwrap()));
    let full = history.read_full("notes_agent").await.unwrap();
    assert_eq!(full.len(), 50);
    assert_eq!(full[0].content, "turn 0");

    let window = history.read_context("notes_agent", 10).await.unwrap();
    assert_eq!(window.len(), 10);
    assert_eq!(window[0].content, "turn 40");
    assert_eq!(window[9].content, "turn 49");
}

// ============================================================================
// Memory retriever
// ============================================================================

#[tokio::test]
async fn test_retriever_stops_after_three_iterations() {
    let (memory, _) = memory_service();
    let history = in_memory_history();
    history
        .append(Message::user("what tea do I like?").for_agent("notes_agent"))
        .await
        .unwrap();

    let search = r#"{"decision":"GET_MEMORIES","queries":["tea"]}"#;
    let provider = Arc::new(RoutingProvider::new().retriever_says(&[search; 5]));
    let retriever = MemoryRetriever::new(
        provider.clone(),
        memory,
        history,
        RetrieverConfig::default(),
    );

    let outcome = retriever.run("notes_agent").await;
    assert_eq!(outcome.iterations, 3);
    assert_eq!(outcome.end, RetrievalEnd::IterationLimit);
    assert!(outcome.memories.is_empty());
    assert_eq!(provider.requests_for(Route::Retriever).len(), 3);
}

#[tokio::test]
async fn test_retrieved_memories_reach_the_agent() {
    let (memory, _) = memory_service();
    let stored = memory
        .create(NewMemory::new(
            "notes_agent",
            MemoryType::UserPreference,
            "The user prefers green tea over coffee",
        ))
        .await
        .unwrap();

    let broker = Arc::new(InMemoryBroker::new());
    let history = in_memory_history();
    let give = json!({"decision": "GIVE_MEMORIES", "memory_ids": [stored.id]}).to_string();
    let provider = Arc::new(
        RoutingProvider::new()
            .retriever_says(&[
                r#"{"decision":"GET_MEMORIES","queries":["tea preference"]}"#,
                give.as_str(),
            ])
            .agent_says(vec![LLMResponse::text("Green tea, as usual?")]),
    );
    let retriever = MemoryRetriever::new(
        provider.clone(),
        memory.clone(),
        history.clone(),
        RetrieverConfig::default(),
    );
    let mut deps = bare_deps(broker.clone(), history.clone(), provider.clone());
    deps.retriever = Some(retriever);
    let agent = AgentLoop::new(AgentSettings::with_defaults("notes_agent"), deps);

    broker
        .publish(&Notification::user_message("notes_agent", "gateway", "make me a drink"))
        .await
        .unwrap();
    let delivery = broker.consume("notes_agent").await.unwrap();
    let outcome = agent.process_delivery(delivery).await;
    assert!(matches!(outcome, CycleOutcome::Completed { .. }));

    let request = &provider.requests_for(Route::Agent)[0];
    let injected: Value = serde_json::from_str(&request.last().unwrap().content).unwrap();
    assert_eq!(injected["type"], "proactive_memories");
    assert_eq!(injected["memories"][0]["id"], stored.id.as_str());

    // Handing the memory over counts as an access.
    let provided = memory.recently_provided("notes_agent", 10).await.unwrap();
    assert_eq!(provided.len(), 1);
    assert_eq!(provided[0].access_count, 1);
}

// ============================================================================
// Memory creator
// ============================================================================

#[tokio::test]
async fn test_creator_stores_memory_after_cycle() {
    let (memory, store) = memory_service();
    let broker = Arc::new(InMemoryBroker::new());
    let history = in_memory_history();
    let status_store: Arc<dyn StatusStore> = Arc::new(InMemoryStatusStore::new());
    let create = json!({
        "decision": "CREATE_NOW",
        "memories": [{
            "content": "The user is allergic to peanuts",
            "memory_type": "user_fact",
            "importance": 0.9,
            "confidence": 0.95,
            "tags": ["health"]
        }]
    })
    .to_string();
    let provider = Arc::new(
        RoutingProvider::new()
            .creator_says(&[create.as_str()])
            .agent_says(vec![LLMResponse::text("Noted, no peanuts.")]),
    );
    let creator = MemoryCreator::new(
        provider.clone(),
        memory.clone(),
        history.clone(),
        status_store.clone(),
        CreatorConfig::default(),
    );
    let mut deps = bare_deps(broker.clone(), history, provider.clone());
    deps.status_store = status_store;
    deps.creator = Some(creator);
    let agent = AgentLoop::new(AgentSettings::with_defaults("notes_agent"), deps);

    broker
        .publish(&Notification::user_message("notes_agent", "gateway", "I'm allergic to peanuts"))
        .await
        .unwrap();
    let delivery = broker.consume("notes_agent").await.unwrap();
    agent.process_delivery(delivery).await;

    assert_eq!(store.len().await, 1);
    let created = memory.recent_created("notes_agent", 5).await.unwrap();
    assert_eq!(created[0].content, "The user is allergic to peanuts");
    assert_eq!(created[0].memory_type, MemoryType::UserFact);

    // The creator saw the finished exchange, reply included.
    let prompt = &provider.requests_for(Route::Creator)[0][1].content;
    assert!(prompt.contains("I'm allergic to peanuts"));
    assert!(prompt.contains("Noted, no peanuts."));
}

#[tokio::test]
async fn test_wait_topic_survives_restart() {
    let dir = tempdir().unwrap();
    let history = in_memory_history();
    history
        .append(
            Message::user("I'm planning a trip to Japan, I'll tell you the dates later")
                .for_agent("notes_agent"),
        )
        .await
        .unwrap();

    {
        let status_store: Arc<dyn StatusStore> =
            Arc::new(FileStatusStore::with_path(dir.path()).unwrap());
        let (memory, _) = memory_service();
        let provider = Arc::new(
            RoutingProvider::new()
                .creator_says(&[r#"{"decision":"WAIT","topic":"trip to Japan, dates pending"}"#]),
        );
        let creator = MemoryCreator::new(
            provider,
            memory,
            history.clone(),
            status_store,
            CreatorConfig::default(),
        );
        assert_eq!(
            creator.run("notes_agent").await,
            CreatorOutcome::Waiting {
                topic: "trip to Japan, dates pending".into()
            }
        );
    }

    // A fresh process over the same status directory.
    let status_store: Arc<dyn StatusStore> =
        Arc::new(FileStatusStore::with_path(dir.path()).unwrap());
    let (memory, _) = memory_service();
    let provider = Arc::new(RoutingProvider::new().creator_says(&[r#"{"decision":"IGNORE"}"#]));
    let creator = MemoryCreator::new(
        provider.clone(),
        memory,
        history,
        status_store.clone(),
        CreatorConfig::default(),
    );

    let outcome = creator.run("notes_agent").await;
    let prompt = &provider.requests_for(Route::Creator)[0][1].content;
    assert!(prompt.contains("trip to Japan, dates pending"));
    assert_eq!(outcome, CreatorOutcome::Ignored { cleared_wait: true });

    let metadata = AgentMetadata::new(status_store, "notes_agent");
    assert_eq!(metadata.get_wait_topic().await.unwrap(), None);
}
