//! Message history
//!
//! Every agent owns an append-only conversation log. This module provides:
//! - the [`HistoryStore`] boundary to the persistent store, with an
//!   in-memory implementation and a JSON-lines file implementation
//! - [`MessageHistory`], the manager the agent loop and memory modules use
//!
//! Appends are idempotent per message id. Turns written by a processing
//! cycle get the id `<correlation_id>:<seq>`, so replaying a redelivered
//! notification never duplicates turns that were already stored.
//!
//! Trimming is a read-time view: [`MessageHistory::read_context`] returns a
//! bounded window while [`MessageHistory::read_full`] always returns the
//! whole log.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use vos_agent::session::{InMemoryHistoryStore, Message, MessageHistory};
//!
//! #[tokio::main]
//! async fn main() {
//!     let history = MessageHistory::new(Arc::new(InMemoryHistoryStore::new()));
//!     for i in 0..5 {
//!         let msg = Message::user(&format!("turn {}", i)).for_agent("notes_agent");
//!         history.append(msg).await.unwrap();
//!     }
//!     assert_eq!(history.read_context("notes_agent", 2).await.unwrap().len(), 2);
//!     assert_eq!(history.read_full("notes_agent").await.unwrap().len(), 5);
//! }
//! ```

pub mod types;

pub use types::{Message, Role, ToolCall};

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::{Result, VosError};
use crate::utils::string::sanitize_file_stem;

// ============================================================================
// Store boundary
// ============================================================================

/// Persistent storage for per-agent conversation logs.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append a turn. Returns `false` when a turn with the same id is already stored.
    async fn append(&self, message: &Message) -> Result<bool>;

    /// The most recent `limit` turns in chronological order (0 = all).
    async fn read_recent(&self, agent_id: &str, limit: usize) -> Result<Vec<Message>>;

    /// The whole log in chronological order.
    async fn read_all(&self, agent_id: &str) -> Result<Vec<Message>> {
        self.read_recent(agent_id, 0).await
    }

    /// Number of stored turns.
    async fn count(&self, agent_id: &str) -> Result<usize>;
}

#[derive(Debug, Default, Clone)]
struct AgentLog {
    messages: Vec<Message>,
    ids: HashSet<String>,
    /// The backing file ends without a newline (torn write)
    needs_newline: bool,
}

impl AgentLog {
    fn push(&mut self, message: &Message) -> bool {
        if !self.ids.insert(message.id.clone()) {
            return false;
        }
        self.messages.push(message.clone());
        true
    }

    fn recent(&self, limit: usize) -> Vec<Message> {
        let start = if limit == 0 {
            0
        } else {
            self.messages.len().saturating_sub(limit)
        };
        self.messages[start..].to_vec()
    }
}

fn require_agent(message: &Message) -> Result<()> {
    if message.agent_id.is_empty() {
        return Err(VosError::Validation(
            "history message has no agent_id".into(),
        ));
    }
    Ok(())
}

/// History store kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    logs: RwLock<HashMap<String, AgentLog>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, message: &Message) -> Result<bool> {
        require_agent(message)?;
        let mut logs = self.logs.write().await;
        Ok(logs
            .entry(message.agent_id.clone())
            .or_default()
            .push(message))
    }

    async fn read_recent(&self, agent_id: &str, limit: usize) -> Result<Vec<Message>> {
        let logs = self.logs.read().await;
        Ok(logs.get(agent_id).map(|l| l.recent(limit)).unwrap_or_default())
    }

    async fn count(&self, agent_id: &str) -> Result<usize> {
        let logs = self.logs.read().await;
        Ok(logs.get(agent_id).map_or(0, |l| l.messages.len()))
    }
}

/// History store backed by one JSON-lines file per agent.
///
/// Logs are loaded into memory on first access. A torn trailing line left
/// by a crash is skipped with a warning.
#[derive(Debug)]
pub struct FileHistoryStore {
    dir: PathBuf,
    logs: Mutex<HashMap<String, AgentLog>>,
}

impl FileHistoryStore {
    /// Create a store rooted at `dir`, creating the directory if needed.
    pub fn with_path(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            logs: Mutex::new(HashMap::new()),
        })
    }

    fn file_path(&self, agent_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.jsonl", sanitize_file_stem(agent_id)))
    }

    async fn load(path: &Path) -> Result<AgentLog> {
        let mut log = AgentLog::default();
        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(log),
            Err(e) => return Err(VosError::Store(format!("read {}: {}", path.display(), e))),
        };
        log.needs_newline = !content.is_empty() && !content.ends_with('\n');
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Message>(line) {
                Ok(msg) => {
                    log.push(&msg);
                }
                Err(e) => warn!(
                    path = %path.display(),
                    line = lineno + 1,
                    error = %e,
                    "Skipping unreadable history line"
                ),
            }
        }
        Ok(log)
    }

    async fn with_log<T>(
        &self,
        agent_id: &str,
        f: impl FnOnce(&mut AgentLog) -> T,
    ) -> Result<T> {
        let mut logs = self.logs.lock().await;
        if !logs.contains_key(agent_id) {
            let log = Self::load(&self.file_path(agent_id)).await?;
            logs.insert(agent_id.to_string(), log);
        }
        let log = logs
            .get_mut(agent_id)
            .ok_or_else(|| VosError::Store(format!("history for {} not loaded", agent_id)))?;
        Ok(f(log))
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn append(&self, message: &Message) -> Result<bool> {
        require_agent(message)?;
        let mut logs = self.logs.lock().await;
        if !logs.contains_key(&message.agent_id) {
            let log = Self::load(&self.file_path(&message.agent_id)).await?;
            logs.insert(message.agent_id.clone(), log);
        }
        let Some(log) = logs.get_mut(&message.agent_id) else {
            return Err(VosError::Store("history log missing".into()));
        };
        if log.ids.contains(&message.id) {
            return Ok(false);
        }

        let mut line = String::new();
        if log.needs_newline {
            line.push('\n');
        }
        line.push_str(&serde_json::to_string(message)?);
        line.push('\n');
        let path = self.file_path(&message.agent_id);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| VosError::Store(format!("open {}: {}", path.display(), e)))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| VosError::Store(format!("write {}: {}", path.display(), e)))?;
        file.flush()
            .await
            .map_err(|e| VosError::Store(format!("flush {}: {}", path.display(), e)))?;
        log.needs_newline = false;

        Ok(log.push(message))
    }

    async fn read_recent(&self, agent_id: &str, limit: usize) -> Result<Vec<Message>> {
        self.with_log(agent_id, |log| log.recent(limit)).await
    }

    async fn count(&self, agent_id: &str) -> Result<usize> {
        self.with_log(agent_id, |log| log.messages.len()).await
    }
}

// ============================================================================
// History manager
// ============================================================================

/// Reads and writes agent conversation history.
#[derive(Clone)]
pub struct MessageHistory {
    store: Arc<dyn HistoryStore>,
}

impl MessageHistory {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    /// Append one turn. Returns `false` if the turn was already stored.
    pub async fn append(&self, message: Message) -> Result<bool> {
        let stored = self.store.append(&message).await?;
        if !stored {
            debug!(agent_id = %message.agent_id, id = %message.id, "History turn already stored");
        }
        Ok(stored)
    }

    /// The most recent `limit` turns in chronological order (0 = unlimited).
    ///
    /// The window never opens on half of a tool exchange: leading tool
    /// results and tool-call proposals are dropped, so the view can be
    /// slightly shorter than `limit`.
    pub async fn read_context(&self, agent_id: &str, limit: usize) -> Result<Vec<Message>> {
        let mut window = self.store.read_recent(agent_id, limit).await?;
        let total = self.store.count(agent_id).await?;
        if limit != 0 && total > window.len() {
            let skip = window
                .iter()
                .take_while(|m| m.is_tool_result() || m.has_tool_calls())
                .count();
            window.drain(..skip);
        }
        Ok(window)
    }

    /// The complete log, regardless of any context window.
    pub async fn read_full(&self, agent_id: &str) -> Result<Vec<Message>> {
        self.store.read_all(agent_id).await
    }

    /// The last `n` plain user/assistant turns, for the memory modules.
    pub async fn read_module_window(&self, agent_id: &str, n: usize) -> Result<Vec<Message>> {
        let all = self.store.read_all(agent_id).await?;
        let mut window: Vec<Message> = all
            .into_iter()
            .rev()
            .filter(|m| m.is_conversational())
            .take(n)
            .collect();
        window.reverse();
        Ok(window)
    }

    pub async fn count(&self, agent_id: &str) -> Result<usize> {
        self.store.count(agent_id).await
    }

    /// How many turns an agent already holds for one cycle's correlation id.
    pub async fn correlated_count(&self, agent_id: &str, correlation_id: &str) -> Result<usize> {
        let all = self.store.read_all(agent_id).await?;
        Ok(all
            .iter()
            .filter(|m| m.correlation_id.as_deref() == Some(correlation_id))
            .count())
    }
}
