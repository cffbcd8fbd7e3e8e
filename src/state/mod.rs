//! Agent status records and metadata
//!
//! Each agent has one [`AgentStatusRecord`] holding its lifecycle status,
//! processing state, heartbeat, turn counter and an open key-value metadata
//! map. The agent loop owns the record through a [`StatusTracker`] and
//! flushes it on every transition; nothing else writes status fields.
//!
//! The metadata map is a separate channel: [`StatusStore::upsert_status`]
//! never overwrites it, and the core only reaches it through typed accessors
//! such as [`AgentMetadata::get_wait_topic`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{Result, VosError};
use crate::utils::string::sanitize_file_stem;

/// Metadata key under which the memory creator keeps its pending topic.
pub const WAIT_TOPIC_KEY: &str = "memory_creator_wait_topic";

/// Whether the agent polls its queue at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    Active,
    Sleeping,
    Off,
}

/// Where the agent is inside a processing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    Idle,
    Thinking,
    ExecutingTools,
}

/// Durable per-agent status row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatusRecord {
    pub agent_id: String,
    pub status: LifecycleStatus,
    pub processing_state: ProcessingState,
    pub last_heartbeat: DateTime<Utc>,
    /// Monotonic count of cycles that invoked the model
    #[serde(default)]
    pub total_turns: u64,
    /// Wake-up time while sleeping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl AgentStatusRecord {
    pub fn new(agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            status: LifecycleStatus::Active,
            processing_state: ProcessingState::Idle,
            last_heartbeat: Utc::now(),
            total_turns: 0,
            sleep_until: None,
            metadata: Map::new(),
        }
    }
}

// ============================================================================
// Store boundary
// ============================================================================

/// Persistent storage for agent status rows and metadata maps.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn load(&self, agent_id: &str) -> Result<Option<AgentStatusRecord>>;

    /// Write every field except `metadata`, which keeps its stored value.
    async fn upsert_status(&self, record: &AgentStatusRecord) -> Result<()>;

    async fn get_metadata(&self, agent_id: &str) -> Result<Map<String, Value>>;

    async fn set_metadata(&self, agent_id: &str, metadata: Map<String, Value>) -> Result<()>;
}

/// Status store kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryStatusStore {
    records: RwLock<HashMap<String, AgentStatusRecord>>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn load(&self, agent_id: &str) -> Result<Option<AgentStatusRecord>> {
        Ok(self.records.read().await.get(agent_id).cloned())
    }

    async fn upsert_status(&self, record: &AgentStatusRecord) -> Result<()> {
        let mut records = self.records.write().await;
        let metadata = records
            .get(&record.agent_id)
            .map(|r| r.metadata.clone())
            .unwrap_or_default();
        let mut stored = record.clone();
        stored.metadata = metadata;
        records.insert(record.agent_id.clone(), stored);
        Ok(())
    }

    async fn get_metadata(&self, agent_id: &str) -> Result<Map<String, Value>> {
        Ok(self
            .records
            .read()
            .await
            .get(agent_id)
            .map(|r| r.metadata.clone())
            .unwrap_or_default())
    }

    async fn set_metadata(&self, agent_id: &str, metadata: Map<String, Value>) -> Result<()> {
        let mut records = self.records.write().await;
        records
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentStatusRecord::new(agent_id))
            .metadata = metadata;
        Ok(())
    }
}

/// Status store keeping one JSON document per agent.
///
/// Writes go to a temporary file in the same directory and are renamed into
/// place, so a crash never leaves a half-written record behind.
#[derive(Debug)]
pub struct FileStatusStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStatusStore {
    /// Create a store rooted at `dir`, creating the directory if needed.
    pub fn with_path(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn file_path(&self, agent_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", sanitize_file_stem(agent_id)))
    }

    async fn read(&self, agent_id: &str) -> Result<Option<AgentStatusRecord>> {
        let path = self.file_path(agent_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|e| VosError::Store(format!("corrupt {}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VosError::Store(format!("read {}: {}", path.display(), e))),
        }
    }

    async fn write(&self, record: &AgentStatusRecord) -> Result<()> {
        let dir = self.dir.clone();
        let path = self.file_path(&record.agent_id);
        let content = serde_json::to_vec_pretty(record)?;
        tokio::task::spawn_blocking(move || -> Result<()> {
            use std::io::Write;
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&content)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path)
                .map_err(|e| VosError::Store(format!("persist {}: {}", path.display(), e)))?;
            Ok(())
        })
        .await
        .map_err(|e| VosError::Store(format!("status writer panicked: {}", e)))?
    }
}

#[async_trait]
impl StatusStore for FileStatusStore {
    async fn load(&self, agent_id: &str) -> Result<Option<AgentStatusRecord>> {
        self.read(agent_id).await
    }

    async fn upsert_status(&self, record: &AgentStatusRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let metadata = self
            .read(&record.agent_id)
            .await?
            .map(|r| r.metadata)
            .unwrap_or_default();
        let mut stored = record.clone();
        stored.metadata = metadata;
        self.write(&stored).await
    }

    async fn get_metadata(&self, agent_id: &str) -> Result<Map<String, Value>> {
        Ok(self
            .read(agent_id)
            .await?
            .map(|r| r.metadata)
            .unwrap_or_default())
    }

    async fn set_metadata(&self, agent_id: &str, metadata: Map<String, Value>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut record = self
            .read(agent_id)
            .await?
            .unwrap_or_else(|| AgentStatusRecord::new(agent_id));
        record.metadata = metadata;
        self.write(&record).await
    }
}

// ============================================================================
// Typed metadata access
// ============================================================================

/// Typed view over one agent's metadata map.
#[derive(Clone)]
pub struct AgentMetadata {
    store: Arc<dyn StatusStore>,
    agent_id: String,
}

impl AgentMetadata {
    pub fn new(store: Arc<dyn StatusStore>, agent_id: &str) -> Self {
        Self {
            store,
            agent_id: agent_id.to_string(),
        }
    }

    /// Topic the memory creator is waiting on, if any.
    pub async fn get_wait_topic(&self) -> Result<Option<String>> {
        let metadata = self.store.get_metadata(&self.agent_id).await?;
        Ok(metadata
            .get(WAIT_TOPIC_KEY)
            .and_then(Value::as_str)
            .map(str::to_string)
            .filter(|t| !t.trim().is_empty()))
    }

    /// Record a pending topic, replacing any previous one.
    pub async fn set_wait_topic(&self, topic: &str) -> Result<()> {
        let mut metadata = self.store.get_metadata(&self.agent_id).await?;
        metadata.insert(WAIT_TOPIC_KEY.to_string(), Value::String(topic.to_string()));
        self.store.set_metadata(&self.agent_id, metadata).await
    }

    /// Remove the pending topic. Returns whether one was set.
    pub async fn clear_wait_topic(&self) -> Result<bool> {
        let mut metadata = self.store.get_metadata(&self.agent_id).await?;
        if metadata.remove(WAIT_TOPIC_KEY).is_none() {
            return Ok(false);
        }
        self.store.set_metadata(&self.agent_id, metadata).await?;
        Ok(true)
    }
}

// ============================================================================
// Status tracker
// ============================================================================

/// The loop's owned copy of its status row, flushed on every transition.
pub struct StatusTracker {
    record: AgentStatusRecord,
    store: Arc<dyn StatusStore>,
    /// The in-memory record holds changes the store has not accepted yet.
    unsaved: bool,
}

impl StatusTracker {
    /// Load (or create) the agent's record and recover from a crashed cycle.
    ///
    /// A record still in `thinking` or `executing_tools` belongs to a cycle
    /// that never finished; it is reset to `idle`. An `off` agent that is
    /// being started again becomes `active`.
    pub async fn open(
        agent_id: &str,
        store: Arc<dyn StatusStore>,
        stale_after_secs: u64,
    ) -> Result<Self> {
        let mut record = match store.load(agent_id).await? {
            Some(record) => record,
            None => {
                info!(agent_id = %agent_id, "Creating status record");
                AgentStatusRecord::new(agent_id)
            }
        };

        if record.processing_state != ProcessingState::Idle {
            let age_secs = (Utc::now() - record.last_heartbeat).num_seconds().max(0) as u64;
            if age_secs > stale_after_secs {
                warn!(
                    agent_id = %agent_id,
                    state = ?record.processing_state,
                    age_secs,
                    "Resetting stale processing state"
                );
            } else {
                warn!(
                    agent_id = %agent_id,
                    state = ?record.processing_state,
                    age_secs,
                    "Previous cycle was interrupted; resetting to idle"
                );
            }
            record.processing_state = ProcessingState::Idle;
        }
        if record.status == LifecycleStatus::Off {
            record.status = LifecycleStatus::Active;
        }

        let mut tracker = Self {
            record,
            store,
            unsaved: true,
        };
        tracker.flush().await?;
        Ok(tracker)
    }

    pub fn record(&self) -> &AgentStatusRecord {
        &self.record
    }

    pub fn status(&self) -> LifecycleStatus {
        self.record.status
    }

    pub fn processing_state(&self) -> ProcessingState {
        self.record.processing_state
    }

    pub fn total_turns(&self) -> u64 {
        self.record.total_turns
    }

    pub async fn set_processing(&mut self, state: ProcessingState) -> Result<()> {
        if self.record.processing_state == state {
            return Ok(());
        }
        debug!(
            agent_id = %self.record.agent_id,
            from = ?self.record.processing_state,
            to = ?state,
            "Processing state transition"
        );
        self.record.processing_state = state;
        self.flush().await
    }

    /// Change lifecycle status. `sleep_until` only applies to `Sleeping`.
    pub async fn set_status(
        &mut self,
        status: LifecycleStatus,
        sleep_until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        info!(agent_id = %self.record.agent_id, ?status, "Lifecycle status change");
        self.record.status = status;
        self.record.sleep_until = match status {
            LifecycleStatus::Sleeping => sleep_until,
            _ => None,
        };
        self.flush().await
    }

    /// Increment and persist the turn counter, returning the new value.
    pub async fn next_turn(&mut self) -> Result<u64> {
        self.record.total_turns += 1;
        self.flush().await?;
        Ok(self.record.total_turns)
    }

    /// Refresh the heartbeat without changing state.
    pub async fn heartbeat(&mut self) -> Result<()> {
        self.flush().await
    }

    /// Whether the last write to the store failed.
    pub fn has_unsaved_changes(&self) -> bool {
        self.unsaved
    }

    /// Write the current record again, e.g. after a failed write.
    pub async fn save(&mut self) -> Result<()> {
        self.flush().await
    }

    async fn flush(&mut self) -> Result<()> {
        self.record.last_heartbeat = Utc::now();
        self.unsaved = true;
        self.store.upsert_status(&self.record).await?;
        self.unsaved = false;
        Ok(())
    }
}
