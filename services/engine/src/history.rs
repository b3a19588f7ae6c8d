//! Rolling audit log of crashed rounds
//!
//! The in-memory window is authoritative. A background flusher copies it to a
//! [`HistorySink`]; a failed write is logged, counted and retried on the next
//! flush without ever holding up the round.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use shared::types::RoundId;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{EngineError, Result};
use crate::fairness::FairnessProof;
use crate::ledger::Bet;
use crate::round::Round;

pub const REDIS_HISTORY_KEY: &str = "crash:history";

/// Self-contained record of one crashed round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub round_id: RoundId,
    pub round_number: u64,
    pub commit_hash: String,
    pub server_seed: String,
    pub derived_hash: String,
    pub u: u64,
    pub crash_point: f64,
    pub crash_point_display: f64,
    pub house_edge_bps: i64,
    pub created_at: DateTime<Utc>,
    pub crashed_at: DateTime<Utc>,
    pub bets: Vec<Bet>,
}

impl HistoryEntry {
    /// Freeze a round that has reached CRASHED
    pub(crate) fn from_round(round: &Round) -> Option<Self> {
        let proof = round.proof()?;
        Some(Self {
            round_id: round.id,
            round_number: round.number,
            commit_hash: proof.commit_hash,
            server_seed: proof.server_seed,
            derived_hash: proof.derived_hash,
            u: proof.u,
            crash_point: proof.crash_point,
            crash_point_display: round.outcome.crash_point_display,
            house_edge_bps: proof.house_edge_bps,
            created_at: round.created_at,
            crashed_at: round.crashed_at.unwrap_or(round.created_at),
            bets: round.bets().to_vec(),
        })
    }

    pub fn proof(&self) -> FairnessProof {
        FairnessProof {
            round_id: self.round_id,
            commit_hash: self.commit_hash.clone(),
            server_seed: self.server_seed.clone(),
            derived_hash: self.derived_hash.clone(),
            u: self.u,
            crash_point: self.crash_point,
            house_edge_bps: self.house_edge_bps,
        }
    }
}

/// Durable destination for the history window
#[async_trait]
pub trait HistorySink: Send + Sync {
    fn name(&self) -> &'static str;

    /// Replace the stored window with `entries` (oldest first)
    async fn persist(&self, entries: &[HistoryEntry]) -> Result<()>;

    async fn load(&self) -> Result<Vec<HistoryEntry>>;
}

#[derive(Debug, Default)]
pub struct MemoryHistorySink {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl MemoryHistorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn stored(&self) -> Vec<HistoryEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl HistorySink for MemoryHistorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn persist(&self, entries: &[HistoryEntry]) -> Result<()> {
        *self.entries.lock().await = entries.to_vec();
        Ok(())
    }

    async fn load(&self) -> Result<Vec<HistoryEntry>> {
        Ok(self.entries.lock().await.clone())
    }
}

/// Stores the whole window as one JSON document under [`REDIS_HISTORY_KEY`]
#[derive(Clone)]
pub struct RedisHistorySink {
    conn: ConnectionManager,
    key: String,
}

impl RedisHistorySink {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            key: REDIS_HISTORY_KEY.to_string(),
        }
    }

    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl HistorySink for RedisHistorySink {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn persist(&self, entries: &[HistoryEntry]) -> Result<()> {
        let json = serde_json::to_string(entries)
            .map_err(|e| EngineError::Persistence(e.to_string()))?;
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(&self.key, json)
            .await
            .map_err(|e| EngineError::Persistence(e.to_string()))
    }

    async fn load(&self) -> Result<Vec<HistoryEntry>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(&self.key)
            .await
            .map_err(|e| EngineError::Persistence(e.to_string()))?;
        match raw {
            Some(json) => {
                serde_json::from_str(&json).map_err(|e| EngineError::Persistence(e.to_string()))
            }
            None => Ok(Vec::new()),
        }
    }
}

/// Bounded window of the most recent crashed rounds
pub struct HistoryStore {
    entries: RwLock<VecDeque<HistoryEntry>>,
    capacity: usize,
    sink: Arc<dyn HistorySink>,
    dirty: AtomicBool,
    last_flush_ok: AtomicBool,
    notify: Notify,
}

impl HistoryStore {
    pub fn new(capacity: usize, sink: Arc<dyn HistorySink>) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            sink,
            dirty: AtomicBool::new(false),
            last_flush_ok: AtomicBool::new(true),
            notify: Notify::new(),
        }
    }

    pub fn in_memory(capacity: usize) -> Self {
        Self::new(capacity, Arc::new(MemoryHistorySink::new()))
    }

    pub fn sink_name(&self) -> &'static str {
        self.sink.name()
    }

    /// Seed the window from the sink; a read failure starts empty
    pub async fn restore(&self) {
        match self.sink.load().await {
            Ok(mut loaded) => {
                let excess = loaded.len().saturating_sub(self.capacity);
                loaded.drain(..excess);
                let count = loaded.len();
                *self.entries.write().await = loaded.into();
                info!(sink = self.sink.name(), count, "History restored");
            }
            Err(e) => {
                warn!(sink = self.sink.name(), error = %e, "History restore failed, starting empty");
            }
        }
    }

    pub async fn append(&self, entry: HistoryEntry) {
        {
            let mut entries = self.entries.write().await;
            entries.push_back(entry);
            while entries.len() > self.capacity {
                entries.pop_front();
            }
        }
        self.dirty.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Newest first
    pub async fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        self.entries.read().await.iter().rev().take(limit).cloned().collect()
    }

    /// Highest round number in the window, 0 when empty
    pub async fn last_round_number(&self) -> u64 {
        self.entries
            .read()
            .await
            .iter()
            .map(|e| e.round_number)
            .max()
            .unwrap_or(0)
    }

    pub async fn find(&self, round_id: &RoundId) -> Option<HistoryEntry> {
        self.entries
            .read()
            .await
            .iter()
            .find(|entry| entry.round_id == *round_id)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn last_flush_ok(&self) -> bool {
        self.last_flush_ok.load(Ordering::SeqCst)
    }

    /// Write the window to the sink if it changed; `Ok(false)` when clean
    pub async fn flush(&self) -> Result<bool> {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(false);
        }

        let snapshot: Vec<HistoryEntry> = self.entries.read().await.iter().cloned().collect();
        match self.sink.persist(&snapshot).await {
            Ok(()) => {
                self.last_flush_ok.store(true, Ordering::SeqCst);
                debug!(sink = self.sink.name(), count = snapshot.len(), "History flushed");
                Ok(true)
            }
            Err(e) => {
                self.dirty.store(true, Ordering::SeqCst);
                self.last_flush_ok.store(false, Ordering::SeqCst);
                metrics::counter!("crash_history_persist_failures_total").increment(1);
                Err(e)
            }
        }
    }

    /// Flush on every append and on `interval` until cancelled, then once more
    pub async fn run_flusher(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        info!(
            sink = self.sink.name(),
            interval_ms = interval.as_millis() as u64,
            "History flusher started"
        );

        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = self.notify.notified() => {}
            }

            if let Err(e) = self.flush().await {
                warn!(sink = self.sink.name(), error = %e, "History flush failed, will retry");
            }
        }

        if let Err(e) = self.flush().await {
            warn!(sink = self.sink.name(), error = %e, "Final history flush failed");
        }
        info!("History flusher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn entry(round_number: u64) -> HistoryEntry {
        HistoryEntry {
            round_id: RoundId::new(),
            round_number,
            commit_hash: "c".into(),
            server_seed: "s".into(),
            derived_hash: "d".into(),
            u: 1,
            crash_point: 2.0,
            crash_point_display: 2.0,
            house_edge_bps: 200,
            created_at: Utc::now(),
            crashed_at: Utc::now(),
            bets: Vec::new(),
        }
    }

    /// Fails the first `failures` writes
    struct FlakySink {
        failures: AtomicUsize,
        inner: MemoryHistorySink,
    }

    #[async_trait]
    impl HistorySink for FlakySink {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn persist(&self, entries: &[HistoryEntry]) -> Result<()> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(EngineError::Persistence("connection refused".into()));
            }
            self.inner.persist(entries).await
        }

        async fn load(&self) -> Result<Vec<HistoryEntry>> {
            self.inner.load().await
        }
    }

    #[tokio::test]
    async fn test_window_is_bounded() {
        let store = HistoryStore::in_memory(50);
        for n in 1..=60 {
            store.append(entry(n)).await;
        }

        assert_eq!(store.len().await, 50);
        let recent = store.recent(3).await;
        assert_eq!(
            recent.iter().map(|e| e.round_number).collect::<Vec<_>>(),
            vec![60, 59, 58]
        );
        assert_eq!(store.recent(100).await.last().unwrap().round_number, 11);
    }

    #[tokio::test]
    async fn test_failed_flush_is_retried() {
        let sink = Arc::new(FlakySink {
            failures: AtomicUsize::new(1),
            inner: MemoryHistorySink::new(),
        });
        let store = HistoryStore::new(10, sink.clone());
        store.append(entry(1)).await;

        assert!(matches!(store.flush().await, Err(EngineError::Persistence(_))));
        assert!(store.is_dirty());
        assert!(!store.last_flush_ok());

        assert!(store.flush().await.unwrap());
        assert!(store.last_flush_ok());
        assert_eq!(sink.inner.stored().await.len(), 1);

        // nothing new, nothing written
        assert!(!store.flush().await.unwrap());
    }

    #[tokio::test]
    async fn test_restore_from_sink() {
        let sink = Arc::new(MemoryHistorySink::new());
        sink.persist(&(1..=5).map(entry).collect::<Vec<_>>()).await.unwrap();

        let store = HistoryStore::new(3, sink);
        store.restore().await;

        assert_eq!(store.len().await, 3);
        assert_eq!(store.recent(1).await[0].round_number, 5);
        assert_eq!(store.last_round_number().await, 5);
    }

    #[tokio::test]
    async fn test_find_by_round() {
        let store = HistoryStore::in_memory(5);
        let target = entry(7);
        let id = target.round_id;
        store.append(entry(6)).await;
        store.append(target).await;

        assert_eq!(store.find(&id).await.unwrap().round_number, 7);
        assert!(store.find(&RoundId::new()).await.is_none());
    }
}
