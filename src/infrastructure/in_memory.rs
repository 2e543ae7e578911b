use crate::domain::ledger::{DEFAULT_DEDUP_TTL, is_within_ttl};
use crate::domain::ports::IdempotencyLedger;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;

/// A thread-safe in-memory idempotency ledger.
///
/// Uses `Arc<RwLock<HashMap<String, DateTime<Utc>>>>` so clones share the same entries.
/// Stale entries are evicted lazily on lookup and, optionally, by a background sweeper.
/// Nothing survives a restart.
#[derive(Clone)]
pub struct InMemoryLedger {
    entries: Arc<RwLock<HashMap<String, DateTime<Utc>>>>,
    ttl: Duration,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_TTL)
    }
}

impl InMemoryLedger {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Number of stored entries, stale ones included until they are evicted.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drops every expired entry and returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, created_at| is_within_ttl(*created_at, self.ttl));
        before - entries.len()
    }

    /// Runs `purge_expired` every `interval` until the returned handle is aborted.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let ledger = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = ledger.purge_expired().await;
                if removed > 0 {
                    debug!(removed, "swept expired ledger entries");
                }
            }
        })
    }
}

#[async_trait]
impl IdempotencyLedger for InMemoryLedger {
    async fn is_duplicate(&self, key: &str) -> Result<bool> {
        if key.is_empty() {
            return Ok(false);
        }
        let created_at = self.entries.read().await.get(key).copied();
        match created_at {
            Some(created_at) if is_within_ttl(created_at, self.ttl) => Ok(true),
            Some(_) => {
                let mut entries = self.entries.write().await;
                if entries
                    .get(key)
                    .is_some_and(|at| !is_within_ttl(*at, self.ttl))
                {
                    entries.remove(key);
                }
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn mark_key(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Ok(());
        }
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), Utc::now());
        Ok(())
    }

    async fn claim(&self, key: &str) -> Result<bool> {
        if key.is_empty() {
            return Ok(true);
        }
        let mut entries = self.entries.write().await;
        if entries
            .get(key)
            .is_some_and(|at| is_within_ttl(*at, self.ttl))
        {
            return Ok(false);
        }
        entries.insert(key.to_string(), Utc::now());
        Ok(true)
    }
}
