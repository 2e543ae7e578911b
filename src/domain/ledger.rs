use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default window during which a repeated idempotency key is treated as a re-delivery.
pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// One ledger row: inserted on first sighting, never updated, evicted once stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupEntry {
    pub key: String,
    pub created_at: DateTime<Utc>,
}

impl DedupEntry {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            created_at: Utc::now(),
        }
    }

    /// `now - created_at < ttl`. Entries stamped in the future count as fresh.
    pub fn is_live(&self, ttl: Duration) -> bool {
        is_within_ttl(self.created_at, ttl)
    }
}

pub fn is_within_ttl(created_at: DateTime<Utc>, ttl: Duration) -> bool {
    match (Utc::now() - created_at).to_std() {
        Ok(elapsed) => elapsed < ttl,
        Err(_) => true,
    }
}
