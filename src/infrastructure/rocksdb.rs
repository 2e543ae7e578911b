use crate::domain::ledger::DedupEntry;
use crate::domain::ports::IdempotencyLedger;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Column Family holding one `DedupEntry` per idempotency key.
pub const CF_DEDUP: &str = "dedup";

/// A durable idempotency ledger backed by RocksDB.
///
/// Entries survive restarts, so a gateway retrying after a deploy is still recognised.
/// Expired entries are overwritten on the next claim for the same key.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>` and claim lock).
#[derive(Clone)]
pub struct RocksDbLedger {
    db: Arc<DB>,
    ttl: Duration,
    claim_lock: Arc<Mutex<()>>,
}

impl RocksDbLedger {
    /// Opens or creates a RocksDB instance at `path`, ensuring the "dedup" column family exists.
    pub fn open<P: AsRef<Path>>(path: P, ttl: Duration) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_dedup = ColumnFamilyDescriptor::new(CF_DEDUP, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_dedup])?;

        Ok(Self {
            db: Arc::new(db),
            ttl,
            claim_lock: Arc::new(Mutex::new(())),
        })
    }

    fn load(&self, key: &str) -> Result<Option<DedupEntry>> {
        let cf = self.db.cf_handle(CF_DEDUP).ok_or_else(missing_cf)?;
        match self.db.get_pinned_cf(&cf, key.as_bytes())? {
            Some(bytes) => {
                let entry = serde_json::from_slice(&bytes).map_err(|e| {
                    PaymentError::InternalError(Box::new(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("Deserialization error: {}", e),
                    )))
                })?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    fn store(&self, key: &str) -> Result<()> {
        let cf = self.db.cf_handle(CF_DEDUP).ok_or_else(missing_cf)?;
        let value = serde_json::to_vec(&DedupEntry::new(key)).map_err(|e| {
            PaymentError::InternalError(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Serialization error: {}", e),
            )))
        })?;
        self.db.put_cf(&cf, key.as_bytes(), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let cf = self.db.cf_handle(CF_DEDUP).ok_or_else(missing_cf)?;
        self.db.delete_cf(&cf, key.as_bytes())?;
        Ok(())
    }
}

fn missing_cf() -> PaymentError {
    PaymentError::InternalError(Box::new(std::io::Error::other(
        "Dedup column family not found",
    )))
}

#[async_trait]
impl IdempotencyLedger for RocksDbLedger {
    async fn is_duplicate(&self, key: &str) -> Result<bool> {
        if key.is_empty() {
            return Ok(false);
        }
        match self.load(key)? {
            Some(entry) if entry.is_live(self.ttl) => Ok(true),
            Some(_) => {
                self.remove(key)?;
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn mark_key(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Ok(());
        }
        self.store(key)
    }

    async fn claim(&self, key: &str) -> Result<bool> {
        if key.is_empty() {
            return Ok(true);
        }
        let _guard = self.claim_lock.lock().await;
        if self.load(key)?.is_some_and(|entry| entry.is_live(self.ttl)) {
            return Ok(false);
        }
        self.store(key)?;
        Ok(true)
    }
}
