//! In-memory lock store.
//!
//! Locks live as long as the process. Useful for dry runs and tests; a single
//! mutex makes every operation atomic.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;

use super::record::LockRecord;
use super::store::{AcquireOutcome, LockStore, ReleaseOutcome};

/// In-memory lock store.
#[derive(Debug, Clone, Default)]
pub struct MemoryLockStore {
    locks: Arc<Mutex<HashMap<String, LockRecord>>>,
}

impl MemoryLockStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn acquire(&self, key: &str, ttl: Duration, owner: &str, message: &str) -> Result<AcquireOutcome> {
        let mut locks = self.locks.lock().await;

        if let Some(existing) = LockRecord::blocking(locks.get(key), owner) {
            return Ok(AcquireOutcome::Conflict(existing.clone()));
        }

        let record = LockRecord::new(key, owner, message, ttl);
        locks.insert(key.to_string(), record.clone());
        debug!("Acquired in-memory lock {key} for {owner}");
        Ok(AcquireOutcome::Acquired(record))
    }

    async fn release(&self, key: &str, owner: &str) -> Result<ReleaseOutcome> {
        let mut locks = self.locks.lock().await;

        match locks.get(key) {
            None => Ok(ReleaseOutcome::NotFound),
            Some(existing) if existing.is_expired() => {
                locks.remove(key);
                Ok(ReleaseOutcome::NotFound)
            }
            Some(existing) if !existing.is_owned_by(owner) => {
                Ok(ReleaseOutcome::NotOwner(existing.clone()))
            }
            Some(_) => Ok(locks
                .remove(key)
                .map_or(ReleaseOutcome::NotFound, ReleaseOutcome::Released)),
        }
    }

    async fn inspect(&self, key: &str) -> Result<Option<LockRecord>> {
        let mut locks = self.locks.lock().await;

        if locks.get(key).is_some_and(LockRecord::is_expired) {
            locks.remove(key);
        }
        Ok(locks.get(key).cloned())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
