//! Lock store trait definition.
//!
//! The store is the only state that outlives a single invocation. Backends
//! must apply a record atomically: a reader sees the old record or the new
//! one, never a mix.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

use super::record::LockRecord;

/// Result of an acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The lock is now held (new or renewed).
    Acquired(LockRecord),
    /// A live lock owned by someone else is in place.
    Conflict(LockRecord),
}

/// Result of a release attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The lock was removed.
    Released(LockRecord),
    /// No live lock exists.
    NotFound,
    /// The live lock belongs to someone else.
    NotOwner(LockRecord),
}

/// Trait for TTL-capable lock stores.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Acquires `key` for `owner`.
    ///
    /// Succeeds when no live lock exists or when `owner` already holds it
    /// (renewal: the expiry becomes now + `ttl`).
    async fn acquire(&self, key: &str, ttl: Duration, owner: &str, message: &str) -> Result<AcquireOutcome>;

    /// Releases `key` if `owner` holds it.
    async fn release(&self, key: &str, owner: &str) -> Result<ReleaseOutcome>;

    /// Gets the live lock on `key`, if any. Expired locks read as absent.
    async fn inspect(&self, key: &str) -> Result<Option<LockRecord>>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}
