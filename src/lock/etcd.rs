//! etcd lock store.
//!
//! Talks to the etcd v2 keys API over HTTP. Every write is a compare-and-swap:
//! a fresh lock uses `prevExist=false`, a renewal or takeover uses the
//! `prevIndex` of the record it replaces. The key also carries an etcd TTL so
//! abandoned locks disappear on the server side.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, trace};

use crate::error::{LockError, Result};

use super::record::LockRecord;
use super::store::{AcquireOutcome, LockStore, ReleaseOutcome};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Attempts before giving up on a contended compare-and-swap.
const MAX_ATTEMPTS: u32 = 3;

/// etcd lock store.
#[derive(Debug, Clone)]
pub struct EtcdLockStore {
    /// HTTP client.
    client: Client,
    /// Base URL, without trailing slash.
    endpoint: String,
    /// Key prefix, with a leading slash.
    prefix: String,
}

#[derive(Debug, Deserialize)]
struct KeysResponse {
    node: KeysNode,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeysNode {
    value: Option<String>,
    modified_index: u64,
}

/// A record and the etcd index it was read at.
struct Versioned {
    record: LockRecord,
    index: u64,
}

/// Precondition for a write.
enum Precondition {
    Absent,
    Index(u64),
}

impl EtcdLockStore {
    /// Creates a store for `endpoint` storing keys under `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(endpoint: &str, prefix: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| LockError::backend(format!("Failed to create HTTP client: {e}")))?;

        let prefix = prefix.trim_matches('/');
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            prefix: if prefix.is_empty() {
                String::new()
            } else {
                format!("/{prefix}")
            },
        })
    }

    fn key_url(&self, key: &str) -> String {
        format!("{}/v2/keys{}/{key}", self.endpoint, self.prefix)
    }

    async fn read(&self, key: &str) -> Result<Option<Versioned>> {
        let url = self.key_url(key);
        trace!("GET {url}");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LockError::backend(format!("Failed to reach etcd: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(LockError::backend(format!(
                "etcd returned {} reading {key}",
                response.status()
            ))
            .into());
        }

        let body: KeysResponse = response
            .json()
            .await
            .map_err(|e| LockError::backend(format!("Invalid etcd response: {e}")))?;

        let Some(value) = body.node.value else {
            return Ok(None);
        };
        let record: LockRecord = serde_json::from_str(&value)
            .map_err(|e| LockError::backend(format!("Corrupted lock record at {key}: {e}")))?;

        Ok(Some(Versioned {
            record,
            index: body.node.modified_index,
        }))
    }

    /// Writes `record`. Returns false when the precondition no longer holds.
    async fn write(&self, record: &LockRecord, precondition: &Precondition) -> Result<bool> {
        let value = serde_json::to_string(record)
            .map_err(|e| LockError::backend(format!("Failed to serialize lock: {e}")))?;
        let ttl = ttl_secs(record.ttl()).to_string();

        let condition = match precondition {
            Precondition::Absent => ("prevExist", String::from("false")),
            Precondition::Index(index) => ("prevIndex", index.to_string()),
        };

        let response = self
            .client
            .put(self.key_url(record.key()))
            .query(&[condition])
            .form(&[("value", value.as_str()), ("ttl", ttl.as_str())])
            .send()
            .await
            .map_err(|e| LockError::backend(format!("Failed to reach etcd: {e}")))?;

        match response.status() {
            StatusCode::PRECONDITION_FAILED => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(LockError::backend(format!(
                "etcd returned {status} writing {}",
                record.key()
            ))
            .into()),
        }
    }

    /// Deletes `key` if it is still at `index`. Returns false on a lost race.
    async fn delete(&self, key: &str, index: u64) -> Result<bool> {
        let response = self
            .client
            .delete(self.key_url(key))
            .query(&[("prevIndex", index.to_string())])
            .send()
            .await
            .map_err(|e| LockError::backend(format!("Failed to reach etcd: {e}")))?;

        match response.status() {
            StatusCode::PRECONDITION_FAILED => Ok(false),
            StatusCode::NOT_FOUND => Ok(true),
            status if status.is_success() => Ok(true),
            status => Err(LockError::backend(format!("etcd returned {status} deleting {key}")).into()),
        }
    }
}

/// etcd TTLs are whole seconds; round up and never go below one.
fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

fn contended(key: &str) -> crate::error::FleetworkError {
    LockError::backend(format!("Lock {key} is contended, gave up after {MAX_ATTEMPTS} attempts")).into()
}

#[async_trait]
impl LockStore for EtcdLockStore {
    async fn acquire(&self, key: &str, ttl: Duration, owner: &str, message: &str) -> Result<AcquireOutcome> {
        for attempt in 1..=MAX_ATTEMPTS {
            let current = self.read(key).await?;

            if let Some(existing) = current.as_ref().map(|v| &v.record)
                && LockRecord::blocking(Some(existing), owner).is_some()
            {
                return Ok(AcquireOutcome::Conflict(existing.clone()));
            }

            let precondition = current
                .as_ref()
                .map_or(Precondition::Absent, |v| Precondition::Index(v.index));
            let record = LockRecord::new(key, owner, message, ttl);

            if self.write(&record, &precondition).await? {
                info!("Acquired lock {key} for {owner} (expires {})", record.expires_at().to_rfc3339());
                return Ok(AcquireOutcome::Acquired(record));
            }
            debug!("Lost compare-and-swap on {key} (attempt {attempt}/{MAX_ATTEMPTS})");
        }

        Err(contended(key))
    }

    async fn release(&self, key: &str, owner: &str) -> Result<ReleaseOutcome> {
        for attempt in 1..=MAX_ATTEMPTS {
            let Some(current) = self.read(key).await? else {
                return Ok(ReleaseOutcome::NotFound);
            };

            let expired = current.record.is_expired();
            if !expired && !current.record.is_owned_by(owner) {
                return Ok(ReleaseOutcome::NotOwner(current.record));
            }

            if self.delete(key, current.index).await? {
                if expired {
                    return Ok(ReleaseOutcome::NotFound);
                }
                info!("Released lock {key}");
                return Ok(ReleaseOutcome::Released(current.record));
            }
            debug!("Lost compare-and-delete on {key} (attempt {attempt}/{MAX_ATTEMPTS})");
        }

        Err(contended(key))
    }

    async fn inspect(&self, key: &str) -> Result<Option<LockRecord>> {
        Ok(self
            .read(key)
            .await?
            .map(|v| v.record)
            .filter(|r| !r.is_expired()))
    }

    fn backend_type(&self) -> &'static str {
        "etcd"
    }
}
