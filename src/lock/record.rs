//! Lock records and operator identity.
//!
//! A [`LockRecord`] is an immutable value: renewing a lock produces a new
//! record with a fresh acquisition time rather than mutating the old one.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// An advisory lock on one environment/service pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Unique lock identifier.
    lock_id: String,
    /// `<env>/<service>`.
    key: String,
    /// Operator holding the lock.
    owner: String,
    /// Free-form reason left by the owner.
    message: String,
    /// When the lock was acquired or last renewed.
    acquired_at: DateTime<Utc>,
    /// Lock lifetime in milliseconds.
    ttl_ms: u64,
}

impl LockRecord {
    /// Creates a record acquired now.
    #[must_use]
    pub fn new(key: &str, owner: &str, message: &str, ttl: Duration) -> Self {
        Self::acquired_at(key, owner, message, ttl, Utc::now())
    }

    /// Creates a record acquired at a given instant.
    #[must_use]
    pub fn acquired_at(
        key: &str,
        owner: &str,
        message: &str,
        ttl: Duration,
        acquired_at: DateTime<Utc>,
    ) -> Self {
        Self {
            lock_id: Uuid::new_v4().to_string(),
            key: key.to_string(),
            owner: owner.to_string(),
            message: message.to_string(),
            acquired_at,
            ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Gets the lock ID.
    #[must_use]
    pub fn lock_id(&self) -> &str {
        &self.lock_id
    }

    /// Gets the lock key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Gets the lock owner.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Gets the owner's message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Gets the acquisition time.
    #[must_use]
    pub const fn acquired(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    /// Gets the lock lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Acquisition time plus TTL.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        let ttl = i64::try_from(self.ttl_ms)
            .ok()
            .and_then(TimeDelta::try_milliseconds)
            .unwrap_or(TimeDelta::MAX);
        self.acquired_at
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Checks if the lock has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Checks if the lock is expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// Returns the remaining time until expiry.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        (self.expires_at() - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }

    /// Returns true if `owner` holds this lock.
    #[must_use]
    pub fn is_owned_by(&self, owner: &str) -> bool {
        self.owner == owner
    }

    /// Returns the record when it blocks `owner`: not expired and held by someone else.
    #[must_use]
    pub fn blocking<'a>(existing: Option<&'a Self>, owner: &str) -> Option<&'a Self> {
        existing.filter(|record| !record.is_expired() && !record.is_owned_by(owner))
    }
}

/// Identity of the operator running fleetwork.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Operator(String);

impl Operator {
    /// Wraps an explicit identity.
    #[must_use]
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// Uses `identity` when given, otherwise `user@hostname`.
    #[must_use]
    pub fn detect(identity: Option<&str>) -> Self {
        if let Some(identity) = identity {
            return Self::new(identity);
        }

        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| String::from("unknown"));
        let host = hostname::get()
            .map_or_else(|_| String::from("unknown"), |h| h.to_string_lossy().to_string());

        Self(format!("{user}@{host}"))
    }

    /// Gets the identity string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
