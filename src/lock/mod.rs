//! Advisory locks on services.
//!
//! A lock is keyed by `<env>/<service>`, carries an owner, a message and a
//! TTL, and is kept in one of several backends:
//! - Local JSON files (default)
//! - etcd v2 keys API
//! - In-memory (tests and dry runs)

mod record;
mod store;
mod memory;
mod local;
mod etcd;

pub use record::{LockRecord, Operator};
pub use store::{AcquireOutcome, LockStore, ReleaseOutcome};
pub use memory::MemoryLockStore;
pub use local::LocalLockStore;
pub use etcd::EtcdLockStore;

use std::sync::Arc;
use tracing::debug;

use crate::config::{LockBackend, Settings};
use crate::error::{ConfigError, Result};

/// Builds the lock store selected by `settings`.
///
/// # Errors
///
/// Returns an error if the etcd backend has no endpoint or its client cannot
/// be created.
pub fn build_lock_store(settings: &Settings) -> Result<Arc<dyn LockStore>> {
    let store: Arc<dyn LockStore> = match settings.lock.backend {
        LockBackend::Local => Arc::new(LocalLockStore::new(settings.lock_dir())),
        LockBackend::Memory => Arc::new(MemoryLockStore::new()),
        LockBackend::Etcd => {
            let endpoint = settings.lock.endpoint.as_deref().ok_or_else(|| {
                ConfigError::validation(
                    "An endpoint is required when using the etcd lock backend",
                    "lock.endpoint",
                )
            })?;
            Arc::new(EtcdLockStore::new(endpoint, &settings.lock.prefix)?)
        }
    };

    debug!("Using {} lock store", store.backend_type());
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_lock_store_selects_backend() {
        let mut settings = Settings::default();
        assert_eq!(build_lock_store(&settings).unwrap().backend_type(), "local");

        settings.lock.backend = LockBackend::Memory;
        assert_eq!(build_lock_store(&settings).unwrap().backend_type(), "memory");

        settings.lock.backend = LockBackend::Etcd;
        assert!(build_lock_store(&settings).is_err());

        settings.lock.endpoint = Some(String::from("http://127.0.0.1:2379"));
        assert_eq!(build_lock_store(&settings).unwrap().backend_type(), "etcd");
    }
}
