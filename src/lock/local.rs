//! Local file-based lock store.
//!
//! One JSON file per key under the lock directory
//! (`<dir>/<env>/<service>.lock`). Every read-modify-write holds an exclusive
//! OS file lock on a sidecar file (`<service>.guard`), so separate processes
//! sharing the directory serialize on the same key. Records are written to a
//! uniquely named temporary file and renamed into place; readers never see a
//! partial record.

use async_trait::async_trait;
use fs4::fs_std::FileExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{LockError, Result};

use super::record::LockRecord;
use super::store::{AcquireOutcome, LockStore, ReleaseOutcome};

/// Lock file extension.
const LOCK_EXTENSION: &str = "lock";

/// Sidecar file extension.
const GUARD_EXTENSION: &str = "guard";

/// Local file-based lock store.
#[derive(Debug, Clone)]
pub struct LocalLockStore {
    /// Base directory for lock files.
    base_dir: PathBuf,
}

/// Exclusive OS lock on a key, released when dropped.
struct KeyGuard {
    _file: std::fs::File,
}

impl LocalLockStore {
    /// Creates a store rooted at `base_dir`.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{key}.{LOCK_EXTENSION}"))
    }

    /// Blocks until this process holds the sidecar lock of `path`.
    async fn guard(path: &Path) -> Result<KeyGuard> {
        Self::ensure_parent(path).await?;
        let guard_path = path.with_extension(GUARD_EXTENSION);

        let file = tokio::task::spawn_blocking(move || -> std::io::Result<std::fs::File> {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&guard_path)?;
            file.lock_exclusive()?;
            Ok(file)
        })
        .await
        .map_err(|e| LockError::backend(format!("Lock guard task failed: {e}")))?
        .map_err(|e| LockError::backend(format!("Failed to lock {}: {e}", path.display())))?;

        Ok(KeyGuard { _file: file })
    }

    async fn read_lock_file(&self, path: &Path) -> Result<Option<LockRecord>> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(LockError::backend(format!(
                    "Failed to read lock file {}: {e}",
                    path.display()
                ))
                .into());
            }
        };

        let record: LockRecord = serde_json::from_str(&content).map_err(|e| {
            LockError::backend(format!("Failed to parse lock file {}: {e}", path.display()))
        })?;

        Ok(Some(record))
    }

    async fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                LockError::backend(format!(
                    "Failed to create lock directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        Ok(())
    }

    /// Writes the lock file atomically. Callers hold the key guard.
    async fn write_lock_file(path: &Path, record: &LockRecord) -> Result<()> {
        let content = serialize(record)?;
        let temp_path =
            path.with_extension(format!("{LOCK_EXTENSION}.{}.tmp", uuid::Uuid::new_v4().simple()));

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| LockError::backend(format!("Failed to create temp lock file: {e}")))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| LockError::backend(format!("Failed to write lock file: {e}")))?;
        file.sync_all()
            .await
            .map_err(|e| LockError::backend(format!("Failed to sync lock file: {e}")))?;

        if let Err(e) = fs::rename(&temp_path, path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(LockError::backend(format!("Failed to rename lock file: {e}")).into());
        }

        Ok(())
    }

    async fn delete_lock_file(path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LockError::backend(format!("Failed to delete lock file: {e}")).into()),
        }
    }
}

fn serialize(record: &LockRecord) -> Result<String> {
    serde_json::to_string_pretty(record)
        .map_err(|e| LockError::backend(format!("Failed to serialize lock: {e}")).into())
}

#[async_trait]
impl LockStore for LocalLockStore {
    async fn acquire(&self, key: &str, ttl: Duration, owner: &str, message: &str) -> Result<AcquireOutcome> {
        let path = self.lock_path(key);
        let _guard = Self::guard(&path).await?;

        if let Some(existing) = self.read_lock_file(&path).await? {
            if LockRecord::blocking(Some(&existing), owner).is_some() {
                return Ok(AcquireOutcome::Conflict(existing));
            }
            if existing.is_expired() {
                debug!("Expired lock on {key} held by {}, taking over", existing.owner());
            }
        }

        let record = LockRecord::new(key, owner, message, ttl);
        Self::write_lock_file(&path, &record).await?;

        info!("Acquired lock {key} for {owner} (expires {})", record.expires_at().to_rfc3339());
        Ok(AcquireOutcome::Acquired(record))
    }

    async fn release(&self, key: &str, owner: &str) -> Result<ReleaseOutcome> {
        let path = self.lock_path(key);
        let _guard = Self::guard(&path).await?;

        match self.read_lock_file(&path).await? {
            None => Ok(ReleaseOutcome::NotFound),
            Some(existing) if existing.is_expired() => {
                Self::delete_lock_file(&path).await?;
                Ok(ReleaseOutcome::NotFound)
            }
            Some(existing) if !existing.is_owned_by(owner) => Ok(ReleaseOutcome::NotOwner(existing)),
            Some(existing) => {
                Self::delete_lock_file(&path).await?;
                info!("Released lock {key}");
                Ok(ReleaseOutcome::Released(existing))
            }
        }
    }

    async fn inspect(&self, key: &str) -> Result<Option<LockRecord>> {
        let record = self.read_lock_file(&self.lock_path(key)).await?;
        Ok(record.filter(|r| !r.is_expired()))
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const KEY: &str = "staging/web";
    const HOUR: Duration = Duration::from_secs(3600);

    fn create_test_store() -> (LocalLockStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = LocalLockStore::new(temp_dir.path());
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_lock_file_layout() {
        let (store, temp) = create_test_store();

        store.acquire(KEY, HOUR, "alice@ops", "deploy").await.unwrap();

        let path = temp.path().join("staging").join("web.lock");
        assert!(path.exists());
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("alice@ops"));
    }

    #[tokio::test]
    async fn test_lock_conflict_and_renewal() {
        let (store, _temp) = create_test_store();

        let first = store.acquire(KEY, HOUR, "alice@ops", "deploy").await.unwrap();
        assert!(matches!(first, AcquireOutcome::Acquired(_)));

        let second = store.acquire(KEY, HOUR, "bob@ops", "hotfix").await.unwrap();
        let AcquireOutcome::Conflict(holder) = second else {
            panic!("expected conflict");
        };
        assert_eq!(holder.owner(), "alice@ops");
        assert_eq!(holder.message(), "deploy");

        let renewed = store
            .acquire(KEY, Duration::from_secs(60), "alice@ops", "shorter")
            .await
            .unwrap();
        let AcquireOutcome::Acquired(renewed) = renewed else {
            panic!("owner must be able to renew");
        };
        assert_eq!(renewed.ttl(), Duration::from_secs(60));
        assert_eq!(store.inspect(KEY).await.unwrap(), Some(renewed));
    }

    #[tokio::test]
    async fn test_expired_lock_is_taken_over() {
        let (store, _temp) = create_test_store();

        store
            .acquire(KEY, Duration::from_millis(50), "alice@ops", "deploy")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(store.inspect(KEY).await.unwrap(), None);
        let outcome = store.acquire(KEY, HOUR, "bob@ops", "hotfix").await.unwrap();
        assert!(matches!(outcome, AcquireOutcome::Acquired(_)));
        assert_eq!(store.inspect(KEY).await.unwrap().unwrap().owner(), "bob@ops");
    }

    #[tokio::test]
    async fn test_release_by_owner_only() {
        let (store, temp) = create_test_store();

        store.acquire(KEY, HOUR, "alice@ops", "deploy").await.unwrap();

        let outcome = store.release(KEY, "bob@ops").await.unwrap();
        assert!(matches!(outcome, ReleaseOutcome::NotOwner(ref r) if r.owner() == "alice@ops"));

        let outcome = store.release(KEY, "alice@ops").await.unwrap();
        assert!(matches!(outcome, ReleaseOutcome::Released(_)));
        assert!(!temp.path().join("staging").join("web.lock").exists());
        assert_eq!(store.inspect(KEY).await.unwrap(), None);
        assert_eq!(store.release(KEY, "alice@ops").await.unwrap(), ReleaseOutcome::NotFound);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stores_sharing_a_directory_never_both_take_over() {
        for _ in 0..50 {
            let temp = TempDir::new().unwrap();
            let first = LocalLockStore::new(temp.path());
            let second = LocalLockStore::new(temp.path());

            first
                .acquire(KEY, Duration::from_millis(1), "alice@ops", "stale")
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;

            let (bob, carol) = tokio::join!(
                first.acquire(KEY, HOUR, "bob@ops", "deploy"),
                second.acquire(KEY, HOUR, "carol@ops", "deploy"),
            );
            let outcomes = [bob.unwrap(), carol.unwrap()];
            let winners: Vec<&LockRecord> = outcomes
                .iter()
                .filter_map(|o| match o {
                    AcquireOutcome::Acquired(record) => Some(record),
                    AcquireOutcome::Conflict(_) => None,
                })
                .collect();
            assert_eq!(winners.len(), 1);

            let holder = second.inspect(KEY).await.unwrap().unwrap();
            assert_eq!(holder.owner(), winners[0].owner());

            let leftovers: Vec<_> = std::fs::read_dir(temp.path().join("staging"))
                .unwrap()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
                .collect();
            assert!(leftovers.is_empty());
        }
    }

    #[tokio::test]
    async fn test_corrupted_lock_file_is_an_error() {
        let (store, temp) = create_test_store();
        std::fs::create_dir_all(temp.path().join("staging")).unwrap();
        std::fs::write(temp.path().join("staging").join("web.lock"), "not json").unwrap();

        assert!(store.inspect(KEY).await.is_err());
    }
}
