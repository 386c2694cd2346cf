//! Key-addressed blob storage for current entry content.
//!
//! Keys are opaque slash-separated strings; the store enforces no
//! uniqueness beyond what callers provide and specifies no retries —
//! callers decide how to react to failure.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Derives the blob key for a journal entry.
///
/// Deterministic from (user, journal, date), so an entry's key never
/// changes across updates.
pub fn entry_key(user_sub: &str, journal_id: &str, entry_date: &str) -> String {
    format!("{}/{}/{}.md", user_sub, journal_id, entry_date)
}

/// Durable key→bytes blob storage.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Writes `content` at `key`, overwriting any existing object.
    async fn put(&self, key: &str, content: &[u8]) -> Result<()>;

    /// Reads the object at `key`. `NotFound` if absent.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Deletes the object at `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Whether an object exists at `key`.
    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Filesystem-backed blob store: one object file per key under `root`.
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Maps a key to its on-disk path, rejecting keys that would escape
    /// the store root.
    fn object_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || Path::new(key).is_absolute() {
            return Err(AppError::storage_error(
                format!("Invalid object key: {:?}", key),
                None,
            ));
        }
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(AppError::storage_error(
                    format!("Invalid object key: {:?}", key),
                    None,
                ));
            }
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn put(&self, key: &str, content: &[u8]) -> Result<()> {
        let path = self.object_path(key)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                AppError::storage_error(
                    format!("Failed to create object directory: {}", e),
                    Some(parent.to_path_buf()),
                )
            })?;
        }

        fs::write(&path, content).await.map_err(|e| {
            AppError::storage_error(format!("Failed to write object {}: {}", key, e), Some(path))
        })?;

        debug!(key = %key, size = content.len(), "Stored object");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(key)?;

        match fs::read(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::not_found(format!("Object not found: {}", key)))
            }
            Err(e) => Err(AppError::storage_error(
                format!("Failed to read object {}: {}", key, e),
                Some(path),
            )),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.object_path(key)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key = %key, "Deleted object");
                Ok(())
            }
            // Idempotent: the key being absent already satisfies the caller.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::storage_error(
                format!("Failed to delete object {}: {}", key, e),
                Some(path),
            )),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.object_path(key)?;

        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::storage_error(
                format!("Failed to stat object {}: {}", key, e),
                Some(path),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (FsContentStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        (FsContentStore::new(temp_dir.path().to_path_buf()), temp_dir)
    }

    #[test]
    fn test_entry_key_shape() {
        assert_eq!(
            entry_key("user-1", "journal-1", "2025-12-01"),
            "user-1/journal-1/2025-12-01.md"
        );
    }

    #[tokio::test]
    async fn test_put_and_get_roundtrip() {
        let (store, _temp_dir) = store();

        store.put("u/j/2025-01-01.md", b"hello").await.unwrap();
        let content = store.get("u/j/2025-01-01.md").await.unwrap();

        assert_eq!(content, b"hello");
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let (store, _temp_dir) = store();

        store.put("u/j/d.md", b"first").await.unwrap();
        store.put("u/j/d.md", b"second").await.unwrap();

        assert_eq!(store.get("u/j/d.md").await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (store, _temp_dir) = store();

        let err = store.get("u/j/missing.md").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (store, _temp_dir) = store();

        store.put("u/j/d.md", b"bytes").await.unwrap();
        store.delete("u/j/d.md").await.unwrap();
        // Second delete of an absent key must not fail.
        store.delete("u/j/d.md").await.unwrap();

        assert!(!store.exists("u/j/d.md").await.unwrap());
    }

    #[tokio::test]
    async fn test_exists() {
        let (store, _temp_dir) = store();

        assert!(!store.exists("u/j/d.md").await.unwrap());
        store.put("u/j/d.md", b"bytes").await.unwrap();
        assert!(store.exists("u/j/d.md").await.unwrap());
    }

    #[tokio::test]
    async fn test_traversal_keys_rejected() {
        let (store, _temp_dir) = store();

        for key in ["", "../escape", "a//b", "/absolute", "a/./b"] {
            let err = store.put(key, b"x").await.unwrap_err();
            assert!(
                matches!(err, AppError::Storage { .. }),
                "key {:?} should be rejected",
                key
            );
        }
    }
}
