//! Per-user append-only version histories.
//!
//! Each user gets one isolated repository, created lazily with an empty
//! root commit so a head reference always exists before the first real
//! write. Commits are content-addressed snapshots of the user's whole
//! tree: blob objects are SHA-256-addressed files sharded by the first
//! two hash characters, commit records are JSON documents carrying the
//! parent id, the tree (path → blob hash), the message, the fixed system
//! author identity, and a timestamp.
//!
//! ## Repository layout
//!
//! ```text
//! <root>/<user>/
//! ├── HEAD                 # current commit id
//! ├── commits/
//! │   └── <commit-id>.json
//! └── objects/
//!     ├── a3/
//!     │   └── f2e1d4c5...  # full hash as filename
//!     └── b7/
//!         └── e145a3b2...
//! ```

use crate::error::{AppError, Result};
use crate::models::CommitInfo;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info};

/// Author identity stamped on every system-generated commit.
pub const SYSTEM_AUTHOR_NAME: &str = "JournalVault System";
pub const SYSTEM_AUTHOR_EMAIL: &str = "system@journalvault.local";

/// Derives the repository path of an entry inside its user's tree.
pub fn entry_path(journal_id: &str, entry_date: &str) -> String {
    format!("{}/{}.md", journal_id, entry_date)
}

/// Result of a `commit_file` call.
///
/// `created` is false when the content was byte-identical to what the
/// head already records at the path; `id` is then the existing head
/// commit rather than a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub id: String,
    pub created: bool,
}

/// One isolated, append-only commit history per user identity.
#[async_trait]
pub trait VersionRepository: Send + Sync {
    /// Records `content` at `path` in the user's tree.
    ///
    /// No-op (returns the head id) when the content is unchanged;
    /// otherwise creates a commit with `message` and the fixed system
    /// author identity.
    async fn commit_file(
        &self,
        user_sub: &str,
        path: &str,
        content: &[u8],
        message: &str,
    ) -> Result<CommitOutcome>;

    /// Reads the content of `path` as of `commit_id`, or the current
    /// head when `None`.
    async fn read_file_at(
        &self,
        user_sub: &str,
        path: &str,
        commit_id: Option<&str>,
    ) -> Result<Vec<u8>>;

    /// Commits whose tree contains `path`, in chronological ascending
    /// order (oldest first).
    async fn list_commits_touching(&self, user_sub: &str, path: &str) -> Result<Vec<CommitInfo>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CommitRecord {
    id: String,
    parent: Option<String>,
    tree: BTreeMap<String, String>,
    message: String,
    author_name: String,
    author_email: String,
    created_at: DateTime<Utc>,
}

/// Filesystem-backed version repository.
#[derive(Debug, Clone)]
pub struct FsVersionRepository {
    root: PathBuf,
}

impl FsVersionRepository {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn user_dir(&self, user_sub: &str) -> Result<PathBuf> {
        if user_sub.is_empty()
            || user_sub == "."
            || user_sub == ".."
            || user_sub.contains('/')
            || user_sub.contains('\\')
        {
            return Err(AppError::validation(format!(
                "invalid user identity: {:?}",
                user_sub
            )));
        }
        Ok(self.root.join(user_sub))
    }

    fn commit_path(user_dir: &std::path::Path, commit_id: &str) -> PathBuf {
        user_dir.join("commits").join(format!("{}.json", commit_id))
    }

    /// Blob object path, first two hash chars as the shard directory.
    fn object_path(user_dir: &std::path::Path, hash: &str) -> PathBuf {
        let (prefix, suffix) = hash.split_at(2);
        user_dir.join("objects").join(prefix).join(suffix)
    }

    fn blob_hash(content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        format!("{:x}", hasher.finalize())
    }

    /// Content-derived commit identifier over the canonical commit fields.
    fn commit_digest(
        parent: Option<&str>,
        tree: &BTreeMap<String, String>,
        message: &str,
        created_at: &DateTime<Utc>,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(parent.unwrap_or(""));
        hasher.update([0u8]);
        for (path, blob) in tree {
            hasher.update(path.as_bytes());
            hasher.update([0u8]);
            hasher.update(blob.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(message.as_bytes());
        hasher.update([0u8]);
        hasher.update(SYSTEM_AUTHOR_NAME.as_bytes());
        hasher.update(SYSTEM_AUTHOR_EMAIL.as_bytes());
        hasher.update(created_at.to_rfc3339().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    async fn write_head(user_dir: &std::path::Path, commit_id: &str) -> Result<()> {
        fs::write(user_dir.join("HEAD"), commit_id)
            .await
            .map_err(|e| AppError::commit_error(format!("Failed to write HEAD: {}", e)))
    }

    async fn write_commit(user_dir: &std::path::Path, record: &CommitRecord) -> Result<()> {
        let payload = serde_json::to_vec_pretty(record)
            .map_err(|e| AppError::commit_error(format!("Failed to encode commit: {}", e)))?;
        fs::write(Self::commit_path(user_dir, &record.id), payload)
            .await
            .map_err(|e| {
                AppError::commit_error(format!("Failed to write commit {}: {}", record.id, e))
            })
    }

    /// Loads a commit record; `Ok(None)` when no such commit exists.
    async fn load_commit(
        user_dir: &std::path::Path,
        commit_id: &str,
    ) -> Result<Option<CommitRecord>> {
        match fs::read(Self::commit_path(user_dir, commit_id)).await {
            Ok(payload) => {
                let record: CommitRecord = serde_json::from_slice(&payload).map_err(|e| {
                    AppError::commit_error(format!("Corrupt commit {}: {}", commit_id, e))
                })?;
                Ok(Some(record))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::commit_error(format!(
                "Failed to read commit {}: {}",
                commit_id, e
            ))),
        }
    }

    /// Stores a blob object; skips the write when the hash is already
    /// present (same content, same object).
    async fn store_blob(user_dir: &std::path::Path, content: &[u8]) -> Result<String> {
        let hash = Self::blob_hash(content);
        let path = Self::object_path(user_dir, &hash);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                AppError::commit_error(format!("Failed to create object directory: {}", e))
            })?;
        }

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(mut file) => {
                use tokio::io::AsyncWriteExt;
                file.write_all(content).await.map_err(|e| {
                    AppError::commit_error(format!("Failed to write object {}: {}", hash, e))
                })?;
                file.flush().await.map_err(|e| {
                    AppError::commit_error(format!("Failed to flush object {}: {}", hash, e))
                })?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                debug!(hash = %hash, "Object already exists, skipping write");
            }
            Err(e) => {
                return Err(AppError::commit_error(format!(
                    "Failed to create object {}: {}",
                    hash, e
                )));
            }
        }

        Ok(hash)
    }

    async fn read_blob(user_dir: &std::path::Path, hash: &str) -> Result<Vec<u8>> {
        fs::read(Self::object_path(user_dir, hash))
            .await
            .map_err(|e| AppError::commit_error(format!("Failed to read object {}: {}", hash, e)))
    }

    /// Returns the head commit id, initializing the repository with an
    /// empty root commit on first access.
    async fn ensure_repo(&self, user_sub: &str) -> Result<String> {
        let user_dir = self.user_dir(user_sub)?;

        match fs::read_to_string(user_dir.join("HEAD")).await {
            Ok(head) => return Ok(head.trim().to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(AppError::commit_error(format!(
                    "Failed to read HEAD for {}: {}",
                    user_sub, e
                )));
            }
        }

        fs::create_dir_all(user_dir.join("commits"))
            .await
            .map_err(|e| {
                AppError::commit_error(format!("Failed to initialize repository: {}", e))
            })?;
        fs::create_dir_all(user_dir.join("objects"))
            .await
            .map_err(|e| {
                AppError::commit_error(format!("Failed to initialize repository: {}", e))
            })?;

        let created_at = Utc::now();
        let tree = BTreeMap::new();
        let id = Self::commit_digest(None, &tree, "Initial commit", &created_at);
        let root = CommitRecord {
            id: id.clone(),
            parent: None,
            tree,
            message: "Initial commit".to_string(),
            author_name: SYSTEM_AUTHOR_NAME.to_string(),
            author_email: SYSTEM_AUTHOR_EMAIL.to_string(),
            created_at,
        };

        Self::write_commit(&user_dir, &root).await?;
        Self::write_head(&user_dir, &id).await?;

        info!(user = %user_sub, commit = %id, "Initialized version repository");
        Ok(id)
    }
}

#[async_trait]
impl VersionRepository for FsVersionRepository {
    async fn commit_file(
        &self,
        user_sub: &str,
        path: &str,
        content: &[u8],
        message: &str,
    ) -> Result<CommitOutcome> {
        let head_id = self.ensure_repo(user_sub).await?;
        let user_dir = self.user_dir(user_sub)?;

        let head = Self::load_commit(&user_dir, &head_id)
            .await?
            .ok_or_else(|| {
                AppError::commit_error(format!("Head commit {} missing from repository", head_id))
            })?;

        let blob = Self::blob_hash(content);
        if head.tree.get(path) == Some(&blob) {
            debug!(
                user = %user_sub,
                path = %path,
                commit = %head_id,
                "Content unchanged, reusing head commit"
            );
            return Ok(CommitOutcome {
                id: head_id,
                created: false,
            });
        }

        Self::store_blob(&user_dir, content).await?;

        let mut tree = head.tree;
        tree.insert(path.to_string(), blob);

        let created_at = Utc::now();
        let id = Self::commit_digest(Some(&head_id), &tree, message, &created_at);
        let record = CommitRecord {
            id: id.clone(),
            parent: Some(head_id),
            tree,
            message: message.to_string(),
            author_name: SYSTEM_AUTHOR_NAME.to_string(),
            author_email: SYSTEM_AUTHOR_EMAIL.to_string(),
            created_at,
        };

        Self::write_commit(&user_dir, &record).await?;
        Self::write_head(&user_dir, &id).await?;

        info!(user = %user_sub, path = %path, commit = %id, "Created commit");
        Ok(CommitOutcome { id, created: true })
    }

    async fn read_file_at(
        &self,
        user_sub: &str,
        path: &str,
        commit_id: Option<&str>,
    ) -> Result<Vec<u8>> {
        let head_id = self.ensure_repo(user_sub).await?;
        let user_dir = self.user_dir(user_sub)?;
        let target = commit_id.unwrap_or(&head_id);

        let commit = Self::load_commit(&user_dir, target)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Commit not found: {}", target)))?;

        let blob = commit.tree.get(path).ok_or_else(|| {
            AppError::not_found(format!("File {} not present at commit {}", path, target))
        })?;

        Self::read_blob(&user_dir, blob).await
    }

    async fn list_commits_touching(&self, user_sub: &str, path: &str) -> Result<Vec<CommitInfo>> {
        let head_id = self.ensure_repo(user_sub).await?;
        let user_dir = self.user_dir(user_sub)?;

        // Walk from head backward, newest first.
        let mut commits = Vec::new();
        let mut cursor = Some(head_id);
        while let Some(id) = cursor {
            let commit = Self::load_commit(&user_dir, &id).await?.ok_or_else(|| {
                AppError::commit_error(format!("Commit {} missing from history walk", id))
            })?;
            cursor = commit.parent.clone();

            if commit.tree.contains_key(path) {
                commits.push(CommitInfo {
                    id: commit.id,
                    message: commit.message,
                    author_name: commit.author_name,
                    author_email: commit.author_email,
                    created_at: commit.created_at,
                });
            }
        }

        // Chronological ascending order: oldest first.
        commits.reverse();
        Ok(commits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo() -> (FsVersionRepository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        (
            FsVersionRepository::new(temp_dir.path().to_path_buf()),
            temp_dir,
        )
    }

    #[tokio::test]
    async fn test_lazy_init_creates_root_commit() {
        let (repo, _temp_dir) = repo();

        // First touch of an unknown user initializes an empty history.
        let commits = repo.list_commits_touching("alice", "j/2025-01-01.md").await.unwrap();
        assert!(commits.is_empty());

        let err = repo
            .read_file_at("alice", "j/2025-01-01.md", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_commit_and_read_head() {
        let (repo, _temp_dir) = repo();

        let outcome = repo
            .commit_file("alice", "j/2025-01-01.md", b"Version 1", "Entry for 2025-01-01")
            .await
            .unwrap();
        assert!(outcome.created);

        let content = repo
            .read_file_at("alice", "j/2025-01-01.md", None)
            .await
            .unwrap();
        assert_eq!(content, b"Version 1");
    }

    #[tokio::test]
    async fn test_unchanged_content_is_noop() {
        let (repo, _temp_dir) = repo();

        let first = repo
            .commit_file("alice", "j/d.md", b"same", "Entry for d")
            .await
            .unwrap();
        let second = repo
            .commit_file("alice", "j/d.md", b"same", "Update entry for d")
            .await
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.id, second.id);

        let commits = repo.list_commits_touching("alice", "j/d.md").await.unwrap();
        assert_eq!(commits.len(), 1);
    }

    #[tokio::test]
    async fn test_history_is_chronological_oldest_first() {
        let (repo, _temp_dir) = repo();

        let first = repo
            .commit_file("alice", "j/d.md", b"Version 1", "Entry for d")
            .await
            .unwrap();
        let second = repo
            .commit_file("alice", "j/d.md", b"Version 2", "Update entry for d")
            .await
            .unwrap();

        let commits = repo.list_commits_touching("alice", "j/d.md").await.unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].id, first.id);
        assert_eq!(commits[1].id, second.id);
        assert_eq!(commits[0].message, "Entry for d");
        assert_eq!(commits[0].author_name, SYSTEM_AUTHOR_NAME);
        assert_eq!(commits[0].author_email, SYSTEM_AUTHOR_EMAIL);
    }

    #[tokio::test]
    async fn test_old_commit_keeps_old_content() {
        let (repo, _temp_dir) = repo();

        let first = repo
            .commit_file("alice", "j/d.md", b"Version 1", "Entry for d")
            .await
            .unwrap();
        repo.commit_file("alice", "j/d.md", b"Version 2", "Update entry for d")
            .await
            .unwrap();

        let old = repo
            .read_file_at("alice", "j/d.md", Some(&first.id))
            .await
            .unwrap();
        let head = repo.read_file_at("alice", "j/d.md", None).await.unwrap();

        assert_eq!(old, b"Version 1");
        assert_eq!(head, b"Version 2");
    }

    #[tokio::test]
    async fn test_unknown_commit_is_not_found() {
        let (repo, _temp_dir) = repo();

        repo.commit_file("alice", "j/d.md", b"x", "Entry for d")
            .await
            .unwrap();

        let err = repo
            .read_file_at("alice", "j/d.md", Some("deadbeef"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_histories_are_isolated_per_user() {
        let (repo, _temp_dir) = repo();

        repo.commit_file("alice", "j/d.md", b"alice text", "Entry for d")
            .await
            .unwrap();

        let commits = repo.list_commits_touching("bob", "j/d.md").await.unwrap();
        assert!(commits.is_empty());

        let err = repo.read_file_at("bob", "j/d.md", None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_commits_track_multiple_paths() {
        let (repo, _temp_dir) = repo();

        repo.commit_file("alice", "j/a.md", b"a", "Entry for a")
            .await
            .unwrap();
        repo.commit_file("alice", "j/b.md", b"b", "Entry for b")
            .await
            .unwrap();

        // Both commits carry j/a.md in their tree; only the second carries j/b.md.
        let touching_a = repo.list_commits_touching("alice", "j/a.md").await.unwrap();
        let touching_b = repo.list_commits_touching("alice", "j/b.md").await.unwrap();
        assert_eq!(touching_a.len(), 2);
        assert_eq!(touching_b.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_user_identity_rejected() {
        let (repo, _temp_dir) = repo();

        for user in ["", "..", "a/b", "a\\b"] {
            let err = repo
                .commit_file(user, "j/d.md", b"x", "Entry for d")
                .await
                .unwrap_err();
            assert!(
                matches!(err, AppError::Validation(_)),
                "user {:?} should be rejected",
                user
            );
        }
    }
}
