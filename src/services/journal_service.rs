//! The entry write coordinator.
//!
//! Drives ContentStore → VersionRepository → MetadataStore, in that
//! order, for every entry mutation, and MetadataStore →
//! ContentStore/VersionRepository for reads. There is no cross-backend
//! transaction: each mutation runs as a saga whose steps either all
//! land or are compensated best-effort (see `services::saga`).
//!
//! All mutating operations for one user are serialized through a
//! per-user lock: the user's version history is a single mutable
//! working tree, and two concurrent writes for the same user would race
//! on it.

use crate::error::{AppError, Result};
use crate::models::{CommitInfo, Entry, Journal};
use crate::services::saga::{pending_compensation, Compensation, SagaState};
use crate::storage::{
    entry_key, entry_path, ContentStore, MetadataStore, VersionRepository, SYSTEM_AUTHOR_EMAIL,
    SYSTEM_AUTHOR_NAME,
};
use crate::utils::text::{count_words, normalize_content};
use chrono::NaiveDate;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const DATE_FORMAT: &str = "%Y-%m-%d";

fn parse_entry_date(entry_date: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(entry_date, DATE_FORMAT).map_err(|_| {
        AppError::validation(format!(
            "invalid date format: {:?} (expected YYYY-MM-DD)",
            entry_date
        ))
    })
}

/// Coordinates journal and entry mutations across the three backends.
pub struct JournalService {
    content: Arc<dyn ContentStore>,
    versions: Arc<dyn VersionRepository>,
    metadata: Arc<MetadataStore>,
    /// One exclusive critical section per user identity.
    user_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl JournalService {
    pub fn new(
        content: Arc<dyn ContentStore>,
        versions: Arc<dyn VersionRepository>,
        metadata: Arc<MetadataStore>,
    ) -> Self {
        Self {
            content,
            versions,
            metadata,
            user_locks: DashMap::new(),
        }
    }

    fn user_lock(&self, user_sub: &str) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_sub.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Runs the compensations owed for a saga that failed in `state`.
    ///
    /// Failures here are logged and swallowed; they never mask the
    /// original error.
    async fn compensate(&self, state: SagaState, blob_key: &str) {
        for action in pending_compensation(state) {
            match action {
                Compensation::DeleteBlob => {
                    if let Err(e) = self.content.delete(blob_key).await {
                        warn!(
                            key = %blob_key,
                            error = %e,
                            "Compensation failed: could not delete blob"
                        );
                    }
                }
            }
        }
    }

    /// Step D: append a version row. Never fails the enclosing
    /// operation — the entry is already written and readable; a missing
    /// row only leaves the version index behind the true repository
    /// history.
    async fn record_version(&self, entry_id: &str, commit_id: &str, message: &str) {
        if let Err(e) = self
            .metadata
            .create_version(
                entry_id,
                commit_id,
                Some(message),
                Some(SYSTEM_AUTHOR_NAME),
                Some(SYSTEM_AUTHOR_EMAIL),
            )
            .await
        {
            warn!(
                entry = %entry_id,
                commit = %commit_id,
                error = %e,
                "Failed to record version row; history remains readable from the repository"
            );
        }
    }

    // ========== Journal operations ==========

    pub async fn create_journal(
        &self,
        user_sub: &str,
        title: &str,
        description: Option<&str>,
    ) -> Result<Journal> {
        if title.trim().is_empty() {
            return Err(AppError::validation("journal title must not be empty"));
        }
        self.metadata
            .create_journal(user_sub, title, description)
            .await
    }

    pub async fn get_journal(&self, user_sub: &str, journal_id: &str) -> Result<Journal> {
        self.metadata.get_journal(journal_id, user_sub).await
    }

    pub async fn list_journals(&self, user_sub: &str) -> Result<Vec<Journal>> {
        self.metadata.list_journals(user_sub).await
    }

    pub async fn update_journal(
        &self,
        user_sub: &str,
        journal_id: &str,
        title: &str,
        description: Option<&str>,
    ) -> Result<()> {
        if title.trim().is_empty() {
            return Err(AppError::validation("journal title must not be empty"));
        }
        self.metadata
            .update_journal(journal_id, user_sub, title, description)
            .await
    }

    /// Deletes a journal: best-effort delete of every entry's blob, then
    /// the journal row, which cascades entry and version rows
    /// transactionally. The user's version repository is never pruned.
    pub async fn delete_journal(&self, user_sub: &str, journal_id: &str) -> Result<()> {
        let lock = self.user_lock(user_sub);
        let _guard = lock.lock().await;

        self.metadata.get_journal(journal_id, user_sub).await?;

        let entries = self.metadata.list_entries(journal_id).await?;
        for entry in &entries {
            if let Err(e) = self.content.delete(&entry.blob_key).await {
                warn!(
                    key = %entry.blob_key,
                    error = %e,
                    "Failed to delete blob during journal delete; continuing"
                );
            }
        }

        self.metadata.delete_journal(journal_id, user_sub).await?;

        info!(
            user = %user_sub,
            journal = %journal_id,
            entries = entries.len(),
            "Deleted journal"
        );
        Ok(())
    }

    // ========== Entry mutations ==========

    /// Creates the entry for (journal, date).
    ///
    /// Saga: blob put (A), repository commit (B), metadata insert (C),
    /// version row (D). B and C failures compensate by deleting the
    /// step-A blob; the step-B commit is never rolled back; a step-D
    /// failure does not fail the operation.
    pub async fn create_entry(
        &self,
        user_sub: &str,
        journal_id: &str,
        entry_date: &str,
        content: &str,
    ) -> Result<Entry> {
        let date = parse_entry_date(entry_date)?;

        let lock = self.user_lock(user_sub);
        let _guard = lock.lock().await;

        self.metadata.get_journal(journal_id, user_sub).await?;
        if self
            .metadata
            .get_entry_by_date(journal_id, date)
            .await?
            .is_some()
        {
            return Err(AppError::conflict(format!(
                "entry for date {} already exists",
                entry_date
            )));
        }

        let normalized = normalize_content(content);
        let word_count = count_words(&normalized) as i64;
        let blob_key = entry_key(user_sub, journal_id, entry_date);
        let message = format!("Entry for {}", entry_date);

        // Step A. Nothing else has happened yet; no compensation needed
        // on failure.
        self.content.put(&blob_key, normalized.as_bytes()).await?;

        // Step B.
        let path = entry_path(journal_id, entry_date);
        let outcome = match self
            .versions
            .commit_file(user_sub, &path, normalized.as_bytes(), &message)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.compensate(SagaState::BlobWritten, &blob_key).await;
                return Err(e);
            }
        };

        // Step C. The commit stays behind as an accepted orphan if this
        // fails.
        let entry = match self
            .metadata
            .create_entry(
                journal_id,
                date,
                &blob_key,
                Some(outcome.id.as_str()),
                Some(word_count),
            )
            .await
        {
            Ok(entry) => entry,
            Err(e) => {
                self.compensate(SagaState::Committed, &blob_key).await;
                return Err(e);
            }
        };

        // Step D.
        self.record_version(&entry.id, &outcome.id, &message).await;

        info!(
            user = %user_sub,
            journal = %journal_id,
            date = %entry_date,
            commit = %outcome.id,
            words = word_count,
            "Created entry"
        );
        Ok(entry)
    }

    /// Updates the entry for (journal, date).
    ///
    /// The blob key is fixed, so step A overwrites in place. When the
    /// normalized content matches the repository head the whole
    /// operation is a no-op beyond re-confirming metadata: no new
    /// commit, no metadata update, no version row.
    pub async fn update_entry(
        &self,
        user_sub: &str,
        journal_id: &str,
        entry_date: &str,
        content: &str,
    ) -> Result<Entry> {
        let date = parse_entry_date(entry_date)?;

        let lock = self.user_lock(user_sub);
        let _guard = lock.lock().await;

        self.metadata.get_journal(journal_id, user_sub).await?;
        let entry = self
            .metadata
            .get_entry_by_date(journal_id, date)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!("entry not found for date {}", entry_date))
            })?;

        let normalized = normalize_content(content);
        let word_count = count_words(&normalized) as i64;
        let message = format!("Update entry for {}", entry_date);

        // Step A: overwrite the fixed blob key.
        self.content
            .put(&entry.blob_key, normalized.as_bytes())
            .await?;

        // Step B. The blob already holds the new current content, so
        // update failures propagate without compensation.
        let path = entry_path(journal_id, entry_date);
        let outcome = self
            .versions
            .commit_file(user_sub, &path, normalized.as_bytes(), &message)
            .await?;

        if !outcome.created {
            debug!(
                user = %user_sub,
                journal = %journal_id,
                date = %entry_date,
                commit = %outcome.id,
                "Content unchanged; no new version"
            );
            return Ok(entry);
        }

        // Step C.
        self.metadata
            .update_entry(&entry.id, &outcome.id, word_count)
            .await?;

        // Step D.
        self.record_version(&entry.id, &outcome.id, &message).await;

        info!(
            user = %user_sub,
            journal = %journal_id,
            date = %entry_date,
            commit = %outcome.id,
            words = word_count,
            "Updated entry"
        );
        self.metadata.get_entry(&entry.id).await
    }

    /// Deletes the entry for (journal, date): best-effort blob delete,
    /// then the metadata row (cascading its version rows). The
    /// repository commits are never removed.
    pub async fn delete_entry(
        &self,
        user_sub: &str,
        journal_id: &str,
        entry_date: &str,
    ) -> Result<()> {
        let date = parse_entry_date(entry_date)?;

        let lock = self.user_lock(user_sub);
        let _guard = lock.lock().await;

        self.metadata.get_journal(journal_id, user_sub).await?;
        let entry = self
            .metadata
            .get_entry_by_date(journal_id, date)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!("entry not found for date {}", entry_date))
            })?;

        if let Err(e) = self.content.delete(&entry.blob_key).await {
            warn!(
                key = %entry.blob_key,
                error = %e,
                "Failed to delete blob; continuing with metadata delete"
            );
        }

        self.metadata.delete_entry(&entry.id).await?;

        info!(user = %user_sub, journal = %journal_id, date = %entry_date, "Deleted entry");
        Ok(())
    }

    // ========== Read path ==========
    //
    // Ownership is re-verified on every read, independently of the
    // entry lookup, as defense against id guessing across users.

    /// Current entry content: the record plus the blob body.
    pub async fn get_entry(
        &self,
        user_sub: &str,
        journal_id: &str,
        entry_date: &str,
    ) -> Result<(Entry, String)> {
        let date = parse_entry_date(entry_date)?;

        self.metadata.get_journal(journal_id, user_sub).await?;
        let entry = self
            .metadata
            .get_entry_by_date(journal_id, date)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!("entry not found for date {}", entry_date))
            })?;

        let content = self.content.get(&entry.blob_key).await?;
        Ok((entry, String::from_utf8_lossy(&content).into_owned()))
    }

    pub async fn list_entries(&self, user_sub: &str, journal_id: &str) -> Result<Vec<Entry>> {
        self.metadata.get_journal(journal_id, user_sub).await?;
        self.metadata.list_entries(journal_id).await
    }

    /// Commit history of an entry, oldest first, straight from the
    /// version repository.
    pub async fn list_versions(
        &self,
        user_sub: &str,
        journal_id: &str,
        entry_date: &str,
    ) -> Result<Vec<CommitInfo>> {
        parse_entry_date(entry_date)?;

        self.metadata.get_journal(journal_id, user_sub).await?;
        self.versions
            .list_commits_touching(user_sub, &entry_path(journal_id, entry_date))
            .await
    }

    /// Entry content as of a specific commit. Historical reads come from
    /// the version repository, bypassing the blob store entirely.
    pub async fn get_version(
        &self,
        user_sub: &str,
        journal_id: &str,
        entry_date: &str,
        commit_id: &str,
    ) -> Result<String> {
        parse_entry_date(entry_date)?;

        self.metadata.get_journal(journal_id, user_sub).await?;
        let content = self
            .versions
            .read_file_at(user_sub, &entry_path(journal_id, entry_date), Some(commit_id))
            .await?;
        Ok(String::from_utf8_lossy(&content).into_owned())
    }
}
