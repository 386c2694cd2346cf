//! SQLite metadata store.
//!
//! Relational records for journals, entries, and version rows.
//!
//! ## Structural guarantees
//!
//! - entry insert enforces `UNIQUE(journal_id, entry_date)` — a duplicate
//!   insert surfaces `Conflict`;
//! - journal delete cascades to entries and then to versions inside one
//!   transaction (`ON DELETE CASCADE` with foreign keys enabled on every
//!   pooled connection);
//! - every other write is a single-statement transaction.

use crate::error::{AppError, Result};
use crate::models::{Entry, Journal, Version};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite-backed metadata store.
pub struct MetadataStore {
    pool: SqlitePool,
}

impl MetadataStore {
    /// Opens (creating if missing) the database at `db_path` and
    /// initializes the schema.
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AppError::storage_error(
                    format!("Failed to create database directory: {}", e),
                    Some(parent.to_path_buf()),
                )
            })?;
        }

        info!(path = %db_path.display(), "Initializing metadata store");

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            // WAL allows concurrent reads while writing.
            .journal_mode(SqliteJournalMode::Wal)
            // Cascading deletes depend on this being set per connection.
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|e| {
                AppError::database_error(format!("Failed to connect to database: {}", e))
            })?;

        Self::init_schema(&pool).await?;

        Ok(Self { pool })
    }

    async fn init_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS journals (
                id TEXT PRIMARY KEY,
                user_sub TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| AppError::database_error(format!("Failed to create journals table: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS journal_entries (
                id TEXT PRIMARY KEY,
                journal_id TEXT NOT NULL,
                entry_date TEXT NOT NULL,
                blob_key TEXT NOT NULL,
                commit_id TEXT,
                word_count INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (journal_id, entry_date),
                FOREIGN KEY (journal_id) REFERENCES journals(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| AppError::database_error(format!("Failed to create entries table: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS journal_versions (
                id TEXT PRIMARY KEY,
                entry_id TEXT NOT NULL,
                commit_id TEXT NOT NULL,
                message TEXT,
                author_name TEXT,
                author_email TEXT,
                created_at TEXT NOT NULL,
                UNIQUE (entry_id, commit_id),
                FOREIGN KEY (entry_id) REFERENCES journal_entries(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| AppError::database_error(format!("Failed to create versions table: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_journals_user ON journals(user_sub)")
            .execute(pool)
            .await
            .map_err(|e| AppError::database_error(format!("Failed to create index: {}", e)))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_entries_journal ON journal_entries(journal_id)",
        )
        .execute(pool)
        .await
        .map_err(|e| AppError::database_error(format!("Failed to create index: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_versions_entry ON journal_versions(entry_id)")
            .execute(pool)
            .await
            .map_err(|e| AppError::database_error(format!("Failed to create index: {}", e)))?;

        debug!("Database schema initialized");
        Ok(())
    }

    // ========== Journal operations ==========

    pub async fn create_journal(
        &self,
        user_sub: &str,
        title: &str,
        description: Option<&str>,
    ) -> Result<Journal> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO journals (id, user_sub, title, description, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_sub)
        .bind(title)
        .bind(description)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database_error(format!("Failed to insert journal: {}", e)))?;

        debug!(id = %id, user = %user_sub, "Created journal");
        self.get_journal(&id, user_sub).await
    }

    /// Looks the journal up scoped by owner; a foreign user's journal id
    /// surfaces as `NotFound` rather than revealing its existence.
    pub async fn get_journal(&self, id: &str, user_sub: &str) -> Result<Journal> {
        let row = sqlx::query("SELECT * FROM journals WHERE id = ? AND user_sub = ?")
            .bind(id)
            .bind(user_sub)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database_error(format!("Failed to query journal: {}", e)))?;

        row.map(row_to_journal)
            .transpose()?
            .ok_or_else(|| AppError::not_found(format!("Journal not found: {}", id)))
    }

    pub async fn list_journals(&self, user_sub: &str) -> Result<Vec<Journal>> {
        let rows =
            sqlx::query("SELECT * FROM journals WHERE user_sub = ? ORDER BY created_at DESC")
                .bind(user_sub)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| AppError::database_error(format!("Failed to list journals: {}", e)))?;

        rows.into_iter().map(row_to_journal).collect()
    }

    pub async fn update_journal(
        &self,
        id: &str,
        user_sub: &str,
        title: &str,
        description: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE journals
            SET title = ?, description = ?, updated_at = ?
            WHERE id = ? AND user_sub = ?
            "#,
        )
        .bind(title)
        .bind(description)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .bind(user_sub)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database_error(format!("Failed to update journal: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Journal not found: {}", id)));
        }
        Ok(())
    }

    /// Deletes the journal row; entries and their version rows go with it
    /// in the same implicit transaction via `ON DELETE CASCADE`.
    pub async fn delete_journal(&self, id: &str, user_sub: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM journals WHERE id = ? AND user_sub = ?")
            .bind(id)
            .bind(user_sub)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database_error(format!("Failed to delete journal: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Journal not found: {}", id)));
        }

        debug!(id = %id, user = %user_sub, "Deleted journal");
        Ok(())
    }

    // ========== Entry operations ==========

    pub async fn create_entry(
        &self,
        journal_id: &str,
        entry_date: NaiveDate,
        blob_key: &str,
        commit_id: Option<&str>,
        word_count: Option<i64>,
    ) -> Result<Entry> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO journal_entries
                (id, journal_id, entry_date, blob_key, commit_id, word_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(journal_id)
        .bind(entry_date.format(DATE_FORMAT).to_string())
        .bind(blob_key)
        .bind(commit_id)
        .bind(word_count)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::conflict(format!(
                    "entry for date {} already exists in journal {}",
                    entry_date.format(DATE_FORMAT),
                    journal_id
                ))
            } else {
                AppError::database_error(format!("Failed to insert entry: {}", e))
            }
        })?;

        debug!(id = %id, journal = %journal_id, date = %entry_date, "Created entry");
        self.get_entry(&id).await
    }

    pub async fn get_entry(&self, id: &str) -> Result<Entry> {
        let row = sqlx::query("SELECT * FROM journal_entries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database_error(format!("Failed to query entry: {}", e)))?;

        row.map(row_to_entry)
            .transpose()?
            .ok_or_else(|| AppError::not_found(format!("Entry not found: {}", id)))
    }

    pub async fn get_entry_by_date(
        &self,
        journal_id: &str,
        entry_date: NaiveDate,
    ) -> Result<Option<Entry>> {
        let row =
            sqlx::query("SELECT * FROM journal_entries WHERE journal_id = ? AND entry_date = ?")
                .bind(journal_id)
                .bind(entry_date.format(DATE_FORMAT).to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AppError::database_error(format!("Failed to query entry: {}", e)))?;

        row.map(row_to_entry).transpose()
    }

    pub async fn list_entries(&self, journal_id: &str) -> Result<Vec<Entry>> {
        let rows = sqlx::query(
            "SELECT * FROM journal_entries WHERE journal_id = ? ORDER BY entry_date DESC",
        )
        .bind(journal_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database_error(format!("Failed to list entries: {}", e)))?;

        rows.into_iter().map(row_to_entry).collect()
    }

    /// Replaces the entry's commit pointer and word count; the blob key
    /// is fixed for the entry's lifetime and is not touched.
    pub async fn update_entry(&self, id: &str, commit_id: &str, word_count: i64) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE journal_entries
            SET commit_id = ?, word_count = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(commit_id)
        .bind(word_count)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database_error(format!("Failed to update entry: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Entry not found: {}", id)));
        }
        Ok(())
    }

    /// Deletes the entry row; its version rows cascade.
    pub async fn delete_entry(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM journal_entries WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database_error(format!("Failed to delete entry: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Entry not found: {}", id)));
        }

        debug!(id = %id, "Deleted entry");
        Ok(())
    }

    // ========== Version operations ==========

    pub async fn create_version(
        &self,
        entry_id: &str,
        commit_id: &str,
        message: Option<&str>,
        author_name: Option<&str>,
        author_email: Option<&str>,
    ) -> Result<Version> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO journal_versions
                (id, entry_id, commit_id, message, author_name, author_email, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(entry_id)
        .bind(commit_id)
        .bind(message)
        .bind(author_name)
        .bind(author_email)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::conflict(format!(
                    "version for commit {} already recorded on entry {}",
                    commit_id, entry_id
                ))
            } else {
                AppError::database_error(format!("Failed to insert version: {}", e))
            }
        })?;

        Ok(Version {
            id,
            entry_id: entry_id.to_string(),
            commit_id: commit_id.to_string(),
            message: message.map(str::to_string),
            author_name: author_name.map(str::to_string),
            author_email: author_email.map(str::to_string),
            created_at: now,
        })
    }

    pub async fn list_versions(&self, entry_id: &str) -> Result<Vec<Version>> {
        let rows = sqlx::query(
            "SELECT * FROM journal_versions WHERE entry_id = ? ORDER BY created_at DESC",
        )
        .bind(entry_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database_error(format!("Failed to list versions: {}", e)))?;

        rows.into_iter().map(row_to_version).collect()
    }

    pub async fn get_version(&self, entry_id: &str, commit_id: &str) -> Result<Option<Version>> {
        let row =
            sqlx::query("SELECT * FROM journal_versions WHERE entry_id = ? AND commit_id = ?")
                .bind(entry_id)
                .bind(commit_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AppError::database_error(format!("Failed to query version: {}", e)))?;

        row.map(row_to_version).transpose()
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::database_error(format!("Corrupt timestamp {:?}: {}", value, e)))
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| AppError::database_error(format!("Corrupt entry date {:?}: {}", value, e)))
}

fn row_to_journal(row: SqliteRow) -> Result<Journal> {
    Ok(Journal {
        id: row.get("id"),
        user_sub: row.get("user_sub"),
        title: row.get("title"),
        description: row.get("description"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
    })
}

fn row_to_entry(row: SqliteRow) -> Result<Entry> {
    Ok(Entry {
        id: row.get("id"),
        journal_id: row.get("journal_id"),
        entry_date: parse_date(&row.get::<String, _>("entry_date"))?,
        blob_key: row.get("blob_key"),
        commit_id: row.get("commit_id"),
        word_count: row.get("word_count"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
    })
}

fn row_to_version(row: SqliteRow) -> Result<Version> {
    Ok(Version {
        id: row.get("id"),
        entry_id: row.get("entry_id"),
        commit_id: row.get("commit_id"),
        message: row.get("message"),
        author_name: row.get("author_name"),
        author_email: row.get("author_email"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}
