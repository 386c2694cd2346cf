//! Record types produced by the metadata store and the version repository.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A user-owned collection of dated entries.
///
/// Deleting a journal cascades to its entries and their version rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journal {
    pub id: String,
    pub user_sub: String,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One diary entry: at most one per (journal, date).
///
/// The entry row is the single source of truth for where current content
/// lives. `blob_key` is deterministic from (user, journal, date) and never
/// changes across updates; `commit_id` and `word_count` are replaced on
/// every content-changing update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub journal_id: String,
    pub entry_date: NaiveDate,
    pub blob_key: String,
    pub commit_id: Option<String>,
    pub word_count: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only index row pointing at a repository commit.
///
/// Rows are added once per commit-producing write and never mutated;
/// they are removed only by the cascading entry delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    pub id: String,
    pub entry_id: String,
    pub commit_id: String,
    pub message: Option<String>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Commit metadata surfaced from a user's version repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub id: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub created_at: DateTime<Utc>,
}
