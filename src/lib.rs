//! Versioned diary entry storage.
//!
//! Every entry lives in three backends at once: a key-addressed blob
//! store holding current content, a per-user append-only commit history
//! holding every past version, and SQLite rows indexing both. None of
//! the three share a transaction; [`JournalService`] keeps them
//! mutually consistent by running each mutation as an ordered saga with
//! best-effort compensation.
//!
//! ```no_run
//! use journal_vault::{FsContentStore, FsVersionRepository, JournalService, MetadataStore};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let service = JournalService::new(
//!     Arc::new(FsContentStore::new("./data/blobs".into())),
//!     Arc::new(FsVersionRepository::new("./data/repos".into())),
//!     Arc::new(MetadataStore::new(Path::new("./data/metadata.db")).await.unwrap()),
//! );
//!
//! let journal = service.create_journal("alice", "Daily", None).await.unwrap();
//! service
//!     .create_entry("alice", &journal.id, "2025-12-01", "Dear diary...")
//!     .await
//!     .unwrap();
//! # })
//! ```

pub mod error;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

pub use error::{AppError, Result};
pub use infrastructure::config::AppConfig;
pub use models::{CommitInfo, Entry, Journal, Version};
pub use services::JournalService;
pub use storage::{
    ContentStore, FsContentStore, FsVersionRepository, MetadataStore, VersionRepository,
};

use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber.
///
/// `RUST_LOG` wins over `default_level` when set. Safe to call more
/// than once; later calls are no-ops.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
