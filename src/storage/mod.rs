//! Storage backends.
//!
//! Three structurally different backends back every entry:
//!
//! - [`ContentStore`] — key-addressed blob storage holding current entry
//!   content;
//! - [`VersionRepository`] — one append-only, content-addressed commit
//!   history per user;
//! - [`MetadataStore`] — SQLite rows for journals, entries, and version
//!   records, with cascading deletes.
//!
//! None of them share a transaction; the write coordinator in
//! `services::journal_service` keeps them consistent through ordered
//! steps and best-effort compensation.

pub mod content_store;
pub mod metadata_store;
pub mod version_repo;

pub use content_store::{entry_key, ContentStore, FsContentStore};
pub use metadata_store::MetadataStore;
pub use version_repo::{
    entry_path, CommitOutcome, FsVersionRepository, VersionRepository, SYSTEM_AUTHOR_EMAIL,
    SYSTEM_AUTHOR_NAME,
};
