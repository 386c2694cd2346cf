//! End-to-end entry lifecycle against the real local backends.

use journal_vault::{
    AppError, FsContentStore, FsVersionRepository, JournalService, MetadataStore,
};
use std::sync::Arc;
use tempfile::TempDir;

async fn service() -> (JournalService, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let service = JournalService::new(
        Arc::new(FsContentStore::new(temp_dir.path().join("blobs"))),
        Arc::new(FsVersionRepository::new(temp_dir.path().join("repos"))),
        Arc::new(
            MetadataStore::new(&temp_dir.path().join("metadata.db"))
                .await
                .unwrap(),
        ),
    );
    (service, temp_dir)
}

#[tokio::test]
async fn full_entry_lifecycle() {
    let (service, _temp_dir) = service().await;

    let journal = service
        .create_journal("alice", "J", Some("scenario journal"))
        .await
        .unwrap();

    // First write: one version.
    let created = service
        .create_entry("alice", &journal.id, "2025-12-01", "Version 1")
        .await
        .unwrap();
    let first_commit = created.commit_id.clone().unwrap();

    let versions = service
        .list_versions("alice", &journal.id, "2025-12-01")
        .await
        .unwrap();
    assert_eq!(versions.len(), 1);

    // Update: two versions, oldest first.
    service
        .update_entry("alice", &journal.id, "2025-12-01", "Version 2")
        .await
        .unwrap();

    let versions = service
        .list_versions("alice", &journal.id, "2025-12-01")
        .await
        .unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].id, first_commit);
    assert!(versions[0].created_at <= versions[1].created_at);

    // Historical read serves the old snapshot, current read the new one.
    let old = service
        .get_version("alice", &journal.id, "2025-12-01", &first_commit)
        .await
        .unwrap();
    assert_eq!(old, "Version 1");

    let (entry, current) = service
        .get_entry("alice", &journal.id, "2025-12-01")
        .await
        .unwrap();
    assert_eq!(current, "Version 2");
    assert_eq!(entry.word_count, Some(2));

    // Deleting the journal removes the entry from the read path.
    service.delete_journal("alice", &journal.id).await.unwrap();
    let err = service
        .get_entry("alice", &journal.id, "2025-12-01")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn crlf_content_is_stored_with_lf_only() {
    let (service, _temp_dir) = service().await;

    let journal = service.create_journal("alice", "J", None).await.unwrap();
    service
        .create_entry("alice", &journal.id, "2025-12-01", "first line\r\nsecond line\r\n")
        .await
        .unwrap();

    let (_, content) = service
        .get_entry("alice", &journal.id, "2025-12-01")
        .await
        .unwrap();
    assert_eq!(content, "first line\nsecond line\n");
    assert!(!content.contains('\r'));
}

#[tokio::test]
async fn entries_for_different_dates_coexist() {
    let (service, _temp_dir) = service().await;

    let journal = service.create_journal("alice", "J", None).await.unwrap();
    for (date, text) in [
        ("2025-12-01", "first day"),
        ("2025-12-02", "second day"),
        ("2025-12-03", "third day"),
    ] {
        service
            .create_entry("alice", &journal.id, date, text)
            .await
            .unwrap();
    }

    let entries = service.list_entries("alice", &journal.id).await.unwrap();
    assert_eq!(entries.len(), 3);
    // Newest date first.
    assert_eq!(
        entries[0].entry_date.format("%Y-%m-%d").to_string(),
        "2025-12-03"
    );

    let (_, content) = service
        .get_entry("alice", &journal.id, "2025-12-02")
        .await
        .unwrap();
    assert_eq!(content, "second day");
}
