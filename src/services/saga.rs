//! Saga progress tracking for multi-backend entry writes.
//!
//! An entry mutation crosses three backends with no shared transaction:
//! blob store, version repository, metadata store. Correctness rests on
//! step ordering plus best-effort compensation, encoded here as an
//! explicit state machine so the compensation rules can be tested
//! without any backend I/O.

/// Progress of an entry write saga.
///
/// Steps advance `Init` → `BlobWritten` → `Committed` →
/// `MetadataWritten` → `VersionRecorded`; a failure at any point moves
/// the saga to `Failed` after its owed compensations have been run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaState {
    /// Nothing written yet; validation and lookups only.
    Init,
    /// Step A done: blob written to the content store.
    BlobWritten,
    /// Step B done: content committed to the version repository.
    Committed,
    /// Step C done: entry metadata row written. The operation is now
    /// successful from the caller's point of view.
    MetadataWritten,
    /// Step D done: version row recorded.
    VersionRecorded,
    /// Terminal failure state.
    Failed,
}

/// A compensating action for an already-completed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compensation {
    /// Remove the blob written in step A. Best-effort: a failure is
    /// logged, never re-raised over the original error.
    DeleteBlob,
}

/// The compensations owed when a saga fails while in `state`.
///
/// Repository commits are never compensated: a commit left behind by a
/// failed metadata write is an accepted orphan. Once the metadata row
/// exists the operation has succeeded, so nothing is owed — a missing
/// version row only degrades history completeness.
pub fn pending_compensation(state: SagaState) -> &'static [Compensation] {
    match state {
        SagaState::Init => &[],
        SagaState::BlobWritten | SagaState::Committed => &[Compensation::DeleteBlob],
        SagaState::MetadataWritten | SagaState::VersionRecorded | SagaState::Failed => &[],
    }
}
