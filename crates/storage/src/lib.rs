//! Named, append-only backing store: at most one visible snapshot
//! "head" plus the identifier of the journal segment the journal
//! should resume from.
//!
//! [`Storage`] is deliberately byte-level and object-safe — it never
//! sees a typed `Model`, only the bytes a [`Serializer`](https://docs.rs/prevalence-serializer)
//! has already produced. That keeps it free of generics so it can be
//! held as `Arc<dyn Storage>` and swapped at runtime, matching the
//! specification's pluggable `storageFactory`.

#![warn(missing_docs)]

mod file;

pub use file::FileStorage;

use thiserror::Error;

/// Errors raised by a [`Storage`] implementation.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The storage location is incompatible with this implementation
    /// (wrong format version, foreign layout, etc).
    #[error("incompatible storage: {0}")]
    Incompatible(String),
    /// `create` was called on a location that already exists.
    #[error("storage location already exists")]
    AlreadyExists,
    /// An underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Identifies the journal segment a snapshot is tied to: the journal
/// segment active at snapshot-time, from which recovery resumes after
/// loading that snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JournalSegmentInfo {
    /// Stable segment identifier, strictly increasing across rotations.
    pub segment_id: u64,
}

impl JournalSegmentInfo {
    /// The segment identifier used before any snapshot has ever been
    /// written — segment #0.
    pub const INITIAL: JournalSegmentInfo = JournalSegmentInfo { segment_id: 0 };
}

/// A named location containing at most one snapshot "head" plus a
/// journal area (managed separately by `prevalence-journal`, which
/// shares the same base location).
pub trait Storage: Send + Sync {
    /// Whether a snapshot already exists at this location.
    fn exists(&self) -> bool;

    /// Whether a new location could be created here (no snapshot
    /// present and the location is otherwise writable).
    fn can_create(&self) -> bool;

    /// Validates that this location can be loaded by this
    /// implementation, failing with [`StorageError::Incompatible`]
    /// otherwise.
    fn verify_can_load(&self) -> Result<(), StorageError>;

    /// Writes an initial snapshot tagged with segment #0. Fails with
    /// [`StorageError::AlreadyExists`] if the location is already
    /// populated.
    fn create(&self, initial_snapshot: &[u8]) -> Result<(), StorageError>;

    /// Returns the most recent complete snapshot and the journal
    /// segment the journal should resume from, or `None` with
    /// [`JournalSegmentInfo::INITIAL`] if no snapshot exists yet.
    fn most_recent_snapshot(&self) -> Result<Option<(Vec<u8>, JournalSegmentInfo)>, StorageError>;

    /// Atomically writes a new snapshot. The new snapshot must not be
    /// observable until the write is complete, so that a crash
    /// mid-write leaves the previous snapshot intact. Returns the
    /// journal segment this snapshot is now tied to.
    fn write_snapshot(
        &self,
        bytes: &[u8],
        name: &str,
        segment: JournalSegmentInfo,
    ) -> Result<(), StorageError>;
}
