//! Ordered, segmented, durable log of accepted commands.
//!
//! [`CommandJournal`] is byte-level and object-safe, like
//! `prevalence-storage`'s `Storage` trait: it never sees a typed
//! command, only the bytes a serializer has already produced. The
//! engine is responsible for encoding/decoding; this crate is
//! responsible only for ordering, durability, and segmentation.

#![warn(missing_docs)]

mod segmented;

pub use segmented::SegmentedFileJournal;

use thiserror::Error;

/// Errors raised by a [`CommandJournal`] implementation.
#[derive(Debug, Error)]
pub enum JournalError {
    /// Interior (non-tail) journal damage was detected — a sealed
    /// segment failed to parse cleanly. This is always fatal; unlike
    /// a torn trailing write, a sealed segment should never be
    /// incomplete.
    #[error("journal corrupt: {0}")]
    Corrupt(String),
    /// An underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One journaled command: its strictly-increasing sequence number and
/// its serialized payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Strictly increasing across every segment in the journal.
    pub sequence: u64,
    /// The serialized command, as produced by the engine's serializer.
    pub payload: Vec<u8>,
}

/// An ordered, segmented, durable log of accepted commands.
///
/// Appends happen strictly under the engine's write lock, so append
/// order equals command acceptance order.
pub trait CommandJournal: Send + Sync {
    /// Begins appending to the current (tail) segment.
    fn open(&self) -> Result<(), JournalError>;

    /// Flushes and seals the current segment.
    fn close(&self) -> Result<(), JournalError>;

    /// Serializes and durably appends `payload`, returning only after
    /// the bytes are guaranteed recoverable. Returns the sequence
    /// number assigned to this entry.
    fn append(&self, payload: &[u8]) -> Result<u64, JournalError>;

    /// A lazy, ordered, single-pass stream of entries from `segment`
    /// through the tail.
    fn entries_from(
        &self,
        segment: u64,
    ) -> Result<Box<dyn Iterator<Item = Result<JournalEntry, JournalError>> + '_>, JournalError>;

    /// Seals the current segment and starts a new, empty one,
    /// returning the new segment's identifier. Called immediately
    /// after a successful snapshot write; the new segment becomes the
    /// one associated with that snapshot.
    fn create_next_segment(&self) -> Result<u64, JournalError>;

    /// The identifier of the segment currently being appended to.
    fn current_segment(&self) -> u64;
}
