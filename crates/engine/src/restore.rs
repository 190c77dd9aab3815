use prevalence_core::{Command, Error, Model, Result};
use prevalence_journal::CommandJournal;
use prevalence_serializer::Serializer;
use prevalence_storage::{JournalSegmentInfo, Storage};

/// Implements `spec.md` §4.6.1: load the latest snapshot (or build a
/// fresh model if storage is empty and a constructor was supplied),
/// run `snapshot_restored`, replay every journal entry since that
/// snapshot's segment via `Command::redo`, then run `journal_restored`.
///
/// Single-threaded and unlocked by design: called either before the
/// engine is published (initial open) or after the live model has
/// been discarded following a command failure (rollback), in both
/// cases with no other thread able to observe or mutate the model
/// being rebuilt.
pub(crate) fn restore<M, C, S>(
    storage: &dyn Storage,
    journal: &dyn CommandJournal,
    serializer: &S,
    constructor: Option<Box<dyn FnOnce() -> M>>,
) -> Result<M>
where
    M: Model,
    C: Command<M>,
    S: Serializer,
{
    let (snapshot_bytes, segment) = match storage.most_recent_snapshot()? {
        Some((bytes, segment)) => (Some(bytes), segment),
        None => (None, JournalSegmentInfo::INITIAL),
    };

    let mut model = match snapshot_bytes {
        Some(bytes) => serializer.deserialize::<M>(&bytes)?,
        None => match constructor {
            Some(build) => build(),
            None => return Err(Error::NoInitialSnapshot),
        },
    };
    model.snapshot_restored();

    let mut replayed = 0u64;
    for entry in journal.entries_from(segment.segment_id)? {
        let entry = entry?;
        let command: C = serializer.deserialize(&entry.payload)?;
        command.redo(&mut model).map_err(Error::ReplayFailed)?;
        replayed += 1;
    }
    tracing::info!(segment = segment.segment_id, replayed, "restore complete");

    model.journal_restored();
    Ok(model)
}
