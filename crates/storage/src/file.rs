use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{JournalSegmentInfo, Storage, StorageError};

const HEAD_FILE: &str = "HEAD";
const SNAPSHOTS_DIR: &str = "snapshots";
const FORMAT_MARKER: &[u8; 4] = b"PVS1";

/// The default [`Storage`]: a directory holding one file per snapshot
/// plus a `HEAD` pointer file naming the current one.
///
/// Each snapshot file is `{marker}{segment_id: u64 LE}{payload}`.
/// `HEAD` holds the file name of the current snapshot and is written
/// with the standard write-temp-fsync-rename sequence, so it is never
/// observable mid-write: a crash between writing a new snapshot file
/// and renaming `HEAD` to point at it simply leaves the previous
/// snapshot as the visible one.
pub struct FileStorage {
    base_dir: PathBuf,
    next_seq: AtomicU64,
}

impl FileStorage {
    /// Opens (without creating) a storage location rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let next_seq = current_head_seq(&base_dir).map(|s| s + 1).unwrap_or(0);
        Self {
            base_dir,
            next_seq: AtomicU64::new(next_seq),
        }
    }

    fn snapshots_dir(&self) -> PathBuf {
        self.base_dir.join(SNAPSHOTS_DIR)
    }

    fn head_path(&self) -> PathBuf {
        self.base_dir.join(HEAD_FILE)
    }

    fn write_snapshot_file(
        &self,
        seq: u64,
        name: &str,
        segment: JournalSegmentInfo,
        payload: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let dir = self.snapshots_dir();
        fs::create_dir_all(&dir)?;
        let file_name = format!("{seq:020}-{}.snapshot", sanitize(name));
        let final_path = dir.join(&file_name);
        let temp_path = dir.join(format!(".{file_name}.tmp"));

        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)?;
        file.write_all(FORMAT_MARKER)?;
        file.write_all(&segment.segment_id.to_le_bytes())?;
        file.write_all(payload)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &final_path)?;
        if let Ok(dir_handle) = fs::File::open(&dir) {
            let _ = dir_handle.sync_all();
        }
        Ok(final_path)
    }

    fn publish_head(&self, file_name: &str) -> Result<(), StorageError> {
        let head = self.head_path();
        let temp = self.base_dir.join(".HEAD.tmp");
        fs::create_dir_all(&self.base_dir)?;
        fs::write(&temp, file_name.as_bytes())?;
        if let Ok(f) = fs::File::open(&temp) {
            let _ = f.sync_all();
        }
        fs::rename(&temp, &head)?;
        Ok(())
    }
}

fn sanitize(name: &str) -> String {
    if name.is_empty() {
        return "auto".to_string();
    }
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn current_head_seq(base_dir: &Path) -> Option<u64> {
    let head = fs::read_to_string(base_dir.join(HEAD_FILE)).ok()?;
    let seq_str = head.split('-').next()?;
    seq_str.parse().ok()
}

impl Storage for FileStorage {
    fn exists(&self) -> bool {
        self.head_path().is_file()
    }

    fn can_create(&self) -> bool {
        !self.exists()
    }

    fn verify_can_load(&self) -> Result<(), StorageError> {
        if !self.exists() {
            return Ok(());
        }
        let head_name = fs::read_to_string(self.head_path())?;
        let path = self.snapshots_dir().join(head_name.trim());
        let bytes = fs::read(&path)?;
        if bytes.len() < FORMAT_MARKER.len() || &bytes[..FORMAT_MARKER.len()] != FORMAT_MARKER {
            return Err(StorageError::Incompatible(format!(
                "snapshot {} missing format marker",
                path.display()
            )));
        }
        Ok(())
    }

    fn create(&self, initial_snapshot: &[u8]) -> Result<(), StorageError> {
        if self.exists() {
            return Err(StorageError::AlreadyExists);
        }
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let path = self.write_snapshot_file(seq, "initial", JournalSegmentInfo::INITIAL, initial_snapshot)?;
        let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
        self.publish_head(&file_name)?;
        tracing::info!(path = %path.display(), "wrote initial snapshot");
        Ok(())
    }

    fn most_recent_snapshot(&self) -> Result<Option<(Vec<u8>, JournalSegmentInfo)>, StorageError> {
        if !self.exists() {
            return Ok(None);
        }
        let head_name = fs::read_to_string(self.head_path())?;
        let path = self.snapshots_dir().join(head_name.trim());
        let bytes = fs::read(&path)?;
        if bytes.len() < FORMAT_MARKER.len() + 8 || &bytes[..FORMAT_MARKER.len()] != FORMAT_MARKER {
            return Err(StorageError::Incompatible(format!(
                "snapshot {} truncated or missing marker",
                path.display()
            )));
        }
        let segment_id = u64::from_le_bytes(bytes[4..12].try_into().unwrap());
        let payload = bytes[12..].to_vec();
        Ok(Some((payload, JournalSegmentInfo { segment_id })))
    }

    fn write_snapshot(
        &self,
        bytes: &[u8],
        name: &str,
        segment: JournalSegmentInfo,
    ) -> Result<(), StorageError> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let path = self.write_snapshot_file(seq, name, segment, bytes)?;
        let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
        self.publish_head(&file_name)?;
        tracing::info!(path = %path.display(), segment = segment.segment_id, "wrote snapshot");
        Ok(())
    }
}
