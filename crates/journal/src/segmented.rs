use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use parking_lot::Mutex;

use crate::{CommandJournal, JournalEntry, JournalError};

const SEGMENT_MAGIC: &[u8; 4] = b"PVJ1";
const SEGMENT_HEADER_SIZE: usize = 12; // magic(4) + segment_number(8)
const RECORD_PREFIX_SIZE: usize = 12; // sequence(8) + len(4)
const META_MAGIC: &[u8; 4] = b"PVJM";
const META_SIZE: usize = 32; // magic(4)+segment(8)+last_seq(8)+count(8)+crc(4)

fn segment_path(dir: &Path, segment: u64) -> PathBuf {
    dir.join(format!("segment-{segment:012}.journal"))
}

fn meta_path(dir: &Path, segment: u64) -> PathBuf {
    dir.join(format!("segment-{segment:012}.meta"))
}

struct State {
    dir: PathBuf,
    current_segment: u64,
    next_sequence: u64,
    file: Option<File>,
}

/// The default [`CommandJournal`]: numbered segment files of
/// length-prefixed, CRC32-checksummed records.
///
/// Segment layout: a 12-byte header (`"PVJ1"` + segment number),
/// followed by records of `sequence(8) | len(4) | payload(len) |
/// crc32(4)`, where the checksum covers `sequence | len | payload`.
/// When a segment is sealed (via [`CommandJournal::create_next_segment`])
/// a small sidecar `.meta` file is written recording its last sequence
/// number and record count, mirroring a write-ahead-log's per-segment
/// metadata sidecar: it lets a fresh open resume sequence numbering
/// without rescanning the whole journal.
///
/// Only the tail segment (the one still open for append) can ever be
/// torn by a crash — every earlier segment was sealed (flushed and
/// closed) before rotation, so it is immutable. On construction, a
/// torn trailing record in the tail segment is detected and the file
/// is truncated back to the last complete, checksummed record; the
/// same condition in any sealed segment is reported as
/// [`JournalError::Corrupt`] and aborts open entirely.
pub struct SegmentedFileJournal {
    state: Mutex<State>,
}

impl SegmentedFileJournal {
    /// Opens (or initializes) a journal rooted at `dir`, scanning for
    /// the current tail segment and repairing a torn trailing write
    /// if one is found.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let tail_segment = latest_segment_number(&dir)?.unwrap_or(0);
        if !segment_path(&dir, tail_segment).exists() {
            create_empty_segment(&dir, tail_segment)?;
        }

        let (tail_entries, truncated_to) = read_segment(&dir, tail_segment, true)?;
        if let Some(offset) = truncated_to {
            tracing::warn!(segment = tail_segment, offset, "truncating torn trailing journal write");
            let path = segment_path(&dir, tail_segment);
            let file = OpenOptions::new().write(true).open(&path)?;
            file.set_len(offset as u64)?;
            file.sync_all()?;
        }

        let next_sequence = match tail_entries.last() {
            Some(entry) => entry.sequence + 1,
            None if tail_segment == 0 => 0,
            None => {
                // Tail segment is empty (freshly rotated); continue
                // numbering from the sealed predecessor's sidecar.
                read_meta(&dir, tail_segment - 1)?
                    .map(|m| m.last_sequence + 1)
                    .unwrap_or(0)
            }
        };

        Ok(Self {
            state: Mutex::new(State {
                dir,
                current_segment: tail_segment,
                next_sequence,
                file: None,
            }),
        })
    }
}

struct SegmentMeta {
    last_sequence: u64,
}

fn read_meta(dir: &Path, segment: u64) -> Result<Option<SegmentMeta>, JournalError> {
    let path = meta_path(dir, segment);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(&path)?;
    if bytes.len() != META_SIZE || &bytes[..4] != META_MAGIC {
        return Ok(None);
    }
    let crc_stored = LittleEndian::read_u32(&bytes[28..32]);
    let crc_actual = crc32fast::hash(&bytes[..28]);
    if crc_stored != crc_actual {
        return Ok(None);
    }
    let last_sequence = LittleEndian::read_u64(&bytes[12..20]);
    Ok(Some(SegmentMeta { last_sequence }))
}

fn write_meta(dir: &Path, segment: u64, last_sequence: u64, record_count: u64) -> Result<(), JournalError> {
    let mut buf = [0u8; META_SIZE];
    buf[..4].copy_from_slice(META_MAGIC);
    LittleEndian::write_u64(&mut buf[4..12], segment);
    LittleEndian::write_u64(&mut buf[12..20], last_sequence);
    LittleEndian::write_u64(&mut buf[20..28], record_count);
    let crc = crc32fast::hash(&buf[..28]);
    LittleEndian::write_u32(&mut buf[28..32], crc);

    let path = meta_path(dir, segment);
    let mut file = File::create(&path)?;
    file.write_all(&buf)?;
    file.sync_all()?;
    Ok(())
}

fn latest_segment_number(dir: &Path) -> Result<Option<u64>, JournalError> {
    let mut max = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(rest) = name.strip_prefix("segment-") {
            if let Some(num_str) = rest.strip_suffix(".journal") {
                if let Ok(num) = num_str.parse::<u64>() {
                    max = Some(max.map_or(num, |m: u64| m.max(num)));
                }
            }
        }
    }
    Ok(max)
}

fn create_empty_segment(dir: &Path, segment: u64) -> Result<(), JournalError> {
    let path = segment_path(dir, segment);
    let mut file = OpenOptions::new().create(true).write(true).truncate(false).open(&path)?;
    let len = file.metadata()?.len();
    if len == 0 {
        file.write_all(SEGMENT_MAGIC)?;
        file.write_all(&segment.to_le_bytes())?;
        file.sync_all()?;
    }
    Ok(())
}

/// Reads every record of a segment file. `is_tail` controls how a
/// partially-written trailing record is handled: for the tail
/// segment, returns the good entries plus the byte offset to truncate
/// to; for a sealed segment, any such condition is `Corrupt`.
fn read_segment(
    dir: &Path,
    segment: u64,
    is_tail: bool,
) -> Result<(Vec<JournalEntry>, Option<usize>), JournalError> {
    let path = segment_path(dir, segment);
    let mut data = Vec::new();
    File::open(&path)?.read_to_end(&mut data)?;

    if data.len() < SEGMENT_HEADER_SIZE || &data[..4] != SEGMENT_MAGIC {
        return Err(JournalError::Corrupt(format!(
            "segment {} missing or invalid header",
            path.display()
        )));
    }

    let mut entries = Vec::new();
    let mut offset = SEGMENT_HEADER_SIZE;

    loop {
        if offset == data.len() {
            return Ok((entries, None));
        }
        if offset + RECORD_PREFIX_SIZE > data.len() {
            return handle_short_read(is_tail, &path, offset, entries);
        }
        let sequence = LittleEndian::read_u64(&data[offset..offset + 8]);
        let len = LittleEndian::read_u32(&data[offset + 8..offset + 12]) as usize;
        let record_len = RECORD_PREFIX_SIZE + len + 4;
        if offset + record_len > data.len() {
            return handle_short_read(is_tail, &path, offset, entries);
        }

        let payload_start = offset + RECORD_PREFIX_SIZE;
        let payload_end = payload_start + len;
        let crc_stored = LittleEndian::read_u32(&data[payload_end..payload_end + 4]);
        let crc_actual = crc32fast::hash(&data[offset..payload_end]);
        if crc_stored != crc_actual {
            return handle_short_read(is_tail, &path, offset, entries);
        }

        entries.push(JournalEntry {
            sequence,
            payload: data[payload_start..payload_end].to_vec(),
        });
        offset += record_len;
    }
}

fn handle_short_read(
    is_tail: bool,
    path: &Path,
    offset: usize,
    entries: Vec<JournalEntry>,
) -> Result<(Vec<JournalEntry>, Option<usize>), JournalError> {
    if is_tail {
        Ok((entries, Some(offset)))
    } else {
        Err(JournalError::Corrupt(format!(
            "sealed segment {} has a damaged record at offset {offset}",
            path.display()
        )))
    }
}

impl CommandJournal for SegmentedFileJournal {
    fn open(&self) -> Result<(), JournalError> {
        let mut state = self.state.lock();
        if state.file.is_some() {
            return Ok(());
        }
        let path = segment_path(&state.dir, state.current_segment);
        let file = OpenOptions::new().append(true).open(&path)?;
        state.file = Some(file);
        Ok(())
    }

    fn close(&self) -> Result<(), JournalError> {
        let mut state = self.state.lock();
        if let Some(file) = state.file.take() {
            file.sync_all()?;
        }
        Ok(())
    }

    fn append(&self, payload: &[u8]) -> Result<u64, JournalError> {
        let mut state = self.state.lock();
        let sequence = state.next_sequence;
        let len = payload.len() as u32;

        let mut record = Vec::with_capacity(RECORD_PREFIX_SIZE + payload.len() + 4);
        record.extend_from_slice(&sequence.to_le_bytes());
        record.extend_from_slice(&len.to_le_bytes());
        record.extend_from_slice(payload);
        let crc = crc32fast::hash(&record);
        record.extend_from_slice(&crc.to_le_bytes());

        let file = state
            .file
            .as_mut()
            .ok_or_else(|| JournalError::Corrupt("journal is not open".to_string()))?;
        file.write_all(&record)?;
        file.sync_all()?;

        state.next_sequence += 1;
        Ok(sequence)
    }

    fn entries_from(
        &self,
        segment: u64,
    ) -> Result<Box<dyn Iterator<Item = Result<JournalEntry, JournalError>> + '_>, JournalError> {
        let (dir, tail) = {
            let state = self.state.lock();
            (state.dir.clone(), state.current_segment)
        };

        let mut all = Vec::new();
        for seg in segment..=tail {
            if !segment_path(&dir, seg).exists() {
                continue;
            }
            let (entries, _truncated) = read_segment(&dir, seg, seg == tail)?;
            all.extend(entries);
        }
        Ok(Box::new(all.into_iter().map(Ok)))
    }

    fn create_next_segment(&self) -> Result<u64, JournalError> {
        let mut state = self.state.lock();
        let sealed = state.current_segment;

        if let Some(file) = state.file.take() {
            file.sync_all()?;
        }
        let (sealed_entries, _) = read_segment(&state.dir, sealed, true)?;
        write_meta(
            &state.dir,
            sealed,
            sealed_entries.last().map(|e| e.sequence).unwrap_or(0),
            sealed_entries.len() as u64,
        )?;

        let next = sealed + 1;
        create_empty_segment(&state.dir, next)?;
        let file = OpenOptions::new().append(true).open(segment_path(&state.dir, next))?;
        state.file = Some(file);
        state.current_segment = next;
        tracing::info!(from = sealed, to = next, "rotated journal segment");
        Ok(next)
    }

    fn current_segment(&self) -> u64 {
        self.state.lock().current_segment
    }
}
