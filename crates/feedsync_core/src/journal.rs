//! Append-only journal of committed transactions.
//!
//! Record layout:
//!
//! ```text
//! magic (4) | version (2) | kind (1) | length (4) | payload (length) | crc32 (4)
//! ```
//!
//! The payload is CBOR. A `Commit` record holds the ordered changes of one
//! transaction; a `Snapshot` record holds the complete tables and resets
//! state. Replay stops at the first record that is short, has the wrong
//! magic, or fails its checksum; everything from there on is a torn write
//! and gets truncated.

use crate::error::{StoreError, StoreResult};
use crate::storage::StorageBackend;
use crate::tables::{Change, Tables};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

/// Magic bytes identifying a journal record.
pub const JOURNAL_MAGIC: [u8; 4] = *b"FSJL";

/// Current journal format version.
pub const JOURNAL_VERSION: u16 = 1;

/// magic (4) + version (2) + kind (1) + length (4)
const HEADER_SIZE: usize = 11;

const CRC_SIZE: usize = 4;

const KIND_COMMIT: u8 = 1;
const KIND_SNAPSHOT: u8 = 2;

#[derive(Debug, Serialize, Deserialize)]
struct CommitPayload {
    seq: u64,
    changes: Vec<Change>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotPayload {
    seq: u64,
    tables: Tables,
}

/// State recovered from a journal.
pub(crate) struct Recovered {
    pub tables: Option<Tables>,
    pub seq: u64,
    pub records: u64,
}

/// Writes and replays journal records over a storage backend.
pub(crate) struct Journal {
    backend: Box<dyn StorageBackend>,
    sync_on_commit: bool,
    seq: u64,
    records_since_snapshot: u64,
}

impl Journal {
    /// Replays the backend and returns the journal positioned after the last valid record.
    pub(crate) fn open(
        mut backend: Box<dyn StorageBackend>,
        sync_on_commit: bool,
        fresh: Tables,
    ) -> StoreResult<(Self, Tables)> {
        let bytes = backend.read_all()?;
        let (recovered, valid_len) = replay(&bytes, fresh.clone())?;

        if (valid_len as usize) < bytes.len() {
            warn!(
                valid_len,
                total = bytes.len(),
                "truncating torn journal tail"
            );
            backend.truncate(valid_len)?;
        }

        debug!(records = recovered.records, seq = recovered.seq, "journal replayed");
        let journal = Self {
            backend,
            sync_on_commit,
            seq: recovered.seq,
            records_since_snapshot: recovered.records,
        };
        Ok((journal, recovered.tables.unwrap_or(fresh)))
    }

    /// Appends one committed transaction.
    pub(crate) fn append_commit(&mut self, changes: &[Change]) -> StoreResult<u64> {
        let seq = self.seq + 1;
        let payload = CommitPayload {
            seq,
            changes: changes.to_vec(),
        };
        let frame = frame(KIND_COMMIT, &encode(&payload)?)?;

        let start = self.backend.size()?;
        if let Err(err) = self.write_frame(&frame) {
            self.discard_tail(start);
            return Err(err);
        }

        self.seq = seq;
        self.records_since_snapshot += 1;
        Ok(seq)
    }

    fn write_frame(&mut self, frame: &[u8]) -> StoreResult<()> {
        self.backend.append(frame)?;
        if self.sync_on_commit {
            self.backend.sync()?;
        }
        Ok(())
    }

    /// Cuts a commit that did not make it to disk so replay never applies it.
    fn discard_tail(&mut self, start: u64) {
        match self.backend.truncate(start) {
            Ok(()) => debug!(offset = start, "discarded unacknowledged journal tail"),
            Err(err) => error!(
                offset = start,
                error = %err,
                "failed to discard unacknowledged journal tail"
            ),
        }
    }

    /// Replaces the whole journal with one snapshot of `tables`.
    pub(crate) fn compact(&mut self, tables: &Tables) -> StoreResult<()> {
        let payload = SnapshotPayload {
            seq: self.seq,
            tables: tables.clone(),
        };
        let frame = frame(KIND_SNAPSHOT, &encode(&payload)?)?;
        self.backend.replace(&frame)?;
        self.records_since_snapshot = 1;
        debug!(seq = self.seq, bytes = frame.len(), "journal compacted");
        Ok(())
    }

    pub(crate) fn records_since_snapshot(&self) -> u64 {
        self.records_since_snapshot
    }

    pub(crate) fn size(&self) -> StoreResult<u64> {
        Ok(self.backend.size()?)
    }

    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }
}

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::codec(e.to_string()))?;
    Ok(buf)
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> StoreResult<T> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::codec(e.to_string()))
}

fn frame(kind: u8, payload: &[u8]) -> StoreResult<Vec<u8>> {
    let len = u32::try_from(payload.len())
        .map_err(|_| StoreError::invalid("journal record payload too large"))?;

    let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    data.extend_from_slice(&JOURNAL_MAGIC);
    data.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
    data.push(kind);
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(payload);

    let crc = compute_crc32(&data);
    data.extend_from_slice(&crc.to_le_bytes());
    Ok(data)
}

/// Replays `bytes` and returns the recovered state plus the length of the valid prefix.
fn replay(bytes: &[u8], fresh: Tables) -> StoreResult<(Recovered, u64)> {
    let mut tables: Option<Tables> = None;
    let mut seq = 0u64;
    let mut records = 0u64;
    let mut offset = 0usize;

    while offset < bytes.len() {
        let Some((kind, payload, next)) = read_frame(bytes, offset) else {
            break;
        };

        match kind {
            KIND_COMMIT => {
                let commit: CommitPayload = decode(payload)?;
                let state = tables.get_or_insert_with(|| fresh.clone());
                for change in &commit.changes {
                    state.apply(change);
                }
                seq = commit.seq;
            }
            KIND_SNAPSHOT => {
                let snapshot: SnapshotPayload = decode(payload)?;
                tables = Some(snapshot.tables);
                seq = snapshot.seq;
                records = 0;
            }
            other => {
                return Err(StoreError::corrupted(format!(
                    "unknown record kind {other} at offset {offset}"
                )));
            }
        }

        records += 1;
        offset = next;
    }

    Ok((
        Recovered {
            tables,
            seq,
            records,
        },
        offset as u64,
    ))
}

/// Reads the frame at `offset`. Returns `None` for a torn or damaged frame.
fn read_frame(bytes: &[u8], offset: usize) -> Option<(u8, &[u8], usize)> {
    let header = bytes.get(offset..offset + HEADER_SIZE)?;
    if header[0..4] != JOURNAL_MAGIC {
        return None;
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != JOURNAL_VERSION {
        return None;
    }
    let kind = header[6];
    let len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;

    let body_end = offset + HEADER_SIZE + len;
    let frame_end = body_end + CRC_SIZE;
    let crc_bytes = bytes.get(body_end..frame_end)?;
    let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);

    if compute_crc32(&bytes[offset..body_end]) != stored {
        return None;
    }

    Some((kind, &bytes[offset + HEADER_SIZE..body_end], frame_end))
}

/// CRC32 (IEEE polynomial).
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc = CRC32_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8);
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccountId, Folder, FolderId};
    use crate::storage::MemoryBackend;

    fn fresh() -> Tables {
        Tables::new(AccountId::from_raw("journal-test"))
    }

    fn put_folder(id: i64, name: &str) -> Change {
        Change::PutFolder(Folder::new(FolderId::new(id), name))
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn commits_replay_in_order() {
        let backend = MemoryBackend::new();
        {
            let (mut journal, _) =
                Journal::open(Box::new(backend.clone()), true, fresh()).unwrap();
            journal.append_commit(&[put_folder(1, "News")]).unwrap();
            journal
                .append_commit(&[put_folder(1, "Renamed"), put_folder(2, "Tech")])
                .unwrap();
        }

        let (journal, tables) = Journal::open(Box::new(backend), true, fresh()).unwrap();
        assert_eq!(journal.seq(), 2);
        assert_eq!(tables.folders.len(), 2);
        assert_eq!(tables.folders[&FolderId::new(1)].name, "Renamed");
    }

    #[test]
    fn torn_tail_is_truncated() {
        let backend = MemoryBackend::new();
        {
            let (mut journal, _) =
                Journal::open(Box::new(backend.clone()), true, fresh()).unwrap();
            journal.append_commit(&[put_folder(1, "News")]).unwrap();
        }
        let good_len = backend.bytes().len();

        // Simulate a crash halfway through the second record.
        let mut torn = backend.bytes();
        let second = frame(KIND_COMMIT, &encode(&CommitPayload {
            seq: 2,
            changes: vec![put_folder(2, "Lost")],
        })
        .unwrap())
        .unwrap();
        torn.extend_from_slice(&second[..second.len() / 2]);
        let damaged = MemoryBackend::with_data(torn);

        let (journal, tables) = Journal::open(Box::new(damaged.clone()), true, fresh()).unwrap();
        assert_eq!(journal.seq(), 1);
        assert_eq!(tables.folders.len(), 1);
        assert_eq!(damaged.bytes().len(), good_len);
    }

    #[test]
    fn corrupted_checksum_stops_replay() {
        let backend = MemoryBackend::new();
        {
            let (mut journal, _) =
                Journal::open(Box::new(backend.clone()), true, fresh()).unwrap();
            journal.append_commit(&[put_folder(1, "News")]).unwrap();
        }
        let mut bytes = backend.bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let (_, tables) =
            Journal::open(Box::new(MemoryBackend::with_data(bytes)), true, fresh()).unwrap();
        assert!(tables.folders.is_empty());
    }

    #[test]
    fn compaction_preserves_state() {
        let backend = MemoryBackend::new();
        let state = {
            let (mut journal, mut tables) =
                Journal::open(Box::new(backend.clone()), true, fresh()).unwrap();
            for i in 1..=20 {
                let change = put_folder(i, &format!("folder {i}"));
                journal.append_commit(std::slice::from_ref(&change)).unwrap();
                tables.apply(&change);
            }
            let before = journal.size().unwrap();
            journal.compact(&tables).unwrap();
            assert!(journal.size().unwrap() < before);
            assert_eq!(journal.records_since_snapshot(), 1);
            tables
        };

        let (journal, tables) = Journal::open(Box::new(backend), true, fresh()).unwrap();
        assert_eq!(tables, state);
        assert_eq!(journal.seq(), 20);
    }
}
