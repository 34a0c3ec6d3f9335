use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use timber_types::StreamId;

use crate::error::{MetaError, MetaResult};
use crate::memory::{index_ops, StreamIndex};
use crate::record::SuperblockRecord;
use crate::traits::MetaStore;

/// Frame header: 4 bytes entry length + 4 bytes CRC32 (both little-endian).
const HEADER_SIZE: usize = 8;

/// One journaled mutation.
///
/// On-disk format per frame:
/// ```text
/// [4 bytes: entry length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized JournalEntry)]
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
enum JournalEntry {
    Append(SuperblockRecord),
    Unlink {
        stream: StreamId,
        from: u64,
        until: u64,
    },
    Remove(StreamId),
}

struct JournalWriter {
    writer: BufWriter<File>,
    offset: u64,
}

/// Durable superblock store backed by an append-only journal file.
///
/// Every mutation is framed, checksummed, and fsynced before the in-memory
/// index is updated. On open the journal is replayed front-to-back; the first
/// invalid frame is treated as a torn write from a crash, and the file is
/// truncated there so subsequent appends continue from a clean tail.
pub struct JournalMetaStore {
    path: PathBuf,
    writer: Mutex<JournalWriter>,
    index: RwLock<StreamIndex>,
}

impl JournalMetaStore {
    /// Open (or create) the journal at the given path and rebuild the index.
    pub fn open(path: &Path) -> MetaResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let (index, valid_len, total) = match File::open(path) {
            Ok(file) => Self::replay(file)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => (StreamIndex::new(), 0, 0),
            Err(e) => return Err(e.into()),
        };

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        if file.metadata()?.len() > valid_len {
            warn!(
                path = %path.display(),
                valid_len,
                "truncating torn journal tail"
            );
            file.set_len(valid_len)?;
        }
        let mut file = file;
        file.seek(SeekFrom::Start(valid_len))?;

        debug!(path = %path.display(), entries = total, "meta journal opened");
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(JournalWriter {
                writer: BufWriter::new(file),
                offset: valid_len,
            }),
            index: RwLock::new(index),
        })
    }

    /// Path of the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replay all valid frames. Returns the rebuilt index, the byte length of
    /// the valid prefix, and the number of entries applied.
    fn replay(file: File) -> MetaResult<(StreamIndex, u64, usize)> {
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut index = StreamIndex::new();
        let mut offset: u64 = 0;
        let mut applied = 0usize;

        while offset + HEADER_SIZE as u64 <= file_len {
            let mut header = [0u8; HEADER_SIZE];
            match reader.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            if length == 0 || offset + HEADER_SIZE as u64 + length as u64 > file_len {
                warn!(offset, length, "invalid journal frame length; stopping replay");
                break;
            }

            let mut payload = vec![0u8; length as usize];
            match reader.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    warn!(offset, "truncated journal frame; stopping replay");
                    break;
                }
                Err(e) => return Err(e.into()),
            }

            if crc32fast::hash(&payload) != expected_crc {
                warn!(offset, "journal frame CRC mismatch; stopping replay");
                break;
            }

            let entry: JournalEntry = match bincode::deserialize(&payload) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(offset, error = %e, "undecodable journal frame; stopping replay");
                    break;
                }
            };
            Self::apply(&mut index, entry);

            offset += HEADER_SIZE as u64 + length as u64;
            applied += 1;
        }

        Ok((index, offset, applied))
    }

    fn apply(index: &mut StreamIndex, entry: JournalEntry) {
        match entry {
            JournalEntry::Append(record) => {
                if let Err(e) = index_ops::append(index, &record) {
                    // A journal replayed from disk should never conflict with
                    // itself; keep the first-written record and continue.
                    warn!(error = %e, "conflicting record during journal replay");
                }
            }
            JournalEntry::Unlink {
                stream,
                from,
                until,
            } => {
                index_ops::mark_unlinked(index, stream, from, until);
            }
            JournalEntry::Remove(stream) => {
                index_ops::remove_stream(index, stream);
            }
        }
    }

    /// Frame, checksum, append, and fsync one entry.
    fn write_frame(w: &mut JournalWriter, entry: &JournalEntry) -> MetaResult<()> {
        let payload =
            bincode::serialize(entry).map_err(|e| MetaError::Serialization(e.to_string()))?;
        let length = payload.len() as u32;
        let crc = crc32fast::hash(&payload);

        w.writer.write_all(&length.to_le_bytes())?;
        w.writer.write_all(&crc.to_le_bytes())?;
        w.writer.write_all(&payload)?;
        w.writer.flush()?;
        w.writer.get_ref().sync_all()?;

        w.offset += HEADER_SIZE as u64 + payload.len() as u64;
        Ok(())
    }
}

#[async_trait]
impl MetaStore for JournalMetaStore {
    async fn latest(&self, stream: StreamId) -> MetaResult<Option<SuperblockRecord>> {
        let index = self.index.read().expect("meta index poisoned");
        Ok(index_ops::latest(&index, stream))
    }

    async fn at(&self, stream: StreamId, version: u64) -> MetaResult<Option<SuperblockRecord>> {
        let index = self.index.read().expect("meta index poisoned");
        Ok(index_ops::at(&index, stream, version))
    }

    async fn append(&self, record: &SuperblockRecord) -> MetaResult<()> {
        // The writer mutex serializes all mutations, so the duplicate check
        // cannot race with a concurrent append of the same version.
        let mut w = self.writer.lock().expect("journal writer poisoned");
        {
            let index = self.index.read().expect("meta index poisoned");
            if let Some(existing) =
                index_ops::at(&index, record.stream, record.version)
            {
                if existing == *record {
                    return Ok(());
                }
                return Err(MetaError::Duplicate {
                    stream: record.stream,
                    version: record.version,
                });
            }
        }

        Self::write_frame(&mut w, &JournalEntry::Append(record.clone()))?;

        let mut index = self.index.write().expect("meta index poisoned");
        index_ops::append(&mut index, record)
    }

    async fn mark_unlinked(&self, stream: StreamId, from: u64, until: u64) -> MetaResult<u64> {
        let mut w = self.writer.lock().expect("journal writer poisoned");
        let would_mark = {
            let index = self.index.read().expect("meta index poisoned");
            index
                .get(&stream)
                .map(|versions| {
                    versions
                        .range(from..until)
                        .filter(|(_, r)| !r.unlinked)
                        .count() as u64
                })
                .unwrap_or(0)
        };
        if would_mark == 0 {
            return Ok(0);
        }

        Self::write_frame(
            &mut w,
            &JournalEntry::Unlink {
                stream,
                from,
                until,
            },
        )?;

        let mut index = self.index.write().expect("meta index poisoned");
        Ok(index_ops::mark_unlinked(&mut index, stream, from, until))
    }

    async fn remove_stream(&self, stream: StreamId) -> MetaResult<u64> {
        let mut w = self.writer.lock().expect("journal writer poisoned");
        let present = {
            let index = self.index.read().expect("meta index poisoned");
            index.get(&stream).map(|v| v.len() as u64).unwrap_or(0)
        };
        if present == 0 {
            return Ok(0);
        }

        Self::write_frame(&mut w, &JournalEntry::Remove(stream))?;

        let mut index = self.index.write().expect("meta index poisoned");
        Ok(index_ops::remove_stream(&mut index, stream))
    }
}
