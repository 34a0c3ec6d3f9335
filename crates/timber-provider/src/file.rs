use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use timber_types::DBSIZE;

use crate::error::{ProviderError, ProviderResult};
use crate::traits::StorageProvider;

/// Slot header: 4 bytes payload length (little-endian u32).
const SLOT_HEADER: usize = 4;

/// Name of the data file inside the storage directory.
const DATA_FILE: &str = "blocks.dat";

/// Slotted single-file storage provider.
///
/// Block `addr` lives at byte offset `addr * DBSIZE`; each slot holds a u32
/// length header followed by the payload. Slot 0 is reserved (address 0 means
/// "no root") and is never written. Allocation reserves the slot on disk by
/// extending the file, so the next-address counter can be recovered from the
/// file length on reopen.
pub struct FileStorageProvider {
    path: PathBuf,
    inner: Mutex<FileState>,
}

struct FileState {
    file: File,
    next_addr: u64,
}

impl FileStorageProvider {
    /// Open (or create) the data file under the given storage directory.
    pub fn open(dir: &Path) -> ProviderResult<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(DATA_FILE);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;

        let len = file.metadata()?.len();
        // Recover the allocation cursor: one slot per DBSIZE, partial tail
        // slots count as allocated. Slot 0 is always reserved.
        let next_addr = (len.div_ceil(DBSIZE as u64)).max(1);

        debug!(path = %path.display(), next_addr, "file provider opened");
        Ok(Self {
            path,
            inner: Mutex::new(FileState { file, next_addr }),
        })
    }

    /// Path of the backing data file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of allocated slots (including never-written ones).
    pub fn allocated(&self) -> u64 {
        self.inner.lock().expect("provider lock poisoned").next_addr - 1
    }
}

impl StorageProvider for FileStorageProvider {
    fn allocate(&self) -> ProviderResult<u64> {
        let mut state = self.inner.lock().expect("provider lock poisoned");
        let addr = state.next_addr;
        state.next_addr += 1;
        // Reserve the slot on disk so the cursor survives reopen.
        let end = state.next_addr * DBSIZE as u64;
        state.file.set_len(end)?;
        Ok(addr)
    }

    fn write(&self, addr: u64, payload: &[u8]) -> ProviderResult<()> {
        if payload.len() > DBSIZE - SLOT_HEADER {
            return Err(ProviderError::BlockTooLarge {
                len: payload.len(),
                max: DBSIZE - SLOT_HEADER,
            });
        }
        let mut state = self.inner.lock().expect("provider lock poisoned");
        if addr == 0 || addr >= state.next_addr {
            return Err(ProviderError::UnallocatedAddress(addr));
        }

        let offset = addr * DBSIZE as u64;
        state.file.seek(SeekFrom::Start(offset))?;
        state.file.write_all(&(payload.len() as u32).to_le_bytes())?;
        state.file.write_all(payload)?;
        Ok(())
    }

    fn read(&self, addr: u64, scratch: &mut [u8]) -> ProviderResult<usize> {
        let mut state = self.inner.lock().expect("provider lock poisoned");
        if addr == 0 || addr >= state.next_addr {
            return Err(ProviderError::UnallocatedAddress(addr));
        }

        let offset = addr * DBSIZE as u64;
        state.file.seek(SeekFrom::Start(offset))?;
        let mut header = [0u8; SLOT_HEADER];
        state.file.read_exact(&mut header)?;
        let len = u32::from_le_bytes(header) as usize;

        if len == 0 {
            // Allocated slot that was never written.
            return Err(ProviderError::BlockNotFound(addr));
        }
        if len > DBSIZE - SLOT_HEADER {
            return Err(ProviderError::CorruptSlot {
                addr,
                reason: format!("slot header claims {len} payload bytes"),
            });
        }
        if len > scratch.len() {
            return Err(ProviderError::ScratchTooSmall {
                scratch: scratch.len(),
                needed: len,
            });
        }

        state.file.read_exact(&mut scratch[..len])?;
        Ok(len)
    }
}
