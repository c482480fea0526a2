//! In-memory storage backend.

use super::{StorageBackend, StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// An in-memory journal backend.
///
/// Clones share the same buffer, so a test can drop a store and reopen a
/// new one over the bytes the first one left behind.
///
/// ```rust
/// use feedsync_core::storage::{MemoryBackend, StorageBackend};
///
/// let mut backend = MemoryBackend::new();
/// let reopened = backend.clone();
/// backend.append(b"record").unwrap();
/// assert_eq!(reopened.read_all().unwrap(), b"record");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend preloaded with bytes, e.g. a damaged journal.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns a copy of the stored bytes.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl StorageBackend for MemoryBackend {
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        Ok(self.data.read().clone())
    }

    fn append(&mut self, new_data: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(new_data);
        Ok(offset)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let size = data.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncatePastEnd {
                requested: new_size,
                size,
            });
        }
        data.truncate(new_size as usize);
        Ok(())
    }

    fn replace(&mut self, new_data: &[u8]) -> StorageResult<()> {
        *self.data.write() = new_data.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_returns_offsets() {
        let mut backend = MemoryBackend::new();
        assert_eq!(backend.append(b"abc").unwrap(), 0);
        assert_eq!(backend.append(b"de").unwrap(), 3);
        assert_eq!(backend.size().unwrap(), 5);
    }

    #[test]
    fn clones_share_bytes() {
        let mut backend = MemoryBackend::new();
        let other = backend.clone();
        backend.append(b"shared").unwrap();
        assert_eq!(other.bytes(), b"shared");
    }

    #[test]
    fn truncate_past_end_fails() {
        let mut backend = MemoryBackend::with_data(b"abc".to_vec());
        assert!(matches!(
            backend.truncate(10),
            Err(StorageError::TruncatePastEnd { .. })
        ));
        backend.truncate(1).unwrap();
        assert_eq!(backend.bytes(), b"a");
    }

    #[test]
    fn replace_swaps_contents() {
        let mut backend = MemoryBackend::with_data(b"old journal".to_vec());
        backend.replace(b"new").unwrap();
        assert_eq!(backend.read_all().unwrap(), b"new");
    }
}
