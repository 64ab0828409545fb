use crate::storage::{ReadableStorage, StorageError};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

/// Wraps a file's storage with the lazy SHA-256 accumulator HFS entries carry.
///
/// The hash covers only the first `hashed_region_size` bytes of the file (the
/// "hashed region"); bytes beyond that are unverified. Hashing happens
/// incrementally as callers read through the file sequentially (the
/// documented access pattern for a single reader, see the crate's
/// concurrency notes) rather than all at once on open, so a caller that never
/// reads the hashed region pays nothing for it. Once the accumulator has
/// consumed the whole hashed region, the computed digest is compared against
/// the stored one; a mismatch poisons the storage and every subsequent read
/// (even ones that don't touch the hashed region) fails with
/// `HashMismatch`.
#[derive(Debug)]
pub struct HashVerifiedStorage<S> {
    inner: S,
    hash_region_offset: u64,
    hash_region_end: u64,
    expected_hash: [u8; 0x20],
    state: Mutex<HashState>,
}

#[derive(Debug)]
enum HashState {
    Hashing { hasher: Sha256, consumed: u64 },
    Verified,
    Mismatch,
}

impl<S: ReadableStorage> HashVerifiedStorage<S> {
    pub fn new(
        inner: S,
        hash_region_offset: u64,
        hash_region_size: u64,
        expected_hash: [u8; 0x20],
    ) -> Self {
        let state = if hash_region_size == 0 {
            HashState::Verified
        } else {
            HashState::Hashing {
                hasher: Sha256::new(),
                consumed: hash_region_offset,
            }
        };

        Self {
            inner,
            hash_region_offset,
            hash_region_end: hash_region_offset + hash_region_size,
            expected_hash,
            state: Mutex::new(state),
        }
    }

    /// Feeds any newly-read bytes covering `[offset, offset+buf.len())` into
    /// the accumulator, in order, ignoring bytes outside
    /// `[hash_region_offset, hash_region_end)` and any already-consumed prefix.
    fn observe(&self, offset: u64, buf: &[u8]) -> Result<(), StorageError> {
        let mut state = self.state.lock();

        let (hasher, consumed) = match &mut *state {
            HashState::Verified => return Ok(()),
            HashState::Mismatch => return Err(StorageError::IntegrityCheckFailed {}),
            HashState::Hashing { hasher, consumed } => (hasher, consumed),
        };

        let end = offset.saturating_add(buf.len() as u64);
        if end <= *consumed || offset >= self.hash_region_end {
            // nothing new in the hashed region
        } else {
            let feed_start = (*consumed).max(offset);
            let feed_end = end.min(self.hash_region_end);
            if feed_end > feed_start {
                let buf_start = (feed_start - offset) as usize;
                let buf_end = (feed_end - offset) as usize;
                hasher.update(&buf[buf_start..buf_end]);
                *consumed = feed_end;
            }
        }

        if *consumed >= self.hash_region_end {
            let hasher = std::mem::replace(hasher, Sha256::new());
            let digest: [u8; 0x20] = hasher.finalize().into();
            if digest == self.expected_hash {
                *state = HashState::Verified;
                Ok(())
            } else {
                *state = HashState::Mismatch;
                Err(StorageError::IntegrityCheckFailed {})
            }
        } else {
            Ok(())
        }
    }
}

impl<S: ReadableStorage> ReadableStorage for HashVerifiedStorage<S> {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError> {
        self.inner.read(offset, buf)?;
        self.observe(offset, buf)
    }

    fn get_size(&self) -> u64 {
        self.inner.get_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::VecStorage;

    fn hash_of(data: &[u8]) -> [u8; 0x20] {
        Sha256::digest(data).into()
    }

    #[test]
    fn matching_hash_verifies_across_split_reads() {
        let data = vec![0x42u8; 0x100];
        let expected = hash_of(&data);
        let storage = HashVerifiedStorage::new(VecStorage::new(data.clone()), 0, 0x100, expected);

        let mut buf = vec![0u8; 0x80];
        storage.read(0, &mut buf).unwrap();
        storage.read(0x80, &mut buf).unwrap();
    }

    #[test]
    fn mismatch_surfaces_once_region_consumed() {
        let data = vec![0x42u8; 0x100];
        let wrong_hash = hash_of(b"not the right data");
        let storage = HashVerifiedStorage::new(VecStorage::new(data), 0, 0x100, wrong_hash);

        let mut buf = vec![0u8; 0xff];
        storage.read(0, &mut buf).unwrap();

        let mut last_byte = [0u8; 1];
        let err = storage.read(0xff, &mut last_byte);
        assert!(err.is_err());

        // Once poisoned, even re-reading the already-consumed prefix fails.
        let err = storage.read(0, &mut buf);
        assert!(err.is_err());
    }
}
