//! AES-CTR-EX ("BKTR") section crypto: the encryption half of a patch NCA's
//! bucket-tree indirection, where the counter's middle word is swapped out
//! per-subsection instead of following the section offset directly.
//!
//! The on-disk bucket-tree entry layout here is inferred from the shape of
//! [`PatchInfo`] (the redundant `encryption_tree_header` matches a
//! magic/version/entry-count/reserved quartet) and from the counter-swap
//! behaviour documented for this section type; it hasn't been checked against
//! a reference decrypter, so treat offsets it produces with suspicion until
//! that's done.

use crate::crypto::AesKey;
use crate::formats::nca::structs::PatchInfo;
use crate::storage::{ReadableStorage, StorageError};
use binrw::BinRead;
use snafu::{ResultExt, Snafu};
use std::io::Cursor;

#[derive(Snafu, Debug)]
pub enum BktrError {
    #[snafu(display("Encryption bucket-tree header has an unexpected magic value"))]
    BadMagic,
    #[snafu(display("Failed to read the encryption bucket-tree table"))]
    ReadTable { source: StorageError },
    #[snafu(display("Failed to parse the encryption bucket-tree table"))]
    ParseTable { source: binrw::Error },
}

#[derive(Debug, Clone, Copy, BinRead)]
#[br(little)]
struct RawEntry {
    offset: u64,
    counter_ex: u32,
    _reserved: u32,
}

#[derive(Debug, Clone, Copy)]
struct Subsection {
    /// Section-relative byte offset where this subsection begins.
    offset: u64,
    /// Replaces the counter's third 32-bit word for reads inside this subsection.
    counter_ex: u32,
}

fn base_ctr(upper_counter: u64, block_offset: u64) -> [u8; 0x10] {
    let mut ctr = [0u8; 0x10];
    ctr[..8].copy_from_slice(&upper_counter.to_be_bytes());
    ctr[8..].copy_from_slice(&block_offset.to_be_bytes());
    ctr
}

fn subsection_ctr(upper_counter: u64, counter_ex: u32, section_relative_offset: u64) -> [u8; 0x10] {
    let mut ctr = [0u8; 0x10];
    ctr[..8].copy_from_slice(&upper_counter.to_be_bytes());
    ctr[8..12].copy_from_slice(&counter_ex.to_be_bytes());
    let block_low = ((section_relative_offset >> 4) & 0xFFFF_FFFF) as u32;
    ctr[12..].copy_from_slice(&block_low.to_be_bytes());
    ctr
}

/// Decrypts a section whose encryption type is `AesCtrEx`: most of a patch
/// NCA's fragment, with the counter's subsection word swapped in from the
/// encryption bucket tree described by the section's [`PatchInfo`].
#[derive(Debug)]
pub struct BktrCryptStorage<S: ReadableStorage> {
    storage: S,
    key: AesKey,
    upper_counter: u64,
    subsections: Vec<Subsection>,
    size: u64,
}

impl<S: ReadableStorage> BktrCryptStorage<S> {
    pub fn new(
        storage: S,
        key: AesKey,
        upper_counter: u64,
        section_start: u64,
        patch_info: PatchInfo,
    ) -> Result<Self, BktrError> {
        let size = storage.get_size();

        let header = patch_info.encryption_tree_header.0;
        if &header[0..4] != b"BKTR" {
            return Err(BktrError::BadMagic);
        }
        let entry_count = u32::from_le_bytes(header[8..12].try_into().unwrap()) as usize;

        let mut subsections = Vec::with_capacity(entry_count + 1);
        if entry_count > 0 {
            let table_offset = patch_info.encryption_tree_offset;
            let aligned_offset = table_offset - table_offset % 16;
            let table_len = entry_count * 0x10;
            let table_start_in_raw = (table_offset - aligned_offset) as usize;
            let aligned_len = (table_start_in_raw + table_len + 15) / 16 * 16;

            let mut raw = vec![0u8; aligned_len];
            storage.read(aligned_offset, &mut raw).context(ReadTableSnafu)?;

            let ctr = base_ctr(upper_counter, (section_start + aligned_offset) / 16);
            key.decrypt_ctr(&mut raw, &ctr);

            let mut cur = Cursor::new(&raw[table_start_in_raw..table_start_in_raw + table_len]);
            for _ in 0..entry_count {
                let entry = RawEntry::read(&mut cur).context(ParseTableSnafu)?;
                subsections.push(Subsection {
                    offset: entry.offset,
                    counter_ex: entry.counter_ex,
                });
            }
        }

        if subsections.first().map(|s| s.offset) != Some(0) {
            subsections.insert(
                0,
                Subsection {
                    offset: 0,
                    counter_ex: 0,
                },
            );
        }
        subsections.sort_by_key(|s| s.offset);

        Ok(Self {
            storage,
            key,
            upper_counter,
            subsections,
            size,
        })
    }

    fn subsection_index_for(&self, offset: u64) -> usize {
        self.subsections
            .partition_point(|s| s.offset <= offset)
            .saturating_sub(1)
    }
}

impl<S: ReadableStorage> ReadableStorage for BktrCryptStorage<S> {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError> {
        let mut pos = offset;
        let mut remaining = buf;

        while !remaining.is_empty() {
            let sub_idx = self.subsection_index_for(pos);
            let sub = self.subsections[sub_idx];
            let sub_end = self
                .subsections
                .get(sub_idx + 1)
                .map(|s| s.offset)
                .unwrap_or(self.size);

            let align_start = pos - (pos % 16);
            let chunk_end = std::cmp::min(sub_end, pos + remaining.len() as u64);
            let aligned_len = (((chunk_end - align_start) + 15) / 16 * 16) as usize;

            let mut tmp = vec![0u8; aligned_len];
            self.storage.read(align_start, &mut tmp)?;
            let ctr = subsection_ctr(self.upper_counter, sub.counter_ex, align_start);
            self.key.decrypt_ctr(&mut tmp, &ctr);

            let copy_start = (pos - align_start) as usize;
            let copy_len = (chunk_end - pos) as usize;
            remaining[..copy_len].copy_from_slice(&tmp[copy_start..copy_start + copy_len]);

            remaining = &mut remaining[copy_len..];
            pos = chunk_end;
        }

        Ok(())
    }

    fn get_size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::VecStorage;

    #[test]
    fn single_implicit_subsection_matches_plain_ctr() {
        let key = "11".repeat(0x10).parse::<AesKey>().unwrap();
        let mut plaintext = vec![0u8; 0x40];
        for (i, b) in plaintext.iter_mut().enumerate() {
            *b = i as u8;
        }

        let mut ciphertext = plaintext.clone();
        key.encrypt_ctr(&mut ciphertext, &base_ctr(0, 0));

        let patch_info = PatchInfo {
            relocation_tree_offset: 0,
            relocation_tree_size: 0,
            relocation_tree_header: crate::hexstring::HexData([0; 0x10]),
            encryption_tree_offset: 0,
            encryption_tree_size: 0,
            encryption_tree_header: crate::hexstring::HexData([0; 0x10]), // entry_count = 0
        };

        let storage = BktrCryptStorage::new(VecStorage::new(ciphertext), key, 0, 0, patch_info)
            .expect("zero-entry table is always valid");

        let mut decrypted = vec![0u8; 0x40];
        storage.read(0, &mut decrypted).unwrap();
        assert_eq!(decrypted, plaintext);
    }
}
