mod hash_storage;
mod structs;

pub use hash_storage::HashVerifiedStorage;

use crate::filesystem::{Entry, ReadableDirectory, ReadableFile, ReadableFileSystem};
use crate::formats::hfs::structs::{HashFileSystemEntry, HashFileSystemHeader};
use crate::storage::{
    ReadableStorage, ReadableStorageExt, SharedStorage, SliceStorage, SliceStorageError,
};
use binrw::BinRead;
use snafu::{ResultExt, Snafu};
use std::fmt::Debug;
use std::io::Seek;

#[derive(Snafu, Debug)]
pub struct HfsParseError {
    source: binrw::Error,
}

#[derive(Snafu, Debug)]
pub struct HfsOpenError {
    source: SliceStorageError,
}

/// The signed hierarchical file container used for cartridge partitions
/// (`HFS0` magic). Unlike `PartitionFileSystem`, every entry carries a
/// truncated-prefix SHA-256 hash that a file opened from it verifies lazily
/// as the caller reads through it (see `HashVerifiedStorage`).
#[derive(Debug)]
pub struct HashFileSystem<S: ReadableStorage> {
    storage: SharedStorage<S>,
    files: Vec<(String, HashFileSystemEntry)>,
    header_size: u64,
}

pub type FileStorage<S> = HashVerifiedStorage<SliceStorage<SharedStorage<S>>>;

pub struct Directory<'a, S: ReadableStorage> {
    fs: &'a HashFileSystem<S>,
}

pub struct File<'a, S: ReadableStorage> {
    fs: &'a HashFileSystem<S>,
    filename: &'a str,
    entry: HashFileSystemEntry,
}

impl<'a, S: ReadableStorage> Debug for Directory<'a, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directory").finish()
    }
}

impl<'a, S: ReadableStorage> Debug for File<'a, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashFileSystemFile")
            .field("filename", &self.filename)
            .field("offset", &self.entry.offset)
            .field("size", &self.entry.size)
            .finish()
    }
}

#[derive(Debug)]
pub struct DirectoryIter<'a, S: ReadableStorage> {
    fs: &'a HashFileSystem<S>,
    iter: std::slice::Iter<'a, (String, HashFileSystemEntry)>,
}

impl<'a, S: ReadableStorage> Iterator for DirectoryIter<'a, S> {
    type Item = Entry<File<'a, S>, Directory<'a, S>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|(filename, entry)| {
            Entry::File(File {
                fs: self.fs,
                filename: filename.as_str(),
                entry: entry.clone(),
            })
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.iter.size_hint()
    }

    fn count(self) -> usize {
        self.iter.count()
    }
}

fn get_string(name_table: &[u8], offset: u32) -> String {
    let start = offset as usize;
    let end = name_table[start..]
        .iter()
        .position(|&c| c == 0)
        .unwrap_or(name_table.len());

    std::str::from_utf8(&name_table[start..start + end])
        .expect("invalid utf8 in name table")
        .to_string()
}

impl<S: ReadableStorage> HashFileSystem<S> {
    pub fn new(storage: S) -> Result<Self, HfsParseError> {
        let mut io = storage.buf_read();

        let HashFileSystemHeader {
            file_entries,
            name_table,
            ..
        } = HashFileSystemHeader::read(&mut io).context(HfsParseSnafu)?;

        let files = file_entries
            .into_iter()
            .map(|e| {
                let name = get_string(&name_table, e.name_offset);
                (name, e)
            })
            .collect();

        let header_size = io.stream_position().unwrap();

        let storage = io.into_inner().into_inner().shared();
        Ok(Self {
            storage,
            files,
            header_size,
        })
    }
}

impl<S: ReadableStorage> ReadableFileSystem for HashFileSystem<S> {
    type File<'a> = File<'a, S> where Self: 'a;
    type Directory<'a> = Directory<'a, S> where Self: 'a;
    type Storage = FileStorage<S>;
    type OpenError = HfsOpenError;

    fn root(&self) -> Self::Directory<'_> {
        Directory { fs: self }
    }

    fn open_directory(&self, path: &str) -> Option<Self::Directory<'_>> {
        assert!(path.starts_with('/'));
        if path == "/" {
            Some(self.root())
        } else {
            None
        }
    }

    fn open_file(&self, path: &str) -> Option<Self::File<'_>> {
        let path = path.strip_prefix('/').unwrap();
        self.files
            .iter()
            .find(|(filename, _)| filename == path)
            .map(|(filename, entry)| File {
                fs: self,
                filename,
                entry: entry.clone(),
            })
    }
}

impl<'a, S: ReadableStorage> ReadableDirectory for Directory<'a, S> {
    type File = File<'a, S>;
    type Iter = DirectoryIter<'a, S>;

    fn name(&self) -> &str {
        ""
    }

    fn entries(&self) -> Self::Iter {
        DirectoryIter {
            fs: self.fs,
            iter: self.fs.files.iter(),
        }
    }
}

impl<'a, S: ReadableStorage> ReadableFile for File<'a, S> {
    type Storage = FileStorage<S>;
    type Error = HfsOpenError;

    fn name(&self) -> &str {
        self.filename
    }

    fn size(&self) -> u64 {
        self.entry.size
    }

    fn storage(&self) -> Result<Self::Storage, Self::Error> {
        let storage = self.fs.storage.clone();
        let offset = self.entry.offset + self.fs.header_size;
        let size = self.entry.size;
        let sliced = storage.slice(offset, size).context(HfsOpenSnafu)?;

        Ok(HashVerifiedStorage::new(
            sliced,
            self.entry.hash_target_offset,
            self.entry.hash_target_size as u64,
            self.entry.hash,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::VecStorage;
    use sha2::{Digest, Sha256};

    fn build_hfs(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut name_table = Vec::new();
        let mut offsets = Vec::new();
        for (name, _) in files {
            offsets.push(name_table.len() as u32);
            name_table.extend_from_slice(name.as_bytes());
            name_table.push(0);
        }

        let mut data = Vec::new();
        let mut entries = Vec::new();
        let mut cursor = 0u64;
        for (i, (_, content)) in files.iter().enumerate() {
            let hash: [u8; 0x20] = Sha256::digest(content).into();
            entries.push((
                cursor,
                content.len() as u64,
                offsets[i],
                content.len() as u32,
                hash,
            ));
            data.extend_from_slice(content);
            cursor += content.len() as u64;
        }

        let mut out = Vec::new();
        out.extend_from_slice(b"HFS0");
        out.extend_from_slice(&(files.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name_table.len() as u32).to_le_bytes());
        out.extend_from_slice(&[0u8; 4]);
        for (offset, size, name_offset, hash_size, hash) in entries {
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&size.to_le_bytes());
            out.extend_from_slice(&name_offset.to_le_bytes());
            out.extend_from_slice(&hash_size.to_le_bytes());
            out.extend_from_slice(&0u64.to_le_bytes()); // hash_target_offset
            out.extend_from_slice(&hash);
        }
        out.extend_from_slice(&name_table);
        out.extend_from_slice(&data);
        out
    }

    #[test]
    fn open_file_verifies_hash_on_read() {
        let raw = build_hfs(&[("secure", b"cartridge partition contents")]);
        let fs = HashFileSystem::new(VecStorage::new(raw)).unwrap();

        let file = fs.open_file("/secure").unwrap();
        let storage = file.storage().unwrap();
        let mut buf = vec![0u8; file.size() as usize];
        storage.read(0, &mut buf).unwrap();
        assert_eq!(buf, b"cartridge partition contents");
    }

    #[test]
    fn corrupted_region_fails_hash_check() {
        let mut raw = build_hfs(&[("secure", b"0123456789abcdef")]);
        // flip a byte inside the file data, past the header+entry table+name table
        let last = raw.len() - 1;
        raw[last] ^= 0xff;

        let fs = HashFileSystem::new(VecStorage::new(raw)).unwrap();
        let file = fs.open_file("/secure").unwrap();
        let storage = file.storage().unwrap();
        let mut buf = vec![0u8; file.size() as usize];
        assert!(storage.read(0, &mut buf).is_err());
    }
}
