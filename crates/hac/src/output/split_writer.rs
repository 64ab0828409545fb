//! Shared "concatenation file" machinery (§4.13): a directory of
//! zero-padded, two-digit-numbered part files that together stand in for one
//! logical output. Used by both the SD card sink (when the logical size
//! exceeds the FAT32 limit) and the UMS FAT sink (always, per §4.13: "create
//! a plain directory with numbered 4 GiB parts").
//!
//! This module only manages bytes-on-disk bookkeeping; it knows nothing
//! about SD vs. UMS vs. free-space prechecks, which is why both sinks share
//! it rather than duplicating the rotation arithmetic.

use super::CONCATENATION_FILE_PART_SIZE;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

fn part_name(index: u32) -> String {
    format!("{index:02}")
}

/// Either a single plain file, or a directory of rotating parts, selected up
/// front at construction time and fixed for the life of the writer.
pub struct SplitWriter {
    root: PathBuf,
    mode: Mode,
    written: u64,
    total_size: u64,
    current_part_written: u64,
    current_part_index: u32,
    current_file: Option<File>,
}

enum Mode {
    Single,
    Parted,
}

impl SplitWriter {
    /// `split` selects parted mode up front; callers decide this from their
    /// own policy (SD: only when `total_size > CONCATENATION_FILE_PART_SIZE`;
    /// UMS FAT: always).
    pub fn create(root: &Path, total_size: u64, split: bool) -> std::io::Result<Self> {
        if split {
            fs::create_dir_all(root)?;
        } else if let Some(parent) = root.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut writer = Self {
            root: root.to_owned(),
            mode: if split { Mode::Parted } else { Mode::Single },
            written: 0,
            total_size,
            current_part_written: 0,
            current_part_index: 0,
            current_file: None,
        };
        writer.open_current()?;
        Ok(writer)
    }

    fn current_path(&self) -> PathBuf {
        match self.mode {
            Mode::Single => self.root.clone(),
            Mode::Parted => self.root.join(part_name(self.current_part_index)),
        }
    }

    fn open_current(&mut self) -> std::io::Result<()> {
        let path = self.current_path();
        self.current_file = Some(File::create(path)?);
        Ok(())
    }

    fn rotate(&mut self) -> std::io::Result<()> {
        self.current_part_index += 1;
        self.current_part_written = 0;
        self.open_current()
    }

    /// Writes `bytes`, silently truncating anything past `total_size` (§4.13).
    pub fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        let remaining_total = self.total_size.saturating_sub(self.written);
        let bytes = if (bytes.len() as u64) > remaining_total {
            &bytes[..remaining_total as usize]
        } else {
            bytes
        };
        if bytes.is_empty() {
            return Ok(());
        }

        let mut offset = 0usize;
        while offset < bytes.len() {
            if matches!(self.mode, Mode::Parted)
                && self.current_part_written >= CONCATENATION_FILE_PART_SIZE
            {
                self.rotate()?;
            }

            let chunk_remaining = match self.mode {
                Mode::Single => (bytes.len() - offset) as u64,
                Mode::Parted => {
                    CONCATENATION_FILE_PART_SIZE - self.current_part_written
                }
            };
            let chunk_len = std::cmp::min(chunk_remaining, (bytes.len() - offset) as u64) as usize;

            self.current_file
                .as_mut()
                .expect("opened in create()/rotate()")
                .write_all(&bytes[offset..offset + chunk_len])?;

            self.current_part_written += chunk_len as u64;
            self.written += chunk_len as u64;
            offset += chunk_len;
        }

        Ok(())
    }

    /// Rewrites `bytes` at the very start of the logical stream (the
    /// package assembler's placeholder-then-patch PFS0 header). Only ever
    /// touches the first part.
    pub fn rewrite_header(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        use std::io::{Seek, SeekFrom};

        let path = match self.mode {
            Mode::Single => self.root.clone(),
            Mode::Parted => self.root.join(part_name(0)),
        };
        let mut file = fs::OpenOptions::new().write(true).open(path)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(bytes)?;
        Ok(())
    }

    /// Deletes everything written so far (§5 cancellation).
    pub fn cancel(mut self) -> std::io::Result<()> {
        self.current_file.take();
        match self.mode {
            Mode::Single => {
                if self.root.exists() {
                    fs::remove_file(&self.root)?;
                }
            }
            Mode::Parted => {
                if self.root.exists() {
                    fs::remove_dir_all(&self.root)?;
                }
            }
        }
        Ok(())
    }

    pub fn close(mut self) -> std::io::Result<()> {
        if let Some(file) = self.current_file.take() {
            file.sync_all()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn read_parts(dir: &Path) -> Vec<(String, Vec<u8>)> {
        let mut entries: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        entries.sort();
        entries
            .into_iter()
            .map(|p| {
                let name = p.file_name().unwrap().to_str().unwrap().to_owned();
                let mut data = Vec::new();
                File::open(&p).unwrap().read_to_end(&mut data).unwrap();
                (name, data)
            })
            .collect()
    }

    #[test]
    fn single_mode_writes_one_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let mut writer = SplitWriter::create(&path, 5, false).unwrap();
        writer.write(&[1, 2, 3, 4, 5]).unwrap();
        writer.close().unwrap();

        let mut data = Vec::new();
        File::open(&path).unwrap().read_to_end(&mut data).unwrap();
        assert_eq!(data, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn split_mode_rotates_at_part_size() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("out");
        let total = CONCATENATION_FILE_PART_SIZE + 10;
        let mut writer = SplitWriter::create(&out_dir, total, true).unwrap();

        let chunk = vec![0xABu8; 1024 * 1024];
        let mut written = 0u64;
        while written < total {
            let len = std::cmp::min(chunk.len() as u64, total - written) as usize;
            writer.write(&chunk[..len]).unwrap();
            written += len as u64;
        }
        writer.close().unwrap();

        let parts = read_parts(&out_dir);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].0, "00");
        assert_eq!(parts[0].1.len() as u64, CONCATENATION_FILE_PART_SIZE);
        assert_eq!(parts[1].0, "01");
        assert_eq!(parts[1].1.len() as u64, 10);
    }

    #[test]
    fn writes_past_total_size_truncate_silently() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let mut writer = SplitWriter::create(&path, 3, false).unwrap();
        writer.write(&[1, 2, 3, 4, 5]).unwrap();
        writer.close().unwrap();

        let mut data = Vec::new();
        File::open(&path).unwrap().read_to_end(&mut data).unwrap();
        assert_eq!(data, vec![1, 2, 3]);
    }

    #[test]
    fn cancel_removes_partial_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("out");
        let mut writer = SplitWriter::create(&out_dir, 100, true).unwrap();
        writer.write(&[1, 2, 3]).unwrap();
        assert!(out_dir.exists());
        writer.cancel().unwrap();
        assert!(!out_dir.exists());
    }
}
