//! SD card output sink (§4.13): a single file, unless the logical size
//! exceeds the FAT32 file-size limit, in which case a "concatenation file"
//! directory of numbered parts is used instead.

use super::split_writer::SplitWriter;
use super::{FreeSpaceError, FreeSpaceSource, SinkError};
use crate::package::PackageSink;
use snafu::ResultExt;
use std::path::{Path, PathBuf};

use super::FileWriterSink;

/// Prefix recognized as "this output path targets the SD card" (§4.13: "path
/// begins with the SD device prefix"). Matches the console's own convention
/// for the SD card mount point.
pub const SD_DEVICE_PREFIX: &str = "sdmc:/";

pub fn path_targets_sd_card(path: &str) -> bool {
    path.starts_with(SD_DEVICE_PREFIX)
}

pub struct SdCardSink<'a> {
    mount_root: &'a Path,
    free_space: &'a dyn FreeSpaceSource,
    writer: Option<SplitWriter>,
    header_reserved: Option<u64>,
}

impl<'a> SdCardSink<'a> {
    /// `mount_root` is the host filesystem path the SD card prefix resolves
    /// to (the caller strips [`SD_DEVICE_PREFIX`] and joins the remainder
    /// onto this root).
    pub fn new(mount_root: &'a Path, free_space: &'a dyn FreeSpaceSource) -> Self {
        Self {
            mount_root,
            free_space,
            writer: None,
            header_reserved: None,
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let relative = path.strip_prefix(SD_DEVICE_PREFIX).unwrap_or(path);
        self.mount_root.join(relative)
    }
}

impl FileWriterSink for SdCardSink<'_> {
    type Error = SinkError;

    fn create_or_open(
        &mut self,
        path: &str,
        total_size: u64,
        nsp_header_size: Option<u64>,
    ) -> Result<(), Self::Error> {
        let available = self
            .free_space
            .free_space_bytes()
            .context(super::FreeSpaceSnafu)?;
        if available < total_size {
            return Err(SinkError::InsufficientSpace {
                needed: total_size,
                available,
            });
        }

        let split = total_size > super::FAT32_MAX_FILE_SIZE - 1;
        let root = self.resolve(path);
        self.writer =
            Some(SplitWriter::create(&root, total_size, split).context(super::IoSnafu)?);
        self.header_reserved = nsp_header_size;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.writer
            .as_mut()
            .ok_or(SinkError::NotOpen)?
            .write(bytes)
            .context(super::IoSnafu)
    }

    fn rewrite_nsp_header(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        let reserved = self.header_reserved.ok_or(SinkError::NoHeaderReserved)?;
        if bytes.len() as u64 > reserved {
            return Err(SinkError::HeaderTooLarge {
                reserved,
                actual: bytes.len() as u64,
            });
        }
        self.writer
            .as_mut()
            .ok_or(SinkError::NotOpen)?
            .rewrite_header(bytes)
            .context(super::IoSnafu)
    }

    fn cancel(&mut self) -> Result<(), Self::Error> {
        if let Some(writer) = self.writer.take() {
            writer.cancel().context(super::IoSnafu)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        if let Some(writer) = self.writer.take() {
            writer.close().context(super::IoSnafu)?;
        }
        Ok(())
    }
}

impl PackageSink for SdCardSink<'_> {
    type Error = SinkError;

    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        FileWriterSink::write(self, bytes)
    }

    fn rewrite_header(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.rewrite_nsp_header(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct UnlimitedSpace;
    impl FreeSpaceSource for UnlimitedSpace {
        fn free_space_bytes(&self) -> Result<u64, FreeSpaceError> {
            Ok(u64::MAX)
        }
    }

    struct NoSpace;
    impl FreeSpaceSource for NoSpace {
        fn free_space_bytes(&self) -> Result<u64, FreeSpaceError> {
            Ok(0)
        }
    }

    #[test]
    fn path_prefix_detection() {
        assert!(path_targets_sd_card("sdmc:/switch/foo.nsp"));
        assert!(!path_targets_sd_card("/mnt/ums0/foo.nsp"));
    }

    #[test]
    fn insufficient_space_is_rejected_before_any_write() {
        let dir = tempfile::tempdir().unwrap();
        let space = NoSpace;
        let mut sink = SdCardSink::new(dir.path(), &space);
        let err = sink
            .create_or_open("sdmc:/foo.nsp", 100, None)
            .unwrap_err();
        assert!(matches!(err, SinkError::InsufficientSpace { .. }));
        assert!(!dir.path().join("foo.nsp").exists());
    }

    #[test]
    fn small_file_does_not_split() {
        let dir = tempfile::tempdir().unwrap();
        let space = UnlimitedSpace;
        let mut sink = SdCardSink::new(dir.path(), &space);
        sink.create_or_open("sdmc:/foo.nsp", 5, None).unwrap();
        FileWriterSink::write(&mut sink, &[1, 2, 3, 4, 5]).unwrap();
        sink.close().unwrap();
        assert!(dir.path().join("foo.nsp").is_file());
    }
}
