//! UMS (mass-storage) removable-device output sink (§4.13): FAT-family
//! devices always split into a numbered-parts directory; exFAT and anything
//! else get a single plain file.

use super::split_writer::SplitWriter;
use super::{FreeSpaceSource, SinkError};
use crate::package::PackageSink;
use snafu::ResultExt;
use std::path::{Path, PathBuf};

use super::FileWriterSink;

/// The UMS filesystem kinds this sink distinguishes behavior for. Anything
/// not FAT12/16/32 is treated the same as exFAT: a single plain file, since
/// only the FAT family imposes the 4 GiB file-size ceiling this sink works
/// around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UmsFilesystem {
    Fat12,
    Fat16,
    Fat32,
    ExFat,
    Other,
}

impl UmsFilesystem {
    fn requires_split(self) -> bool {
        matches!(self, Self::Fat12 | Self::Fat16 | Self::Fat32)
    }
}

/// Path prefix recognized as "this output path targets a mounted UMS
/// device" (§4.13): a mounted device label, e.g. `ums0:/`.
pub fn path_targets_ums_device(path: &str) -> bool {
    path.len() > 1
        && !path.starts_with('/')
        && !path.starts_with(super::sd::SD_DEVICE_PREFIX)
        && path.contains(":/")
}

pub struct UmsSink<'a> {
    mount_root: &'a Path,
    filesystem: UmsFilesystem,
    free_space: &'a dyn FreeSpaceSource,
    writer: Option<SplitWriter>,
    header_reserved: Option<u64>,
}

impl<'a> UmsSink<'a> {
    pub fn new(
        mount_root: &'a Path,
        filesystem: UmsFilesystem,
        free_space: &'a dyn FreeSpaceSource,
    ) -> Self {
        Self {
            mount_root,
            filesystem,
            free_space,
            writer: None,
            header_reserved: None,
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let relative = path.split_once(":/").map(|(_, rest)| rest).unwrap_or(path);
        self.mount_root.join(relative)
    }
}

impl FileWriterSink for UmsSink<'_> {
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

        let root = self.resolve(path);
        self.writer = Some(
            SplitWriter::create(&root, total_size, self.filesystem.requires_split())
                .context(super::IoSnafu)?,
        );
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

impl PackageSink for UmsSink<'_> {
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
        fn free_space_bytes(&self) -> Result<u64, super::super::FreeSpaceError> {
            Ok(u64::MAX)
        }
    }

    #[test]
    fn fat_device_splits_even_for_small_files() {
        let dir = tempfile::tempdir().unwrap();
        let space = UnlimitedSpace;
        let mut sink = UmsSink::new(dir.path(), UmsFilesystem::Fat32, &space);
        sink.create_or_open("ums0:/foo.nsp", 5, None).unwrap();
        FileWriterSink::write(&mut sink, &[1, 2, 3, 4, 5]).unwrap();
        sink.close().unwrap();
        assert!(dir.path().join("foo.nsp").is_dir());
        assert!(dir.path().join("foo.nsp").join("00").is_file());
    }

    #[test]
    fn exfat_device_writes_a_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let space = UnlimitedSpace;
        let mut sink = UmsSink::new(dir.path(), UmsFilesystem::ExFat, &space);
        sink.create_or_open("ums0:/foo.nsp", 5, None).unwrap();
        FileWriterSink::write(&mut sink, &[1, 2, 3, 4, 5]).unwrap();
        sink.close().unwrap();
        assert!(dir.path().join("foo.nsp").is_file());
    }

    #[test]
    fn path_prefix_detection() {
        assert!(path_targets_ums_device("ums0:/foo.nsp"));
        assert!(!path_targets_ums_device("/foo.nsp"));
        assert!(!path_targets_ums_device(super::super::sd::SD_DEVICE_PREFIX));
    }
}
