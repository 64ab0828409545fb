//! File writer sink (§4.13): split-aware output streaming for SD card, UMS
//! (FAT/exFAT) removable media, and a connected USB host tool.
//!
//! The three concrete sinks ([`sd::SdCardSink`], [`ums::UmsSink`],
//! [`usb::UsbHostSink`]) all implement the same small capability interface
//! sketched in §9's "Polymorphism across output sinks" note, rather than
//! sharing a base class: `create_or_open` / `write` / `rewrite_nsp_header` /
//! `cancel` / `close`. [`crate::package::PackageSink`] is a narrower slice of
//! the same interface (just `write`/`rewrite_header`), and every sink here
//! also implements it directly so a package assembly can stream straight into
//! one.

pub mod sd;
pub mod split_writer;
pub mod ums;
pub mod usb;

use snafu::Snafu;

/// Size a part is rotated at: the FAT32 per-file size ceiling, `4 GiB - 1`
/// (`0xFFFF_FFFF`), matching §4.13's prose and S6's literal part sizes. A
/// part is rotated once its accumulated size *reaches* this limit, not when
/// the next write would exceed it, so a write that exactly fills a part
/// rotates on the next call.
pub const CONCATENATION_FILE_PART_SIZE: u64 = 0xFFFF_FFFF;

/// The raw FAT32 per-file size ceiling. Equal to
/// [`CONCATENATION_FILE_PART_SIZE`]; kept as a separate name since the two
/// constants answer different questions (the absolute limit vs. the size
/// this writer rotates at).
pub const FAT32_MAX_FILE_SIZE: u64 = 0xFFFF_FFFF;

/// Replaces filesystem-hostile characters for devices enforcing
/// stricter-than-POSIX naming (§6): each of `\/:*?"<>|` and any ASCII
/// control character is replaced with `_`.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || (c as u32) < 0x20 {
                '_'
            } else {
                c
            }
        })
        .collect()
}

#[derive(Snafu, Debug)]
pub enum FreeSpaceError {
    #[snafu(display("failed to query free space on the output device"))]
    Query { source: std::io::Error },
}

/// The free-space precheck every sink runs before creating anything (§4.13).
pub trait FreeSpaceSource {
    fn free_space_bytes(&self) -> Result<u64, FreeSpaceError>;
}

#[derive(Snafu, Debug)]
pub enum SinkError {
    #[snafu(display(
        "not enough free space for a {needed}-byte output: {available} bytes available"
    ))]
    InsufficientSpace { needed: u64, available: u64 },
    #[snafu(display("failed to query free space"))]
    FreeSpace { source: FreeSpaceError },
    #[snafu(display("I/O error writing output"))]
    Io { source: std::io::Error },
    #[snafu(display("rewrite_nsp_header called before create_or_open, or without a declared header size"))]
    NoHeaderReserved,
    #[snafu(display("header rewrite is larger than the reserved header size"))]
    HeaderTooLarge { reserved: u64, actual: u64 },
    #[snafu(display("sink used before create_or_open"))]
    NotOpen,
}

/// The full output-sink capability (§4.13, §9): one `create_or_open` per
/// logical output, then a stream of `write` calls, an optional
/// `rewrite_nsp_header` once the true header bytes are known (package
/// assembly writes a zeroed placeholder first and comes back to patch it),
/// and either `close` on success or `cancel` to tear everything down.
///
/// Writes past the total size declared at `create_or_open` silently
/// truncate, matching §4.13's writer-sink note; callers that need to know
/// when that happens should track their own byte count (the package
/// assembler does, via its entry table).
pub trait FileWriterSink {
    type Error: std::error::Error + 'static;

    /// `nsp_header_size`, when set, reserves that many bytes at the front of
    /// the output for a later `rewrite_nsp_header` call (the package
    /// assembler's placeholder-then-patch PFS0 header).
    fn create_or_open(
        &mut self,
        path: &str,
        total_size: u64,
        nsp_header_size: Option<u64>,
    ) -> Result<(), Self::Error>;

    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;

    fn rewrite_nsp_header(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Cooperative cancellation (§5): deletes partial output, closes open
    /// handles. There is no hard abort; callers reach this by checking their
    /// own cancel flag between chunks.
    fn cancel(&mut self) -> Result<(), Self::Error>;

    fn close(&mut self) -> Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_filename_replaces_reserved_and_control_chars() {
        assert_eq!(sanitize_filename("a:b/c*d?e\"f<g>h|i"), "a_b_c_d_e_f_g_h_i");
        assert_eq!(sanitize_filename("a\u{0007}b"), "a_b");
        assert_eq!(sanitize_filename("Super Mario Odyssey.nsp"), "Super Mario Odyssey.nsp");
    }
}
