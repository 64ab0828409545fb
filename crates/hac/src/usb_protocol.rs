//! Host-tool wire protocol (§6): the length-prefixed command/response
//! framing a USB bulk endpoint carries between this crate and a connected
//! desktop host tool.
//!
//! This module models the wire types only — the frame header, the command
//! enum, and an encode/decode codec for one frame — not the USB transport
//! itself, matching the spec's scoping rule that the console-specific
//! service bindings (and, by extension, the actual USB stack) are opaque
//! system calls this crate doesn't talk to directly. [`output::usb`] is the
//! sink that drives this codec against a caller-supplied [`UsbTransport`].

use binrw::{BinRead, BinWrite};
use snafu::Snafu;

/// 4-byte magic opening every frame, matching the "NXDT-style" framing the
/// spec calls out.
pub const FRAME_MAGIC: u32 = u32::from_le_bytes(*b"NXDT");

#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(repr = u32)]
pub enum UsbCommandId {
    FileProperties = 0,
    FileData = 1,
    NspProperties = 2,
    NspHeader = 3,
    Cancel = 4,
}

#[derive(Snafu, Debug)]
pub enum FrameError {
    #[snafu(display("frame magic mismatch: expected {FRAME_MAGIC:#010x}, got {actual:#010x}"))]
    BadMagic { actual: u32 },
    #[snafu(display("failed to parse frame header"))]
    Parse { source: binrw::Error },
    #[snafu(display("failed to serialize frame header"))]
    Serialize { source: binrw::Error },
}

/// The fixed-size header in front of every frame's payload: magic, command
/// id, payload length. The payload itself is read separately by the caller
/// once it knows how many bytes follow.
#[derive(Debug, Clone, Copy, BinRead, BinWrite)]
#[brw(little, magic = b"NXDT")]
pub struct FrameHeader {
    pub command: UsbCommandId,
    pub payload_len: u32,
}

impl FrameHeader {
    pub const ENCODED_SIZE: usize = 4 + 4 + 4;

    pub fn encode(command: UsbCommandId, payload_len: u32) -> Result<Vec<u8>, FrameError> {
        let header = FrameHeader {
            command,
            payload_len,
        };
        let mut out = Vec::with_capacity(Self::ENCODED_SIZE);
        header
            .write(&mut std::io::Cursor::new(&mut out))
            .context(SerializeSnafu)?;
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        FrameHeader::read(&mut std::io::Cursor::new(bytes)).context(ParseSnafu)
    }
}

use snafu::ResultExt;

/// `file_properties` payload: total size, file name, and — for a package
/// dump — the reserved header size the host should seek back and patch once
/// it receives `nsp_header`.
#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub struct FileProperties {
    pub total_size: u64,
    #[bw(calc = file_name.len() as u32)]
    pub file_name_len: u32,
    #[br(count = file_name_len)]
    pub file_name: Vec<u8>,
    /// `0` means "no package header to patch back in", matching how a plain
    /// content/raw-image dump carries no `nsp_header_size`.
    pub nsp_header_size: u64,
}

impl FileProperties {
    pub fn new(total_size: u64, file_name: &str, nsp_header_size: Option<u64>) -> Self {
        Self {
            total_size,
            file_name: file_name.as_bytes().to_vec(),
            nsp_header_size: nsp_header_size.unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_header_round_trips() {
        let encoded = FrameHeader::encode(UsbCommandId::FileData, 0x1234).unwrap();
        assert_eq!(encoded.len(), FrameHeader::ENCODED_SIZE);
        let decoded = FrameHeader::decode(&encoded).unwrap();
        assert_eq!(decoded.command, UsbCommandId::FileData);
        assert_eq!(decoded.payload_len, 0x1234);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = FrameHeader::encode(UsbCommandId::Cancel, 0).unwrap();
        bytes[0] ^= 0xFF;
        assert!(FrameHeader::decode(&bytes).is_err());
    }

    #[test]
    fn file_properties_round_trips_through_binrw() {
        let props = FileProperties::new(0x1000, "foo.nsp", Some(0x200));
        let mut bytes = Vec::new();
        props.write(&mut std::io::Cursor::new(&mut bytes)).unwrap();
        let read_back = FileProperties::read(&mut std::io::Cursor::new(&bytes)).unwrap();
        assert_eq!(read_back.total_size, 0x1000);
        assert_eq!(read_back.file_name, b"foo.nsp");
        assert_eq!(read_back.nsp_header_size, 0x200);
    }
}
