use crate::hexstring::HexData;
use crate::ids::TitleId;
use binrw::{BinRead, BinWrite};

pub const GAMECARD_MEDIA_UNIT_SIZE: u64 = 0x200;
/// Offset of the certificate block within the cartridge's logical image,
/// past the header and the root hash filesystem's usual extent.
pub const GAMECARD_CERT_OFFSET: u64 = 0x7000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(repr = u8)]
pub enum RomSize {
    Size1Gb = 0xfa,
    Size2Gb = 0xf8,
    Size4Gb = 0xf0,
    Size8Gb = 0xe0,
    Size16Gb = 0xe1,
    Size32Gb = 0xe2,
}

impl RomSize {
    /// Total cartridge capacity in bytes, media-unit padding included.
    pub fn capacity(self) -> u64 {
        let gb = match self {
            RomSize::Size1Gb => 1,
            RomSize::Size2Gb => 2,
            RomSize::Size4Gb => 4,
            RomSize::Size8Gb => 8,
            RomSize::Size16Gb => 16,
            RomSize::Size32Gb => 32,
        };
        gb * 0x4000_0000
    }
}

/// The cartridge's plaintext header, starting at the `HEAD` magic: the root
/// hash filesystem's location and the fields needed to compute both
/// dump-size variants (§4.10). The 0x100-byte RSA-2048 signature that
/// precedes this magic in the logical image is read separately, since it
/// covers bytes outside this struct.
#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little, magic = b"HEAD")]
pub struct GameCardHeader {
    pub package_id: HexData<0x8>,
    pub valid_data_end_address: u32,
    #[brw(pad_before = 0x4)]
    pub partition_fs_header_hash: HexData<0x20>,
    pub partition_fs_header_address: u64,
    pub partition_fs_header_size: u64,
    pub secure_area_hash: HexData<0x20>,
    pub rom_size: RomSize,
    pub flags: u8,
    pub key_index: u8,
    #[brw(pad_after = 0x1)]
    pub header_version: u8,
    /// AES-128-CBC encrypted with `gc_cardinfo_key`; see
    /// [`super::CardInfo`] for the decrypted layout.
    pub encrypted_card_info: HexData<0x70>,
}

/// The decrypted contents of [`GameCardHeader::encrypted_card_info`]: access
/// timings for the cartridge reader, the bundled update partition's version
/// and title id, and the LAFW/compatibility fields gating insertion (§4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct CardInfo {
    pub firmware_version: u64,
    pub access_control_flags: u32,
    pub read_wait_time1: u32,
    pub read_wait_time2: u32,
    pub write_wait_time1: u32,
    pub write_wait_time2: u32,
    pub firmware_mode: u32,
    pub cup_version: u32,
    pub compatibility_type: u8,
    #[brw(pad_before = 0x7)]
    pub cup_title_id: TitleId,
    #[brw(pad_size_to = 0x3c)]
    pub upp_hash: HexData<0x8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::BinRead;
    use std::io::Cursor;

    #[test]
    fn rejects_wrong_magic() {
        let mut data = vec![0u8; 0x60];
        data[0..4].copy_from_slice(b"NOPE");
        assert!(GameCardHeader::read(&mut Cursor::new(data)).is_err());
    }
}
