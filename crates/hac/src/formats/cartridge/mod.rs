//! The cartridge as a logical read device (§4.10): a concatenation of the
//! normal and secure storage areas exposed by the cartridge handle, the
//! plaintext header and card-info parsed out of it, and the insertion state
//! machine that gates access to all of the above.

mod structs;

use crate::crypto::keyset::{KeySet, MissingKeyError};
use crate::storage::{ConcatStorage2, ReadableStorage, StorageError};
use binrw::BinRead;
use snafu::{ResultExt, Snafu};
use std::io::Cursor;

pub use structs::{CardInfo, GameCardHeader, RomSize, GAMECARD_CERT_OFFSET, GAMECARD_MEDIA_UNIT_SIZE};

/// The cartridge's logical image: the normal and secure storage areas
/// concatenated into the single address space every other cartridge
/// operation (header, root hash filesystem, certificate block) is read
/// through.
pub type LogicalImage<N, S> = ConcatStorage2<N, S>;

#[derive(Snafu, Debug)]
pub enum CartridgeOpenError {
    #[snafu(display("Failed to read the cartridge header"))]
    ReadHeader { source: StorageError },
    #[snafu(display("Failed to parse the cartridge header"))]
    ParseHeader { source: binrw::Error },
    #[snafu(display("Missing gc_cardinfo_key to decrypt the card-info block"))]
    MissingCardInfoKey { source: MissingKeyError },
    #[snafu(display("Failed to parse the decrypted card-info block"))]
    ParseCardInfo { source: binrw::Error },
}

/// A successfully-opened cartridge: `InsertedInfoLoaded` in the state
/// machine's terms. Constructing one performs every step of §4.10's
/// `Processing` transition except the title-database re-enumeration, which
/// is the caller's job (it needs a whole filesystem view, not just the
/// logical image).
#[derive(Debug)]
pub struct Cartridge<N: ReadableStorage, S: ReadableStorage> {
    image: LogicalImage<N, S>,
    header: GameCardHeader,
    card_info: CardInfo,
}

impl<N: ReadableStorage, S: ReadableStorage> Cartridge<N, S> {
    pub fn open(key_set: &KeySet, normal_area: N, secure_area: S) -> Result<Self, CartridgeOpenError> {
        let image = LogicalImage::new(normal_area, secure_area);

        let mut header_bytes = vec![0u8; 0x200];
        image.read(0, &mut header_bytes).context(ReadHeaderSnafu)?;
        let header =
            GameCardHeader::read(&mut Cursor::new(&header_bytes)).context(ParseHeaderSnafu)?;

        let card_info_key = key_set
            .gc_cardinfo_key(false)
            .context(MissingCardInfoKeySnafu)?;
        let mut card_info_bytes = header.encrypted_card_info.0;
        // the card-info block is the only part of the header that's
        // encrypted; the IV is the all-zero block, matching how the rest of
        // the header (unlike NCA headers) carries no per-instance tweak.
        card_info_key.decrypt_cbc(&mut card_info_bytes, &[0u8; 0x10]);
        let card_info =
            CardInfo::read(&mut Cursor::new(&card_info_bytes)).context(ParseCardInfoSnafu)?;

        Ok(Self {
            image,
            header,
            card_info,
        })
    }

    pub fn header(&self) -> &GameCardHeader {
        &self.header
    }

    pub fn card_info(&self) -> &CardInfo {
        &self.card_info
    }

    pub fn image(&self) -> &LogicalImage<N, S> {
        &self.image
    }

    /// Total dump size: the full padded capacity declared by the header's
    /// ROM size class.
    pub fn total_size(&self) -> u64 {
        self.header.rom_size.capacity()
    }

    /// Trimmed dump size: only the bytes actually written to the cartridge.
    pub fn trimmed_size(&self) -> u64 {
        0x200 + self.header.valid_data_end_address as u64 * GAMECARD_MEDIA_UNIT_SIZE
    }

    pub fn certificate_block(&self) -> Result<Vec<u8>, StorageError> {
        let mut buf = vec![0u8; 0x200];
        self.image.read(GAMECARD_CERT_OFFSET, &mut buf)?;
        Ok(buf)
    }
}

/// The insertion lifecycle a physical cartridge reader drives (§4.10). This
/// models states only; the transitions themselves are driven by whichever
/// poller owns the cartridge handle (see the concurrency & lifecycle
/// component), since they depend on hardware events this crate doesn't talk
/// to directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartridgeState {
    NotInserted,
    Processing,
    InsertedInfoLoaded,
    LafwUpdateRequired,
    NoGameCardPatchEnabled,
    InsertedInfoNotLoaded,
}

impl CartridgeState {
    pub fn is_inserted(self) -> bool {
        !matches!(self, CartridgeState::NotInserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cartridge_state_not_inserted_is_not_inserted() {
        assert!(!CartridgeState::NotInserted.is_inserted());
        assert!(CartridgeState::InsertedInfoLoaded.is_inserted());
    }
}
