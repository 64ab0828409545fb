use crate::hexstring::HexData;
use binrw::{BinRead, BinWrite};
use hex::FromHexError;
use serde::{Deserialize, Serialize};
use snafu::Snafu;
use std::fmt::{Debug, Display};
use std::str::FromStr;

#[derive(Snafu, Debug)]
pub enum IdParseError {
    InvalidLength { expected: usize, actual: usize },
    InvalidChar { char: char, index: usize },
}

fn parse_id(s: &str, result: &mut [u8]) -> Result<(), IdParseError> {
    hex::decode_to_slice(s, result).map_err(|e| match e {
        FromHexError::InvalidHexCharacter { c, index } => {
            IdParseError::InvalidChar { char: c, index }
        }
        FromHexError::OddLength | FromHexError::InvalidStringLength => {
            IdParseError::InvalidLength {
                expected: result.len() * 2,
                actual: s.len(),
            }
        }
    })?;
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BinRead, BinWrite)]
pub struct TitleId(u64);

impl Debug for TitleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}
impl Display for TitleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BinRead, BinWrite)]
pub struct NcaId([u8; 0x10]);

// wanna lowercase, hence the separate type
impl Debug for NcaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
impl Display for NcaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl FromStr for NcaId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut result = [0; 0x10];
        parse_id(s, &mut result).map(|_| NcaId(result))
    }
}

/// Identifies a title key in the keyset.
#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Hash,
    Ord,
    PartialOrd,
    Serialize,
    Deserialize,
    BinRead,
    BinWrite,
)]
pub struct RightsId(HexData<0x10>);

impl RightsId {
    pub fn is_empty(&self) -> bool {
        self.0 .0.iter().all(|&x| x == 0)
    }
}

impl Display for RightsId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RightsId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut result = [0; 0x10];
        parse_id(s, &mut result).map(|_| RightsId(HexData(result)))
    }
}

/// A content (NCA) identifier: 16 raw bytes, as found in file names and content-meta tables.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BinRead, BinWrite)]
pub struct ContentId([u8; 0x10]);

impl Debug for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
impl Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl FromStr for ContentId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut result = [0; 0x10];
        parse_id(s, &mut result).map(|_| ContentId(result))
    }
}

impl From<[u8; 0x10]> for ContentId {
    fn from(value: [u8; 0x10]) -> Self {
        ContentId(value)
    }
}

/// A role-tagged title id bit: which of the reserved bits/ranges of a 64-bit title id
/// identify it as an application, patch, add-on (data) or data-patch.
///
/// The low 12 bits of a title id are a "type" field; the role ids below model the
/// specific roles this crate cares about rather than the full type enumeration.
const PATCH_BIT: u64 = 0x800;
const ADD_ON_BASE_MASK: u64 = !0xFFFF;

macro_rules! title_role_id {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BinRead, BinWrite)]
        pub struct $name(u64);

        impl $name {
            pub fn new(value: u64) -> Self {
                Self(value)
            }

            pub fn value(self) -> u64 {
                self.0
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:016X}", self.0)
            }
        }
        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                Debug::fmt(self, f)
            }
        }

        impl From<AnyId> for $name {
            fn from(value: AnyId) -> Self {
                Self(value.0)
            }
        }

        impl From<$name> for AnyId {
            fn from(value: $name) -> Self {
                AnyId(value.0)
            }
        }
    };
}

/// A title id that hasn't committed to a particular role yet, as stored verbatim in a
/// `ContentMetaKey`/`PackagedContentMeta`. Converted to a role-specific id (with `.into()`)
/// once the caller knows which role a given content-meta record plays.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BinRead, BinWrite)]
pub struct AnyId(u64);

impl Debug for AnyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}
impl Display for AnyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl AnyId {
    pub fn value(self) -> u64 {
        self.0
    }
}

title_role_id!(ApplicationId);
title_role_id!(PatchId);
title_role_id!(DataId);
title_role_id!(DataPatchId);

impl ApplicationId {
    /// Derives this application's patch (update) title id by setting the patch bit.
    ///
    /// This is a cross-check helper: a content-meta record for a patch carries its
    /// own `application_id` field, which is the authoritative link. This derivation
    /// is used only to flag a mismatch, never to override the stored value.
    pub fn derive_patch_id(self) -> PatchId {
        PatchId(self.0 | PATCH_BIT)
    }

    /// Derives an add-on (DLC) title id for the given index by clearing the low 16
    /// bits and adding the index, mirroring [`ApplicationId::derive_patch_id`]'s
    /// cross-check role.
    pub fn derive_data_id(self, index: u16) -> DataId {
        DataId((self.0 & ADD_ON_BASE_MASK) + index as u64)
    }
}

/// Identifies one program (executable) within a title. Multi-program titles (rare,
/// but used by a handful of titles that bundle more than one NSO image) number their
/// programs by adding the content's `id_offset` to the title's base id.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BinRead, BinWrite)]
pub struct ProgramId(u64);

impl Debug for ProgramId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}
impl Display for ProgramId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl ProgramId {
    pub fn new(base: AnyId, id_offset: u8) -> Self {
        ProgramId(base.0 + id_offset as u64)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_id_derivation_sets_patch_bit() {
        let app = ApplicationId::new(0x0100000000010000);
        assert_eq!(app.derive_patch_id().value(), 0x0100000000010800);
    }

    #[test]
    fn data_id_derivation_clears_low_bits() {
        let app = ApplicationId::new(0x0100000000010000);
        assert_eq!(app.derive_data_id(1).value(), 0x0100000000010001);
    }

    #[test]
    fn program_id_adds_offset_to_base() {
        let base = AnyId::from(ApplicationId::new(0x0100000000010000));
        assert_eq!(ProgramId::new(base, 1).value(), 0x0100000000010001);
    }

    #[test]
    fn content_id_round_trips_through_display_and_parse() {
        let id: ContentId = "0123456789abcdef0123456789abcdef".parse().unwrap();
        assert_eq!(format!("{id}"), "0123456789abcdef0123456789abcdef");
    }
}
