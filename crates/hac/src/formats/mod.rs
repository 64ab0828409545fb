//! Parsers for the on-disk container and filesystem formats: content metadata
//! (`cnmt`), the hash and partition filesystems used by cartridges and content
//! sections (`hfs`, `pfs`), the read-only content filesystem (`romfs`), the
//! encrypted content container itself (`nca`), the control-data format
//! (`nacp`), tickets, the certificate chains that authenticate them (`cert`),
//! and the cartridge logical image and header (`cartridge`).

pub mod cartridge;
pub mod cert;
pub mod cnmt;
pub mod hfs;
pub mod nacp;
pub mod nca;
pub mod pfs;
pub mod romfs;
pub mod ticket;
