//! Ticket enumeration and titlekey caching (§4.11).
//!
//! The "list installed tickets"/"fetch ticket blob" service calls are modeled
//! as a [`TicketSource`] so the lookup/cache/`DeviceKeyWiped` logic below is
//! testable against an in-memory fake; [`FsTicketSource`] is the concrete
//! implementation this crate actually drives, scanning `*.tik` files the same
//! way [`crate::switch_fs::tickets::import_tickets`] does.

use crate::crypto::keyset::KeySet;
use crate::crypto::TitleKey;
use crate::filesystem::{ReadableDirectoryExt, ReadableFile, ReadableFileSystem};
use crate::formats::ticket::{Ticket, TitleKeyDecryptError, TitleKeyType};
use crate::ids::RightsId;
use crate::storage::{ReadableStorageExt, StorageError};
use binrw::BinRead;
use snafu::{ResultExt, Snafu};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

#[derive(Snafu, Debug)]
pub enum TicketSourceError {
    #[snafu(display("Failed to read a ticket file"))]
    ReadTicketFile { source: StorageError },
    #[snafu(display("Failed to parse a ticket file"))]
    ParseTicketFile { source: binrw::Error },
    #[snafu(display("No ticket blob found for rights id {rights_id}"))]
    NotFound { rights_id: RightsId },
}

/// The enumeration/fetch surface a real ticket service exposes, reduced to
/// what the store needs: two rights-id lists (common vs. personalized) and a
/// fetch-by-id.
pub trait TicketSource {
    fn common_rights_ids(&self) -> Vec<RightsId>;
    fn personalized_rights_ids(&self) -> Vec<RightsId>;
    fn ticket(&self, rights_id: &RightsId) -> Result<Ticket, TicketSourceError>;
}

/// Scans a filesystem for `*.tik` files, the way installed titles carry them
/// alongside their NCAs, building the common/personalized rights-id lists up
/// front and re-reading the ticket blob lazily on each `ticket()` call.
pub struct FsTicketSource {
    common: Vec<RightsId>,
    personalized: Vec<RightsId>,
    by_rights_id: HashMap<RightsId, Ticket>,
}

impl FsTicketSource {
    pub fn scan<F: ReadableFileSystem>(fs: &F) -> Result<Self, TicketSourceError> {
        let mut common = Vec::new();
        let mut personalized = Vec::new();
        let mut by_rights_id = HashMap::new();

        for (name, entry) in ReadableDirectoryExt::entries_recursive(&fs.root()) {
            if !name.ends_with(".tik") {
                continue;
            }
            let Some(file) = entry.file() else { continue };
            let data = file
                .storage()
                .expect("Malformed FS")
                .read_all()
                .context(ReadTicketFileSnafu)?;
            let ticket =
                Ticket::read(&mut std::io::Cursor::new(data)).context(ParseTicketFileSnafu)?;
            match ticket.title_key_type {
                TitleKeyType::Common => common.push(ticket.rights_id),
                TitleKeyType::Personalized => personalized.push(ticket.rights_id),
            }
            by_rights_id.insert(ticket.rights_id, ticket);
        }

        Ok(Self {
            common,
            personalized,
            by_rights_id,
        })
    }
}

impl TicketSource for FsTicketSource {
    fn common_rights_ids(&self) -> Vec<RightsId> {
        self.common.clone()
    }

    fn personalized_rights_ids(&self) -> Vec<RightsId> {
        self.personalized.clone()
    }

    fn ticket(&self, rights_id: &RightsId) -> Result<Ticket, TicketSourceError> {
        self.by_rights_id
            .get(rights_id)
            .cloned()
            .ok_or(TicketSourceError::NotFound {
                rights_id: *rights_id,
            })
    }
}

#[derive(Snafu, Debug)]
pub enum TicketLookupError {
    #[snafu(display("No ticket installed for rights id {rights_id}"))]
    TicketNotFound { rights_id: RightsId },
    #[snafu(display("Failed to enumerate or fetch ticket for rights id {rights_id}"))]
    Source {
        source: TicketSourceError,
        rights_id: RightsId,
    },
    #[snafu(display("Failed to decrypt titlekey for rights id {rights_id}"))]
    RsaDecryptFailed {
        source: TitleKeyDecryptError,
        rights_id: RightsId,
    },
    #[snafu(display(
        "The device's eTicket key is unavailable; personalized tickets cannot be recovered"
    ))]
    DeviceKeyWiped,
}

/// Caches decrypted titlekeys by rights id and enforces the one-shot
/// `DeviceKeyWiped` refusal: once a personalized lookup fails for lack of the
/// eTicket device key, every subsequent personalized lookup fails the same
/// way without re-attempting the (expensive, and by then known-impossible)
/// RSA decrypt.
pub struct TicketStore<S: TicketSource> {
    source: S,
    cache: RefCell<HashMap<RightsId, TitleKey>>,
    device_key_wiped: Cell<bool>,
}

impl<S: TicketSource> TicketStore<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: RefCell::new(HashMap::new()),
            device_key_wiped: Cell::new(false),
        }
    }

    fn is_personalized(&self, rights_id: &RightsId) -> bool {
        self.source
            .personalized_rights_ids()
            .iter()
            .any(|id| id == rights_id)
    }

    pub fn lookup(
        &self,
        key_set: &KeySet,
        rights_id: RightsId,
    ) -> Result<TitleKey, TicketLookupError> {
        if let Some(cached) = self.cache.borrow().get(&rights_id) {
            return Ok(*cached);
        }

        let personalized = self.is_personalized(&rights_id);
        if personalized && self.device_key_wiped.get() {
            return Err(TicketLookupError::DeviceKeyWiped);
        }

        let known = self
            .source
            .common_rights_ids()
            .iter()
            .chain(self.source.personalized_rights_ids().iter())
            .any(|id| id == &rights_id);
        if !known {
            return Err(TicketLookupError::TicketNotFound { rights_id });
        }

        let ticket = self
            .source
            .ticket(&rights_id)
            .context(SourceSnafu { rights_id })?;

        match ticket.title_key(key_set) {
            Ok(title_key) => {
                self.cache.borrow_mut().insert(rights_id, title_key);
                Ok(title_key)
            }
            Err(source @ TitleKeyDecryptError::MissingEticketKey { .. }) if personalized => {
                self.device_key_wiped.set(true);
                let _ = source;
                Err(TicketLookupError::DeviceKeyWiped)
            }
            Err(source) => Err(TicketLookupError::RsaDecryptFailed { source, rights_id }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeSource {
        common: Vec<RightsId>,
        personalized: Vec<RightsId>,
    }

    impl TicketSource for FakeSource {
        fn common_rights_ids(&self) -> Vec<RightsId> {
            self.common.clone()
        }
        fn personalized_rights_ids(&self) -> Vec<RightsId> {
            self.personalized.clone()
        }
        fn ticket(&self, rights_id: &RightsId) -> Result<Ticket, TicketSourceError> {
            Err(TicketSourceError::NotFound {
                rights_id: *rights_id,
            })
        }
    }

    #[test]
    fn unknown_rights_id_is_not_found() {
        let store = TicketStore::new(FakeSource {
            common: vec![],
            personalized: vec![],
        });
        let key_set = KeySet::from_file_contents("", "").unwrap();
        let rights_id: RightsId = "0".repeat(32).parse().unwrap();
        let err = store.lookup(&key_set, rights_id).unwrap_err();
        assert!(matches!(err, TicketLookupError::TicketNotFound { .. }));
    }
}
