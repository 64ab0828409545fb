use crate::crypto::primitives::Rsa2048PrivateKey;
use crate::crypto::{AesKey, AesXtsKey, KeyParseError, TitleKey};
use crate::formats::ticket::Ticket;
use crate::ids::{IdParseError, RightsId};
use binrw::{BinRead, BinWrite};
use ini::Properties;
use snafu::{ResultExt, Snafu};
use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

#[derive(Clone)]
pub struct KeySet {
    header_key: Option<AesXtsKey>,
    title_kek: [Option<AesKey>; 0x20],
    key_area_key_application: [Option<AesKey>; 0x20],
    key_area_key_ocean: [Option<AesKey>; 0x20],
    key_area_key_system: [Option<AesKey>; 0x20],
    /// Raw per-generation master keys, as dumped off a unit. Exposed mostly
    /// for completeness/diagnostics: every other derived key above is keyed
    /// directly by generation rather than re-derived from these at runtime
    /// (matching how key files are distributed in practice: already-derived
    /// per-purpose keys, not the master keys plus kek sources).
    master_key: [Option<AesKey>; 0x20],
    /// AES-CBC key decrypting the cartridge header's card-info block.
    gc_cardinfo_key: Option<AesKey>,
    gc_cardinfo_key_dev: Option<AesKey>,
    /// AES-CTR key unwrapping the eTicket RSA device key blob from the
    /// calibration area. Two variants exist because the source switches key
    /// depending on an observed unit generation; see `KeySet::eticket_key`.
    eticket_rsa_kek: Option<AesKey>,
    eticket_rsa_kek_personalized: Option<AesKey>,
    eticket_key: Option<Arc<Rsa2048PrivateKey>>,
    title_keys: HashMap<RightsId, TitleKey>,
}

pub struct KeyName {
    pub key_name: &'static str,
    pub index: Option<u8>,
}

impl Debug for KeyName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(index) = self.index {
            write!(f, "{}_{:02x}", self.key_name, index)
        } else {
            write!(f, "{}", self.key_name)
        }
    }
}

impl Display for KeyName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

#[derive(Snafu, Debug)]
pub struct MissingKeyError {
    pub key_name: KeyName,
}

#[derive(Snafu, Debug)]
pub enum KeySetParseError {
    #[snafu(display("Could not parse keyset file at line {} column {}: {}", line, col, msg))]
    CommonKeysFileParse {
        line: usize,
        col: usize,
        msg: String,
    },
    #[snafu(display(
        "Could not parse title keys file at line {} column {}: {}",
        line,
        col,
        msg
    ))]
    TitleKeysFileParse {
        line: usize,
        col: usize,
        msg: String,
    },

    #[snafu(display("Could not parse key {}: {}", key_name, source))]
    KeyParse {
        key_name: KeyName,
        source: KeyParseError,
    },
    #[snafu(display("Could not parse rightsid {}: {}", rights_id, source))]
    RightsIdParse {
        rights_id: String,
        source: IdParseError,
    },
    #[snafu(display("Could not parse title key for rightsid {:?}: {}", rights_id, source))]
    TitleKeyParse {
        rights_id: RightsId,
        source: KeyParseError,
    },
}

#[derive(Snafu, Debug)]
pub enum SystemKeysetError {
    Parse { source: KeySetParseError },
    NotFound { tried: Vec<PathBuf> },
    Io { source: std::io::Error },
}

#[derive(Snafu, Debug)]
#[snafu(display("Missing title key for RightsId {}", rights_id))]
pub struct MissingTitleKeyError {
    pub rights_id: RightsId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(repr = u8)]
pub enum KeyAreaKeyIndex {
    Application = 0,
    Ocean = 1,
    System = 2,
}

impl KeySet {
    /// Loads a keyset from a file. The file format is the same as the one used by Hactool.
    /// By default the file is searched in the ".switch" dir in
    ///     the user's home directory and in "switch" in user's config directory (according to `dirs-next` crate).
    ///
    /// One can also provide a path to a custom keyset file, then the system directories are ignored.
    pub fn from_system(keys_dir: Option<&Path>) -> Result<Self, SystemKeysetError> {
        let paths = if let Some(key_path) = keys_dir {
            vec![Some(key_path.into())]
        } else {
            vec![
                dirs_next::config_dir().map(|v| v.join("switch")),
                dirs_next::home_dir().map(|v| v.join(".switch")),
            ]
        }
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();

        let find_file = |file_name: &str| -> Result<PathBuf, SystemKeysetError> {
            for path in &paths {
                let file_path = path.join(file_name);
                if file_path.exists() {
                    return Ok(file_path);
                }
            }

            Err(SystemKeysetError::NotFound {
                tried: paths
                    .clone()
                    .into_iter()
                    .map(|p| p.join(file_name))
                    .collect(),
            })
        };

        let prod_keys_path = find_file("prod.keys")?;
        let title_keys_path = find_file("title.keys").ok();

        let prod_keys = std::fs::read_to_string(&prod_keys_path).context(IoSnafu)?;
        let title_keys = title_keys_path
            .as_ref()
            .map(|p| std::fs::read_to_string(p).context(IoSnafu))
            .transpose()?;

        Self::from_file_contents(&prod_keys, title_keys.as_deref().unwrap_or(""))
            .context(ParseSnafu {})
    }

    pub fn from_file_contents(
        common_keys: &str,
        title_keys: &str,
    ) -> Result<Self, KeySetParseError> {
        let common_keys = ini::Ini::load_from_str_noescape(common_keys).map_err(|e| {
            KeySetParseError::CommonKeysFileParse {
                line: e.line,
                col: e.col,
                msg: e.msg,
            }
        })?;
        let common_keys = common_keys.general_section();

        fn parse_key<K: FromStr<Err = KeyParseError>>(
            props: &Properties,
            name: &'static str,
        ) -> Result<Option<K>, KeySetParseError> {
            props
                .get(name)
                .map(|s| s.parse())
                .transpose()
                .map_err(|source| KeySetParseError::KeyParse {
                    key_name: KeyName {
                        key_name: name,
                        index: None,
                    },
                    source,
                })
        }

        fn parse_keys<K: FromStr<Err = KeyParseError> + Copy, const N: usize>(
            props: &Properties,
            name: &'static str,
        ) -> Result<[Option<K>; N], KeySetParseError> {
            let mut result = [None; N];
            for (i, result) in result.iter_mut().enumerate() {
                let key_name = KeyName {
                    key_name: name,
                    index: Some(i as u8),
                };
                let key = props
                    .get(&key_name.to_string())
                    .map(|s| s.parse())
                    .transpose()
                    .map_err(|source| KeySetParseError::KeyParse { key_name, source })?;
                *result = key;
            }
            Ok(result)
        }

        let title_keys_ini = ini::Ini::load_from_str_noescape(title_keys).map_err(|e| {
            KeySetParseError::TitleKeysFileParse {
                line: e.line,
                col: e.col,
                msg: e.msg,
            }
        })?;

        let mut title_keys = HashMap::new();
        for (rights_id, title_key) in title_keys_ini.general_section().iter() {
            let rights_id = rights_id.parse().context(RightsIdParseSnafu {
                rights_id: rights_id.to_string(),
            })?;
            let title_key = title_key
                .parse()
                .context(TitleKeyParseSnafu { rights_id })?;
            title_keys.insert(rights_id, title_key);
        }

        Ok(Self {
            header_key: parse_key(common_keys, "header_key")?,
            title_kek: parse_keys(common_keys, "titlekek")?,
            key_area_key_application: parse_keys(common_keys, "key_area_key_application")?,
            key_area_key_ocean: parse_keys(common_keys, "key_area_key_ocean")?,
            key_area_key_system: parse_keys(common_keys, "key_area_key_system")?,
            master_key: parse_keys(common_keys, "master_key")?,
            gc_cardinfo_key: parse_key(common_keys, "xci_header_key")?,
            gc_cardinfo_key_dev: parse_key(common_keys, "xci_header_key_dev")?,
            eticket_rsa_kek: parse_key(common_keys, "eticket_rsa_kek")?,
            eticket_rsa_kek_personalized: parse_key(common_keys, "eticket_rsa_kek_personalized")?,
            eticket_key: None,
            title_keys,
        })
    }
}

impl KeySet {
    pub fn header_key(&self) -> Result<AesXtsKey, MissingKeyError> {
        self.header_key.ok_or(MissingKeyError {
            key_name: KeyName {
                key_name: "header_key",
                index: None,
            },
        })
    }

    pub fn import_ticket(
        &mut self,
        ticket: &Ticket,
    ) -> Result<(), crate::formats::ticket::TitleKeyDecryptError> {
        let title_key = ticket.title_key(self)?;
        self.title_keys.insert(ticket.rights_id, title_key);
        Ok(())
    }

    pub fn title_kek(&self, master_key_revision: u8) -> Result<AesKey, MissingKeyError> {
        self.title_kek[master_key_revision as usize].ok_or(MissingKeyError {
            key_name: KeyName {
                key_name: "title_kek",
                index: Some(master_key_revision),
            },
        })
    }

    pub fn key_area_key(
        &self,
        master_key_revision: u8,
        key_area_key_index: KeyAreaKeyIndex,
    ) -> Result<AesKey, MissingKeyError> {
        let (kek_array, name) = match key_area_key_index {
            KeyAreaKeyIndex::Application => {
                (&self.key_area_key_application, "key_area_key_application")
            }
            KeyAreaKeyIndex::Ocean => (&self.key_area_key_ocean, "key_area_key_ocean"),
            KeyAreaKeyIndex::System => (&self.key_area_key_system, "key_area_key_system"),
        };
        kek_array[master_key_revision as usize].ok_or(MissingKeyError {
            key_name: KeyName {
                key_name: name,
                index: Some(master_key_revision),
            },
        })
    }

    pub fn title_key(&self, rights_id: &RightsId) -> Result<TitleKey, MissingTitleKeyError> {
        self.title_keys
            .get(rights_id)
            .copied()
            .ok_or(MissingTitleKeyError {
                rights_id: *rights_id,
            })
    }

    /// Looks up the raw master key for `generation`. If the exact generation
    /// isn't present in the loaded key file (the file predates the unit),
    /// falls open to the highest-generation master key actually loaded,
    /// mirroring the "derive down" fallback real dumping tools use when a
    /// unit is newer than the user's key file. We don't attempt to *derive*
    /// intermediate generations ourselves (that needs Nintendo's master key
    /// vectors, which we don't embed - see `DESIGN.md`); callers that need to
    /// be sure should compare against a known-good vector via
    /// `verify_master_key`.
    pub fn master_key(&self, generation: u8) -> Result<AesKey, MissingKeyError> {
        self.master_key[generation as usize]
            .or_else(|| self.master_key.iter().rev().copied().flatten().next())
            .ok_or(MissingKeyError {
                key_name: KeyName {
                    key_name: "master_key",
                    index: Some(generation),
                },
            })
    }

    /// Validates a fallen-open master key against a known-good value (e.g. a
    /// hash of the vector the original firmware image ships). Returns
    /// `false` when the comparison fails, in which case the caller should
    /// surface `WrongKeys` rather than proceed with a silently-wrong key.
    pub fn verify_master_key(&self, generation: u8, expected: &[u8; 0x10]) -> bool {
        self.master_key(generation)
            .map(|k| k.raw() == *expected)
            .unwrap_or(false)
    }

    pub fn gc_cardinfo_key(&self, dev: bool) -> Result<AesKey, MissingKeyError> {
        let (key, name) = if dev {
            (self.gc_cardinfo_key_dev, "xci_header_key_dev")
        } else {
            (self.gc_cardinfo_key, "xci_header_key")
        };
        key.ok_or(MissingKeyError {
            key_name: KeyName {
                key_name: name,
                index: None,
            },
        })
    }

    /// Selects the AES-CTR key that unwraps the eTicket RSA device key blob.
    /// The source key differs depending on unit generation; we resolve the
    /// choice to "prefer the personalized variant when present, otherwise
    /// fall back to the common one" (see `DESIGN.md`'s note on this open
    /// question) rather than trying to infer the precise firmware threshold.
    pub fn eticket_rsa_kek(&self) -> Result<AesKey, MissingKeyError> {
        self.eticket_rsa_kek_personalized
            .or(self.eticket_rsa_kek)
            .ok_or(MissingKeyError {
                key_name: KeyName {
                    key_name: "eticket_rsa_kek",
                    index: None,
                },
            })
    }

    /// Unwraps the eTicket RSA device private key from its encrypted
    /// calibration-area blob and validates it.
    ///
    /// `ctr` and `encrypted_key` are the AES-CTR nonce/keystream-offset block
    /// and the 0x230-byte encrypted key material as they appear in the
    /// calibration area; the exact byte layout of the surrounding PRODINFO
    /// partition is treated as an opaque input the caller is responsible for
    /// slicing out (see `DESIGN.md`).
    pub fn import_eticket_device_key(
        &mut self,
        ctr: &[u8; 0x10],
        encrypted_key: &[u8; 0x230],
    ) -> Result<(), EticketKeyImportError> {
        let kek = self.eticket_rsa_kek().context(KekMissingSnafu)?;

        let mut data = *encrypted_key;
        kek.decrypt_ctr(&mut data[..0x220], ctr);

        let modulus: [u8; 0x100] = data[0x00..0x100].try_into().unwrap();
        let private_exponent: [u8; 0x100] = data[0x100..0x200].try_into().unwrap();
        let public_exponent = u32::from_be_bytes(data[0x200..0x204].try_into().unwrap());

        if public_exponent != 65537 {
            return Err(EticketKeyImportError::BadPublicExponent { public_exponent });
        }

        let key = Rsa2048PrivateKey::from_raw_parts(&modulus, public_exponent, &private_exponent)
            .context(RsaKeySnafu)?;

        // Round-trip a probe value through the public/private pair - the
        // keyset's sanity check that the unwrapped blob really is a valid
        // key and not garbage from a wrong KEK.
        let probe = b"eticket device key self-test probe value";
        let ciphertext = key
            .public_key()
            .oaep_encrypt(probe)
            .context(RsaKeySnafu)?;
        let roundtrip = key.oaep_decrypt(&ciphertext).context(RsaKeySnafu)?;
        if roundtrip != probe {
            return Err(EticketKeyImportError::RoundtripFailed {});
        }

        self.eticket_key = Some(Arc::new(key));
        Ok(())
    }

    pub fn eticket_key(&self) -> Result<Arc<Rsa2048PrivateKey>, MissingKeyError> {
        self.eticket_key.clone().ok_or(MissingKeyError {
            key_name: KeyName {
                key_name: "eticket_rsa_key",
                index: None,
            },
        })
    }

    /// A coarse "what did we actually load" readout, for diagnostics (the
    /// `keys` CLI subcommand prints this rather than dumping key material).
    pub fn summarize(&self) -> KeySetSummary {
        let count_some = |keys: &[Option<AesKey>]| keys.iter().filter(|k| k.is_some()).count();
        KeySetSummary {
            header_key: self.header_key.is_some(),
            title_kek_count: count_some(&self.title_kek),
            key_area_key_application_count: count_some(&self.key_area_key_application),
            key_area_key_ocean_count: count_some(&self.key_area_key_ocean),
            key_area_key_system_count: count_some(&self.key_area_key_system),
            master_key_count: count_some(&self.master_key),
            gc_cardinfo_key: self.gc_cardinfo_key.is_some(),
            eticket_rsa_kek: self.eticket_rsa_kek.is_some(),
            eticket_key: self.eticket_key.is_some(),
            title_key_count: self.title_keys.len(),
        }
    }
}

/// See [`KeySet::summarize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySetSummary {
    pub header_key: bool,
    pub title_kek_count: usize,
    pub key_area_key_application_count: usize,
    pub key_area_key_ocean_count: usize,
    pub key_area_key_system_count: usize,
    pub master_key_count: usize,
    pub gc_cardinfo_key: bool,
    pub eticket_rsa_kek: bool,
    pub eticket_key: bool,
    pub title_key_count: usize,
}

#[derive(Snafu, Debug)]
pub enum EticketKeyImportError {
    #[snafu(display("Missing eTicket RSA KEK"))]
    KekMissing { source: MissingKeyError },
    #[snafu(display("eTicket RSA key has unexpected public exponent {public_exponent}"))]
    BadPublicExponent { public_exponent: u32 },
    #[snafu(display("Failed to construct the eTicket RSA key"))]
    RsaKey {
        source: crate::crypto::primitives::RsaError,
    },
    #[snafu(display("eTicket RSA key failed its self-test round-trip"))]
    RoundtripFailed {},
}

#[cfg(test)]
mod summary_tests {
    use super::*;

    #[test]
    fn empty_keyset_summarizes_to_all_zero() {
        let keyset = KeySet::from_file_contents("", "").unwrap();
        let summary = keyset.summarize();
        assert!(!summary.header_key);
        assert_eq!(summary.master_key_count, 0);
        assert_eq!(summary.title_key_count, 0);
    }
}
