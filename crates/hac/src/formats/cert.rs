//! Certificate chain blobs: concatenations of typed signed records, each
//! carrying an issuer name, a public key of one of three shapes, and a name
//! used to address it from a child record's issuer field (§4.4).

use crate::crypto::primitives::{Rsa2048PublicKey, RsaError};
use crate::formats::ticket::Signature;
use crate::hexstring::HexData;
use binrw::{BinRead, BinWrite, NullString};
use snafu::{ResultExt, Snafu};
use std::collections::HashMap;
use std::io::Cursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[br(import(key_type: u32))]
pub enum PublicKeyBlock {
    #[br(pre_assert(key_type == 0))]
    Rsa4096 {
        modulus: HexData<0x200>,
        #[brw(pad_after = 0x34)]
        public_exponent: u32,
    },
    #[br(pre_assert(key_type == 1))]
    Rsa2048 {
        modulus: HexData<0x100>,
        #[brw(pad_after = 0x34)]
        public_exponent: u32,
    },
    #[br(pre_assert(key_type == 2))]
    Ecsda240 {
        #[brw(pad_after = 0x3c)]
        public_key: HexData<0x3c>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct Certificate {
    pub signature: Signature,
    #[brw(pad_size_to = 0x40)]
    pub issuer: NullString,
    #[brw(big)]
    pub public_key_type: u32,
    #[brw(pad_size_to = 0x40)]
    pub name: NullString,
    pub cert_id: u32,
    #[br(args(public_key_type))]
    pub public_key: PublicKeyBlock,
}

impl Certificate {
    pub fn name(&self) -> String {
        self.name.to_string()
    }

    pub fn issuer(&self) -> String {
        self.issuer.to_string()
    }

    /// Extracts the RSA-2048 public key, if this certificate carries one.
    /// Nintendo's PKI only ever issues RSA-2048 leaf certs in practice, but
    /// root/intermediate CAs may carry RSA-4096 or ECDSA keys we don't (yet)
    /// have verification primitives for.
    pub fn rsa2048_public_key(&self) -> Result<Rsa2048PublicKey, CertKeyError> {
        match &self.public_key {
            PublicKeyBlock::Rsa2048 {
                modulus,
                public_exponent,
                ..
            } => Rsa2048PublicKey::from_raw_parts(&modulus.0, *public_exponent)
                .context(InvalidKeySnafu),
            _ => Err(CertKeyError::UnsupportedKeyType),
        }
    }
}

#[derive(Snafu, Debug)]
pub enum CertKeyError {
    #[snafu(display("certificate does not carry an RSA-2048 public key"))]
    UnsupportedKeyType,
    #[snafu(display("failed to construct public key from certificate"))]
    InvalidKey { source: RsaError },
}

#[derive(Snafu, Debug)]
pub enum CertChainParseError {
    #[snafu(display("failed to parse a certificate record at offset {offset}"))]
    ParseCertificate { source: binrw::Error, offset: u64 },
}

#[derive(Snafu, Debug)]
pub enum CertChainVerifyError {
    #[snafu(display("certificate chain has no record named {name:?}"))]
    CertificateNotFound { name: String },
    #[snafu(display("certificate {name:?} does not carry a usable public key"))]
    UnusableKey { name: String, source: CertKeyError },
    #[snafu(display("signature does not match the parent certificate's public key"))]
    SignatureMismatch,
    #[snafu(display("only RSA-2048 SHA-256 signatures are supported"))]
    UnsupportedSignatureType,
}

/// Byte size of a signature block's wire encoding (4-byte magic, signature
/// bytes, zero padding), needed to locate where a certificate's signed body
/// starts within its own record.
fn signature_block_size(signature: &Signature) -> usize {
    match signature {
        Signature::Rsa4096Sha1(_) | Signature::Rsa4096Sha256(_) => 4 + 0x200 + 0x3c,
        Signature::Rsa2048Sha1(_) | Signature::Rsa2048Sha256(_) => 4 + 0x100 + 0x3c,
        Signature::EcdsaSha1(_) | Signature::EcdsaSha256(_) => 4 + 0x3c + 0x40,
    }
}

/// A parsed certificate plus the raw bytes of its own signed body (every
/// field after the signature block), needed to verify the certificate's own
/// signature against its issuer's public key.
#[derive(Debug, Clone)]
struct CertEntry {
    cert: Certificate,
    signed_body: Vec<u8>,
}

/// An in-memory `name -> certificate` map built from a concatenated chain
/// blob, as found embedded in tickets, NCAs with a rights id, and cartridge
/// header regions.
#[derive(Debug, Clone, Default)]
pub struct CertificateChain {
    certs: HashMap<String, CertEntry>,
}

impl CertificateChain {
    pub fn parse(data: &[u8]) -> Result<Self, CertChainParseError> {
        let mut certs = HashMap::new();
        let mut cursor = Cursor::new(data);

        while (cursor.position() as usize) < data.len() {
            let offset = cursor.position();
            let cert = Certificate::read(&mut cursor).context(ParseCertificateSnafu { offset })?;
            let end = cursor.position() as usize;
            let body_start = offset as usize + signature_block_size(&cert.signature);
            let signed_body = data[body_start..end].to_vec();
            certs.insert(cert.name(), CertEntry { cert, signed_body });
        }

        Ok(Self { certs })
    }

    pub fn get(&self, name: &str) -> Option<&Certificate> {
        self.certs.get(name).map(|entry| &entry.cert)
    }

    /// Verifies `signature` over `message`, whose issuer field names the
    /// bottom of the chain (e.g. `"Root-CA00000003-XS00000020"`), then walks
    /// the chain upward: each certificate's own signature is in turn
    /// verified against its issuer's public key, stopping once a link's
    /// issuer resolves to a name with no corresponding certificate in the
    /// chain (the root, whose key is never embedded in its own chain and is
    /// trusted implicitly). A forged or unverified intermediate anywhere on
    /// the path causes the whole verification to fail.
    pub fn verify(
        &self,
        issuer: &str,
        message: &[u8],
        signature: &Signature,
    ) -> Result<(), CertChainVerifyError> {
        self.verify_link(issuer, message, signature)
    }

    fn verify_link(
        &self,
        issuer: &str,
        message: &[u8],
        signature: &Signature,
    ) -> Result<(), CertChainVerifyError> {
        let Signature::Rsa2048Sha256(sig_bytes) = signature else {
            return Err(CertChainVerifyError::UnsupportedSignatureType);
        };

        let leaf_name = issuer.rsplit('-').next().unwrap_or(issuer).to_string();

        let entry =
            self.certs
                .get(&leaf_name)
                .ok_or_else(|| CertChainVerifyError::CertificateNotFound {
                    name: leaf_name.clone(),
                })?;

        let public_key = entry
            .cert
            .rsa2048_public_key()
            .context(UnusableKeySnafu { name: leaf_name })?;

        if !public_key.pkcs1v15_sha256_verify(message, &sig_bytes.0) {
            return Err(CertChainVerifyError::SignatureMismatch);
        }

        let parent_issuer = entry.cert.issuer();
        let parent_leaf = parent_issuer.rsplit('-').next().unwrap_or(&parent_issuer);
        if !self.certs.contains_key(parent_leaf) {
            return Ok(());
        }

        self.verify_link(&parent_issuer, &entry.signed_body, &entry.cert.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_chain_has_no_certificates() {
        let chain = CertificateChain::parse(&[]).unwrap();
        assert!(chain.get("XS00000020").is_none());
    }

    #[test]
    fn verify_fails_on_missing_certificate() {
        let chain = CertificateChain::parse(&[]).unwrap();
        let sig = Signature::Rsa2048Sha256(HexData([0u8; 0x100]));
        let err = chain
            .verify("Root-CA00000003-XS00000020", b"msg", &sig)
            .unwrap_err();
        assert!(matches!(
            err,
            CertChainVerifyError::CertificateNotFound { .. }
        ));
    }
}
