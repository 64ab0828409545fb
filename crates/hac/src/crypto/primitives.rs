//! Thin wrappers around the platform crypto primitives that aren't already
//! covered by `AesKey`/`AesXtsKey` (block/stream AES and sector-tweak XTS):
//! CMAC, SHA-3, and the two RSA-2048 operations used for the eTicket key and
//! personalized titlekeys.

use cipher::generic_array::GenericArray;
use cipher::{BlockEncrypt, KeyInit};
use cmac::Cmac;
use digest::Mac;
use rsa::pkcs1v15::{Signature as Pkcs1v15Signature, SigningKey, VerifyingKey};
use rsa::pss::{Signature as PssSignature, VerifyingKey as PssVerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{BigUint, Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use sha3::{Sha3_224, Sha3_256, Sha3_384, Sha3_512};
use snafu::Snafu;

use aes::Aes128;

/// Computes the AES-CMAC of `buf` under `key`.
pub fn aes_cmac(key: &[u8; 0x10], buf: &[u8]) -> [u8; 0x10] {
    let mut mac = Cmac::<Aes128>::new(GenericArray::from_slice(key));
    mac.update(buf);
    mac.finalize().into_bytes().into()
}

#[derive(Snafu, Debug)]
pub enum Sha3SizeError {
    #[snafu(display("unsupported SHA-3 output size: {bits} bits"))]
    Unsupported { bits: usize },
}

/// Computes a SHA-3 digest of the requested output size (in bits): 224, 256,
/// 384 or 512.
pub fn sha3(bits: usize, buf: &[u8]) -> Result<Vec<u8>, Sha3SizeError> {
    use digest::Digest;

    Ok(match bits {
        224 => Sha3_224::digest(buf).to_vec(),
        256 => Sha3_256::digest(buf).to_vec(),
        384 => Sha3_384::digest(buf).to_vec(),
        512 => Sha3_512::digest(buf).to_vec(),
        _ => return Err(Sha3SizeError::Unsupported { bits }),
    })
}

#[derive(Snafu, Debug)]
pub enum RsaError {
    #[snafu(display("failed to construct RSA key from raw modulus/exponent"))]
    InvalidKey { source: rsa::errors::Error },
    #[snafu(display("RSA-OAEP decryption failed"))]
    OaepDecrypt { source: rsa::errors::Error },
    #[snafu(display("RSA-PSS / PKCS#1v1.5 signature did not verify"))]
    SignatureInvalid,
}

/// A 2048-bit RSA key pair assembled from raw big-endian modulus/exponent
/// bytes, the form both the eTicket key blob and certificate public-key
/// blocks carry them in.
pub struct Rsa2048PrivateKey(RsaPrivateKey);

impl Rsa2048PrivateKey {
    pub fn from_raw_parts(
        modulus: &[u8; 0x100],
        public_exponent: u32,
        private_exponent: &[u8; 0x100],
    ) -> Result<Self, RsaError> {
        let n = BigUint::from_bytes_be(modulus);
        let e = BigUint::from(public_exponent);
        let d = BigUint::from_bytes_be(private_exponent);

        // Primes aren't recoverable from (n, e, d) alone without extra work;
        // `rsa` can build a usable private key from the CRT-less form as long
        // as we don't need blinding-free operation.
        let key = RsaPrivateKey::from_components(n, e, d, Vec::new())
            .context(InvalidKeySnafu)?;
        Ok(Self(key))
    }

    /// Decrypts `ciphertext` with RSA-OAEP (SHA-256, empty label), as used
    /// both for personalized titlekeys and the eTicket RSA key blob itself.
    pub fn oaep_decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, RsaError> {
        let padding = Oaep::new::<Sha256>();
        self.0
            .decrypt(padding, ciphertext)
            .context(OaepDecryptSnafu)
    }

    pub fn public_key(&self) -> Rsa2048PublicKey {
        Rsa2048PublicKey(self.0.to_public_key())
    }

    /// Produces a PKCS#1 v1.5 SHA-256 signature, the counterpart of
    /// [`Rsa2048PublicKey::pkcs1v15_sha256_verify`]. Used only for
    /// project-controlled re-signing (a build keypair standing in for
    /// Nintendo's own, which this crate obviously doesn't have), never to
    /// forge a signature under a real device or title key.
    pub fn pkcs1v15_sha256_sign(&self, message: &[u8]) -> [u8; 0x100] {
        let signing_key = SigningKey::<Sha256>::new(self.0.clone());
        let signature = signing_key.sign(message);
        let mut out = [0u8; 0x100];
        out.copy_from_slice(&signature.to_bytes());
        out
    }
}

pub struct Rsa2048PublicKey(RsaPublicKey);

impl Rsa2048PublicKey {
    pub fn from_raw_parts(modulus: &[u8; 0x100], public_exponent: u32) -> Result<Self, RsaError> {
        let n = BigUint::from_bytes_be(modulus);
        let e = BigUint::from(public_exponent);
        Ok(Self(RsaPublicKey::new(n, e).context(InvalidKeySnafu)?))
    }

    /// Encrypts `plaintext` with RSA-OAEP (SHA-256, empty label). Used only
    /// to sanity-check a freshly-imported device key by round-tripping a
    /// probe value through the public/private pair.
    pub fn oaep_encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, RsaError> {
        let padding = Oaep::new::<Sha256>();
        self.0
            .encrypt(&mut rand::rngs::OsRng, padding, plaintext)
            .context(OaepDecryptSnafu)
    }

    /// Verifies a PKCS#1 v1.5 SHA-256 signature, the scheme used by the
    /// console's certificate chain and tickets for their `Rsa2048Sha256`
    /// signature type.
    pub fn pkcs1v15_sha256_verify(&self, message: &[u8], signature: &[u8; 0x100]) -> bool {
        let verifying_key = VerifyingKey::<Sha256>::new(self.0.clone());
        let Ok(sig) = Pkcs1v15Signature::try_from(signature.as_slice()) else {
            return false;
        };
        verifying_key.verify(message, &sig).is_ok()
    }

    /// Verifies an RSA-PSS SHA-256 signature, the scheme the NCA fixed-key
    /// header signature uses (§4.3's `rsa2048_pss_verify`).
    pub fn pss_sha256_verify(&self, message: &[u8], signature: &[u8; 0x100]) -> bool {
        let verifying_key = PssVerifyingKey::<Sha256>::new(self.0.clone());
        let Ok(sig) = PssSignature::try_from(signature.as_slice()) else {
            return false;
        };
        verifying_key.verify(message, &sig).is_ok()
    }
}

use snafu::ResultExt;

/// Symmetric bounce-buffer-free ECB block decrypt/encrypt, used for the
/// calibration/key-area unwrap steps that operate one 16-byte block at a
/// time (see `AesKey::decrypt_key`/`decrypt_xts_key` for the higher-level
/// callers).
pub fn aes128_ecb_encrypt_block(key: &[u8; 0x10], block: &mut [u8; 0x10]) {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    cipher.encrypt_block(GenericArray::from_mut_slice(block));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmac_is_deterministic_and_key_dependent() {
        let key_a = [0x11u8; 0x10];
        let key_b = [0x22u8; 0x10];
        let msg = b"some header bytes to authenticate";

        assert_eq!(aes_cmac(&key_a, msg), aes_cmac(&key_a, msg));
        assert_ne!(aes_cmac(&key_a, msg), aes_cmac(&key_b, msg));
    }

    #[test]
    fn sha3_rejects_unsupported_size() {
        assert!(sha3(160, b"x").is_err());
        assert!(sha3(256, b"x").is_ok());
    }

    #[test]
    fn pss_verify_round_trips_and_rejects_tamper() {
        use rsa::pss::SigningKey as PssSigningKey;
        use rsa::signature::RandomizedSigner;

        let private = RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).unwrap();
        let public = Rsa2048PublicKey(private.to_public_key());

        let signing_key = PssSigningKey::<Sha256>::new(private);
        let signature = signing_key.sign_with_rng(&mut rand::rngs::OsRng, b"nca header bytes");
        let mut sig_bytes = [0u8; 0x100];
        sig_bytes.copy_from_slice(&signature.to_bytes());

        assert!(public.pss_sha256_verify(b"nca header bytes", &sig_bytes));
        assert!(!public.pss_sha256_verify(b"different bytes", &sig_bytes));
    }
}
