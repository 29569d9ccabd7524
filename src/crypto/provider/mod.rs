//! The crypto façade: a uniform, suite-dispatched interface over the hash,
//! key agreement, ECIES and signature operations the protocol needs.

mod rust;

use bytes::{BufMut, Bytes, BytesMut};

pub use rust::RustCryptoProvider;

use crate::crypto::cipher_suite::{CipherSuite, SignatureScheme};
use crate::crypto::key_pair::{HpkeKeyPair, SignatureKeyPair};
use crate::crypto::{
    HpkeCiphertext, HpkePrivateKey, HpkePublicKey, SignaturePrivateKey, SignaturePublicKey,
};
use crate::utilities::error::Result;
use crate::utilities::serde::{serialize_opaque, write_uint};

/// Domain separator for hashing seeds into the DH or signature group.
pub(crate) const HASH_TO_GROUP_PREFIX: &[u8] = b"mls10 hash-to-group";

/// Hashes a seed under [`HASH_TO_GROUP_PREFIX`]; the per-group key
/// derivations interpret the digest as scalar material.
pub(crate) fn hash_to_group(seed: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};

    let mut h = Sha256::new();
    h.update(HASH_TO_GROUP_PREFIX);
    h.update(seed);
    h.finalize().into()
}

/// Key Encapsulation Mechanism half of the ECIES parameters.
#[allow(non_camel_case_types)]
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq)]
pub enum Kem {
    #[default]
    /// ECDH over P-256, shared secret is the x coordinate.
    KEM_P256_SHA256,
    /// X25519 Diffie-Hellman function.
    KEM_X25519_SHA256,
}

/// Key derivation function of the ECIES parameters.
#[allow(non_camel_case_types)]
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq)]
pub enum Kdf {
    #[default]
    KDF_HKDF_SHA256,
}

/// AEAD algorithm of the ECIES parameters.
#[allow(non_camel_case_types)]
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq)]
pub enum Aead {
    #[default]
    AEAD_AES128GCM,
}

#[derive(Default, Debug, Copy, Clone, Eq, PartialEq)]
pub struct HpkeSuite {
    pub kem: Kem,
    pub kdf: Kdf,
    pub aead: Aead,
}

#[derive(Default, Debug, Copy, Clone, Eq, PartialEq)]
pub enum HashScheme {
    #[default]
    SHA256,
}

pub trait Hash {
    fn size(&self) -> usize;

    fn digest(&self, data: &[u8]) -> Bytes;

    fn mac(&self, key: &[u8], message: &[u8]) -> Result<Bytes>;

    /// Constant-time MAC verification; `InvalidConfirmation` on mismatch.
    fn verify_mac(&self, key: &[u8], message: &[u8], tag: &[u8]) -> Result<()>;
}

pub trait Hpke {
    /// Derives a DH key pair from a seed: the seed is hashed into the group
    /// under [`HASH_TO_GROUP_PREFIX`], reduced mod the order for P-256 and
    /// clamped for X25519. Deterministic by construction.
    fn derive_key_pair(&self, secret: &[u8]) -> Result<HpkeKeyPair>;

    /// `HKDF-Extract` (an HMAC of `ikm` under `salt`).
    fn kdf_extract(&self, salt: &[u8], ikm: &[u8]) -> Result<Bytes>;

    /// Single-block `HKDF-Expand`; `length` must not exceed the hash size.
    fn kdf_expand(&self, secret: &[u8], info: &[u8], length: usize) -> Result<Bytes>;

    fn aead_key_size(&self) -> usize;

    fn aead_nonce_size(&self) -> usize;

    /// ECIES encryption to `recipient`. The ephemeral key pair is derived
    /// from the caller-supplied `ephemeral_secret`, so a caller with a
    /// deterministic randomness source gets reproducible output.
    fn seal(
        &self,
        recipient: &HpkePublicKey,
        plaintext: &[u8],
        ephemeral_secret: &[u8],
    ) -> Result<HpkeCiphertext>;

    /// ECIES decryption; `DecryptError` on tag mismatch.
    fn open(&self, secret_key: &HpkePrivateKey, input: &HpkeCiphertext) -> Result<Bytes>;
}

pub trait Signature {
    /// Derives a signing key pair from a seed, with the same hash-to-group
    /// seeding as the DH side.
    fn derive_key_pair(&self, secret: &[u8]) -> Result<SignatureKeyPair>;

    fn sign(&self, private_key: &SignaturePrivateKey, message: &[u8]) -> Result<Bytes>;

    fn verify(
        &self,
        public_key: &SignaturePublicKey,
        message: &[u8],
        signature: &[u8],
    ) -> Result<()>;
}

pub trait CryptoProvider {
    fn supports(&self, cipher_suite: CipherSuite) -> bool;

    fn supported(&self) -> Vec<CipherSuite>;

    fn hash(&self, cipher_suite: CipherSuite) -> Result<&dyn Hash>;

    fn hpke(&self, cipher_suite: CipherSuite) -> Result<&dyn Hpke>;

    fn signature(&self, scheme: SignatureScheme) -> Result<&dyn Signature>;

    /// `HKDF-Expand` with the protocol's label framing:
    ///
    /// ```text
    /// struct {
    ///     uint16 length;
    ///     opaque label<0..255> = "mls10 " + Label;
    ///     <context bytes, appended raw>
    /// } HkdfLabel;
    /// ```
    fn expand_with_label(
        &self,
        cipher_suite: CipherSuite,
        secret: &[u8],
        label: &[u8],
        context: &[u8],
        length: usize,
    ) -> Result<Bytes> {
        let mut full_label = Vec::with_capacity(6 + label.len());
        full_label.extend_from_slice(b"mls10 ");
        full_label.extend_from_slice(label);

        let mut info = BytesMut::new();
        write_uint(length as u64, 2, &mut info)?;
        serialize_opaque(&full_label, 1, &mut info)?;
        info.put(context);

        self.hpke(cipher_suite)?.kdf_expand(secret, &info, length)
    }

    /// [`Self::expand_with_label`] at the hash's output length.
    fn derive_secret(
        &self,
        cipher_suite: CipherSuite,
        secret: &[u8],
        label: &[u8],
        context: &[u8],
    ) -> Result<Bytes> {
        let length = self.hash(cipher_suite)?.size();
        self.expand_with_label(cipher_suite, secret, label, context, length)
    }
}
