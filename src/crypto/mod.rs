//! Cryptographic objects: opaque key wrappers, the ECIES ciphertext shape
//! and the suite-dispatching provider.

use std::ops::Deref;

use bytes::{Buf, BufMut, Bytes};

use crate::utilities::{
    error::Result,
    serde::{deserialize_opaque, serialize_opaque, Deserializer, Serializer},
};

pub mod cipher_suite;
pub mod credential;
pub mod key_pair;
pub mod provider;
pub mod rng;

/// An opaque key in the wire format of the underlying group: an uncompressed
/// SEC1 point for P-256, a raw 32-byte point or scalar for the 25519 family.
/// Encodes as `opaque<2>`.
#[derive(Default, Debug, Clone, Eq, PartialEq, Hash)]
pub struct Key(pub Bytes);

impl Key {
    pub fn new<T: Into<Bytes>>(data: T) -> Self {
        Self(data.into())
    }
}

impl Deref for Key {
    type Target = Bytes;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Deserializer for Key {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        Ok(Key(deserialize_opaque(buf, 2)?))
    }
}

impl Serializer for Key {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_opaque(&self.0, 2, buf)
    }
}

pub type HpkePublicKey = Key;
pub type HpkePrivateKey = Key;
pub type SignaturePublicKey = Key;
pub type SignaturePrivateKey = Key;

/// ECIES output: the sender's ephemeral public key plus the AEAD ciphertext
/// (tag appended).
///
/// ```text
/// struct {
///     opaque kem_output<0..2^16-1>;
///     opaque ciphertext<0..2^24-1>;
/// } HPKECiphertext;
/// ```
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct HpkeCiphertext {
    pub kem_output: HpkePublicKey,
    pub ciphertext: Bytes,
}

impl Deserializer for HpkeCiphertext {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let kem_output = HpkePublicKey::deserialize(buf)?;
        let ciphertext = deserialize_opaque(buf, 3)?;
        Ok(Self {
            kem_output,
            ciphertext,
        })
    }
}

impl Serializer for HpkeCiphertext {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.kem_output.serialize(buf)?;
        serialize_opaque(&self.ciphertext, 3, buf)
    }
}
