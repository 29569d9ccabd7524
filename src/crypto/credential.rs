//! Member identities and the leaf-indexed roster.

use bytes::{Buf, BufMut, Bytes};

use crate::crypto::cipher_suite::SignatureScheme;
use crate::crypto::provider::CryptoProvider;
use crate::crypto::SignaturePublicKey;
use crate::utilities::error::{Error, Result};
use crate::utilities::serde::{
    deserialize_opaque, deserialize_optional, deserialize_vector, read_u16, read_u8,
    serialize_opaque, serialize_optional, serialize_vector, Deserializer, Serializer,
};
use crate::utilities::tree_math::LeafIndex;

#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum CredentialType {
    #[default]
    Basic = 0x00,
}

impl TryFrom<u8> for CredentialType {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            0x00 => Ok(CredentialType::Basic),
            _ => Err(Error::UnknownVariant("CredentialType")),
        }
    }
}

impl From<CredentialType> for u8 {
    fn from(val: CredentialType) -> u8 {
        val as u8
    }
}

/// A bare assertion of an identity bound to a signature public key.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct BasicCredential {
    pub identity: Bytes,
    pub signature_scheme: SignatureScheme,
    pub public_key: SignaturePublicKey,
}

impl Deserializer for BasicCredential {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let identity = deserialize_opaque(buf, 2)?;
        let signature_scheme = SignatureScheme::try_from(read_u16(buf)?)?;
        let public_key = SignaturePublicKey::deserialize(buf)?;
        Ok(Self {
            identity,
            signature_scheme,
            public_key,
        })
    }
}

impl Serializer for BasicCredential {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_opaque(&self.identity, 2, buf)?;
        buf.put_u16(self.signature_scheme.into());
        self.public_key.serialize(buf)
    }
}

/// A member's presented identity. The only variant so far is [`Basic`];
/// the discriminator octet leaves room for richer ones.
///
/// [`Basic`]: Credential::Basic
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Credential {
    Basic(BasicCredential),
}

impl Default for Credential {
    fn default() -> Self {
        Self::Basic(BasicCredential::default())
    }
}

impl Credential {
    pub fn basic(
        identity: impl Into<Bytes>,
        signature_scheme: SignatureScheme,
        public_key: SignaturePublicKey,
    ) -> Self {
        Self::Basic(BasicCredential {
            identity: identity.into(),
            signature_scheme,
            public_key,
        })
    }

    pub fn credential_type(&self) -> CredentialType {
        match self {
            Credential::Basic(_) => CredentialType::Basic,
        }
    }

    pub fn identity(&self) -> &Bytes {
        let Credential::Basic(basic) = self;
        &basic.identity
    }

    pub fn signature_scheme(&self) -> SignatureScheme {
        let Credential::Basic(basic) = self;
        basic.signature_scheme
    }

    pub fn public_key(&self) -> &SignaturePublicKey {
        let Credential::Basic(basic) = self;
        &basic.public_key
    }

    /// Verifies `signature` over `message` under this credential's key,
    /// dispatching on its signature scheme.
    pub fn verify(
        &self,
        crypto_provider: &impl CryptoProvider,
        message: &[u8],
        signature: &[u8],
    ) -> Result<()> {
        crypto_provider
            .signature(self.signature_scheme())?
            .verify(self.public_key(), message, signature)
    }
}

impl Deserializer for Credential {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let credential_type = CredentialType::try_from(read_u8(buf)?)?;
        match credential_type {
            CredentialType::Basic => Ok(Self::Basic(BasicCredential::deserialize(buf)?)),
        }
    }
}

impl Serializer for Credential {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        buf.put_u8(self.credential_type().into());
        match self {
            Credential::Basic(basic) => basic.serialize(buf),
        }
    }
}

/// Ordered list of member credentials indexed by leaf; removed slots hold
/// `None`. Always sized to the tree's leaf count; trailing blanks are
/// truncated on encode and re-padded against the tree on decode.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct Roster(pub Vec<Option<Credential>>);

impl Roster {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, leaf: LeafIndex) -> Option<&Credential> {
        self.0.get(leaf.0 as usize).and_then(|slot| slot.as_ref())
    }

    /// Installs a credential at `leaf`, growing the roster with blanks as
    /// needed. Occupied slots cannot be overwritten.
    pub fn add_at(&mut self, leaf: LeafIndex, credential: Credential) -> Result<()> {
        let index = leaf.0 as usize;
        if index >= self.0.len() {
            self.0.resize(index + 1, None);
        }
        let slot = &mut self.0[index];
        if slot.is_some() {
            return Err(Error::InvalidParameter("roster slot is occupied"));
        }
        *slot = Some(credential);
        Ok(())
    }

    pub fn blank_at(&mut self, leaf: LeafIndex) -> Result<()> {
        let slot = self
            .0
            .get_mut(leaf.0 as usize)
            .ok_or(Error::InvalidParameter("roster index out of range"))?;
        *slot = None;
        Ok(())
    }

    /// Grows the roster with blanks up to `len`; used after decode to match
    /// the tree's leaf count.
    pub fn pad_to(&mut self, len: usize) {
        if self.0.len() < len {
            self.0.resize(len, None);
        }
    }

    fn truncated_len(&self) -> usize {
        self.0
            .iter()
            .rposition(|slot| slot.is_some())
            .map_or(0, |i| i + 1)
    }
}

impl Deserializer for Roster {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let mut slots = vec![];
        deserialize_vector(buf, 4, |b: &mut Bytes| -> Result<()> {
            let present = deserialize_optional(b)?;
            if present {
                slots.push(Some(Credential::deserialize(b)?));
            } else {
                slots.push(None);
            }
            Ok(())
        })?;
        Ok(Self(slots))
    }
}

impl Serializer for Roster {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        let len = self.truncated_len();
        serialize_vector(len, 4, buf, |i: usize, b| -> Result<()> {
            match &self.0[i] {
                Some(credential) => {
                    serialize_optional(true, b)?;
                    credential.serialize(b)
                }
                None => serialize_optional(false, b),
            }
        })
    }
}
