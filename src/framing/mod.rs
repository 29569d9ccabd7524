//! Handshake records and their canonical wire forms.
//!
//! Signatures and transcript hashes cover these encodings, so every message
//! re-encodes from its in-memory form; nothing caches received bytes.


pub mod welcome;

pub use welcome::{Welcome, WelcomeInfo};

use bytes::{Buf, BufMut, Bytes};

use crate::crypto::cipher_suite::{CipherSuite, ProtocolVersion};
use crate::crypto::credential::Credential;
use crate::crypto::key_pair::SignatureKeyPair;
use crate::crypto::provider::CryptoProvider;
use crate::crypto::HpkePublicKey;
use crate::ratchet_tree::DirectPath;
use crate::utilities::error::{Error, Result};
use crate::utilities::serde::{
    deserialize_opaque, deserialize_vector, read_u16, read_u32, read_u8, serialize_opaque,
    serialize_vector, write_uint, Deserializer, Serializer,
};
use crate::utilities::tree_math::LeafIndex;

/// A prospective member's pre-published, signed bundle of init keys, one per
/// supported cipher suite.
///
/// ```text
/// struct {
///     opaque user_init_key_id<0..255>;
///     ProtocolVersion supported_versions<0..255>;
///     CipherSuite cipher_suites<0..255>;
///     HPKEPublicKey init_keys<0..2^16-1>;
///     Credential credential;
///     opaque signature<0..2^16-1>;
/// } UserInitKey;
/// ```
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UserInitKey {
    pub user_init_key_id: Bytes,
    pub supported_versions: Vec<ProtocolVersion>,
    pub cipher_suites: Vec<CipherSuite>,
    pub init_keys: Vec<HpkePublicKey>,
    pub credential: Credential,
    pub signature: Bytes,
}

impl Default for UserInitKey {
    fn default() -> Self {
        Self {
            user_init_key_id: Bytes::new(),
            supported_versions: vec![ProtocolVersion::Mls10],
            cipher_suites: vec![],
            init_keys: vec![],
            credential: Credential::default(),
            signature: Bytes::new(),
        }
    }
}

impl UserInitKey {
    /// Registers an init key for `cipher_suite`, keeping `cipher_suites` and
    /// `init_keys` index-aligned.
    pub fn add_init_key(
        &mut self,
        cipher_suite: CipherSuite,
        public_key: HpkePublicKey,
    ) -> Result<()> {
        if self.cipher_suites.contains(&cipher_suite) {
            return Err(Error::InvalidParameter("duplicate cipher suite"));
        }
        self.cipher_suites.push(cipher_suite);
        self.init_keys.push(public_key);
        Ok(())
    }

    /// The init key published for `cipher_suite`, paired by index.
    pub fn find_init_key(&self, cipher_suite: CipherSuite) -> Option<&HpkePublicKey> {
        self.cipher_suites
            .iter()
            .position(|suite| *suite == cipher_suite)
            .map(|i| &self.init_keys[i])
    }

    /// Encoding of every field except the signature.
    pub fn to_be_signed(&self) -> Result<Bytes> {
        let mut buf = bytes::BytesMut::new();
        self.serialize_without_signature(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Installs `credential` and signs the bundle with the matching identity
    /// key.
    pub fn sign(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        identity_key: &SignatureKeyPair,
        credential: Credential,
    ) -> Result<()> {
        self.credential = credential;
        let to_be_signed = self.to_be_signed()?;
        self.signature = crypto_provider
            .signature(identity_key.signature_scheme)?
            .sign(&identity_key.private_key, &to_be_signed)?;
        Ok(())
    }

    /// Checks the signature against the embedded credential.
    pub fn verify(&self, crypto_provider: &impl CryptoProvider) -> Result<()> {
        let to_be_signed = self.to_be_signed()?;
        self.credential
            .verify(crypto_provider, &to_be_signed, &self.signature)
    }

    fn serialize_without_signature<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        serialize_opaque(&self.user_init_key_id, 1, buf)?;
        serialize_vector(self.supported_versions.len(), 1, buf, |i, b| {
            b.put_u8(self.supported_versions[i].into());
            Ok(())
        })?;
        serialize_vector(self.cipher_suites.len(), 1, buf, |i, b| {
            b.put_u16(self.cipher_suites[i].into());
            Ok(())
        })?;
        serialize_vector(self.init_keys.len(), 2, buf, |i, b| {
            self.init_keys[i].serialize(b)
        })?;
        self.credential.serialize(buf)
    }
}

impl Deserializer for UserInitKey {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let user_init_key_id = deserialize_opaque(buf, 1)?;

        let mut supported_versions = vec![];
        deserialize_vector(buf, 1, |b: &mut Bytes| -> Result<()> {
            supported_versions.push(ProtocolVersion::try_from(read_u8(b)?)?);
            Ok(())
        })?;

        let mut cipher_suites = vec![];
        deserialize_vector(buf, 1, |b: &mut Bytes| -> Result<()> {
            cipher_suites.push(CipherSuite::try_from(read_u16(b)?)?);
            Ok(())
        })?;

        let mut init_keys = vec![];
        deserialize_vector(buf, 2, |b: &mut Bytes| -> Result<()> {
            init_keys.push(HpkePublicKey::deserialize(b)?);
            Ok(())
        })?;

        if cipher_suites.len() != init_keys.len() {
            return Err(Error::InconsistentLength("init_keys vs cipher_suites"));
        }

        let credential = Credential::deserialize(buf)?;
        let signature = deserialize_opaque(buf, 2)?;

        Ok(Self {
            user_init_key_id,
            supported_versions,
            cipher_suites,
            init_keys,
            credential,
            signature,
        })
    }
}

impl Serializer for UserInitKey {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.serialize_without_signature(buf)?;
        serialize_opaque(&self.signature, 2, buf)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum GroupOperationType {
    Add = 1,
    Update = 2,
    Remove = 3,
}

impl TryFrom<u8> for GroupOperationType {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            1 => Ok(GroupOperationType::Add),
            2 => Ok(GroupOperationType::Update),
            3 => Ok(GroupOperationType::Remove),
            _ => Err(Error::UnknownVariant("GroupOperationType")),
        }
    }
}

impl From<GroupOperationType> for u8 {
    fn from(val: GroupOperationType) -> u8 {
        val as u8
    }
}

/// Proposes a new member at `index`, carrying its [`UserInitKey`] and a hash
/// of the pre-add `WelcomeInfo` so the joiner and the group agree on the
/// state being extended.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Add {
    pub index: LeafIndex,
    pub init_key: UserInitKey,
    pub welcome_info_hash: Bytes,
}

impl Deserializer for Add {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let index = LeafIndex(read_u32(buf)?);
        let init_key = UserInitKey::deserialize(buf)?;
        let welcome_info_hash = deserialize_opaque(buf, 1)?;
        Ok(Self {
            index,
            init_key,
            welcome_info_hash,
        })
    }
}

impl Serializer for Add {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        write_uint(u64::from(self.index.0), 4, buf)?;
        self.init_key.serialize(buf)?;
        serialize_opaque(&self.welcome_info_hash, 1, buf)
    }
}

/// A member's fresh direct path.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Update {
    pub path: DirectPath,
}

impl Deserializer for Update {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        Ok(Self {
            path: DirectPath::deserialize(buf)?,
        })
    }
}

impl Serializer for Update {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.path.serialize(buf)
    }
}

/// Evicts the member at `removed`; the path is an update from the remover's
/// own leaf, encrypted against the tree with the removed leaf already
/// blanked.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Remove {
    pub removed: LeafIndex,
    pub path: DirectPath,
}

impl Deserializer for Remove {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let removed = LeafIndex(read_u32(buf)?);
        let path = DirectPath::deserialize(buf)?;
        Ok(Self { removed, path })
    }
}

impl Serializer for Remove {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        write_uint(u64::from(self.removed.0), 4, buf)?;
        self.path.serialize(buf)
    }
}

/// The operation carried by a handshake, discriminated on the wire by
/// [`GroupOperationType`]. Exactly one arm is inhabited.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum GroupOperation {
    Add(Add),
    Update(Update),
    Remove(Remove),
}

impl GroupOperation {
    pub fn operation_type(&self) -> GroupOperationType {
        match self {
            GroupOperation::Add(_) => GroupOperationType::Add,
            GroupOperation::Update(_) => GroupOperationType::Update,
            GroupOperation::Remove(_) => GroupOperationType::Remove,
        }
    }
}

impl Deserializer for GroupOperation {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let operation_type = GroupOperationType::try_from(read_u8(buf)?)?;
        match operation_type {
            GroupOperationType::Add => Ok(Self::Add(Add::deserialize(buf)?)),
            GroupOperationType::Update => Ok(Self::Update(Update::deserialize(buf)?)),
            GroupOperationType::Remove => Ok(Self::Remove(Remove::deserialize(buf)?)),
        }
    }
}

impl Serializer for GroupOperation {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        buf.put_u8(self.operation_type().into());
        match self {
            GroupOperation::Add(add) => add.serialize(buf),
            GroupOperation::Update(update) => update.serialize(buf),
            GroupOperation::Remove(remove) => remove.serialize(buf),
        }
    }
}

/// A signed, confirmed group operation.
///
/// ```text
/// struct {
///     uint32 prior_epoch;
///     GroupOperation operation;
///     uint32 signer_index;
///     opaque signature<0..2^16-1>;
///     opaque confirmation<0..255>;
/// } Handshake;
/// ```
///
/// The signature covers the first three fields; the confirmation is an HMAC
/// of the successor epoch's transcript hash under its confirmation key.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Handshake {
    pub prior_epoch: u32,
    pub operation: GroupOperation,
    pub signer_index: LeafIndex,
    pub signature: Bytes,
    pub confirmation: Bytes,
}

impl Handshake {
    pub fn epoch(&self) -> u32 {
        self.prior_epoch + 1
    }

    /// Encoding of `prior_epoch ‖ operation ‖ signer_index`.
    pub fn to_be_signed(&self) -> Result<Bytes> {
        let mut buf = bytes::BytesMut::new();
        write_uint(u64::from(self.prior_epoch), 4, &mut buf)?;
        self.operation.serialize(&mut buf)?;
        write_uint(u64::from(self.signer_index.0), 4, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Everything but the confirmation; the successor transcript hash is
    /// computed over these bytes.
    pub fn transcript_input(&self) -> Result<Bytes> {
        let mut buf = bytes::BytesMut::new();
        write_uint(u64::from(self.prior_epoch), 4, &mut buf)?;
        self.operation.serialize(&mut buf)?;
        write_uint(u64::from(self.signer_index.0), 4, &mut buf)?;
        serialize_opaque(&self.signature, 2, &mut buf)?;
        Ok(buf.freeze())
    }
}

impl Deserializer for Handshake {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let prior_epoch = read_u32(buf)?;
        let operation = GroupOperation::deserialize(buf)?;
        let signer_index = LeafIndex(read_u32(buf)?);
        let signature = deserialize_opaque(buf, 2)?;
        let confirmation = deserialize_opaque(buf, 1)?;
        Ok(Self {
            prior_epoch,
            operation,
            signer_index,
            signature,
            confirmation,
        })
    }
}

impl Serializer for Handshake {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        write_uint(u64::from(self.prior_epoch), 4, buf)?;
        self.operation.serialize(buf)?;
        write_uint(u64::from(self.signer_index.0), 4, buf)?;
        serialize_opaque(&self.signature, 2, buf)?;
        serialize_opaque(&self.confirmation, 1, buf)
    }
}
