use bytes::{Buf, BufMut, Bytes};
use rand_core::{CryptoRng, RngCore};

use crate::crypto::cipher_suite::{CipherSuite, ProtocolVersion};
use crate::crypto::credential::Roster;
use crate::crypto::provider::CryptoProvider;
use crate::crypto::rng::random_bytes;
use crate::crypto::{HpkeCiphertext, HpkePrivateKey, HpkePublicKey};
use crate::utilities::error::{Error, Result};
use crate::utilities::serde::{
    deserialize_opaque, deserialize_optional, deserialize_vector, read_u16, read_u32, read_u8,
    serialize_opaque, serialize_optional, serialize_vector, write_uint, Deserializer, Serializer,
};
use crate::utilities::tree_math;

/// Everything a new member needs to replicate the group state it is being
/// added to: the pre-add roster, tree public keys, transcript hash and init
/// secret.
///
/// ```text
/// struct {
///     ProtocolVersion version;
///     opaque group_id<0..255>;
///     uint32 epoch;
///     optional<Credential> roster<0..2^32-1>;
///     optional<HPKEPublicKey> tree<0..2^32-1>;
///     opaque transcript_hash<0..255>;
///     opaque init_secret<0..255>;
/// } WelcomeInfo;
/// ```
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WelcomeInfo {
    pub version: ProtocolVersion,
    pub group_id: Bytes,
    pub epoch: u32,
    pub roster: Roster,
    pub tree: Vec<Option<HpkePublicKey>>,
    pub transcript_hash: Bytes,
    pub init_secret: Bytes,
}

impl WelcomeInfo {
    /// Hash of the canonical encoding; carried by `Add.welcome_info_hash` so
    /// the group and the joiner agree on the state being extended.
    pub fn hash(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
    ) -> Result<Bytes> {
        let encoded = self.serialize_detached()?;
        Ok(crypto_provider.hash(cipher_suite)?.digest(&encoded))
    }

    /// Number of leaves described by the tree vector.
    pub fn leaf_count(&self) -> u32 {
        if self.tree.is_empty() {
            0
        } else {
            tree_math::leaf_count(self.tree.len() as u32)
        }
    }
}

impl Deserializer for WelcomeInfo {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let version = ProtocolVersion::try_from(read_u8(buf)?)?;
        let group_id = deserialize_opaque(buf, 1)?;
        let epoch = read_u32(buf)?;
        let mut roster = Roster::deserialize(buf)?;

        let mut tree = vec![];
        deserialize_vector(buf, 4, |b: &mut Bytes| -> Result<()> {
            if deserialize_optional(b)? {
                tree.push(Some(HpkePublicKey::deserialize(b)?));
            } else {
                tree.push(None);
            }
            Ok(())
        })?;
        if !tree.is_empty() && tree.len() % 2 == 0 {
            return Err(Error::InconsistentLength("ratchet tree width"));
        }

        let transcript_hash = deserialize_opaque(buf, 1)?;
        let init_secret = deserialize_opaque(buf, 1)?;

        // The roster's trailing blanks are truncated on the wire; size it
        // back up against the tree.
        let leaves = if tree.is_empty() {
            0
        } else {
            tree_math::leaf_count(tree.len() as u32)
        };
        if roster.len() > leaves as usize {
            return Err(Error::InconsistentLength("roster vs tree"));
        }
        roster.pad_to(leaves as usize);

        Ok(Self {
            version,
            group_id,
            epoch,
            roster,
            tree,
            transcript_hash,
            init_secret,
        })
    }
}

impl Serializer for WelcomeInfo {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        buf.put_u8(self.version.into());
        serialize_opaque(&self.group_id, 1, buf)?;
        write_uint(u64::from(self.epoch), 4, buf)?;
        self.roster.serialize(buf)?;
        serialize_vector(self.tree.len(), 4, buf, |i, b| match &self.tree[i] {
            Some(public_key) => {
                serialize_optional(true, b)?;
                public_key.serialize(b)
            }
            None => serialize_optional(false, b),
        })?;
        serialize_opaque(&self.transcript_hash, 1, buf)?;
        serialize_opaque(&self.init_secret, 1, buf)
    }
}

/// A [`WelcomeInfo`] encrypted to a joiner's published init key.
///
/// ```text
/// struct {
///     opaque user_init_key_id<0..255>;
///     CipherSuite cipher_suite;
///     HPKECiphertext encrypted_welcome_info;
/// } Welcome;
/// ```
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Welcome {
    pub user_init_key_id: Bytes,
    pub cipher_suite: CipherSuite,
    pub encrypted_welcome_info: HpkeCiphertext,
}

impl Welcome {
    /// Encrypts `welcome_info` to the joiner's init key for this suite.
    pub fn new(
        crypto_provider: &impl CryptoProvider,
        rng: &mut (impl RngCore + CryptoRng),
        user_init_key_id: Bytes,
        cipher_suite: CipherSuite,
        recipient: &HpkePublicKey,
        welcome_info: &WelcomeInfo,
    ) -> Result<Self> {
        let plaintext = welcome_info.serialize_detached()?;
        let ephemeral: [u8; 32] = random_bytes(rng);
        let encrypted_welcome_info =
            crypto_provider
                .hpke(cipher_suite)?
                .seal(recipient, &plaintext, &ephemeral)?;
        Ok(Self {
            user_init_key_id,
            cipher_suite,
            encrypted_welcome_info,
        })
    }

    /// Decrypts with the init private key the joiner kept alongside its
    /// published [`UserInitKey`](crate::framing::UserInitKey).
    pub fn decrypt(
        &self,
        crypto_provider: &impl CryptoProvider,
        init_private_key: &HpkePrivateKey,
    ) -> Result<WelcomeInfo> {
        let plaintext = crypto_provider
            .hpke(self.cipher_suite)?
            .open(init_private_key, &self.encrypted_welcome_info)?;
        WelcomeInfo::deserialize_exact(&plaintext)
    }
}

impl Deserializer for Welcome {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let user_init_key_id = deserialize_opaque(buf, 1)?;
        let cipher_suite = CipherSuite::try_from(read_u16(buf)?)?;
        let encrypted_welcome_info = HpkeCiphertext::deserialize(buf)?;
        Ok(Self {
            user_init_key_id,
            cipher_suite,
            encrypted_welcome_info,
        })
    }
}

impl Serializer for Welcome {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_opaque(&self.user_init_key_id, 1, buf)?;
        buf.put_u16(self.cipher_suite.into());
        self.encrypted_welcome_info.serialize(buf)
    }
}
