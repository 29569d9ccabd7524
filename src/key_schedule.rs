//! The per-epoch key schedule.
//!
//! Each applied handshake folds the tree's new root secret into the running
//! chain: `epoch_secret = HKDF-Extract(init_secret, update_secret)`, then
//! every working secret is expanded from it under a label bound to the
//! canonical encoding of the group's public state. All members who apply the
//! same handshake to the same prior state derive byte-identical successors.

use bytes::{Buf, BufMut, Bytes};

use crate::crypto::cipher_suite::CipherSuite;
use crate::crypto::provider::CryptoProvider;
use crate::utilities::error::Result;
use crate::utilities::serde::{
    deserialize_opaque, read_u32, serialize_opaque, write_uint, Deserializer, Serializer,
};

/// The public state bound into every derived secret.
///
/// ```text
/// struct {
///     opaque group_id<0..255>;
///     uint32 epoch;
///     opaque tree_hash<0..255>;
///     opaque transcript_hash<0..255>;
/// } GroupContext;
/// ```
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct GroupContext {
    pub group_id: Bytes,
    pub epoch: u32,
    pub tree_hash: Bytes,
    pub transcript_hash: Bytes,
}

impl Deserializer for GroupContext {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let group_id = deserialize_opaque(buf, 1)?;
        let epoch = read_u32(buf)?;
        let tree_hash = deserialize_opaque(buf, 1)?;
        let transcript_hash = deserialize_opaque(buf, 1)?;
        Ok(Self {
            group_id,
            epoch,
            tree_hash,
            transcript_hash,
        })
    }
}

impl Serializer for GroupContext {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_opaque(&self.group_id, 1, buf)?;
        write_uint(u64::from(self.epoch), 4, buf)?;
        serialize_opaque(&self.tree_hash, 1, buf)?;
        serialize_opaque(&self.transcript_hash, 1, buf)
    }
}

/// The working secrets of one epoch. `init_secret` seeds the next epoch's
/// extraction and never goes on the wire except inside a `WelcomeInfo`.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct EpochSecrets {
    pub application_secret: Bytes,
    pub confirmation_key: Bytes,
    pub sender_data_key: Bytes,
    pub init_secret: Bytes,
}

/// Runs the schedule for one epoch transition.
pub fn derive_epoch_secrets(
    crypto_provider: &impl CryptoProvider,
    cipher_suite: CipherSuite,
    init_secret: &[u8],
    update_secret: &[u8],
    group_context: &GroupContext,
) -> Result<EpochSecrets> {
    let epoch_secret = crypto_provider
        .hpke(cipher_suite)?
        .kdf_extract(init_secret, update_secret)?;
    let context = group_context.serialize_detached()?;

    let application_secret =
        crypto_provider.derive_secret(cipher_suite, &epoch_secret, b"app", &context)?;
    let confirmation_key =
        crypto_provider.derive_secret(cipher_suite, &epoch_secret, b"confirm", &context)?;
    let sender_data_key =
        crypto_provider.derive_secret(cipher_suite, &epoch_secret, b"sender data", &context)?;
    let init_secret =
        crypto_provider.derive_secret(cipher_suite, &epoch_secret, b"init", &context)?;

    Ok(EpochSecrets {
        application_secret,
        confirmation_key,
        sender_data_key,
        init_secret,
    })
}
