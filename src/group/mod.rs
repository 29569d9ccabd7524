//! Group creation and evolution.
//!
//! A group is created with a single member, the founder. Other members join
//! through Add handshakes, refresh their keys with Updates for
//! post-compromise security, and are evicted with Removes. Every transition
//! is atomic: a [`State`] either advances to the next epoch completely or is
//! left untouched.

use bytes::Bytes;

use crate::crypto::cipher_suite::{CipherSuite, ProtocolVersion};
use crate::crypto::credential::{Credential, Roster};
use crate::crypto::key_pair::{HpkeKeyPair, SignatureKeyPair};
use crate::crypto::provider::CryptoProvider;
use crate::framing::WelcomeInfo;
use crate::key_schedule::{derive_epoch_secrets, EpochSecrets, GroupContext};
use crate::ratchet_tree::{DirectPath, RatchetTree};
use crate::utilities::error::{Error, Result};
use crate::utilities::tree_math::LeafIndex;

#[cfg(test)]
mod group_test;

pub mod config;
pub mod creation;
pub mod evolution;

/// The init key pair a member keeps between receiving a Welcome and seeing
/// the Add that seats it in the tree.
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct PendingInit {
    pub(crate) user_init_key_id: Bytes,
    pub(crate) init_key_pair: HpkeKeyPair,
}

/// One member's replica of the group state. Exclusive-owner semantics: a
/// value is mutated only by its owner, either through the `create_*`
/// operations or by [`State::handle`] on a received handshake.
#[derive(Debug, Clone)]
pub struct State {
    pub(crate) cipher_suite: CipherSuite,
    pub(crate) version: ProtocolVersion,
    pub(crate) group_id: Bytes,
    pub(crate) epoch: u32,
    pub(crate) roster: Roster,
    pub(crate) tree: RatchetTree,
    pub(crate) transcript_hash: Bytes,
    pub(crate) secrets: EpochSecrets,
    pub(crate) my_leaf: Option<LeafIndex>,
    pub(crate) identity_key: SignatureKeyPair,
    pub(crate) credential: Credential,
    pub(crate) pending_init: Option<PendingInit>,
}

impl State {
    pub fn cipher_suite(&self) -> CipherSuite {
        self.cipher_suite
    }

    pub fn group_id(&self) -> &Bytes {
        &self.group_id
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn tree(&self) -> &RatchetTree {
        &self.tree
    }

    /// This member's leaf, `None` while the member is still waiting for its
    /// Add.
    pub fn leaf_index(&self) -> Option<LeafIndex> {
        self.my_leaf
    }

    pub fn application_secret(&self) -> &Bytes {
        &self.secrets.application_secret
    }

    /// Snapshot of the shareable group state; an encrypted copy of this is
    /// what a joiner bootstraps from.
    pub fn welcome_info(&self) -> WelcomeInfo {
        WelcomeInfo {
            version: self.version,
            group_id: self.group_id.clone(),
            epoch: self.epoch,
            roster: self.roster.clone(),
            tree: self.tree.to_public_keys(),
            transcript_hash: self.transcript_hash.clone(),
            init_secret: self.secrets.init_secret.clone(),
        }
    }

    pub fn group_context(&self, crypto_provider: &impl CryptoProvider) -> Result<GroupContext> {
        Ok(GroupContext {
            group_id: self.group_id.clone(),
            epoch: self.epoch,
            tree_hash: self.tree.tree_hash(crypto_provider)?,
            transcript_hash: self.transcript_hash.clone(),
        })
    }

    pub(crate) fn signer_leaf(&self) -> Result<LeafIndex> {
        self.my_leaf
            .ok_or(Error::InvalidParameter("member is not yet seated in the tree"))
    }

    /// First blank slot, or the append position past the last leaf.
    pub(crate) fn next_free_leaf(&self) -> LeafIndex {
        let leaves = self.tree.leaf_count();
        for i in 0..leaves {
            let leaf = LeafIndex(i);
            let tree_blank = self
                .tree
                .get_leaf(leaf)
                .map_or(true, crate::ratchet_tree::Node::is_blank);
            if self.roster.get(leaf).is_none() && tree_blank {
                return leaf;
            }
        }
        LeafIndex(leaves)
    }

    /// Decrypts, merges and re-derives a sender's direct path, returning the
    /// new root secret.
    pub(crate) fn apply_path(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        signer: LeafIndex,
        path: &DirectPath,
    ) -> Result<Bytes> {
        let me = self.signer_leaf()?;
        let (secret, ancestor) = self.tree.decrypt(crypto_provider, signer, path, me)?;
        self.tree.merge(signer, path)?;
        self.tree.set_path_secrets(crypto_provider, ancestor, &secret)?;
        self.tree.root_secret()
    }

    /// Folds the applied operation into the transcript, bumps the epoch and
    /// re-runs the key schedule. `transcript_input` is the handshake minus
    /// its confirmation.
    pub(crate) fn advance_epoch(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        update_secret: &[u8],
        transcript_input: &[u8],
    ) -> Result<()> {
        let hash = crypto_provider.hash(self.cipher_suite)?;
        let mut data =
            Vec::with_capacity(self.transcript_hash.len() + transcript_input.len());
        data.extend_from_slice(&self.transcript_hash);
        data.extend_from_slice(transcript_input);
        self.transcript_hash = hash.digest(&data);

        self.epoch = self
            .epoch
            .checked_add(1)
            .ok_or(Error::InvalidParameter("epoch counter exhausted"))?;

        let group_context = self.group_context(crypto_provider)?;
        let prior_init = self.secrets.init_secret.clone();
        self.secrets = derive_epoch_secrets(
            crypto_provider,
            self.cipher_suite,
            &prior_init,
            update_secret,
            &group_context,
        )?;
        Ok(())
    }
}
