use bytes::Bytes;
use rand_core::{CryptoRng, RngCore};

use crate::crypto::cipher_suite::ProtocolVersion;
use crate::crypto::provider::CryptoProvider;
use crate::crypto::rng::random_bytes;
use crate::framing::{
    Add, GroupOperation, Handshake, Remove, Update, UserInitKey, Welcome,
};
use crate::group::State;
use crate::ratchet_tree::Node;
use crate::utilities::error::{Error, Result};
use crate::utilities::tree_math::LeafIndex;

impl State {
    /// Adds the holder of `user_init_key` to the group. Returns the Welcome
    /// for the joiner and the Add handshake for the existing members, and
    /// advances this state to the new epoch.
    pub fn create_add(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        rng: &mut (impl RngCore + CryptoRng),
        user_init_key: &UserInitKey,
    ) -> Result<(Welcome, Handshake)> {
        user_init_key.verify(crypto_provider)?;
        let init_public_key = user_init_key
            .find_init_key(self.cipher_suite)
            .ok_or(Error::UnknownSuite)?
            .clone();

        let welcome_info = self.welcome_info();
        let welcome = Welcome::new(
            crypto_provider,
            rng,
            user_init_key.user_init_key_id.clone(),
            self.cipher_suite,
            &init_public_key,
            &welcome_info,
        )?;

        let add = Add {
            index: self.next_free_leaf(),
            init_key: user_init_key.clone(),
            welcome_info_hash: welcome_info.hash(crypto_provider, self.cipher_suite)?,
        };

        let mut next = self.clone();
        let update_secret = next.apply_add(crypto_provider, &add)?;
        let handshake =
            next.seal_handshake(crypto_provider, GroupOperation::Add(add), &update_secret)?;
        *self = next;
        Ok((welcome, handshake))
    }

    /// Refreshes this member's leaf with a new secret and advances to the
    /// new epoch. The returned handshake carries the encrypted direct path.
    pub fn create_update(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Result<Handshake> {
        let me = self.signer_leaf()?;
        let mut next = self.clone();

        let leaf_secret: [u8; 32] = random_bytes(rng);
        let path = next
            .tree
            .encrypt(crypto_provider, me, &leaf_secret, rng)?;
        let update_secret = next.tree.root_secret()?;

        let handshake = next.seal_handshake(
            crypto_provider,
            GroupOperation::Update(Update { path }),
            &update_secret,
        )?;
        *self = next;
        Ok(handshake)
    }

    /// Evicts the member at `removed`: blanks its leaf and path, then rekeys
    /// from this member's own leaf so the departed member cannot follow.
    pub fn create_remove(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        rng: &mut (impl RngCore + CryptoRng),
        removed: LeafIndex,
    ) -> Result<Handshake> {
        let me = self.signer_leaf()?;
        if removed == me {
            return Err(Error::InvalidParameter("cannot remove own leaf"));
        }
        if self.roster.get(removed).is_none() {
            return Err(Error::MissingRosterEntry);
        }

        let mut next = self.clone();
        next.tree.blank_path(removed)?;
        next.roster.blank_at(removed)?;

        let leaf_secret: [u8; 32] = random_bytes(rng);
        let path = next
            .tree
            .encrypt(crypto_provider, me, &leaf_secret, rng)?;
        let update_secret = next.tree.root_secret()?;

        let handshake = next.seal_handshake(
            crypto_provider,
            GroupOperation::Remove(Remove { removed, path }),
            &update_secret,
        )?;
        *self = next;
        Ok(handshake)
    }

    /// Applies a received handshake. Validation order: epoch, roster lookup,
    /// signature over the prior state, the operation itself, then the
    /// confirmation against the successor state. Any failure leaves this
    /// state untouched.
    pub fn handle(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        handshake: &Handshake,
    ) -> Result<()> {
        if handshake.prior_epoch != self.epoch {
            return Err(Error::StaleEpoch {
                current: self.epoch,
                got: handshake.prior_epoch,
            });
        }

        let signer_credential = self
            .roster
            .get(handshake.signer_index)
            .ok_or(Error::MissingRosterEntry)?;
        signer_credential.verify(
            crypto_provider,
            &handshake.to_be_signed()?,
            &handshake.signature,
        )?;

        let mut next = self.clone();
        let update_secret = match &handshake.operation {
            GroupOperation::Add(add) => next.apply_add(crypto_provider, add)?,
            GroupOperation::Update(update) => {
                next.apply_path(crypto_provider, handshake.signer_index, &update.path)?
            }
            GroupOperation::Remove(remove) => {
                if next.roster.get(remove.removed).is_none() {
                    return Err(Error::MissingRosterEntry);
                }
                next.tree.blank_path(remove.removed)?;
                next.roster.blank_at(remove.removed)?;
                next.apply_path(crypto_provider, handshake.signer_index, &remove.path)?
            }
        };

        next.advance_epoch(
            crypto_provider,
            &update_secret,
            &handshake.transcript_input()?,
        )?;

        crypto_provider.hash(next.cipher_suite)?.verify_mac(
            &next.secrets.confirmation_key,
            &next.transcript_hash,
            &handshake.confirmation,
        )?;

        *self = next;
        Ok(())
    }

    /// Seats a new member: verifies its init key bundle, checks the hash of
    /// the state being extended, installs credential and leaf, and blanks
    /// the new leaf's path. The update secret of an Add is all zeroes.
    fn apply_add(&mut self, crypto_provider: &impl CryptoProvider, add: &Add) -> Result<Bytes> {
        let leaf_count = self.tree.leaf_count();
        if add.index.0 > leaf_count {
            return Err(Error::InvalidParameter("add index beyond tree"));
        }

        add.init_key.verify(crypto_provider)?;
        if !add
            .init_key
            .supported_versions
            .contains(&ProtocolVersion::Mls10)
        {
            return Err(Error::InvalidParameter("unsupported protocol version"));
        }

        let expected_hash = self
            .welcome_info()
            .hash(crypto_provider, self.cipher_suite)?;
        if expected_hash != add.welcome_info_hash {
            return Err(Error::InvalidParameter("welcome info hash mismatch"));
        }

        let public_key = add
            .init_key
            .find_init_key(self.cipher_suite)
            .ok_or(Error::UnknownSuite)?
            .clone();

        if add.index.0 < leaf_count {
            let occupied = self
                .tree
                .get_leaf(add.index)
                .map_or(false, |node| !node.is_blank());
            if occupied {
                return Err(Error::InvalidParameter("add target leaf is occupied"));
            }
        }

        // Are we the member being seated? Match on the init key id from our
        // pending Welcome.
        let joining = self
            .pending_init
            .as_ref()
            .map_or(false, |pending| {
                pending.user_init_key_id == add.init_key.user_init_key_id
            });
        let private_key = if joining {
            let pending = self.pending_init.take().expect("pending checked above");
            if pending.init_key_pair.public_key != public_key {
                return Err(Error::InvalidParameter(
                    "init key does not match pending key pair",
                ));
            }
            Some(pending.init_key_pair.private_key)
        } else {
            None
        };

        self.roster
            .add_at(add.index, add.init_key.credential.clone())?;
        if add.index.0 == leaf_count {
            self.tree.add_leaf(add.index, Node::Blank)?;
        }
        self.tree.blank_path(add.index)?;
        self.tree.add_leaf(
            add.index,
            Node::Filled {
                public_key,
                private_key,
                secret: None,
            },
        )?;

        if joining {
            self.my_leaf = Some(add.index);
        }

        let hash_len = crypto_provider.hash(self.cipher_suite)?.size();
        Ok(Bytes::from(vec![0u8; hash_len]))
    }

    /// Signs the operation over the prior epoch, advances this state, and
    /// confirms the successor transcript.
    fn seal_handshake(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        operation: GroupOperation,
        update_secret: &[u8],
    ) -> Result<Handshake> {
        let signer = self.signer_leaf()?;
        let mut handshake = Handshake {
            prior_epoch: self.epoch,
            operation,
            signer_index: signer,
            signature: Bytes::new(),
            confirmation: Bytes::new(),
        };
        handshake.signature = crypto_provider
            .signature(self.identity_key.signature_scheme)?
            .sign(&self.identity_key.private_key, &handshake.to_be_signed()?)?;

        self.advance_epoch(crypto_provider, update_secret, &handshake.transcript_input()?)?;

        handshake.confirmation = crypto_provider
            .hash(self.cipher_suite)?
            .mac(&self.secrets.confirmation_key, &self.transcript_hash)?;
        Ok(handshake)
    }
}
