use bytes::Bytes;
use rand_core::{CryptoRng, RngCore};

use crate::crypto::credential::{Credential, Roster};
use crate::crypto::key_pair::{HpkeKeyPair, SignatureKeyPair};
use crate::crypto::provider::CryptoProvider;
use crate::crypto::rng::random_bytes;
use crate::framing::Welcome;
use crate::group::config::GroupConfig;
use crate::group::{PendingInit, State};
use crate::key_schedule::{derive_epoch_secrets, EpochSecrets};
use crate::ratchet_tree::{Node, RatchetTree};
use crate::utilities::error::{Error, Result};
use crate::utilities::tree_math::LeafIndex;

impl State {
    /// Creates a new one-member group. The founder occupies leaf 0 with a
    /// fresh leaf key pair; the initial schedule runs with a zero init
    /// secret and the leaf secret as the update secret.
    pub fn new(
        crypto_provider: &impl CryptoProvider,
        rng: &mut (impl RngCore + CryptoRng),
        group_config: GroupConfig,
        group_id: impl Into<Bytes>,
        credential: Credential,
        identity_key: SignatureKeyPair,
    ) -> Result<Self> {
        let cipher_suite = group_config.crypto_config.cipher_suite;
        if identity_key.signature_scheme != cipher_suite.signature_scheme() {
            return Err(Error::InvalidParameter(
                "identity key scheme does not match the suite",
            ));
        }
        if credential.public_key() != &identity_key.public_key {
            return Err(Error::InvalidParameter(
                "credential does not carry the identity key",
            ));
        }

        let hash_len = crypto_provider.hash(cipher_suite)?.size();

        let leaf_secret: [u8; 32] = random_bytes(rng);
        let leaf_pair = crypto_provider
            .hpke(cipher_suite)?
            .derive_key_pair(&leaf_secret)?;
        let mut tree = RatchetTree::new(cipher_suite);
        tree.add_leaf(
            LeafIndex(0),
            Node::Filled {
                public_key: leaf_pair.public_key,
                private_key: Some(leaf_pair.private_key),
                secret: Some(Bytes::copy_from_slice(&leaf_secret)),
            },
        )?;

        let mut roster = Roster::new();
        roster.add_at(LeafIndex(0), credential.clone())?;

        let mut state = State {
            cipher_suite,
            version: group_config.crypto_config.version,
            group_id: group_id.into(),
            epoch: 0,
            roster,
            tree,
            transcript_hash: Bytes::from(vec![0u8; hash_len]),
            secrets: EpochSecrets::default(),
            my_leaf: Some(LeafIndex(0)),
            identity_key,
            credential,
            pending_init: None,
        };

        let init_secret = vec![0u8; hash_len];
        let update_secret = state.tree.root_secret()?;
        let group_context = state.group_context(crypto_provider)?;
        state.secrets = derive_epoch_secrets(
            crypto_provider,
            cipher_suite,
            &init_secret,
            &update_secret,
            &group_context,
        )?;

        Ok(state)
    }

    /// Bootstraps a preliminary state from a Welcome. The member holds the
    /// group's shared state but has no leaf yet; the next handshake it can
    /// process is the Add that seats it.
    pub fn from_welcome(
        crypto_provider: &impl CryptoProvider,
        welcome: &Welcome,
        init_key_pair: HpkeKeyPair,
        credential: Credential,
        identity_key: SignatureKeyPair,
    ) -> Result<Self> {
        let cipher_suite = welcome.cipher_suite;
        if identity_key.signature_scheme != cipher_suite.signature_scheme() {
            return Err(Error::InvalidParameter(
                "identity key scheme does not match the suite",
            ));
        }

        let welcome_info = welcome.decrypt(crypto_provider, &init_key_pair.private_key)?;
        let tree = RatchetTree::from_public_keys(cipher_suite, welcome_info.tree);

        Ok(State {
            cipher_suite,
            version: welcome_info.version,
            group_id: welcome_info.group_id,
            epoch: welcome_info.epoch,
            roster: welcome_info.roster,
            tree,
            transcript_hash: welcome_info.transcript_hash,
            secrets: EpochSecrets {
                init_secret: welcome_info.init_secret,
                ..EpochSecrets::default()
            },
            my_leaf: None,
            identity_key,
            credential,
            pending_init: Some(PendingInit {
                user_init_key_id: welcome.user_init_key_id.clone(),
                init_key_pair,
            }),
        })
    }
}
