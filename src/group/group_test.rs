use bytes::Bytes;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha20Rng;

use super::config::GroupConfig;
use super::State;
use crate::crypto::cipher_suite::CipherSuite;
use crate::crypto::credential::Credential;
use crate::crypto::key_pair::{HpkeKeyPair, SignatureKeyPair};
use crate::crypto::provider::{CryptoProvider, RustCryptoProvider};
use crate::framing::{GroupOperation, Handshake, UserInitKey};
use crate::ratchet_tree::RatchetTree;
use crate::utilities::error::Error;
use crate::utilities::serde::{Deserializer, Serializer};
use crate::utilities::tree_math::LeafIndex;

fn suites() -> [CipherSuite; 2] {
    [
        CipherSuite::P256_SHA256_AES128GCM,
        CipherSuite::X25519_SHA256_AES128GCM,
    ]
}

struct Member {
    credential: Credential,
    identity_key: SignatureKeyPair,
}

fn member(suite: CipherSuite, name: &[u8], seed: &[u8]) -> Member {
    let provider = RustCryptoProvider;
    let scheme = suite.signature_scheme();
    let identity_key = provider
        .signature(scheme)
        .unwrap()
        .derive_key_pair(seed)
        .unwrap();
    Member {
        credential: Credential::basic(name.to_vec(), scheme, identity_key.public_key.clone()),
        identity_key,
    }
}

fn user_init_key_for(
    suite: CipherSuite,
    joiner: &Member,
    id: &[u8],
    dh_seed: &[u8],
) -> (UserInitKey, HpkeKeyPair) {
    let provider = RustCryptoProvider;
    let init_key_pair = provider
        .hpke(suite)
        .unwrap()
        .derive_key_pair(dh_seed)
        .unwrap();
    let mut user_init_key = UserInitKey {
        user_init_key_id: Bytes::copy_from_slice(id),
        ..Default::default()
    };
    user_init_key
        .add_init_key(suite, init_key_pair.public_key.clone())
        .unwrap();
    user_init_key
        .sign(&provider, &joiner.identity_key, joiner.credential.clone())
        .unwrap();
    (user_init_key, init_key_pair)
}

fn founder(suite: CipherSuite, rng: &mut ChaCha20Rng) -> (State, Member) {
    let provider = RustCryptoProvider;
    let alice = member(suite, b"alice", b"alice-sig");
    let state = State::new(
        &provider,
        rng,
        GroupConfig::with_cipher_suite(suite),
        Bytes::from_static(b"g"),
        alice.credential.clone(),
        alice.identity_key.clone(),
    )
    .unwrap();
    (state, alice)
}

/// Founder `A` plus joined member `B` at epoch 1 (scenario S1 machinery).
fn joined_pair(suite: CipherSuite, rng: &mut ChaCha20Rng) -> (State, State) {
    let provider = RustCryptoProvider;
    let (mut alice, _) = founder(suite, rng);
    let bob = member(suite, b"bob", b"bob-sig");
    let (user_init_key, init_key_pair) = user_init_key_for(suite, &bob, b"uik-bob", b"bob-dh");

    let (welcome, add) = alice.create_add(&provider, rng, &user_init_key).unwrap();
    let mut bob_state = State::from_welcome(
        &provider,
        &welcome,
        init_key_pair,
        bob.credential.clone(),
        bob.identity_key.clone(),
    )
    .unwrap();
    bob_state.handle(&provider, &add).unwrap();
    (alice, bob_state)
}

fn assert_converged(states: &[&State]) {
    let reference = states[0].welcome_info().serialize_detached().unwrap();
    for state in &states[1..] {
        assert_eq!(
            state.welcome_info().serialize_detached().unwrap(),
            reference
        );
        assert_eq!(state.application_secret(), states[0].application_secret());
        assert_eq!(state.epoch(), states[0].epoch());
    }
}

#[test]
fn s1_join() {
    for suite in suites() {
        let mut rng = ChaCha20Rng::from_seed([1; 32]);
        let (alice, bob) = joined_pair(suite, &mut rng);

        assert_eq!(alice.epoch(), 1);
        assert_eq!(bob.epoch(), 1);
        assert_eq!(bob.leaf_index(), Some(LeafIndex(1)));
        assert!(!alice.application_secret().is_empty());
        assert_converged(&[&alice, &bob]);
    }
}

#[test]
fn s2_update() {
    for suite in suites() {
        let mut rng = ChaCha20Rng::from_seed([2; 32]);
        let provider = RustCryptoProvider;
        let (mut alice, mut bob) = joined_pair(suite, &mut rng);
        let epoch1_secret = alice.application_secret().clone();

        let update = bob.create_update(&provider, &mut rng).unwrap();
        alice.handle(&provider, &update).unwrap();

        assert_eq!(alice.epoch(), 2);
        assert_converged(&[&alice, &bob]);
        assert_ne!(alice.application_secret(), &epoch1_secret);
    }
}

#[test]
fn s3_remove() {
    for suite in suites() {
        let mut rng = ChaCha20Rng::from_seed([3; 32]);
        let provider = RustCryptoProvider;
        let (mut alice, mut bob) = joined_pair(suite, &mut rng);

        let update = bob.create_update(&provider, &mut rng).unwrap();
        alice.handle(&provider, &update).unwrap();

        let remove = alice
            .create_remove(&provider, &mut rng, LeafIndex(1))
            .unwrap();
        assert_eq!(alice.epoch(), 3);

        // The removed member cannot advance: its whole subtree is blanked
        // before the path is decrypted.
        assert_eq!(
            bob.handle(&provider, &remove),
            Err(Error::NoDecryptionKey)
        );
        assert_eq!(bob.epoch(), 2);

        // A later update is equally out of reach for the departed member.
        let late_update = alice.create_update(&provider, &mut rng).unwrap();
        assert_eq!(
            bob.handle(&provider, &late_update),
            Err(Error::StaleEpoch { current: 2, got: 3 })
        );

        let GroupOperation::Update(ref update_op) = late_update.operation else {
            panic!("expected update");
        };
        let mut bob_view: RatchetTree = bob.tree().clone();
        bob_view.blank_path(LeafIndex(1)).unwrap();
        assert_eq!(
            bob_view.decrypt(&provider, LeafIndex(0), &update_op.path, LeafIndex(1)),
            Err(Error::NoDecryptionKey)
        );
    }
}

#[test]
fn s4_corrupted_signature() {
    for suite in suites() {
        let mut rng = ChaCha20Rng::from_seed([4; 32]);
        let provider = RustCryptoProvider;
        let (mut alice, mut bob) = joined_pair(suite, &mut rng);

        let update = bob.create_update(&provider, &mut rng).unwrap();

        let mut corrupted = update.clone();
        let mut signature = corrupted.signature.to_vec();
        signature[0] ^= 0x01;
        corrupted.signature = Bytes::from(signature);

        // Route through the codec as a receiver would.
        let encoded = corrupted.serialize_detached().unwrap();
        let decoded = Handshake::deserialize_exact(&encoded).unwrap();
        assert_eq!(
            alice.handle(&provider, &decoded),
            Err(Error::InvalidSignature)
        );
        assert_eq!(alice.epoch(), 1);

        // The untouched original still applies.
        alice.handle(&provider, &update).unwrap();
        assert_eq!(alice.epoch(), 2);
    }
}

#[test]
fn tampered_operation_fails_signature_check() {
    let suite = CipherSuite::X25519_SHA256_AES128GCM;
    let mut rng = ChaCha20Rng::from_seed([5; 32]);
    let provider = RustCryptoProvider;
    let (mut alice, mut bob) = joined_pair(suite, &mut rng);

    let update = bob.create_update(&provider, &mut rng).unwrap();
    let mut tampered = update.clone();
    let GroupOperation::Update(ref mut update_op) = tampered.operation else {
        panic!("expected update");
    };
    let mut key = update_op.path.nodes[0].public_key.0.to_vec();
    key[0] ^= 0x01;
    update_op.path.nodes[0].public_key = crate::crypto::HpkePublicKey::new(key);

    assert_eq!(
        alice.handle(&provider, &tampered),
        Err(Error::InvalidSignature)
    );
}

#[test]
fn zeroed_confirmation_is_rejected() {
    let suite = CipherSuite::X25519_SHA256_AES128GCM;
    let mut rng = ChaCha20Rng::from_seed([6; 32]);
    let provider = RustCryptoProvider;
    let (mut alice, mut bob) = joined_pair(suite, &mut rng);

    let update = bob.create_update(&provider, &mut rng).unwrap();
    let mut tampered = update.clone();
    tampered.confirmation = Bytes::from(vec![0u8; tampered.confirmation.len()]);

    assert_eq!(
        alice.handle(&provider, &tampered),
        Err(Error::InvalidConfirmation)
    );
    assert_eq!(alice.epoch(), 1);
}

#[test]
fn stale_and_replayed_handshakes_are_rejected() {
    let suite = CipherSuite::X25519_SHA256_AES128GCM;
    let mut rng = ChaCha20Rng::from_seed([7; 32]);
    let provider = RustCryptoProvider;
    let (mut alice, mut bob) = joined_pair(suite, &mut rng);

    let update = bob.create_update(&provider, &mut rng).unwrap();
    alice.handle(&provider, &update).unwrap();

    // Replay of an already-applied handshake.
    assert_eq!(
        alice.handle(&provider, &update),
        Err(Error::StaleEpoch { current: 2, got: 1 })
    );

    // A from-the-future epoch is rejected the same way.
    let mut future = update;
    future.prior_epoch = 9;
    assert_eq!(
        bob.handle(&provider, &future),
        Err(Error::StaleEpoch { current: 2, got: 9 })
    );
}

#[test]
fn preliminary_member_cannot_originate_handshakes() {
    let suite = CipherSuite::X25519_SHA256_AES128GCM;
    let mut rng = ChaCha20Rng::from_seed([8; 32]);
    let provider = RustCryptoProvider;
    let (mut alice, _) = founder(suite, &mut rng);
    let bob = member(suite, b"bob", b"bob-sig");
    let (user_init_key, init_key_pair) = user_init_key_for(suite, &bob, b"uik-bob", b"bob-dh");

    let (welcome, _add) = alice.create_add(&provider, &mut rng, &user_init_key).unwrap();
    let mut bob_state = State::from_welcome(
        &provider,
        &welcome,
        init_key_pair,
        bob.credential.clone(),
        bob.identity_key.clone(),
    )
    .unwrap();
    assert!(bob_state.leaf_index().is_none());
    assert_eq!(
        bob_state.create_update(&provider, &mut rng),
        Err(Error::InvalidParameter("member is not yet seated in the tree"))
    );
}

#[test]
fn welcome_requires_the_matching_init_key() {
    let suite = CipherSuite::X25519_SHA256_AES128GCM;
    let mut rng = ChaCha20Rng::from_seed([9; 32]);
    let provider = RustCryptoProvider;
    let (mut alice, _) = founder(suite, &mut rng);
    let bob = member(suite, b"bob", b"bob-sig");
    let (user_init_key, _) = user_init_key_for(suite, &bob, b"uik-bob", b"bob-dh");

    let (welcome, _) = alice.create_add(&provider, &mut rng, &user_init_key).unwrap();
    let wrong_pair = provider
        .hpke(suite)
        .unwrap()
        .derive_key_pair(b"unrelated")
        .unwrap();
    assert_eq!(
        State::from_welcome(
            &provider,
            &welcome,
            wrong_pair,
            bob.credential.clone(),
            bob.identity_key.clone(),
        )
        .map(|_| ()),
        Err(Error::DecryptError)
    );
}

#[test]
fn mismatched_identity_scheme_is_rejected() {
    let provider = RustCryptoProvider;
    let mut rng = ChaCha20Rng::from_seed([10; 32]);
    let alice = member(CipherSuite::X25519_SHA256_AES128GCM, b"alice", b"alice-sig");
    // Ed25519 identity against the P-256 suite.
    assert_eq!(
        State::new(
            &provider,
            &mut rng,
            GroupConfig::with_cipher_suite(CipherSuite::P256_SHA256_AES128GCM),
            Bytes::from_static(b"g"),
            alice.credential.clone(),
            alice.identity_key.clone(),
        )
        .map(|_| ()),
        Err(Error::InvalidParameter(
            "identity key scheme does not match the suite"
        ))
    );
}

#[test]
fn three_members_converge_through_readds() {
    for suite in suites() {
        let mut rng = ChaCha20Rng::from_seed([11; 32]);
        let provider = RustCryptoProvider;
        let (mut alice, _) = founder(suite, &mut rng);

        // Alice adds Bob.
        let bob = member(suite, b"bob", b"bob-sig");
        let (uik_bob, kp_bob) = user_init_key_for(suite, &bob, b"uik-bob", b"bob-dh");
        let (welcome_bob, add_bob) = alice.create_add(&provider, &mut rng, &uik_bob).unwrap();
        let mut bob_state =
            State::from_welcome(&provider, &welcome_bob, kp_bob, bob.credential.clone(), bob.identity_key.clone())
                .unwrap();
        bob_state.handle(&provider, &add_bob).unwrap();
        assert_converged(&[&alice, &bob_state]);

        // Alice adds Carol; Bob follows the handshake.
        let carol = member(suite, b"carol", b"carol-sig");
        let (uik_carol, kp_carol) =
            user_init_key_for(suite, &carol, b"uik-carol", b"carol-dh");
        let (welcome_carol, add_carol) =
            alice.create_add(&provider, &mut rng, &uik_carol).unwrap();
        bob_state.handle(&provider, &add_carol).unwrap();
        let mut carol_state = State::from_welcome(
            &provider,
            &welcome_carol,
            kp_carol,
            carol.credential.clone(),
            carol.identity_key.clone(),
        )
        .unwrap();
        carol_state.handle(&provider, &add_carol).unwrap();
        assert_eq!(carol_state.leaf_index(), Some(LeafIndex(2)));
        assert_converged(&[&alice, &bob_state, &carol_state]);

        // Bob updates.
        let update = bob_state.create_update(&provider, &mut rng).unwrap();
        alice.handle(&provider, &update).unwrap();
        carol_state.handle(&provider, &update).unwrap();
        assert_converged(&[&alice, &bob_state, &carol_state]);

        // Carol removes Bob.
        let remove = carol_state
            .create_remove(&provider, &mut rng, LeafIndex(1))
            .unwrap();
        alice.handle(&provider, &remove).unwrap();
        assert_eq!(
            bob_state.handle(&provider, &remove),
            Err(Error::NoDecryptionKey)
        );
        assert_converged(&[&alice, &carol_state]);
        assert!(alice.roster().get(LeafIndex(1)).is_none());

        // Removing an already-vacated slot has nothing to point at.
        assert_eq!(
            alice.create_remove(&provider, &mut rng, LeafIndex(1)),
            Err(Error::MissingRosterEntry)
        );

        // Dave is re-added into the blanked slot.
        let dave = member(suite, b"dave", b"dave-sig");
        let (uik_dave, kp_dave) = user_init_key_for(suite, &dave, b"uik-dave", b"dave-dh");
        let (welcome_dave, add_dave) =
            alice.create_add(&provider, &mut rng, &uik_dave).unwrap();
        carol_state.handle(&provider, &add_dave).unwrap();
        let mut dave_state = State::from_welcome(
            &provider,
            &welcome_dave,
            kp_dave,
            dave.credential.clone(),
            dave.identity_key.clone(),
        )
        .unwrap();
        dave_state.handle(&provider, &add_dave).unwrap();
        assert_eq!(dave_state.leaf_index(), Some(LeafIndex(1)));
        assert_converged(&[&alice, &carol_state, &dave_state]);

        // The re-seated slot is fully functional.
        let update = dave_state.create_update(&provider, &mut rng).unwrap();
        alice.handle(&provider, &update).unwrap();
        carol_state.handle(&provider, &update).unwrap();
        assert_converged(&[&alice, &carol_state, &dave_state]);
    }
}
