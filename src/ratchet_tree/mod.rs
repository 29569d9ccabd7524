//! The ratchet tree: a left-balanced binary tree of DH key pairs.
//!
//! Each member owns the private keys on the path from its leaf to the root
//! and nothing else. A path update ratchets a fresh leaf secret up the tree
//! (`sₖ = Hash(sₖ₋₁)`), sealing each level's secret to the resolution of the
//! copath sibling so that exactly the members under that sibling can recover
//! it. Removed members are blanked out; blank subtrees are represented by
//! their resolution when sealing.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use rand_core::{CryptoRng, RngCore};

use crate::crypto::cipher_suite::CipherSuite;
use crate::crypto::provider::CryptoProvider;
use crate::crypto::rng::random_bytes;
use crate::crypto::{HpkeCiphertext, HpkePrivateKey, HpkePublicKey};
use crate::utilities::error::{Error, Result};
use crate::utilities::serde::{
    deserialize_vector, serialize_opaque, serialize_optional, serialize_vector, write_uint,
    Deserializer, Serializer,
};
use crate::utilities::tree_math::{self, LeafIndex};

/// One slot of the tree array.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub enum Node {
    #[default]
    Blank,
    Filled {
        public_key: HpkePublicKey,
        private_key: Option<HpkePrivateKey>,
        secret: Option<Bytes>,
    },
}

impl Node {
    pub fn is_blank(&self) -> bool {
        matches!(self, Node::Blank)
    }

    pub fn public_key(&self) -> Option<&HpkePublicKey> {
        match self {
            Node::Blank => None,
            Node::Filled { public_key, .. } => Some(public_key),
        }
    }

    pub fn private_key(&self) -> Option<&HpkePrivateKey> {
        match self {
            Node::Blank => None,
            Node::Filled { private_key, .. } => private_key.as_ref(),
        }
    }

    pub fn secret(&self) -> Option<&Bytes> {
        match self {
            Node::Blank => None,
            Node::Filled { secret, .. } => secret.as_ref(),
        }
    }

    /// Overwrites the node with a bare public key, dropping any private key
    /// or secret that the new key does not correspond to.
    pub fn set_public_key(&mut self, public_key: HpkePublicKey) {
        *self = Node::Filled {
            public_key,
            private_key: None,
            secret: None,
        };
    }
}

/// One level of an encrypted direct path: the new public key at that level
/// and the level secret sealed to each node of the copath resolution.
///
/// ```text
/// struct {
///     opaque public_key<0..2^16-1>;
///     HPKECiphertext node_secrets<0..2^16-1>;
/// } RatchetNode;
/// ```
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct RatchetNode {
    pub public_key: HpkePublicKey,
    pub node_secrets: Vec<HpkeCiphertext>,
}

impl Deserializer for RatchetNode {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let public_key = HpkePublicKey::deserialize(buf)?;
        let mut node_secrets = vec![];
        deserialize_vector(buf, 2, |b: &mut Bytes| -> Result<()> {
            node_secrets.push(HpkeCiphertext::deserialize(b)?);
            Ok(())
        })?;
        Ok(Self {
            public_key,
            node_secrets,
        })
    }
}

impl Serializer for RatchetNode {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.public_key.serialize(buf)?;
        serialize_vector(self.node_secrets.len(), 2, buf, |i, b| {
            self.node_secrets[i].serialize(b)
        })
    }
}

/// An encrypted direct path: the sender's leaf level first (public key only),
/// then one [`RatchetNode`] per ancestor up to the root.
///
/// ```text
/// struct {
///     RatchetNode nodes<0..2^16-1>;
/// } DirectPath;
/// ```
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct DirectPath {
    pub nodes: Vec<RatchetNode>,
}

impl Deserializer for DirectPath {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let mut nodes = vec![];
        deserialize_vector(buf, 2, |b: &mut Bytes| -> Result<()> {
            nodes.push(RatchetNode::deserialize(b)?);
            Ok(())
        })?;
        Ok(Self { nodes })
    }
}

impl Serializer for DirectPath {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_vector(self.nodes.len(), 2, buf, |i, b| self.nodes[i].serialize(b))
    }
}

/// The tree itself: a flat array of `2n - 1` nodes for `n` leaves.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RatchetTree {
    cipher_suite: CipherSuite,
    nodes: Vec<Node>,
}

impl RatchetTree {
    pub fn new(cipher_suite: CipherSuite) -> Self {
        Self {
            cipher_suite,
            nodes: Vec::new(),
        }
    }

    /// Builds a fully-populated tree from per-leaf secrets; a parent's
    /// secret is `HKDF-Extract(left.secret ‖ right.secret)`.
    pub fn from_leaf_secrets(
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        leaf_secrets: &[Bytes],
    ) -> Result<Self> {
        let n = leaf_secrets.len() as u32;
        let mut tree = Self {
            cipher_suite,
            nodes: vec![Node::Blank; tree_math::node_width(n) as usize],
        };
        let hpke = crypto_provider.hpke(cipher_suite)?;
        for (i, secret) in leaf_secrets.iter().enumerate() {
            let pair = hpke.derive_key_pair(secret)?;
            tree.nodes[2 * i] = Node::Filled {
                public_key: pair.public_key,
                private_key: Some(pair.private_key),
                secret: Some(secret.clone()),
            };
        }
        if n > 0 {
            tree.fill_parents(crypto_provider, tree_math::root(n))?;
        }
        Ok(tree)
    }

    fn fill_parents(&mut self, crypto_provider: &impl CryptoProvider, index: u32) -> Result<()> {
        if tree_math::is_leaf(index) {
            return Ok(());
        }
        let n = self.leaf_count();
        let left = tree_math::left(index);
        let right = tree_math::right(index, n);
        self.fill_parents(crypto_provider, left)?;
        self.fill_parents(crypto_provider, right)?;

        let children = match (
            self.nodes[left as usize].secret(),
            self.nodes[right as usize].secret(),
        ) {
            (Some(l), Some(r)) => Some((l.clone(), r.clone())),
            _ => None,
        };
        if let Some((l, r)) = children {
            let hpke = crypto_provider.hpke(self.cipher_suite)?;
            let mut ikm = Vec::with_capacity(l.len() + r.len());
            ikm.extend_from_slice(&l);
            ikm.extend_from_slice(&r);
            let secret = hpke.kdf_extract(&[], &ikm)?;
            let pair = hpke.derive_key_pair(&secret)?;
            self.nodes[index as usize] = Node::Filled {
                public_key: pair.public_key,
                private_key: Some(pair.private_key),
                secret: Some(secret),
            };
        }
        Ok(())
    }

    /// Reconstructs a tree from the public keys carried in a `WelcomeInfo`.
    pub fn from_public_keys(
        cipher_suite: CipherSuite,
        keys: Vec<Option<HpkePublicKey>>,
    ) -> Self {
        let nodes = keys
            .into_iter()
            .map(|key| match key {
                Some(public_key) => Node::Filled {
                    public_key,
                    private_key: None,
                    secret: None,
                },
                None => Node::Blank,
            })
            .collect();
        Self {
            cipher_suite,
            nodes,
        }
    }

    pub fn to_public_keys(&self) -> Vec<Option<HpkePublicKey>> {
        self.nodes
            .iter()
            .map(|node| node.public_key().cloned())
            .collect()
    }

    pub fn cipher_suite(&self) -> CipherSuite {
        self.cipher_suite
    }

    /// Number of nodes in the array.
    pub fn size(&self) -> u32 {
        self.nodes.len() as u32
    }

    pub fn leaf_count(&self) -> u32 {
        if self.nodes.is_empty() {
            0
        } else {
            tree_math::leaf_count(self.size())
        }
    }

    pub fn get(&self, index: u32) -> Option<&Node> {
        self.nodes.get(index as usize)
    }

    pub fn get_leaf(&self, leaf: LeafIndex) -> Option<&Node> {
        self.get(leaf.node_index())
    }

    /// The secret at the root, which feeds the epoch's `update_secret`.
    pub fn root_secret(&self) -> Result<Bytes> {
        let n = self.leaf_count();
        if n == 0 {
            return Err(Error::InvalidParameter("tree is empty"));
        }
        self.nodes[tree_math::root(n) as usize]
            .secret()
            .cloned()
            .ok_or(Error::InvalidParameter("root has no secret"))
    }

    /// Installs a leaf. Appending at index `n` grows the array by a blank
    /// intermediate node plus the leaf, preserving left balance; anything
    /// below `n` must target a blank slot left by a removal.
    pub fn add_leaf(&mut self, leaf: LeafIndex, node: Node) -> Result<()> {
        let n = self.leaf_count();
        if leaf.0 == n {
            if !self.nodes.is_empty() {
                self.nodes.push(Node::Blank);
            }
            self.nodes.push(node);
            return Ok(());
        }
        if leaf.0 > n {
            return Err(Error::InvalidParameter("leaf index beyond tree"));
        }
        let slot = &mut self.nodes[leaf.node_index() as usize];
        if !slot.is_blank() {
            return Err(Error::InvalidParameter("leaf slot is occupied"));
        }
        *slot = node;
        Ok(())
    }

    /// Clears a leaf and every node on its direct path. The copath is never
    /// touched.
    pub fn blank_path(&mut self, leaf: LeafIndex) -> Result<()> {
        let n = self.leaf_count();
        let x = leaf.node_index();
        if x >= self.size() {
            return Err(Error::InvalidParameter("leaf index beyond tree"));
        }
        self.nodes[x as usize] = Node::Blank;
        for index in tree_math::direct_path(x, n) {
            self.nodes[index as usize] = Node::Blank;
        }
        Ok(())
    }

    /// The minimal ordered set of non-blank nodes covering all non-blank
    /// descendants of `x`. Empty for a blank leaf.
    pub fn resolution(&self, x: u32) -> Vec<u32> {
        fn helper(tree: &RatchetTree, i: u32, acc: &mut Vec<u32>) {
            if tree.nodes[i as usize].is_blank() {
                if tree_math::level(i) == 0 {
                    return;
                }
                let n = tree.leaf_count();
                helper(tree, tree_math::left(i), acc);
                helper(tree, tree_math::right(i, n), acc);
            } else {
                acc.push(i);
            }
        }

        let mut resolution = Vec::new();
        helper(self, x, &mut resolution);
        resolution
    }

    /// Ratchets `leaf_secret` up the sender's direct path, installing the
    /// derived key pairs locally and sealing each level's secret to the
    /// resolution of the corresponding copath node.
    pub fn encrypt(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        from: LeafIndex,
        leaf_secret: &[u8],
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Result<DirectPath> {
        let n = self.leaf_count();
        let x = from.node_index();
        if x >= self.size() {
            return Err(Error::InvalidParameter("leaf index beyond tree"));
        }
        let hpke = crypto_provider.hpke(self.cipher_suite)?;
        let hash = crypto_provider.hash(self.cipher_suite)?;

        let direct_path = tree_math::direct_path(x, n);
        let copath = tree_math::copath(x, n);

        let mut secret = Bytes::copy_from_slice(leaf_secret);
        let leaf_pair = hpke.derive_key_pair(&secret)?;
        self.nodes[x as usize] = Node::Filled {
            public_key: leaf_pair.public_key.clone(),
            private_key: Some(leaf_pair.private_key),
            secret: Some(secret.clone()),
        };

        let mut nodes = Vec::with_capacity(1 + direct_path.len());
        nodes.push(RatchetNode {
            public_key: leaf_pair.public_key,
            node_secrets: vec![],
        });

        for (i, &path_index) in direct_path.iter().enumerate() {
            secret = hash.digest(&secret);
            let pair = hpke.derive_key_pair(&secret)?;

            let mut node_secrets = vec![];
            for res_index in self.resolution(copath[i]) {
                let recipient = self.nodes[res_index as usize]
                    .public_key()
                    .expect("resolution nodes are filled");
                let ephemeral: [u8; 32] = random_bytes(rng);
                node_secrets.push(hpke.seal(recipient, &secret, &ephemeral)?);
            }

            self.nodes[path_index as usize] = Node::Filled {
                public_key: pair.public_key.clone(),
                private_key: Some(pair.private_key),
                secret: Some(secret.clone()),
            };
            nodes.push(RatchetNode {
                public_key: pair.public_key,
                node_secrets,
            });
        }

        Ok(DirectPath { nodes })
    }

    /// Recovers the path secret at the lowest common ancestor of `from` and
    /// `my_leaf`. Returns the secret and the ancestor's node index. Fails
    /// with `NoDecryptionKey` when no owned private key covers the copath
    /// resolution, which is the position a blanked-out member ends up in.
    pub fn decrypt(
        &self,
        crypto_provider: &impl CryptoProvider,
        from: LeafIndex,
        path: &DirectPath,
        my_leaf: LeafIndex,
    ) -> Result<(Bytes, u32)> {
        let n = self.leaf_count();
        let x = from.node_index();
        let me = my_leaf.node_index();
        if x == me {
            return Err(Error::InvalidParameter("cannot decrypt own path"));
        }
        if me >= self.size() || x >= self.size() {
            return Err(Error::InvalidParameter("leaf index beyond tree"));
        }
        let direct_path = tree_math::direct_path(x, n);
        if path.nodes.len() != direct_path.len() + 1 {
            return Err(Error::InconsistentLength("direct path nodes"));
        }
        let copath = tree_math::copath(x, n);
        let hpke = crypto_provider.hpke(self.cipher_suite)?;

        for (i, &copath_index) in copath.iter().enumerate() {
            if !tree_math::is_ancestor_or_self(copath_index, me, n) {
                continue;
            }
            // The LCA of the sender and this member is direct_path[i]; the
            // matching ciphertexts are indexed by the copath resolution.
            for (j, res_index) in self.resolution(copath_index).into_iter().enumerate() {
                let node = &self.nodes[res_index as usize];
                let Some(private_key) = node.private_key() else {
                    continue;
                };
                if !tree_math::is_ancestor_or_self(res_index, me, n) {
                    continue;
                }
                let ciphertext = path.nodes[i + 1]
                    .node_secrets
                    .get(j)
                    .ok_or(Error::InconsistentLength("node secrets"))?;
                let secret = hpke.open(private_key, ciphertext)?;
                return Ok((secret, direct_path[i]));
            }
            return Err(Error::NoDecryptionKey);
        }

        Err(Error::NoDecryptionKey)
    }

    /// Writes the path's public keys into the tree along the sender's direct
    /// path, clearing any secret this member does not recompute from
    /// decryption.
    pub fn merge(&mut self, from: LeafIndex, path: &DirectPath) -> Result<()> {
        let n = self.leaf_count();
        let x = from.node_index();
        if x >= self.size() {
            return Err(Error::InvalidParameter("leaf index beyond tree"));
        }
        let direct_path = tree_math::direct_path(x, n);
        if path.nodes.len() != direct_path.len() + 1 {
            return Err(Error::InconsistentLength("direct path nodes"));
        }
        self.nodes[x as usize].set_public_key(path.nodes[0].public_key.clone());
        for (i, &index) in direct_path.iter().enumerate() {
            self.nodes[index as usize].set_public_key(path.nodes[i + 1].public_key.clone());
        }
        Ok(())
    }

    /// Re-derives every ancestor from `start` to the root out of the
    /// decrypted path secret, hashing one step per level. Each derived
    /// public key must match the one merged from the message.
    pub fn set_path_secrets(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        start: u32,
        path_secret: &[u8],
    ) -> Result<()> {
        let n = self.leaf_count();
        if start >= self.size() {
            return Err(Error::InvalidParameter("node index beyond tree"));
        }
        let hpke = crypto_provider.hpke(self.cipher_suite)?;
        let hash = crypto_provider.hash(self.cipher_suite)?;

        let root = tree_math::root(n);
        let mut secret = Bytes::copy_from_slice(path_secret);
        let mut index = start;
        loop {
            let pair = hpke.derive_key_pair(&secret)?;
            match self.nodes[index as usize].public_key() {
                Some(public_key) if *public_key == pair.public_key => {}
                _ => return Err(Error::InvalidParameter("path public key mismatch")),
            }
            self.nodes[index as usize] = Node::Filled {
                public_key: pair.public_key,
                private_key: Some(pair.private_key),
                secret: Some(secret.clone()),
            };
            if index == root {
                break;
            }
            index = tree_math::parent(index, n);
            secret = hash.digest(&secret);
        }
        Ok(())
    }

    /// Recursive hash over the tree's public structure:
    /// `H(leaf) = Hash(leaf_index ‖ optional(public_key))`,
    /// `H(parent) = Hash(node_index ‖ optional(public_key) ‖ H(left) ‖ H(right))`.
    pub fn tree_hash(&self, crypto_provider: &impl CryptoProvider) -> Result<Bytes> {
        let hash = crypto_provider.hash(self.cipher_suite)?;
        let n = self.leaf_count();
        if n == 0 {
            return Ok(hash.digest(&[]));
        }
        self.hash_subtree(crypto_provider, tree_math::root(n))
    }

    fn hash_subtree(&self, crypto_provider: &impl CryptoProvider, index: u32) -> Result<Bytes> {
        let hash = crypto_provider.hash(self.cipher_suite)?;
        let node = &self.nodes[index as usize];
        let mut buf = BytesMut::new();

        if tree_math::is_leaf(index) {
            write_uint(u64::from(index / 2), 4, &mut buf)?;
            self.write_optional_key(node, &mut buf)?;
        } else {
            let n = self.leaf_count();
            let left_hash = self.hash_subtree(crypto_provider, tree_math::left(index))?;
            let right_hash = self.hash_subtree(crypto_provider, tree_math::right(index, n))?;
            write_uint(u64::from(index), 4, &mut buf)?;
            self.write_optional_key(node, &mut buf)?;
            serialize_opaque(&left_hash, 1, &mut buf)?;
            serialize_opaque(&right_hash, 1, &mut buf)?;
        }

        Ok(hash.digest(&buf))
    }

    fn write_optional_key(&self, node: &Node, buf: &mut BytesMut) -> Result<()> {
        match node.public_key() {
            Some(public_key) => {
                serialize_optional(true, buf)?;
                public_key.serialize(buf)
            }
            None => serialize_optional(false, buf),
        }
    }
}
