//! The ratchet tree: a left-balanced binary tree of DH keypairs over the
//! group's members. A tree with `n` leaves occupies `2n - 1` array slots,
//! leaf `i` at index `2i`. Internal-node keys derive deterministically
//! from per-node path secrets; the root's path secret is the group's
//! update secret.

#[cfg(test)]
mod ratchet_tree_test;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::crypto::cipher_suite::CipherSuite;
use crate::crypto::hpke::HPKECiphertext;
use crate::crypto::kdf::expand_with_label;
use crate::crypto::key_pair::{DHPrivateKey, DHPublicKey};
use crate::crypto::secret::{Secret, SECRET_SIZE};
use crate::utilities::error::{Error, Result};
use crate::utilities::serde::{
    deserialize_optional, deserialize_vector, serialize_optional, serialize_vector, Serializer,
};
use crate::utilities::tree_math::{self, LeafIndex, NodeIndex};

const NODE_LABEL: &str = "node";

/// One slot of the node array. A filled node always has a public key; the
/// private key is present only on nodes this participant can read.
#[derive(Debug, Clone)]
pub enum RatchetTreeNode {
    Blank,
    Filled {
        public_key: DHPublicKey,
        private_key: Option<DHPrivateKey>,
    },
}

impl RatchetTreeNode {
    pub fn is_blank(&self) -> bool {
        matches!(self, RatchetTreeNode::Blank)
    }

    pub fn public_key(&self) -> Option<&DHPublicKey> {
        match self {
            RatchetTreeNode::Blank => None,
            RatchetTreeNode::Filled { public_key, .. } => Some(public_key),
        }
    }

    pub fn private_key(&self) -> Option<&DHPrivateKey> {
        match self {
            RatchetTreeNode::Blank => None,
            RatchetTreeNode::Filled { private_key, .. } => private_key.as_ref(),
        }
    }
}

// Two nodes are equal when they agree on blankness and public key;
// private-key presence is local knowledge and never part of equality.
impl PartialEq for RatchetTreeNode {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RatchetTreeNode::Blank, RatchetTreeNode::Blank) => true,
            (
                RatchetTreeNode::Filled {
                    public_key: left, ..
                },
                RatchetTreeNode::Filled {
                    public_key: right, ..
                },
            ) => left == right,
            _ => false,
        }
    }
}

impl Eq for RatchetTreeNode {}

/// One step of a transmitted path update: the new public key of a node on
/// the sender's direct path, plus the path secret at that level encrypted
/// to each member of the matching co-path resolution.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RatchetNode {
    pub public_key: DHPublicKey,
    pub node_secrets: Vec<HPKECiphertext>,
}

impl RatchetNode {
    pub fn deserialize<B: Buf>(buf: &mut B, suite: CipherSuite) -> Result<Self> {
        let public_key = DHPublicKey::deserialize(buf, suite)?;
        let mut node_secrets = vec![];
        deserialize_vector(buf, 2, |b: &mut Bytes| -> Result<()> {
            node_secrets.push(HPKECiphertext::deserialize(b, suite)?);
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
        serialize_vector(
            self.node_secrets.len(),
            2,
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> { self.node_secrets[i].serialize(b) },
        )
    }
}

/// The ordered steps of a path update, from the sender's leaf (which
/// carries no ciphertexts) up to the root.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DirectPath {
    pub nodes: Vec<RatchetNode>,
}

impl DirectPath {
    pub fn deserialize<B: Buf>(buf: &mut B, suite: CipherSuite) -> Result<Self> {
        let mut nodes = vec![];
        deserialize_vector(buf, 2, |b: &mut Bytes| -> Result<()> {
            nodes.push(RatchetNode::deserialize(b, suite)?);
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
        serialize_vector(
            self.nodes.len(),
            2,
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> { self.nodes[i].serialize(b) },
        )
    }
}

#[derive(Debug, Clone)]
pub struct RatchetTree {
    suite: CipherSuite,
    nodes: Vec<RatchetTreeNode>,
    root_secret: Option<Secret>,
}

// Tree equality is over the node array alone; the locally-known root
// secret is not wire state.
impl PartialEq for RatchetTree {
    fn eq(&self, other: &Self) -> bool {
        self.suite == other.suite && self.nodes == other.nodes
    }
}

impl Eq for RatchetTree {}

impl RatchetTree {
    pub fn new(suite: CipherSuite) -> Self {
        Self {
            suite,
            nodes: vec![],
            root_secret: None,
        }
    }

    /// Builds a tree whose leaves hold keypairs derived from the given
    /// secrets, with every internal node blank.
    pub fn from_leaf_secrets(suite: CipherSuite, secrets: &[Secret]) -> Result<Self> {
        let mut tree = Self::new(suite);
        for (i, secret) in secrets.iter().enumerate() {
            let keypair = DHPrivateKey::derive(suite, secret.as_bytes())?;
            tree.add_leaf(
                LeafIndex(i as u32),
                keypair.public_key().clone(),
                Some(keypair),
            )?;
        }
        Ok(tree)
    }

    pub fn cipher_suite(&self) -> CipherSuite {
        self.suite
    }

    /// Number of array slots.
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn leaf_count(&self) -> u32 {
        ((self.nodes.len() + 1) / 2) as u32
    }

    pub fn node(&self, index: NodeIndex) -> Option<&RatchetTreeNode> {
        self.nodes.get(index.0 as usize)
    }

    pub fn leaf(&self, index: LeafIndex) -> Option<&RatchetTreeNode> {
        self.node(index.node_index())
    }

    /// The root path secret installed by the most recent path update.
    pub fn root_secret(&self) -> Option<&Secret> {
        self.root_secret.as_ref()
    }

    /// Installs a new leaf: appending when `index` equals the leaf count,
    /// otherwise filling a blank slot. The leaf's whole path is blanked
    /// before the leaf itself is set.
    pub fn add_leaf(
        &mut self,
        index: LeafIndex,
        public_key: DHPublicKey,
        private_key: Option<DHPrivateKey>,
    ) -> Result<()> {
        let n = self.leaf_count();
        if index.0 > n {
            return Err(Error::LeafIndexOutOfRange);
        }
        if index.0 == n {
            // Growing by one leaf appends two slots; existing indices keep
            // their positions in the array layout
            if !self.nodes.is_empty() {
                self.nodes.push(RatchetTreeNode::Blank);
            }
            self.nodes.push(RatchetTreeNode::Blank);
        } else if !self.nodes[index.node_index().0 as usize].is_blank() {
            return Err(Error::DuplicateLeaf);
        }

        self.blank_path(index)?;
        self.nodes[index.node_index().0 as usize] = RatchetTreeNode::Filled {
            public_key,
            private_key,
        };
        Ok(())
    }

    /// Blanks a leaf and every node on its direct path.
    pub fn blank_path(&mut self, leaf: LeafIndex) -> Result<()> {
        let n = self.leaf_count();
        if leaf.0 >= n {
            return Err(Error::LeafIndexOutOfRange);
        }
        for x in tree_math::direct_path(leaf.node_index().0, n) {
            self.nodes[x as usize] = RatchetTreeNode::Blank;
        }
        Ok(())
    }

    /// The non-blank descendants that stand in for a (possibly blank)
    /// node, in left-to-right order.
    pub fn resolution(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let x = index.0;
        if !self.nodes[x as usize].is_blank() {
            vec![index]
        } else if tree_math::level(x) == 0 {
            vec![]
        } else {
            let mut out = self.resolution(NodeIndex(tree_math::left(x)));
            out.extend(self.resolution(NodeIndex(tree_math::right(x, self.leaf_count()))));
            out
        }
    }

    fn path_secret_chain(leaf_secret: &Secret, length: usize) -> Result<Vec<Secret>> {
        let mut secrets = vec![leaf_secret.clone()];
        while secrets.len() < length {
            let next = expand_with_label(
                secrets[secrets.len() - 1].as_bytes(),
                NODE_LABEL,
                SECRET_SIZE,
            )?;
            secrets.push(Secret::from_slice(&next)?);
        }
        Ok(secrets)
    }

    fn install_chain(&mut self, dirpath: &[u32], secrets: &[Secret]) -> Result<()> {
        for (x, secret) in dirpath.iter().zip(secrets) {
            let keypair = DHPrivateKey::derive(self.suite, secret.as_bytes())?;
            self.nodes[*x as usize] = RatchetTreeNode::Filled {
                public_key: keypair.public_key().clone(),
                private_key: Some(keypair),
            };
        }
        Ok(())
    }

    /// Sender-side install of a fresh leaf secret: new keypairs along the
    /// whole direct path, derived from the HKDF chain over `leaf_secret`.
    /// Returns the root path secret.
    pub fn set_path(&mut self, leaf: LeafIndex, leaf_secret: &Secret) -> Result<Secret> {
        let n = self.leaf_count();
        if leaf.0 >= n {
            return Err(Error::LeafIndexOutOfRange);
        }
        let dirpath = tree_math::direct_path(leaf.node_index().0, n);
        let secrets = Self::path_secret_chain(leaf_secret, dirpath.len())?;
        self.install_chain(&dirpath, &secrets)?;

        let root = secrets[secrets.len() - 1].clone();
        self.root_secret = Some(root.clone());
        Ok(root)
    }

    /// Installs a fresh leaf secret and emits the update for everyone
    /// else: each level's path secret is sealed to every member of the
    /// matching co-path resolution, so exactly the subtrees that need a
    /// secret can recover it.
    pub fn encrypt_path(
        &mut self,
        leaf: LeafIndex,
        leaf_secret: &Secret,
    ) -> Result<(DirectPath, Secret)> {
        let n = self.leaf_count();
        if leaf.0 >= n {
            return Err(Error::LeafIndexOutOfRange);
        }
        let dirpath = tree_math::direct_path(leaf.node_index().0, n);
        let cop = tree_math::copath(leaf.node_index().0, n);
        let secrets = Self::path_secret_chain(leaf_secret, dirpath.len())?;
        self.install_chain(&dirpath, &secrets)?;

        let mut nodes = Vec::with_capacity(dirpath.len());
        for (i, x) in dirpath.iter().enumerate() {
            let public_key = self.nodes[*x as usize]
                .public_key()
                .ok_or(Error::BlankLeaf)?
                .clone();

            // The sender's own leaf has no co-path below it
            let mut node_secrets = vec![];
            if i > 0 {
                for r in self.resolution(NodeIndex(cop[i - 1])) {
                    let recipient = self.nodes[r.0 as usize]
                        .public_key()
                        .ok_or(Error::BlankLeaf)?;
                    node_secrets.push(recipient.encrypt(secrets[i].as_bytes())?);
                }
            }
            nodes.push(RatchetNode {
                public_key,
                node_secrets,
            });
        }

        let root = secrets[secrets.len() - 1].clone();
        self.root_secret = Some(root.clone());
        Ok((DirectPath { nodes }, root))
    }

    /// Receiver side of a path update from `sender`: locate the lowest
    /// common ancestor, recover the path secret meant for our subtree,
    /// then install derived keypairs above it and the sender's public
    /// keys below it. Returns the root path secret.
    pub fn decrypt_path(
        &mut self,
        my_leaf: LeafIndex,
        sender: LeafIndex,
        path: &DirectPath,
    ) -> Result<Secret> {
        let n = self.leaf_count();
        if my_leaf.0 >= n || sender.0 >= n {
            return Err(Error::LeafIndexOutOfRange);
        }
        if my_leaf == sender {
            return Err(Error::OwnHandshake);
        }

        let x = sender.node_index().0;
        let m = my_leaf.node_index().0;
        let dirpath = tree_math::direct_path(x, n);
        if path.nodes.len() != dirpath.len() {
            return Err(Error::InvalidDirectPath);
        }
        let cop = tree_math::copath(x, n);

        // Walk up the sender's path to the first node that covers us
        let ancestor = (1..dirpath.len())
            .find(|&i| tree_math::in_subtree(m, dirpath[i]))
            .ok_or(Error::InvalidDirectPath)?;

        // Our subtree is the co-path child one level below the ancestor;
        // ciphertexts line up with its resolution in order
        let resolution = self.resolution(NodeIndex(cop[ancestor - 1]));
        if resolution.len() != path.nodes[ancestor].node_secrets.len() {
            return Err(Error::InvalidDirectPath);
        }

        let mut recovered = None;
        for (j, r) in resolution.iter().enumerate() {
            let Some(private_key) = self.nodes[r.0 as usize].private_key() else {
                continue;
            };
            // A ciphertext that fails to open is not fatal while others
            // remain untried
            match private_key.decrypt(&path.nodes[ancestor].node_secrets[j]) {
                Ok(plaintext) => {
                    recovered = Some(Secret::from_slice(&plaintext)?);
                    break;
                }
                Err(_) => continue,
            }
        }
        let recovered = recovered.ok_or(Error::UndecryptablePathSecret)?;

        // Below the ancestor we learn only the sender's public keys
        for (i, idx) in dirpath.iter().enumerate().take(ancestor) {
            self.nodes[*idx as usize] = RatchetTreeNode::Filled {
                public_key: path.nodes[i].public_key.clone(),
                private_key: None,
            };
        }

        // From the ancestor up we re-derive the sender's chain and check
        // our keys against the transmitted ones
        let secrets = Self::path_secret_chain(&recovered, dirpath.len() - ancestor)?;
        for (offset, secret) in secrets.iter().enumerate() {
            let keypair = DHPrivateKey::derive(self.suite, secret.as_bytes())?;
            if *keypair.public_key() != path.nodes[ancestor + offset].public_key {
                return Err(Error::InvalidDirectPath);
            }
            self.nodes[dirpath[ancestor + offset] as usize] = RatchetTreeNode::Filled {
                public_key: keypair.public_key().clone(),
                private_key: Some(keypair),
            };
        }

        let root = secrets[secrets.len() - 1].clone();
        self.root_secret = Some(root.clone());
        Ok(root)
    }

    pub fn deserialize<B: Buf>(buf: &mut B, suite: CipherSuite) -> Result<Self> {
        let mut nodes = vec![];
        deserialize_vector(buf, 4, |b: &mut Bytes| -> Result<()> {
            let present = deserialize_optional(b)?;
            if present {
                nodes.push(RatchetTreeNode::Filled {
                    public_key: DHPublicKey::deserialize(b, suite)?,
                    private_key: None,
                });
            } else {
                nodes.push(RatchetTreeNode::Blank);
            }
            Ok(())
        })?;

        if nodes.len() % 2 == 0 && !nodes.is_empty() {
            return Err(Error::InvalidTreeSize);
        }

        Ok(Self {
            suite,
            nodes,
            root_secret: None,
        })
    }
}

impl Serializer for RatchetTree {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_vector(
            self.nodes.len(),
            4,
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> {
                match &self.nodes[i] {
                    RatchetTreeNode::Blank => serialize_optional(false, b),
                    RatchetTreeNode::Filled { public_key, .. } => {
                        serialize_optional(true, b)?;
                        public_key.serialize(b)
                    }
                }
            },
        )
    }
}
