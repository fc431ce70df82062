//! The group state machine. A `GroupState` is born from `new` (group
//! creation) or `from_welcome` (joining), and from then on changes only
//! when a handshake is applied: exactly one operation per epoch, with the
//! tree, roster, transcript hash and key schedule advancing together.
//! A failed `apply` leaves the state untouched.

#[cfg(test)]
mod group_test;

pub mod key_schedule;

use bytes::{BufMut, Bytes, BytesMut};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::crypto::cipher_suite::{CipherSuite, MLS10_VERSION};
use crate::crypto::credential::Credential;
use crate::crypto::key_pair::{DHPrivateKey, SignaturePrivateKey};
use crate::crypto::secret::Secret;
use crate::messages::{
    Add, GroupOperation, Handshake, Remove, Update, UserInitKey, Welcome, WelcomeInfo,
};
use crate::ratchet_tree::RatchetTree;
use crate::roster::Roster;
use crate::utilities::error::{Error, Result};
use crate::utilities::serde::{serialize_opaque, Serializer};
use crate::utilities::tree_math::LeafIndex;

use self::key_schedule::EpochSecrets;

#[derive(Debug, Clone)]
pub struct GroupState {
    cipher_suite: CipherSuite,
    group_id: Bytes,
    epoch: u32,
    roster: Roster,
    tree: RatchetTree,
    transcript_hash: Bytes,
    init_secret: Secret,

    /// Our position in the leaf layer. `None` between a Welcome and the
    /// Add that installs us.
    my_index: Option<LeafIndex>,
    identity_key: SignaturePrivateKey,
    /// The init key we published, retained until our Add arrives.
    pending_init_key: Option<(UserInitKey, DHPrivateKey)>,
    secrets: Option<EpochSecrets>,
}

impl GroupState {
    /// Creates a new one-member group with this participant at leaf 0.
    pub fn new<T: Into<Bytes>>(
        group_id: T,
        cipher_suite: CipherSuite,
        identity_key: SignaturePrivateKey,
        credential: Credential,
    ) -> Result<Self> {
        if !cipher_suite.is_supported() {
            return Err(Error::UnsupportedCipherSuite);
        }
        if identity_key.public_key() != credential.public_key() {
            return Err(Error::CredentialKeyMismatch);
        }

        let leaf_key = DHPrivateKey::generate(cipher_suite)?;
        let mut tree = RatchetTree::new(cipher_suite);
        tree.add_leaf(LeafIndex(0), leaf_key.public_key().clone(), Some(leaf_key))?;

        let mut roster = Roster::default();
        roster.add(LeafIndex(0), credential)?;

        Ok(Self {
            cipher_suite,
            group_id: group_id.into(),
            epoch: 0,
            roster,
            tree,
            transcript_hash: Bytes::from(vec![0u8; 32]),
            init_secret: Secret::zero(),
            my_index: Some(LeafIndex(0)),
            identity_key,
            pending_init_key: None,
            secrets: None,
        })
    }

    /// Builds the preliminary state of a joiner from a Welcome. The state
    /// becomes active once the matching Add handshake is applied.
    pub fn from_welcome(
        welcome: &Welcome,
        identity_key: SignaturePrivateKey,
        init_key: UserInitKey,
        init_private_key: DHPrivateKey,
    ) -> Result<Self> {
        if !welcome.cipher_suite.is_supported() {
            return Err(Error::UnsupportedCipherSuite);
        }
        if welcome.user_init_key_id != init_key.user_init_key_id {
            return Err(Error::NoMatchingInitKey);
        }

        let info = welcome.decrypt(&init_private_key)?;
        if info.version != MLS10_VERSION {
            return Err(Error::UnsupportedProtocolVersion);
        }

        Ok(Self {
            cipher_suite: welcome.cipher_suite,
            group_id: info.group_id,
            epoch: info.epoch,
            roster: info.roster,
            tree: info.tree,
            transcript_hash: info.transcript_hash,
            init_secret: Secret::from_slice(&info.init_secret)?,
            my_index: None,
            identity_key,
            pending_init_key: Some((init_key, init_private_key)),
            secrets: None,
        })
    }

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

    pub fn transcript_hash(&self) -> &Bytes {
        &self.transcript_hash
    }

    pub fn my_index(&self) -> Option<LeafIndex> {
        self.my_index
    }

    /// The secrets of the current epoch, present once the first handshake
    /// has been applied.
    pub fn epoch_secrets(&self) -> Option<&EpochSecrets> {
        self.secrets.as_ref()
    }

    /// Snapshot of the state a joiner needs, sealed into a Welcome.
    pub fn as_welcome_info(&self) -> WelcomeInfo {
        WelcomeInfo {
            version: MLS10_VERSION,
            group_id: self.group_id.clone(),
            epoch: self.epoch,
            roster: self.roster.clone(),
            tree: self.tree.clone(),
            transcript_hash: self.transcript_hash.clone(),
            init_secret: Bytes::from(self.init_secret.as_bytes().to_vec()),
        }
    }

    /// Adds the holder of `init_key` at `index`, advancing the local state
    /// and returning the Welcome for the joiner and the Handshake for the
    /// rest of the group.
    pub fn add(&mut self, index: LeafIndex, init_key: &UserInitKey) -> Result<(Welcome, Handshake)> {
        init_key.verify()?;
        let init_public = init_key
            .find_init_key(self.cipher_suite)?
            .ok_or(Error::NoMatchingInitKey)?;

        let prior_info = self.as_welcome_info();
        let welcome = Welcome::new(init_key.user_init_key_id.clone(), &init_public, &prior_info)?;

        let prior_hash = prior_info.hash()?;
        let add = Add {
            index,
            init_key: init_key.clone(),
            welcome_info_hash: prior_hash.clone(),
        };
        let handshake = self.commit_local(|next, signer| {
            let op = GroupOperation::Add(add);
            let update_secret = next.apply_operation(&op, signer, Some(&prior_hash))?;
            Ok((op, update_secret))
        })?;

        Ok((welcome, handshake))
    }

    /// Refreshes this member's leaf with a fresh path secret.
    pub fn update(&mut self) -> Result<Handshake> {
        self.commit_local(|next, signer| {
            let leaf_secret = Secret::random();
            let (path, update_secret) = next.tree.encrypt_path(signer, &leaf_secret)?;
            Ok((GroupOperation::Update(Update { path }), update_secret))
        })
    }

    /// Evicts the member at `removed`: their leaf and path are blanked,
    /// then this member injects fresh entropy from its own leaf so the
    /// departed subtree is cut out of the new root secret.
    pub fn remove(&mut self, removed: LeafIndex) -> Result<Handshake> {
        self.commit_local(|next, signer| {
            if removed == signer {
                return Err(Error::LeafIndexOutOfRange);
            }
            next.tree.blank_path(removed)?;
            next.roster.remove(removed)?;

            let leaf_secret = Secret::random();
            let (path, update_secret) = next.tree.encrypt_path(signer, &leaf_secret)?;
            Ok((GroupOperation::Remove(Remove { removed, path }), update_secret))
        })
    }

    /// Applies a handshake received from another member. On any failure
    /// the state is exactly as it was before the call.
    pub fn apply(&mut self, handshake: &Handshake) -> Result<()> {
        if handshake.prior_epoch != self.epoch {
            return Err(Error::WrongEpoch);
        }

        let signer = handshake.signer_index;
        let credential = self.roster.get(signer).ok_or(Error::UnknownSigner)?;
        credential
            .public_key()
            .verify(&handshake.to_be_signed()?, &handshake.signature)
            .map_err(|_| Error::InvalidSignature)?;

        // An Add binds the hash of the state it was proposed against
        let prior_welcome_hash = match &handshake.operation {
            GroupOperation::Add(_) => Some(self.as_welcome_info().hash()?),
            _ => None,
        };

        // Every change lands on a clone; only a fully verified clone
        // replaces the live state
        let mut next = self.clone();
        next.extend_transcript(&handshake.operation)?;
        next.epoch = next.epoch.checked_add(1).ok_or(Error::EpochOverflow)?;
        let update_secret =
            next.apply_operation(&handshake.operation, signer, prior_welcome_hash.as_ref())?;

        let secrets = EpochSecrets::derive(
            &self.init_secret,
            &update_secret,
            &next.key_schedule_context()?,
        )?;
        let expected = secrets.confirmation_mac(&next.transcript_hash)?;
        if !bool::from(expected.ct_eq(&handshake.confirmation)) {
            return Err(Error::ConfirmationMismatch);
        }

        next.init_secret = secrets.init.clone();
        next.secrets = Some(secrets);
        *self = next;
        Ok(())
    }

    /// Creates a handshake for an operation built by `build` against the
    /// successor state, then advances the local state to it. The receive
    /// path for the same operation is `apply`.
    fn commit_local(
        &mut self,
        build: impl FnOnce(&mut GroupState, LeafIndex) -> Result<(GroupOperation, Secret)>,
    ) -> Result<Handshake> {
        let signer = self.my_index.ok_or(Error::PreliminaryGroupState)?;
        let prior_epoch = self.epoch;

        let mut next = self.clone();
        let (operation, update_secret) = build(&mut next, signer)?;
        next.extend_transcript(&operation)?;
        next.epoch = next.epoch.checked_add(1).ok_or(Error::EpochOverflow)?;

        let secrets = EpochSecrets::derive(
            &self.init_secret,
            &update_secret,
            &next.key_schedule_context()?,
        )?;

        let mut handshake = Handshake {
            prior_epoch,
            operation,
            signer_index: signer,
            signature: Bytes::new(),
            confirmation: Bytes::new(),
        };
        handshake.signature = self.identity_key.sign(&handshake.to_be_signed()?)?;
        handshake.confirmation = secrets.confirmation_mac(&next.transcript_hash)?;

        next.init_secret = secrets.init.clone();
        next.secrets = Some(secrets);
        *self = next;
        Ok(handshake)
    }

    /// Mutates this (cloned) state per the operation and returns the
    /// update secret feeding the epoch's key schedule.
    fn apply_operation(
        &mut self,
        operation: &GroupOperation,
        signer: LeafIndex,
        prior_welcome_hash: Option<&Bytes>,
    ) -> Result<Secret> {
        match operation {
            GroupOperation::Add(add) => self.apply_add(add, prior_welcome_hash),
            GroupOperation::Update(update) => {
                let me = self.my_index.ok_or(Error::PreliminaryGroupState)?;
                if me == signer {
                    return Err(Error::OwnHandshake);
                }
                self.tree.decrypt_path(me, signer, &update.path)
            }
            GroupOperation::Remove(remove) => {
                let me = self.my_index.ok_or(Error::PreliminaryGroupState)?;
                if remove.removed == me {
                    return Err(Error::Removed);
                }
                self.tree.blank_path(remove.removed)?;
                self.roster.remove(remove.removed)?;
                if me == signer {
                    // The remover installed its own path when the
                    // operation was created
                    return Err(Error::OwnHandshake);
                }
                self.tree.decrypt_path(me, signer, &remove.path)
            }
        }
    }

    fn apply_add(&mut self, add: &Add, prior_welcome_hash: Option<&Bytes>) -> Result<Secret> {
        add.init_key.verify()?;

        // The Add must bind the same state the joiner's Welcome described
        let prior_hash = prior_welcome_hash.ok_or(Error::WelcomeInfoHashMismatch)?;
        if add.welcome_info_hash != *prior_hash {
            return Err(Error::WelcomeInfoHashMismatch);
        }

        let leaf_public = add
            .init_key
            .find_init_key(self.cipher_suite)?
            .ok_or(Error::NoMatchingInitKey)?;

        let n = self.tree.leaf_count();
        if add.index.0 > n {
            return Err(Error::LeafIndexOutOfRange);
        }
        if add.index.0 < n && self.roster.get(add.index).is_some() {
            return Err(Error::DuplicateLeaf);
        }

        // If we are the one being added, this Add activates us
        let mut leaf_private = None;
        if self.my_index.is_none() {
            if let Some((pending, private)) = self.pending_init_key.take() {
                if pending.user_init_key_id == add.init_key.user_init_key_id {
                    self.my_index = Some(add.index);
                    leaf_private = Some(private);
                } else {
                    self.pending_init_key = Some((pending, private));
                }
            }
        }

        self.tree.add_leaf(add.index, leaf_public, leaf_private)?;
        self.roster.add(add.index, add.init_key.credential.clone())?;

        // An Add never contributes entropy; the tree stays blank along the
        // new path until the next Update resolves it
        Ok(Secret::zero())
    }

    /// transcript_hash_n = SHA-256(transcript_hash_{n-1} ‖ marshal(op))
    fn extend_transcript(&mut self, operation: &GroupOperation) -> Result<()> {
        let serialized = operation.serialize_detached()?;
        let digest = Sha256::new()
            .chain_update(&self.transcript_hash)
            .chain_update(&serialized)
            .finalize();
        self.transcript_hash = Bytes::from(digest.to_vec());
        Ok(())
    }

    /// The canonical state encoding mixed into every derived secret:
    /// everything that identifies the epoch, nothing secret.
    fn key_schedule_context(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        serialize_opaque(&self.group_id, 1, &mut buf)?;
        buf.put_u32(self.epoch);
        self.roster.serialize(&mut buf)?;
        self.tree.serialize(&mut buf)?;
        serialize_opaque(&self.transcript_hash, 1, &mut buf)?;
        Ok(buf.freeze())
    }
}

impl Serializer for GroupState {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.as_welcome_info().serialize(buf)
    }
}
