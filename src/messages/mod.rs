//! Handshake and bootstrap messages. Field order is encoding order, and
//! the canonical encodings double as the pre-images for signatures and the
//! transcript hash, so marshalling here is byte-exact by contract.


use bytes::{Buf, BufMut, Bytes, BytesMut};
use sha2::{Digest, Sha256};

use crate::crypto::cipher_suite::{CipherSuite, MLS10_VERSION};
use crate::crypto::credential::Credential;
use crate::crypto::hpke::HPKECiphertext;
use crate::crypto::key_pair::{DHPrivateKey, DHPublicKey, SignaturePrivateKey};
use crate::ratchet_tree::{DirectPath, RatchetTree};
use crate::roster::Roster;
use crate::utilities::error::{Error, Result};
use crate::utilities::serde::{
    deserialize_opaque, deserialize_vector, serialize_opaque, serialize_vector, Deserializer,
    Serializer,
};
use crate::utilities::tree_math::LeafIndex;

/// A prospective member's signed advertisement: one init key per
/// supported suite, bound to a credential. Init keys are kept as opaque
/// bytes on the wire because parsing one requires knowing its suite.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UserInitKey {
    pub user_init_key_id: Bytes,
    pub supported_versions: Vec<u8>,
    pub cipher_suites: Vec<CipherSuite>,
    init_keys: Vec<Bytes>,
    pub credential: Credential,
    pub signature: Bytes,
}

impl UserInitKey {
    pub fn new<T: Into<Bytes>>(user_init_key_id: T, credential: Credential) -> Self {
        Self {
            user_init_key_id: user_init_key_id.into(),
            supported_versions: vec![MLS10_VERSION],
            cipher_suites: vec![],
            init_keys: vec![],
            credential,
            signature: Bytes::new(),
        }
    }

    /// Advertise an init key; its suite is appended alongside.
    pub fn add_init_key(&mut self, public_key: &DHPublicKey) {
        self.cipher_suites.push(public_key.cipher_suite());
        self.init_keys.push(public_key.to_bytes());
    }

    /// The advertised init key for `suite`, if any.
    pub fn find_init_key(&self, suite: CipherSuite) -> Result<Option<DHPublicKey>> {
        for (s, raw) in self.cipher_suites.iter().zip(&self.init_keys) {
            if *s == suite {
                return Ok(Some(DHPublicKey::from_bytes(suite, raw)?));
            }
        }
        Ok(None)
    }

    /// Every field before the signature, in encoding order.
    pub fn to_be_signed(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        self.serialize_unsigned(&mut buf)?;
        Ok(buf.freeze())
    }

    pub fn sign(&mut self, identity_key: &SignaturePrivateKey) -> Result<()> {
        if identity_key.public_key() != self.credential.public_key() {
            return Err(Error::CredentialKeyMismatch);
        }
        self.signature = identity_key.sign(&self.to_be_signed()?)?;
        Ok(())
    }

    pub fn verify(&self) -> Result<()> {
        self.credential
            .public_key()
            .verify(&self.to_be_signed()?, &self.signature)
            .map_err(|_| Error::InvalidSignature)
    }

    fn serialize_unsigned<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        serialize_opaque(&self.user_init_key_id, 1, buf)?;
        serialize_vector(
            self.supported_versions.len(),
            1,
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> {
                b.put_u8(self.supported_versions[i]);
                Ok(())
            },
        )?;
        serialize_vector(
            self.cipher_suites.len(),
            1,
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> {
                b.put_u16(self.cipher_suites[i].into());
                Ok(())
            },
        )?;
        serialize_vector(
            self.init_keys.len(),
            2,
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> { serialize_opaque(&self.init_keys[i], 2, b) },
        )?;
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
            if !b.has_remaining() {
                return Err(Error::BufferTooSmall);
            }
            supported_versions.push(b.get_u8());
            Ok(())
        })?;

        let mut cipher_suites = vec![];
        deserialize_vector(buf, 1, |b: &mut Bytes| -> Result<()> {
            if b.remaining() < 2 {
                return Err(Error::BufferTooSmall);
            }
            cipher_suites.push(b.get_u16().into());
            Ok(())
        })?;

        let mut init_keys = vec![];
        deserialize_vector(buf, 2, |b: &mut Bytes| -> Result<()> {
            init_keys.push(deserialize_opaque(b, 2)?);
            Ok(())
        })?;

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
        self.serialize_unsigned(buf)?;
        serialize_opaque(&self.signature, 2, buf)
    }
}

/// Everything a joiner needs to reconstruct the group: the full state of
/// the epoch the Welcome was issued at.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WelcomeInfo {
    pub version: u8,
    pub group_id: Bytes,
    pub epoch: u32,
    pub roster: Roster,
    pub tree: RatchetTree,
    pub transcript_hash: Bytes,
    pub init_secret: Bytes,
}

impl WelcomeInfo {
    pub fn hash(&self) -> Result<Bytes> {
        let serialized = self.serialize_detached()?;
        Ok(Bytes::from(Sha256::digest(&serialized).to_vec()))
    }

    pub fn deserialize<B: Buf>(buf: &mut B, suite: CipherSuite) -> Result<Self> {
        if !buf.has_remaining() {
            return Err(Error::BufferTooSmall);
        }
        let version = buf.get_u8();
        let group_id = deserialize_opaque(buf, 1)?;
        if buf.remaining() < 4 {
            return Err(Error::BufferTooSmall);
        }
        let epoch = buf.get_u32();
        let roster = Roster::deserialize(buf)?;
        let tree = RatchetTree::deserialize(buf, suite)?;
        let transcript_hash = deserialize_opaque(buf, 1)?;
        let init_secret = deserialize_opaque(buf, 1)?;

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
        buf.put_u8(self.version);
        serialize_opaque(&self.group_id, 1, buf)?;
        buf.put_u32(self.epoch);
        self.roster.serialize(buf)?;
        self.tree.serialize(buf)?;
        serialize_opaque(&self.transcript_hash, 1, buf)?;
        serialize_opaque(&self.init_secret, 1, buf)
    }
}

/// A WelcomeInfo sealed to a joiner's init key. The suite tag rides along
/// so the ciphertext's ephemeral key can be parsed before decryption.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Welcome {
    pub user_init_key_id: Bytes,
    pub cipher_suite: CipherSuite,
    pub encrypted_welcome_info: HPKECiphertext,
}

impl Welcome {
    pub fn new(user_init_key_id: Bytes, init_key: &DHPublicKey, info: &WelcomeInfo) -> Result<Self> {
        let serialized = info.serialize_detached()?;
        Ok(Self {
            user_init_key_id,
            cipher_suite: init_key.cipher_suite(),
            encrypted_welcome_info: init_key.encrypt(&serialized)?,
        })
    }

    pub fn decrypt(&self, init_key: &DHPrivateKey) -> Result<WelcomeInfo> {
        let raw = init_key.decrypt(&self.encrypted_welcome_info)?;
        let mut buf = raw;
        let info = WelcomeInfo::deserialize(&mut buf, self.cipher_suite)?;
        if buf.has_remaining() {
            return Err(Error::TrailingBytes);
        }
        Ok(info)
    }
}

impl Deserializer for Welcome {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let user_init_key_id = deserialize_opaque(buf, 1)?;
        if buf.remaining() < 2 {
            return Err(Error::BufferTooSmall);
        }
        let cipher_suite: CipherSuite = buf.get_u16().into();
        if !cipher_suite.is_supported() {
            return Err(Error::UnsupportedCipherSuite);
        }
        let encrypted_welcome_info = HPKECiphertext::deserialize(buf, cipher_suite)?;

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

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
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
            _ => Err(Error::InvalidGroupOperationTypeValue),
        }
    }
}

/// Proposes a new member at `index`, carrying their verified UserInitKey
/// and a hash binding the adder's pre-Add state.
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
        if buf.remaining() < 4 {
            return Err(Error::BufferTooSmall);
        }
        let index = LeafIndex(buf.get_u32());
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
        buf.put_u32(self.index.0);
        self.init_key.serialize(buf)?;
        serialize_opaque(&self.welcome_info_hash, 1, buf)
    }
}

/// A fresh path from the sender's leaf.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Update {
    pub path: DirectPath,
}

impl Update {
    pub fn deserialize<B: Buf>(buf: &mut B, suite: CipherSuite) -> Result<Self> {
        Ok(Self {
            path: DirectPath::deserialize(buf, suite)?,
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

/// Evicts the member at `removed`; the path originates at the remover's
/// own leaf, encrypted against resolutions that already skip the blanked
/// subtree.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Remove {
    pub removed: LeafIndex,
    pub path: DirectPath,
}

impl Remove {
    pub fn deserialize<B: Buf>(buf: &mut B, suite: CipherSuite) -> Result<Self> {
        if buf.remaining() < 4 {
            return Err(Error::BufferTooSmall);
        }
        let removed = LeafIndex(buf.get_u32());
        Ok(Self {
            removed,
            path: DirectPath::deserialize(buf, suite)?,
        })
    }
}

impl Serializer for Remove {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        buf.put_u32(self.removed.0);
        self.path.serialize(buf)
    }
}

/// The operation carried by a handshake, tagged on the wire by
/// [`GroupOperationType`].
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

    pub fn deserialize<B: Buf>(buf: &mut B, suite: CipherSuite) -> Result<Self> {
        if !buf.has_remaining() {
            return Err(Error::BufferTooSmall);
        }
        let operation_type = GroupOperationType::try_from(buf.get_u8())?;
        match operation_type {
            GroupOperationType::Add => Ok(Self::Add(Add::deserialize(buf)?)),
            GroupOperationType::Update => Ok(Self::Update(Update::deserialize(buf, suite)?)),
            GroupOperationType::Remove => Ok(Self::Remove(Remove::deserialize(buf, suite)?)),
        }
    }
}

impl Serializer for GroupOperation {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        buf.put_u8(self.operation_type() as u8);
        match self {
            GroupOperation::Add(add) => add.serialize(buf),
            GroupOperation::Update(update) => update.serialize(buf),
            GroupOperation::Remove(remove) => remove.serialize(buf),
        }
    }
}

/// The signed, confirmed envelope around a group operation. The signature
/// covers (prior_epoch, operation, signer_index); the confirmation is an
/// HMAC under the new epoch's confirmation key over the new transcript
/// hash.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Handshake {
    pub prior_epoch: u32,
    pub operation: GroupOperation,
    pub signer_index: LeafIndex,
    pub signature: Bytes,
    pub confirmation: Bytes,
}

impl Handshake {
    /// The epoch this handshake advances the group to.
    pub fn epoch(&self) -> u32 {
        self.prior_epoch + 1
    }

    /// Canonical pre-image of the signature.
    pub fn to_be_signed(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        buf.put_u32(self.prior_epoch);
        self.operation.serialize(&mut buf)?;
        buf.put_u32(self.signer_index.0);
        Ok(buf.freeze())
    }

    pub fn deserialize<B: Buf>(buf: &mut B, suite: CipherSuite) -> Result<Self> {
        if buf.remaining() < 4 {
            return Err(Error::BufferTooSmall);
        }
        let prior_epoch = buf.get_u32();
        let operation = GroupOperation::deserialize(buf, suite)?;
        if buf.remaining() < 4 {
            return Err(Error::BufferTooSmall);
        }
        let signer_index = LeafIndex(buf.get_u32());
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

    pub fn deserialize_exact(raw: impl AsRef<[u8]>, suite: CipherSuite) -> Result<Self> {
        let mut buf = raw.as_ref();
        let handshake = Self::deserialize(&mut buf, suite)?;
        if !buf.is_empty() {
            return Err(Error::TrailingBytes);
        }
        Ok(handshake)
    }
}

impl Serializer for Handshake {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        buf.put_u32(self.prior_epoch);
        self.operation.serialize(buf)?;
        buf.put_u32(self.signer_index.0);
        serialize_opaque(&self.signature, 2, buf)?;
        serialize_opaque(&self.confirmation, 1, buf)
    }
}
