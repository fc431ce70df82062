//! A credential binds a member's identity to the signature key that signs
//! every message attributed to that member.

use bytes::{Buf, BufMut, Bytes};

use crate::crypto::key_pair::SignaturePublicKey;
use crate::utilities::error::{Error, Result};
use crate::utilities::serde::{
    deserialize_opaque, serialize_opaque, Deserializer, Serializer,
};

#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CredentialType {
    #[default]
    Basic,
    Unknown(u8),
}

impl From<u8> for CredentialType {
    fn from(v: u8) -> Self {
        match v {
            0x00 => CredentialType::Basic,
            _ => CredentialType::Unknown(v),
        }
    }
}

impl From<CredentialType> for u8 {
    fn from(val: CredentialType) -> u8 {
        match val {
            CredentialType::Basic => 0x00,
            CredentialType::Unknown(v) => v,
        }
    }
}

/// A bare assertion of an identity together with its signature key.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BasicCredential {
    pub identity: Bytes,
    pub public_key: SignaturePublicKey,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Credential {
    Basic(BasicCredential),
}

impl Credential {
    pub fn basic<T: Into<Bytes>>(identity: T, public_key: SignaturePublicKey) -> Self {
        Self::Basic(BasicCredential {
            identity: identity.into(),
            public_key,
        })
    }

    pub fn credential_type(&self) -> CredentialType {
        match self {
            Credential::Basic(_) => CredentialType::Basic,
        }
    }

    pub fn identity(&self) -> &Bytes {
        match self {
            Credential::Basic(basic) => &basic.identity,
        }
    }

    pub fn public_key(&self) -> &SignaturePublicKey {
        match self {
            Credential::Basic(basic) => &basic.public_key,
        }
    }
}

impl Deserializer for Credential {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        if !buf.has_remaining() {
            return Err(Error::BufferTooSmall);
        }
        let credential_type = buf.get_u8().into();

        match credential_type {
            CredentialType::Basic => {
                let identity = deserialize_opaque(buf, 2)?;
                if buf.remaining() < 2 {
                    return Err(Error::BufferTooSmall);
                }
                let scheme = buf.get_u16().into();
                let public_key = SignaturePublicKey::deserialize(buf, scheme)?;
                Ok(Self::Basic(BasicCredential {
                    identity,
                    public_key,
                }))
            }
            CredentialType::Unknown(_) => Err(Error::InvalidCredentialTypeValue),
        }
    }
}

impl Serializer for Credential {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        buf.put_u8(self.credential_type().into());
        match self {
            Credential::Basic(basic) => {
                serialize_opaque(&basic.identity, 2, buf)?;
                buf.put_u16(basic.public_key.signature_scheme().into());
                basic.public_key.serialize(buf)
            }
        }
    }
}
