//! A cipher suite ties a 2-byte tag to the DH group, signature scheme,
//! AEAD, and hash a group uses. A group instance runs exactly one suite
//! for its whole lifetime.

use std::fmt::{Display, Formatter};

/// The protocol version spoken by this implementation.
pub const MLS10_VERSION: u8 = 0x00;

#[allow(non_camel_case_types)]
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CipherSuite {
    #[default]
    P256_SHA256_AES128GCM,
    X25519_SHA256_AES128GCM,
    Unknown(u16),
}

impl From<u16> for CipherSuite {
    fn from(v: u16) -> Self {
        match v {
            0x0000 => CipherSuite::P256_SHA256_AES128GCM,
            0x0001 => CipherSuite::X25519_SHA256_AES128GCM,
            _ => CipherSuite::Unknown(v),
        }
    }
}

impl From<CipherSuite> for u16 {
    fn from(val: CipherSuite) -> u16 {
        match val {
            CipherSuite::P256_SHA256_AES128GCM => 0x0000,
            CipherSuite::X25519_SHA256_AES128GCM => 0x0001,
            CipherSuite::Unknown(v) => v,
        }
    }
}

impl Display for CipherSuite {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl CipherSuite {
    pub fn is_supported(&self) -> bool {
        !matches!(self, CipherSuite::Unknown(_))
    }

    /// The signature scheme paired with this suite's DH group.
    pub fn signature_scheme(&self) -> SignatureScheme {
        match self {
            CipherSuite::P256_SHA256_AES128GCM => SignatureScheme::P256_SHA256,
            CipherSuite::X25519_SHA256_AES128GCM => SignatureScheme::Ed25519,
            CipherSuite::Unknown(v) => SignatureScheme::Unknown(*v),
        }
    }

    /// Whether signing the same message twice yields identical bytes.
    /// Ed25519 is deterministic; ECDSA draws a fresh nonce per signature.
    pub fn reproducible_signatures(&self) -> bool {
        self.signature_scheme().reproducible()
    }
}

#[allow(non_camel_case_types)]
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SignatureScheme {
    #[default]
    P256_SHA256,
    Ed25519,
    Unknown(u16),
}

impl From<u16> for SignatureScheme {
    fn from(v: u16) -> Self {
        match v {
            0x0000 => SignatureScheme::P256_SHA256,
            0x0001 => SignatureScheme::Ed25519,
            _ => SignatureScheme::Unknown(v),
        }
    }
}

impl From<SignatureScheme> for u16 {
    fn from(val: SignatureScheme) -> u16 {
        match val {
            SignatureScheme::P256_SHA256 => 0x0000,
            SignatureScheme::Ed25519 => 0x0001,
            SignatureScheme::Unknown(v) => v,
        }
    }
}

impl Display for SignatureScheme {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl SignatureScheme {
    pub fn reproducible(&self) -> bool {
        matches!(self, SignatureScheme::Ed25519)
    }
}
