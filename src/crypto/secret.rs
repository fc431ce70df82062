use subtle::ConstantTimeEq;
use zeroize::ZeroizeOnDrop;

#[cfg(not(test))]
use std::fmt;

use crate::crypto::rng::random_bytes;
use crate::utilities::error::{Error, Result};

pub const SECRET_SIZE: usize = 32;

/// Container for a 32-byte secret (path secrets, DH shared secrets, epoch
/// secrets) with best-effort hygiene: memory is zeroised on drop, equality
/// runs in constant time, and the value is hidden from debug output.
#[derive(Clone, Eq, ZeroizeOnDrop)]
#[cfg_attr(test, derive(Debug))]
pub struct Secret([u8; SECRET_SIZE]);

impl Secret {
    /// Fresh secret from the system CSPRNG.
    pub fn random() -> Self {
        Self(random_bytes::<SECRET_SIZE>())
    }

    /// The all-zero secret used to seed brand-new groups and as the update
    /// secret of an Add.
    pub fn zero() -> Self {
        Self([0u8; SECRET_SIZE])
    }

    pub fn from_bytes(bytes: [u8; SECRET_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; SECRET_SIZE] = bytes.try_into().map_err(|_| Error::InvalidSecretSize)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_SIZE] {
        &self.0
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        bool::from(self.0.ct_eq(&other.0))
    }
}

#[cfg(not(test))]
impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret").field("value", &"***").finish()
    }
}
