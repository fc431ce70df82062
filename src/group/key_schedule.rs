//! The per-epoch key schedule. Each applied operation contributes an
//! update secret; extracting it against the previous epoch's init secret
//! yields the epoch secret, from which the working secrets are derived
//! against the new group state.

use bytes::Bytes;

use crate::crypto::kdf::{derive_secret, hkdf_extract, hmac_sha256, HASH_SIZE};
use crate::crypto::secret::Secret;
use crate::utilities::error::Result;

/// The secrets of one epoch. `init` seeds the next epoch's extraction and
/// is not handed out.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct EpochSecrets {
    application: Secret,
    handshake: Secret,
    sender_data: Secret,
    confirmation: Secret,
    pub(crate) init: Secret,
}

impl EpochSecrets {
    /// Runs the schedule for one epoch: extract, then one labelled
    /// derivation per working secret, all bound to `context` (the new
    /// state's canonical encoding).
    pub(crate) fn derive(
        prior_init: &Secret,
        update_secret: &Secret,
        context: &[u8],
    ) -> Result<Self> {
        let epoch_secret = hkdf_extract(prior_init.as_bytes(), update_secret.as_bytes())?;

        let derive = |label: &str| -> Result<Secret> {
            Secret::from_slice(&derive_secret(&epoch_secret, label, context, HASH_SIZE)?)
        };

        Ok(Self {
            application: derive("application")?,
            handshake: derive("handshake")?,
            sender_data: derive("sender_data")?,
            confirmation: derive("confirmation")?,
            init: derive("init")?,
        })
    }

    /// Keys the application-message layer above this crate.
    pub fn application_secret(&self) -> &Secret {
        &self.application
    }

    /// Keys handshake-adjacent encryption.
    pub fn handshake_secret(&self) -> &Secret {
        &self.handshake
    }

    pub fn sender_data_secret(&self) -> &Secret {
        &self.sender_data
    }

    pub fn confirmation_key(&self) -> &Secret {
        &self.confirmation
    }

    /// The confirmation MAC a handshake must carry for the epoch these
    /// secrets belong to.
    pub(crate) fn confirmation_mac(&self, transcript_hash: &[u8]) -> Result<Bytes> {
        hmac_sha256(self.confirmation.as_bytes(), transcript_hash)
    }
}
