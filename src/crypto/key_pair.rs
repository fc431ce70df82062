//! Asymmetric key wrappers: one surface over both DH groups and both
//! signature schemes. Each key holds a per-curve variant and dispatches
//! with a `match`; containers that must parse suite-dependent bytes later
//! carry the suite tag alongside.

use bytes::{Buf, BufMut, Bytes};
use p256::elliptic_curve::ops::Reduce;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use sha2::{Digest, Sha256};
use signature::{RandomizedSigner, Signer, Verifier};
use subtle::ConstantTimeEq;

use crate::crypto::cipher_suite::{CipherSuite, SignatureScheme};
use crate::crypto::rng::get_rng;
use crate::crypto::secret::Secret;
use crate::utilities::error::{Error, Result};
use crate::utilities::serde::{deserialize_opaque, serialize_opaque, Serializer};

// Seeds are hashed with a domain prefix before becoming scalars, so the
// same seed bytes never yield related DH and signature keys.
const DH_SEED_PREFIX: &[u8] = b"treekem derive dh ";
const SIG_SEED_PREFIX: &[u8] = b"treekem derive sig ";

fn seeded_digest(prefix: &[u8], seed: &[u8]) -> sha2::digest::Output<Sha256> {
    Sha256::new().chain_update(prefix).chain_update(seed).finalize()
}

fn p256_scalar(digest: &p256::FieldBytes) -> Result<p256::SecretKey> {
    // The digest is reduced mod the group order to yield the scalar d
    let scalar = <p256::Scalar as Reduce<p256::U256>>::reduce_bytes(digest);
    let scalar = Option::<p256::NonZeroScalar>::from(p256::NonZeroScalar::new(scalar))
        .ok_or(Error::InvalidPrivateKey)?;
    Ok(p256::SecretKey::from(scalar))
}

#[derive(Clone)]
enum DhPublic {
    P256(p256::PublicKey),
    X25519(x25519_dalek::PublicKey),
}

/// Public half of a DH keypair, tagged with its cipher suite.
#[derive(Clone)]
pub struct DHPublicKey {
    suite: CipherSuite,
    key: DhPublic,
}

impl DHPublicKey {
    pub fn cipher_suite(&self) -> CipherSuite {
        self.suite
    }

    /// Raw key bytes: uncompressed SEC1 for P-256, 32 raw bytes for X25519.
    pub fn to_bytes(&self) -> Bytes {
        match &self.key {
            DhPublic::P256(key) => Bytes::from(key.to_encoded_point(false).as_bytes().to_vec()),
            DhPublic::X25519(key) => Bytes::from(key.as_bytes().to_vec()),
        }
    }

    pub fn from_bytes(suite: CipherSuite, data: &[u8]) -> Result<Self> {
        let key = match suite {
            CipherSuite::P256_SHA256_AES128GCM => DhPublic::P256(
                p256::PublicKey::from_sec1_bytes(data).map_err(|_| Error::InvalidPublicKey)?,
            ),
            CipherSuite::X25519_SHA256_AES128GCM => {
                let raw: [u8; 32] = data.try_into().map_err(|_| Error::InvalidPublicKey)?;
                DhPublic::X25519(x25519_dalek::PublicKey::from(raw))
            }
            CipherSuite::Unknown(_) => return Err(Error::UnsupportedCipherSuite),
        };
        Ok(Self { suite, key })
    }

    pub fn deserialize<B: Buf>(buf: &mut B, suite: CipherSuite) -> Result<Self> {
        let raw = deserialize_opaque(buf, 2)?;
        Self::from_bytes(suite, &raw)
    }
}

impl Serializer for DHPublicKey {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_opaque(&self.to_bytes(), 2, buf)
    }
}

impl PartialEq for DHPublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.suite == other.suite && self.to_bytes() == other.to_bytes()
    }
}

impl Eq for DHPublicKey {}

impl std::fmt::Debug for DHPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DHPublicKey")
            .field("suite", &self.suite)
            .field("key", &hex::encode(self.to_bytes()))
            .finish()
    }
}

#[derive(Clone)]
enum DhSecret {
    P256(p256::SecretKey),
    X25519(x25519_dalek::StaticSecret),
}

/// Private half of a DH keypair. The matching public key is cached.
#[derive(Clone)]
pub struct DHPrivateKey {
    secret: DhSecret,
    public: DHPublicKey,
}

impl DHPrivateKey {
    /// Fresh keypair from system randomness.
    pub fn generate(suite: CipherSuite) -> Result<Self> {
        match suite {
            CipherSuite::P256_SHA256_AES128GCM => Ok(Self::from_p256(p256::SecretKey::random(
                &mut get_rng(),
            ))),
            CipherSuite::X25519_SHA256_AES128GCM => Ok(Self::from_x25519(
                x25519_dalek::StaticSecret::random_from_rng(get_rng()),
            )),
            CipherSuite::Unknown(_) => Err(Error::UnsupportedCipherSuite),
        }
    }

    /// Deterministic keypair from a seed: identical seed bytes yield an
    /// identical keypair on every run.
    pub fn derive(suite: CipherSuite, seed: &[u8]) -> Result<Self> {
        let digest = seeded_digest(DH_SEED_PREFIX, seed);
        match suite {
            CipherSuite::P256_SHA256_AES128GCM => Ok(Self::from_p256(p256_scalar(&digest)?)),
            CipherSuite::X25519_SHA256_AES128GCM => {
                // The digest is clamped by the scalar constructor
                let raw: [u8; 32] = digest.into();
                Ok(Self::from_x25519(x25519_dalek::StaticSecret::from(raw)))
            }
            CipherSuite::Unknown(_) => Err(Error::UnsupportedCipherSuite),
        }
    }

    fn from_p256(secret: p256::SecretKey) -> Self {
        let public = DHPublicKey {
            suite: CipherSuite::P256_SHA256_AES128GCM,
            key: DhPublic::P256(secret.public_key()),
        };
        Self {
            secret: DhSecret::P256(secret),
            public,
        }
    }

    fn from_x25519(secret: x25519_dalek::StaticSecret) -> Self {
        let public = DHPublicKey {
            suite: CipherSuite::X25519_SHA256_AES128GCM,
            key: DhPublic::X25519(x25519_dalek::PublicKey::from(&secret)),
        };
        Self {
            secret: DhSecret::X25519(secret),
            public,
        }
    }

    pub fn cipher_suite(&self) -> CipherSuite {
        self.public.suite
    }

    pub fn public_key(&self) -> &DHPublicKey {
        &self.public
    }

    /// Raw ECDH shared secret with `peer`, not hashed.
    pub fn dh(&self, peer: &DHPublicKey) -> Result<Secret> {
        match (&self.secret, &peer.key) {
            (DhSecret::P256(secret), DhPublic::P256(public)) => {
                let shared =
                    p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
                Secret::from_slice(shared.raw_secret_bytes().as_slice())
            }
            (DhSecret::X25519(secret), DhPublic::X25519(public)) => {
                Ok(Secret::from_bytes(secret.diffie_hellman(public).to_bytes()))
            }
            _ => Err(Error::CipherSuiteMismatch),
        }
    }
}

impl PartialEq for DHPrivateKey {
    fn eq(&self, other: &Self) -> bool {
        match (&self.secret, &other.secret) {
            (DhSecret::P256(a), DhSecret::P256(b)) => {
                bool::from(a.to_bytes().ct_eq(&b.to_bytes()))
            }
            (DhSecret::X25519(a), DhSecret::X25519(b)) => {
                bool::from(a.to_bytes().ct_eq(&b.to_bytes()))
            }
            _ => false,
        }
    }
}

impl Eq for DHPrivateKey {}

impl std::fmt::Debug for DHPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DHPrivateKey")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
enum SigPublic {
    P256(p256::ecdsa::VerifyingKey),
    Ed25519(ed25519_dalek::VerifyingKey),
}

/// Public half of a signing keypair, tagged with its scheme.
#[derive(Clone)]
pub struct SignaturePublicKey {
    scheme: SignatureScheme,
    key: SigPublic,
}

impl SignaturePublicKey {
    pub fn signature_scheme(&self) -> SignatureScheme {
        self.scheme
    }

    pub fn to_bytes(&self) -> Bytes {
        match &self.key {
            SigPublic::P256(key) => Bytes::from(key.to_encoded_point(false).as_bytes().to_vec()),
            SigPublic::Ed25519(key) => Bytes::from(key.as_bytes().to_vec()),
        }
    }

    pub fn from_bytes(scheme: SignatureScheme, data: &[u8]) -> Result<Self> {
        let key = match scheme {
            SignatureScheme::P256_SHA256 => SigPublic::P256(
                p256::ecdsa::VerifyingKey::from_sec1_bytes(data)
                    .map_err(|_| Error::InvalidPublicKey)?,
            ),
            SignatureScheme::Ed25519 => {
                let raw: [u8; 32] = data.try_into().map_err(|_| Error::InvalidPublicKey)?;
                SigPublic::Ed25519(
                    ed25519_dalek::VerifyingKey::from_bytes(&raw)
                        .map_err(|_| Error::InvalidPublicKey)?,
                )
            }
            SignatureScheme::Unknown(_) => return Err(Error::UnsupportedCipherSuite),
        };
        Ok(Self { scheme, key })
    }

    pub fn deserialize<B: Buf>(buf: &mut B, scheme: SignatureScheme) -> Result<Self> {
        let raw = deserialize_opaque(buf, 2)?;
        Self::from_bytes(scheme, &raw)
    }

    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        match &self.key {
            SigPublic::P256(key) => {
                let signature = p256::ecdsa::Signature::from_der(signature)?;
                key.verify(message, &signature)?;
            }
            SigPublic::Ed25519(key) => {
                let signature = ed25519_dalek::Signature::from_slice(signature)?;
                key.verify(message, &signature)?;
            }
        }
        Ok(())
    }
}

impl Serializer for SignaturePublicKey {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_opaque(&self.to_bytes(), 2, buf)
    }
}

impl PartialEq for SignaturePublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.scheme == other.scheme && self.to_bytes() == other.to_bytes()
    }
}

impl Eq for SignaturePublicKey {}

impl std::fmt::Debug for SignaturePublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignaturePublicKey")
            .field("scheme", &self.scheme)
            .field("key", &hex::encode(self.to_bytes()))
            .finish()
    }
}

#[derive(Clone)]
enum SigSecret {
    P256(p256::ecdsa::SigningKey),
    Ed25519(ed25519_dalek::SigningKey),
}

/// Private half of a signing keypair. The matching public key is cached.
#[derive(Clone)]
pub struct SignaturePrivateKey {
    secret: SigSecret,
    public: SignaturePublicKey,
}

impl SignaturePrivateKey {
    pub fn generate(scheme: SignatureScheme) -> Result<Self> {
        match scheme {
            SignatureScheme::P256_SHA256 => {
                Ok(Self::from_p256(p256::ecdsa::SigningKey::random(&mut get_rng())))
            }
            SignatureScheme::Ed25519 => Ok(Self::from_ed25519(
                ed25519_dalek::SigningKey::generate(&mut get_rng()),
            )),
            SignatureScheme::Unknown(_) => Err(Error::UnsupportedCipherSuite),
        }
    }

    /// Deterministic keypair from a seed, for the same reasons as
    /// [`DHPrivateKey::derive`].
    pub fn derive(scheme: SignatureScheme, seed: &[u8]) -> Result<Self> {
        let digest = seeded_digest(SIG_SEED_PREFIX, seed);
        match scheme {
            SignatureScheme::P256_SHA256 => Ok(Self::from_p256(p256::ecdsa::SigningKey::from(
                p256_scalar(&digest)?,
            ))),
            SignatureScheme::Ed25519 => {
                let raw: [u8; 32] = digest.into();
                Ok(Self::from_ed25519(ed25519_dalek::SigningKey::from_bytes(
                    &raw,
                )))
            }
            SignatureScheme::Unknown(_) => Err(Error::UnsupportedCipherSuite),
        }
    }

    fn from_p256(secret: p256::ecdsa::SigningKey) -> Self {
        let public = SignaturePublicKey {
            scheme: SignatureScheme::P256_SHA256,
            key: SigPublic::P256(*secret.verifying_key()),
        };
        Self {
            secret: SigSecret::P256(secret),
            public,
        }
    }

    fn from_ed25519(secret: ed25519_dalek::SigningKey) -> Self {
        let public = SignaturePublicKey {
            scheme: SignatureScheme::Ed25519,
            key: SigPublic::Ed25519(secret.verifying_key()),
        };
        Self {
            secret: SigSecret::Ed25519(secret),
            public,
        }
    }

    pub fn signature_scheme(&self) -> SignatureScheme {
        self.public.scheme
    }

    pub fn public_key(&self) -> &SignaturePublicKey {
        &self.public
    }

    /// ECDSA draws a fresh nonce per call; Ed25519 is deterministic.
    pub fn sign(&self, message: &[u8]) -> Result<Bytes> {
        match &self.secret {
            SigSecret::P256(key) => {
                let signature: p256::ecdsa::Signature =
                    key.try_sign_with_rng(&mut get_rng(), message)?;
                Ok(Bytes::from(signature.to_der().as_bytes().to_vec()))
            }
            SigSecret::Ed25519(key) => {
                let signature: ed25519_dalek::Signature = key.sign(message);
                Ok(Bytes::from(signature.to_vec()))
            }
        }
    }
}

impl PartialEq for SignaturePrivateKey {
    fn eq(&self, other: &Self) -> bool {
        match (&self.secret, &other.secret) {
            (SigSecret::P256(a), SigSecret::P256(b)) => {
                bool::from(a.to_bytes().ct_eq(&b.to_bytes()))
            }
            (SigSecret::Ed25519(a), SigSecret::Ed25519(b)) => {
                bool::from(a.to_bytes().ct_eq(&b.to_bytes()))
            }
            _ => false,
        }
    }
}

impl Eq for SignaturePrivateKey {}

impl std::fmt::Debug for SignaturePrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignaturePrivateKey")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}
