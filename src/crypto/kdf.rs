//! HKDF-Extract, HKDF-Expand, and the labelled derivations built on them.
//!
//! Every label on the wire is prefixed with `"mls10 "` and serialized as
//! `HkdfLabel { uint16 length; opaque<1> label; }`, optionally followed by
//! the canonical group-state encoding when deriving epoch secrets.

use bytes::{BufMut, Bytes, BytesMut};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::utilities::error::{Error, Result};
use crate::utilities::serde::serialize_opaque;

pub const HASH_SIZE: usize = 32;

const LABEL_PREFIX: &str = "mls10 ";

/// HKDF-Extract(salt, ikm) = HMAC-SHA256(salt, ikm).
pub fn hkdf_extract(salt: &[u8], ikm: &[u8]) -> Result<Bytes> {
    let mut m = Hmac::<Sha256>::new_from_slice(salt)
        .map_err(|err| Error::RustCryptoError(err.to_string()))?;
    m.update(ikm);
    Ok(Bytes::from(m.finalize().into_bytes().to_vec()))
}

/// HKDF-Expand for outputs up to one hash block. Larger outputs are
/// rejected rather than silently truncating the multi-block schedule this
/// implementation does not run.
pub fn hkdf_expand(secret: &[u8], info: &[u8], length: usize) -> Result<Bytes> {
    if length > HASH_SIZE {
        return Err(Error::ExpandOutputTooLong);
    }

    let hkdf =
        Hkdf::<Sha256>::from_prk(secret).map_err(|err| Error::RustCryptoError(err.to_string()))?;
    let mut out = vec![0u8; length];
    hkdf.expand(info, &mut out)
        .map_err(|err| Error::RustCryptoError(err.to_string()))?;

    Ok(Bytes::from(out))
}

fn serialize_label<B: BufMut>(label: &str, length: usize, buf: &mut B) -> Result<()> {
    buf.put_u16(length as u16);
    let full = format!("{LABEL_PREFIX}{label}");
    serialize_opaque(full.as_bytes(), 1, buf)
}

/// Expansion under a bare label, used for the ECIES key/nonce pair and the
/// per-node path-secret chain.
pub fn expand_with_label(secret: &[u8], label: &str, length: usize) -> Result<Bytes> {
    let mut info = BytesMut::new();
    serialize_label(label, length, &mut info)?;
    hkdf_expand(secret, &info, length)
}

/// Expansion bound to a group state: the label is followed by the state's
/// canonical context encoding, so two groups never derive the same secret
/// from the same epoch secret.
pub fn derive_secret(secret: &[u8], label: &str, context: &[u8], length: usize) -> Result<Bytes> {
    let mut info = BytesMut::new();
    serialize_label(label, length, &mut info)?;
    info.put_slice(context);
    hkdf_expand(secret, &info, length)
}

/// HMAC-SHA256, keyed by an epoch's confirmation key when computing the
/// handshake confirmation.
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> Result<Bytes> {
    let mut m =
        Hmac::<Sha256>::new_from_slice(key).map_err(|err| Error::RustCryptoError(err.to_string()))?;
    m.update(message);
    Ok(Bytes::from(m.finalize().into_bytes().to_vec()))
}
