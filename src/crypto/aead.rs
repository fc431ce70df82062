//! One-shot AES-GCM. The tag is appended to the ciphertext; associated
//! data, when present, is authenticated ahead of the plaintext.

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::AeadInPlace;
use aes_gcm::{aes::Aes192, AesGcm, Aes128Gcm, Aes256Gcm, Key as AesKey, KeyInit, Nonce};
use bytes::Bytes;

use crate::utilities::error::{Error, Result};

pub const KEY_SIZE_128: usize = 16;
pub const KEY_SIZE_192: usize = 24;
pub const KEY_SIZE_256: usize = 32;
pub const NONCE_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;

type Aes192Gcm = AesGcm<Aes192, U12>;

pub fn seal(key: &[u8], nonce: &[u8], plaintext: &[u8], additional_data: &[u8]) -> Result<Bytes> {
    if nonce.len() != NONCE_SIZE {
        return Err(Error::InvalidAeadNonceSize);
    }
    let nonce: &Nonce<U12> = nonce.into();

    let mut in_out = plaintext.to_vec();
    match key.len() {
        KEY_SIZE_128 => {
            let key: &AesKey<Aes128Gcm> = key.into();
            Aes128Gcm::new(key).encrypt_in_place(nonce, additional_data, &mut in_out)
        }
        KEY_SIZE_192 => {
            let key: &AesKey<Aes192Gcm> = key.into();
            Aes192Gcm::new(key).encrypt_in_place(nonce, additional_data, &mut in_out)
        }
        KEY_SIZE_256 => {
            let key: &AesKey<Aes256Gcm> = key.into();
            Aes256Gcm::new(key).encrypt_in_place(nonce, additional_data, &mut in_out)
        }
        _ => return Err(Error::InvalidAeadKeySize),
    }
    .map_err(|err| Error::RustCryptoError(err.to_string()))?;

    Ok(Bytes::from(in_out))
}

pub fn open(key: &[u8], nonce: &[u8], ciphertext: &[u8], additional_data: &[u8]) -> Result<Bytes> {
    if nonce.len() != NONCE_SIZE {
        return Err(Error::InvalidAeadNonceSize);
    }
    if ciphertext.len() < TAG_SIZE {
        return Err(Error::CiphertextTooShort);
    }
    let nonce: &Nonce<U12> = nonce.into();

    let mut in_out = ciphertext.to_vec();
    match key.len() {
        KEY_SIZE_128 => {
            let key: &AesKey<Aes128Gcm> = key.into();
            Aes128Gcm::new(key).decrypt_in_place(nonce, additional_data, &mut in_out)
        }
        KEY_SIZE_192 => {
            let key: &AesKey<Aes192Gcm> = key.into();
            Aes192Gcm::new(key).decrypt_in_place(nonce, additional_data, &mut in_out)
        }
        KEY_SIZE_256 => {
            let key: &AesKey<Aes256Gcm> = key.into();
            Aes256Gcm::new(key).decrypt_in_place(nonce, additional_data, &mut in_out)
        }
        _ => return Err(Error::InvalidAeadKeySize),
    }
    .map_err(|err| Error::RustCryptoError(err.to_string()))?;

    Ok(Bytes::from(in_out))
}
