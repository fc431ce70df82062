use crate::crypto::aead;
use crate::crypto::cipher_suite::{CipherSuite, SignatureScheme};
use crate::crypto::hpke::HPKECiphertext;
use crate::crypto::kdf::{expand_with_label, hkdf_expand, hkdf_extract};
use crate::crypto::key_pair::{DHPrivateKey, DHPublicKey, SignaturePrivateKey};
use crate::utilities::error::{Error, Result};
use crate::utilities::serde::Serializer;

const SUITES: [CipherSuite; 2] = [
    CipherSuite::P256_SHA256_AES128GCM,
    CipherSuite::X25519_SHA256_AES128GCM,
];

#[test]
fn dh_derive_is_deterministic() -> Result<()> {
    let seed = b"fixed 32-byte seed for the tests";
    for suite in SUITES {
        let a = DHPrivateKey::derive(suite, seed)?;
        let b = DHPrivateKey::derive(suite, seed)?;
        assert_eq!(a.public_key().to_bytes(), b.public_key().to_bytes());

        let c = DHPrivateKey::derive(suite, b"a different seed")?;
        assert_ne!(a.public_key().to_bytes(), c.public_key().to_bytes());
    }
    Ok(())
}

#[test]
fn sig_derive_is_deterministic_and_domain_separated() -> Result<()> {
    let seed = b"fixed 32-byte seed for the tests";
    for scheme in [SignatureScheme::P256_SHA256, SignatureScheme::Ed25519] {
        let a = SignaturePrivateKey::derive(scheme, seed)?;
        let b = SignaturePrivateKey::derive(scheme, seed)?;
        assert_eq!(a.public_key().to_bytes(), b.public_key().to_bytes());
    }

    // Same seed, different key class: the P-256 points must differ
    let dh = DHPrivateKey::derive(CipherSuite::P256_SHA256_AES128GCM, seed)?;
    let sig = SignaturePrivateKey::derive(SignatureScheme::P256_SHA256, seed)?;
    assert_ne!(dh.public_key().to_bytes(), sig.public_key().to_bytes());
    Ok(())
}

#[test]
fn dh_agreement() -> Result<()> {
    for suite in SUITES {
        let a = DHPrivateKey::generate(suite)?;
        let b = DHPrivateKey::generate(suite)?;
        assert_eq!(a.dh(b.public_key())?, b.dh(a.public_key())?);
    }
    Ok(())
}

#[test]
fn dh_rejects_mismatched_suites() -> Result<()> {
    let p256 = DHPrivateKey::generate(CipherSuite::P256_SHA256_AES128GCM)?;
    let x25519 = DHPrivateKey::generate(CipherSuite::X25519_SHA256_AES128GCM)?;
    assert!(matches!(
        p256.dh(x25519.public_key()),
        Err(Error::CipherSuiteMismatch)
    ));
    Ok(())
}

#[test]
fn public_key_marshal_round_trip() -> Result<()> {
    for suite in SUITES {
        let key = DHPrivateKey::generate(suite)?;
        let raw = key.public_key().to_bytes();
        let parsed = DHPublicKey::from_bytes(suite, &raw)?;
        assert_eq!(parsed, *key.public_key());

        let expected_len = match suite {
            CipherSuite::P256_SHA256_AES128GCM => 65,
            _ => 32,
        };
        assert_eq!(raw.len(), expected_len);
    }
    Ok(())
}

#[test]
fn public_key_parse_rejects_garbage() {
    // Wrong length for X25519
    assert!(DHPublicKey::from_bytes(CipherSuite::X25519_SHA256_AES128GCM, &[0u8; 31]).is_err());
    // Correct length but not a point on P-256
    let mut bogus = [0xffu8; 65];
    bogus[0] = 0x04;
    assert!(DHPublicKey::from_bytes(CipherSuite::P256_SHA256_AES128GCM, &bogus).is_err());
}

#[test]
fn sign_and_verify() -> Result<()> {
    let message = b"handshake to be signed";
    for scheme in [SignatureScheme::P256_SHA256, SignatureScheme::Ed25519] {
        let key = SignaturePrivateKey::generate(scheme)?;
        let signature = key.sign(message)?;
        key.public_key().verify(message, &signature)?;

        assert!(key.public_key().verify(b"a different message", &signature).is_err());

        let mut tampered = signature.to_vec();
        tampered[4] ^= 0x01;
        assert!(key.public_key().verify(message, &tampered).is_err());
    }
    Ok(())
}

#[test]
fn signature_reproducibility_follows_the_scheme() -> Result<()> {
    let message = b"the same message twice";
    for suite in SUITES {
        let key = SignaturePrivateKey::derive(suite.signature_scheme(), b"sig seed")?;
        let first = key.sign(message)?;
        let second = key.sign(message)?;
        if suite.reproducible_signatures() {
            assert_eq!(first, second);
        } else {
            // ECDSA draws a fresh nonce per signature
            assert_ne!(first, second);
        }
        key.public_key().verify(message, &first)?;
        key.public_key().verify(message, &second)?;
    }
    Ok(())
}

#[test]
fn hkdf_expand_enforces_the_hash_bound() -> Result<()> {
    let prk = hkdf_extract(&[0u8; 32], b"input keying material")?;
    assert_eq!(prk.len(), 32);

    assert_eq!(hkdf_expand(&prk, b"info", 16)?.len(), 16);
    assert_eq!(hkdf_expand(&prk, b"info", 32)?.len(), 32);
    assert!(matches!(
        hkdf_expand(&prk, b"info", 33),
        Err(Error::ExpandOutputTooLong)
    ));
    Ok(())
}

#[test]
fn labelled_expansion_separates_labels() -> Result<()> {
    let prk = hkdf_extract(&[0u8; 32], b"input keying material")?;
    let key = expand_with_label(&prk, "ecies key", 16)?;
    let nonce = expand_with_label(&prk, "ecies nonce", 12)?;
    assert_ne!(&key[..12], &nonce[..]);
    Ok(())
}

#[test]
fn aead_round_trip_all_key_sizes() -> Result<()> {
    let nonce = [0x24u8; aead::NONCE_SIZE];
    let plaintext = b"one-shot aead payload";
    let additional_data = b"aad";

    for key_size in [16usize, 24, 32] {
        let key = vec![0x42u8; key_size];
        let ciphertext = aead::seal(&key, &nonce, plaintext, additional_data)?;
        assert_eq!(ciphertext.len(), plaintext.len() + aead::TAG_SIZE);

        let opened = aead::open(&key, &nonce, &ciphertext, additional_data)?;
        assert_eq!(&opened[..], plaintext);

        // Flipping any ciphertext byte, or changing the AAD, must fail
        let mut tampered = ciphertext.to_vec();
        tampered[0] ^= 0x01;
        assert!(aead::open(&key, &nonce, &tampered, additional_data).is_err());
        assert!(aead::open(&key, &nonce, &ciphertext, b"other aad").is_err());
    }
    Ok(())
}

#[test]
fn aead_rejects_bad_parameters() {
    assert!(matches!(
        aead::seal(&[0u8; 15], &[0u8; 12], b"x", &[]),
        Err(Error::InvalidAeadKeySize)
    ));
    assert!(matches!(
        aead::seal(&[0u8; 16], &[0u8; 11], b"x", &[]),
        Err(Error::InvalidAeadNonceSize)
    ));
    assert!(matches!(
        aead::open(&[0u8; 16], &[0u8; 12], &[0u8; 15], &[]),
        Err(Error::CiphertextTooShort)
    ));
}

#[test]
fn hpke_round_trip() -> Result<()> {
    let plaintext = b"path secret in flight";
    for suite in SUITES {
        let recipient = DHPrivateKey::generate(suite)?;
        let ciphertext = recipient.public_key().encrypt(plaintext)?;
        assert_eq!(recipient.decrypt(&ciphertext)?.as_ref(), plaintext);

        // A different recipient cannot open it
        let other = DHPrivateKey::generate(suite)?;
        assert!(other.decrypt(&ciphertext).is_err());
    }
    Ok(())
}

#[test]
fn hpke_ciphertext_marshal_is_deterministic() -> Result<()> {
    for suite in SUITES {
        let recipient = DHPrivateKey::generate(suite)?;
        let ciphertext = recipient.public_key().encrypt(b"payload")?;
        assert_eq!(
            ciphertext.serialize_detached()?,
            ciphertext.serialize_detached()?
        );

        let reparsed =
            HPKECiphertext::deserialize(&mut ciphertext.serialize_detached()?.clone(), suite)?;
        assert_eq!(reparsed, ciphertext);
    }
    Ok(())
}
