//! Public-key encryption to a DH key: an ephemeral keypair, a raw shared
//! secret, and an AES-128-GCM key/nonce pair expanded under the "ecies"
//! labels. Both the path-secret ciphertexts in a DirectPath and the sealed
//! WelcomeInfo ride in this box.

use bytes::{Buf, BufMut, Bytes};

use crate::crypto::aead;
use crate::crypto::cipher_suite::CipherSuite;
use crate::crypto::kdf::expand_with_label;
use crate::crypto::key_pair::{DHPrivateKey, DHPublicKey};
use crate::utilities::error::Result;
use crate::utilities::serde::{deserialize_opaque, serialize_opaque, Serializer};

const ECIES_KEY_LABEL: &str = "ecies key";
const ECIES_NONCE_LABEL: &str = "ecies nonce";

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct HPKECiphertext {
    pub ephemeral: DHPublicKey,
    pub content: Bytes,
}

impl HPKECiphertext {
    pub fn deserialize<B: Buf>(buf: &mut B, suite: CipherSuite) -> Result<Self> {
        let ephemeral = DHPublicKey::deserialize(buf, suite)?;
        let content = deserialize_opaque(buf, 3)?;
        Ok(Self { ephemeral, content })
    }
}

impl Serializer for HPKECiphertext {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.ephemeral.serialize(buf)?;
        serialize_opaque(&self.content, 3, buf)
    }
}

fn ecies_key_nonce(shared_secret: &[u8]) -> Result<(Bytes, Bytes)> {
    let key = expand_with_label(shared_secret, ECIES_KEY_LABEL, aead::KEY_SIZE_128)?;
    let nonce = expand_with_label(shared_secret, ECIES_NONCE_LABEL, aead::NONCE_SIZE)?;
    Ok((key, nonce))
}

impl DHPublicKey {
    /// Seals `plaintext` to this key under a fresh ephemeral keypair.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<HPKECiphertext> {
        let ephemeral = DHPrivateKey::generate(self.cipher_suite())?;
        let shared_secret = ephemeral.dh(self)?;

        let (key, nonce) = ecies_key_nonce(shared_secret.as_bytes())?;
        let content = aead::seal(&key, &nonce, plaintext, &[])?;

        Ok(HPKECiphertext {
            ephemeral: ephemeral.public_key().clone(),
            content,
        })
    }
}

impl DHPrivateKey {
    pub fn decrypt(&self, ciphertext: &HPKECiphertext) -> Result<Bytes> {
        let shared_secret = self.dh(&ciphertext.ephemeral)?;

        let (key, nonce) = ecies_key_nonce(shared_secret.as_bytes())?;
        aead::open(&key, &nonce, &ciphertext.content, &[])
    }
}
