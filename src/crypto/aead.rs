//! XChaCha20-Poly1305 AEAD primitives.
//!
//! Every datagram body is encrypted under the session key with a nonce
//! derived from the per-direction sequence number. The cleartext
//! sequence-number header doubles as the AAD, so a datagram whose
//! header was altered in flight fails authentication.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::RngCore;
use zeroize::Zeroize;

use crate::core::{AEAD_NONCE_SIZE, AEAD_TAG_SIZE, CryptoError, SESSION_KEY_SIZE};

/// The shared session secret, established out-of-band before transport
/// construction. Zeroized on drop.
#[derive(Clone)]
pub struct SessionKey {
    key: [u8; SESSION_KEY_SIZE],
}

impl SessionKey {
    /// Wrap existing key material.
    pub fn from_bytes(key: [u8; SESSION_KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Generate a fresh random key from the OS RNG.
    ///
    /// Session establishment is out of scope for the transport; this
    /// exists for the side that mints the key before handing it to the
    /// rendezvous channel.
    pub fn generate() -> Self {
        let mut key = [0u8; SESSION_KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self { key }
    }

    /// Raw key bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.key
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.write_str("SessionKey(..)")
    }
}

/// Encrypt a plaintext, returning ciphertext with the appended 16-byte tag.
pub fn encrypt(
    key: &SessionKey,
    nonce: &[u8; AEAD_NONCE_SIZE],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .encrypt(XNonce::from_slice(nonce), Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::EncryptionFailed)
}

/// Decrypt a ciphertext + tag, verifying the AAD.
pub fn decrypt(
    key: &SessionKey,
    nonce: &[u8; AEAD_NONCE_SIZE],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < AEAD_TAG_SIZE {
        return Err(CryptoError::AuthenticationFailure);
    }
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::AuthenticationFailure)
}
