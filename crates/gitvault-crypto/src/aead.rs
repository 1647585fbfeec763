//! Buffer encryption with XChaCha20-Poly1305
//!
//! Encrypted buffer format (binary):
//! ```text
//! [24 bytes: random nonce][N bytes: ciphertext][16 bytes: Poly1305 tag]
//! ```
//!
//! A fresh nonce is drawn for every call, so encrypting the same plaintext
//! twice never yields the same bytes.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::{CryptoError, CryptoResult, EncryptionKey, NONCE_SIZE, TAG_SIZE};

/// Encrypt `plaintext` under `key`.
///
/// Returns: `[24-byte nonce][ciphertext][16-byte tag]`
pub fn encrypt_buffer(key: &EncryptionKey, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt a blob produced by [`encrypt_buffer`].
///
/// Fails with [`CryptoError::InvalidCiphertext`] when the blob cannot even
/// hold a nonce and tag, and with [`CryptoError::Authentication`] when the
/// key is wrong or any byte was altered.
pub fn decrypt_buffer(key: &EncryptionKey, blob: &[u8]) -> CryptoResult<Vec<u8>> {
    if blob.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::InvalidCiphertext {
            len: blob.len(),
            min: NONCE_SIZE + TAG_SIZE,
        });
    }

    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_SIZE);
    let nonce = XNonce::from_slice(nonce_bytes);
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::Authentication)
}
