//! Opaque filename encryption
//!
//! A relative path is encrypted like any other buffer (random nonce, AEAD)
//! and the result is encoded with URL-safe base64 without padding. The
//! alphabet (`A-Z a-z 0-9 - _`) contains no path separators, so the output
//! is usable directly as a flat filename.
//!
//! Names are NOT deterministic: encrypting the same path twice produces two
//! different names. Identity must always be resolved through the ledger,
//! never by recomputing a name.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::aead::{decrypt_buffer, encrypt_buffer};
use crate::{CryptoError, CryptoResult, EncryptionKey, NONCE_SIZE};

/// Encrypt a relative path into an opaque, filesystem-safe name.
///
/// Returns the opaque name together with the nonce that was used (the nonce
/// is also embedded in the name itself).
pub fn encrypt_name(
    key: &EncryptionKey,
    relative_path: &str,
) -> CryptoResult<(String, [u8; NONCE_SIZE])> {
    let blob = encrypt_buffer(key, relative_path.as_bytes())?;

    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&blob[..NONCE_SIZE]);

    Ok((URL_SAFE_NO_PAD.encode(&blob), nonce))
}

/// Recover the relative path from an opaque name produced by [`encrypt_name`].
pub fn decrypt_name(key: &EncryptionKey, opaque_name: &str) -> CryptoResult<String> {
    let blob = URL_SAFE_NO_PAD
        .decode(opaque_name)
        .map_err(|e| CryptoError::InvalidName(format!("base64 decode: {e}")))?;

    let plaintext = decrypt_buffer(key, &blob)?;

    String::from_utf8(plaintext)
        .map_err(|e| CryptoError::InvalidName(format!("decrypted name is not UTF-8: {e}")))
}
