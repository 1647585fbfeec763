//! Whole-file content encryption: zstd compress, then encrypt.

use crate::aead::{decrypt_buffer, encrypt_buffer};
use crate::{CryptoError, CryptoResult, EncryptionKey};

/// zstd compression level for stored file contents
pub const COMPRESSION_LEVEL: i32 = 3;

/// Compress `plaintext` and encrypt the result.
///
/// Returns the same self-describing `[nonce][ciphertext][tag]` layout as
/// [`encrypt_buffer`].
pub fn encrypt_file_content(key: &EncryptionKey, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let compressed =
        zstd::encode_all(plaintext, COMPRESSION_LEVEL).map_err(CryptoError::Compression)?;
    encrypt_buffer(key, &compressed)
}

/// Decrypt a blob from [`encrypt_file_content`] and decompress it.
pub fn decrypt_file_content(key: &EncryptionKey, blob: &[u8]) -> CryptoResult<Vec<u8>> {
    let compressed = decrypt_buffer(key, blob)?;
    zstd::decode_all(compressed.as_slice()).map_err(CryptoError::Decompression)
}
