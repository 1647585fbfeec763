//! Repository salt: generated once, stored in plaintext next to the ciphertext.
//!
//! Regenerating the salt after data has been encrypted would make every
//! existing blob unrecoverable, so a present-but-malformed salt file is an
//! error, never a reason to write a new one.

use rand::RngCore;
use std::path::Path;

use crate::{CryptoError, CryptoResult, SALT_SIZE};

pub type Salt = [u8; SALT_SIZE];

/// Draw 16 bytes from the OS-seeded CSPRNG.
pub fn generate_salt() -> Salt {
    let mut salt = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Read the salt at `path`, creating it if absent.
///
/// Creation writes a temp file and renames it into place so a crash never
/// leaves a truncated salt behind.
pub fn load_or_create_salt(path: &Path) -> CryptoResult<Salt> {
    let io_err = |source| CryptoError::SaltIo {
        path: path.to_path_buf(),
        source,
    };

    if path.exists() {
        let bytes = std::fs::read(path).map_err(io_err)?;
        return bytes.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidSalt(format!(
                "{} holds {} bytes (expected {SALT_SIZE})",
                path.display(),
                bytes.len()
            ))
        });
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let salt = generate_salt();
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, salt).map_err(io_err)?;
    std::fs::rename(&tmp_path, path).map_err(io_err)?;

    tracing::info!(path = %path.display(), "generated new repository salt");
    Ok(salt)
}
