//! Key derivation: Argon2id passphrase + salt → encryption key

use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use crate::{CryptoError, CryptoResult, KEY_SIZE};

/// A 256-bit key derived from the repository passphrase.
///
/// Zeroized on drop to prevent secrets lingering in memory. Never written to
/// disk; every daemon run re-derives it from the passphrase and `.salt`.
#[derive(Clone)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Build a key from an arbitrary slice, rejecting anything but 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let arr: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| CryptoError::InvalidKeySize {
            expected: KEY_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self::from_bytes(arr))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Argon2id cost parameters.
///
/// Production parameters are fixed (see [`KdfParams::PRODUCTION`]); changing
/// them would make existing repositories undecryptable.
#[derive(Debug, Clone, Copy)]
pub(crate) struct KdfParams {
    /// Memory cost in KiB
    pub mem_cost_kib: u32,
    /// Time cost / iterations
    pub time_cost: u32,
    /// Parallelism
    pub parallelism: u32,
}

impl KdfParams {
    /// 64 MiB, 3 passes, 4 lanes.
    pub const PRODUCTION: KdfParams = KdfParams {
        mem_cost_kib: 65536,
        time_cost: 3,
        parallelism: 4,
    };
}

/// Derive the repository key from a passphrase and the persisted salt.
///
/// Deterministic: the same (passphrase, salt) always yields the same key,
/// which is what lets a later run decrypt what an earlier run wrote.
/// Fails with [`CryptoError::InvalidSalt`] on an empty salt.
pub fn derive_key(passphrase: &SecretString, salt: &[u8]) -> CryptoResult<EncryptionKey> {
    derive_key_with_params(passphrase, salt, &KdfParams::PRODUCTION)
}

pub(crate) fn derive_key_with_params(
    passphrase: &SecretString,
    salt: &[u8],
    params: &KdfParams,
) -> CryptoResult<EncryptionKey> {
    if salt.is_empty() {
        return Err(CryptoError::InvalidSalt("no salt provided".into()));
    }

    let argon2_params = Params::new(
        params.mem_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| CryptoError::KeyDerivation(format!("invalid Argon2id params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(passphrase.expose_secret().as_bytes(), salt, &mut key)
        .map_err(|e| CryptoError::KeyDerivation(format!("Argon2id KDF failed: {e}")))?;

    Ok(EncryptionKey::from_bytes(key))
}
