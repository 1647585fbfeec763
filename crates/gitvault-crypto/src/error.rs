use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid salt: {0}")]
    InvalidSalt(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("invalid key size: {actual} bytes (expected {expected})")]
    InvalidKeySize { expected: usize, actual: usize },

    #[error("invalid ciphertext: {len} bytes is shorter than the {min}-byte minimum")]
    InvalidCiphertext { len: usize, min: usize },

    #[error("authentication failed: wrong key or tampered data")]
    Authentication,

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("compression failed: {0}")]
    Compression(#[source] std::io::Error),

    #[error("decompression failed: {0}")]
    Decompression(#[source] std::io::Error),

    #[error("invalid encrypted name: {0}")]
    InvalidName(String),

    #[error("salt file {path}: {source}")]
    SaltIo {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}
