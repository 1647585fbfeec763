//! gitvault-crypto: symmetric encryption for the gitvault backup daemon
//!
//! Every encrypted artifact is self-describing: the random nonce travels as
//! a prefix of the ciphertext, so nothing besides the key is needed to
//! decrypt it.
//!
//! ```text
//! passphrase + .salt ──Argon2id──▶ EncryptionKey (256-bit, never persisted)
//!   ├── buffers:   [24-byte nonce][XChaCha20-Poly1305 ciphertext + tag]
//!   ├── contents:  zstd compress → buffer encryption
//!   └── names:     buffer encryption → URL-safe base64 (flat, opaque filename)
//! ```

pub mod aead;
pub mod content;
pub mod error;
pub mod kdf;
pub mod names;
pub mod salt;

pub use aead::{decrypt_buffer, encrypt_buffer};
pub use content::{decrypt_file_content, encrypt_file_content};
pub use error::{CryptoError, CryptoResult};
pub use kdf::{derive_key, EncryptionKey};
pub use names::{decrypt_name, encrypt_name};
pub use salt::{generate_salt, load_or_create_salt, Salt};

/// Size of an encryption key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of a freshly generated salt
pub const SALT_SIZE: usize = 16;
