pub mod config;
pub mod error;
pub mod passphrase;

pub use error::{GitvaultError, GitvaultResult};
