//! Passphrase acquisition for the daemon and the CLI.

use secrecy::SecretString;
use std::io::IsTerminal;

use crate::config::{GitvaultConfig, PASSPHRASE_ENV};
use crate::{GitvaultError, GitvaultResult};

/// Environment, then `passphrase_file`, then an interactive prompt when
/// stdin is a terminal.
pub fn obtain(config: &GitvaultConfig, prompt: &str) -> GitvaultResult<SecretString> {
    if let Some(passphrase) = config.resolve_passphrase(|k| std::env::var(k).ok())? {
        return Ok(passphrase);
    }

    if std::io::stdin().is_terminal() {
        let entered = rpassword::prompt_password(prompt)?;
        if !entered.is_empty() {
            return Ok(SecretString::from(entered));
        }
    }

    Err(GitvaultError::Config(format!(
        "no passphrase available: set {PASSPHRASE_ENV} or passphrase_file"
    )))
}
