use thiserror::Error;

pub type GitvaultResult<T> = Result<T, GitvaultError>;

#[derive(Debug, Error)]
pub enum GitvaultError {
    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
