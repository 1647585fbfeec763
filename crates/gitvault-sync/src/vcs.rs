//! Version-control collaborator: durable storage with history.
//!
//! The orchestrator only needs "stage everything and commit", "push" and
//! "what is the newest revision"; [`GitBackend`] provides those by running
//! the `git` binary in the repository directory.

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("nothing to commit")]
    NothingToCommit,

    #[error("`{command}` failed: {message}")]
    Backend { command: String, message: String },

    #[error("running `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub trait VersionControl: Send + Sync {
    /// Stage every change under `repo` and commit it with `message`.
    fn stage_and_commit(&self, repo: &Path, message: &str) -> Result<(), VcsError>;

    fn push(&self, repo: &Path, remote: &str, branch: &str) -> Result<(), VcsError>;

    /// Identifier of the newest revision.
    fn last_revision_id(&self, repo: &Path) -> Result<String, VcsError>;
}

/// [`VersionControl`] backed by the `git` command-line tool.
#[derive(Debug, Clone)]
pub struct GitBackend {
    program: PathBuf,
}

impl Default for GitBackend {
    fn default() -> Self {
        Self {
            program: PathBuf::from("git"),
        }
    }
}

impl GitBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific git executable instead of the one on `$PATH`.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run git in `repo`, returning trimmed stdout on success.
    fn run(&self, repo: &Path, args: &[&str]) -> Result<String, VcsError> {
        let command = format!("git {}", args.join(" "));
        let output = Command::new(&self.program)
            .args(args)
            .current_dir(repo)
            .output()
            .map_err(|source| VcsError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(VcsError::Backend {
                command,
                message: if stderr.is_empty() {
                    format!("exit status {}", output.status)
                } else {
                    stderr
                },
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// `git init` the repository if it has no `.git` yet, pointing HEAD at
    /// `branch`, and write the default `.gitignore`.
    pub fn init_repo(&self, repo: &Path, branch: &str) -> Result<bool, VcsError> {
        let gitignore = crate::layout::RepoLayout::new(repo).gitignore_path();
        if !gitignore.exists() {
            std::fs::write(&gitignore, crate::layout::GITIGNORE).map_err(|source| VcsError::Io {
                path: gitignore.clone(),
                source,
            })?;
        }

        if repo.join(".git").exists() {
            return Ok(false);
        }
        self.run(repo, &["init", "--quiet"])?;
        let head = format!("refs/heads/{branch}");
        self.run(repo, &["symbolic-ref", "HEAD", &head])?;
        tracing::info!(repo = %repo.display(), branch, "initialized git repository");
        Ok(true)
    }

    /// Make sure remote `name` exists and points at `url`.
    pub fn ensure_remote(&self, repo: &Path, name: &str, url: &str) -> Result<(), VcsError> {
        match self.run(repo, &["remote", "get-url", name]) {
            Ok(current) if current == url => Ok(()),
            Ok(_) => self.run(repo, &["remote", "set-url", name, url]).map(|_| ()),
            Err(VcsError::Backend { .. }) => {
                self.run(repo, &["remote", "add", name, url]).map(|_| ())
            }
            Err(e) => Err(e),
        }
    }
}

impl VersionControl for GitBackend {
    fn stage_and_commit(&self, repo: &Path, message: &str) -> Result<(), VcsError> {
        self.run(repo, &["add", "--all", "."])?;
        if self.run(repo, &["status", "--porcelain"])?.is_empty() {
            return Err(VcsError::NothingToCommit);
        }
        self.run(repo, &["commit", "--quiet", "-m", message])?;
        Ok(())
    }

    fn push(&self, repo: &Path, remote: &str, branch: &str) -> Result<(), VcsError> {
        self.run(repo, &["push", "--quiet", remote, branch])?;
        Ok(())
    }

    fn last_revision_id(&self, repo: &Path) -> Result<String, VcsError> {
        self.run(repo, &["rev-parse", "HEAD"])
    }
}
