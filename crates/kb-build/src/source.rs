//! The kernel source tree.
//!
//! Revisions are resolved and HEAD is read back with `gix`; the mutating
//! steps (reset, clean, checkout) go through the `git` CLI on the command
//! runner so they can be cancelled.

use std::path::{Path, PathBuf};

use kb_core::SafetyError;
use kb_exec::{CancellationToken, CommandRunner, CommandSpec};

/// A revision resolved to its full commit id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommit {
    /// What the caller asked for (sha, tag, or branch).
    pub requested: String,
    /// Full hex object id.
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct KernelTree {
    root: PathBuf,
}

impl KernelTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.root.join(".config")
    }

    /// Peel `rev` to a commit id without touching the work tree.
    ///
    /// # Errors
    ///
    /// [`SafetyError::Checkout`] if the tree is not a repository or the
    /// revision does not name a commit.
    pub fn resolve(&self, rev: &str) -> Result<ResolvedCommit, SafetyError> {
        let repo = gix::discover(&self.root).map_err(|error| {
            checkout_error(rev, format!("{} is not a git repository: {error}", self.root.display()))
        })?;
        let spec = format!("{rev}^{{commit}}");
        let id = repo
            .rev_parse_single(spec.as_str())
            .map_err(|error| checkout_error(rev, format!("unknown revision: {error}")))?;
        Ok(ResolvedCommit {
            requested: rev.to_string(),
            id: id.detach().to_string(),
        })
    }

    /// Full id of the commit currently checked out.
    ///
    /// # Errors
    ///
    /// [`SafetyError::Checkout`] when HEAD cannot be read.
    pub fn head(&self) -> Result<String, SafetyError> {
        let repo = gix::discover(&self.root)
            .map_err(|error| checkout_error("HEAD", error.to_string()))?;
        let head = repo
            .head_id()
            .map_err(|error| checkout_error("HEAD", error.to_string()))?;
        Ok(head.detach().to_string())
    }

    /// Discard local modifications and untracked files, then check out
    /// `commit` and confirm HEAD moved there.
    ///
    /// Ignored files (including `.config` and build outputs) survive so the
    /// next build stays incremental.
    ///
    /// # Errors
    ///
    /// [`SafetyError::Checkout`] on any git failure, or
    /// [`SafetyError::Cancelled`].
    pub async fn checkout(
        &self,
        runner: &dyn CommandRunner,
        commit: &ResolvedCommit,
        cancel: &CancellationToken,
    ) -> Result<(), SafetyError> {
        let steps = [
            vec!["reset", "--hard", "--quiet"],
            vec!["clean", "-fd", "--quiet"],
            vec!["checkout", "--quiet", "--detach", commit.id.as_str()],
        ];
        for args in steps {
            let spec = CommandSpec::new("git").args(args).current_dir(&self.root);
            tracing::info!(command = %spec, "source checkout");
            runner.run_checked(&spec, cancel).await.map_err(|error| {
                if error.is_cancelled() {
                    SafetyError::Cancelled
                } else {
                    tracing::error!(commit = %commit.id, %error, "checkout step failed");
                    checkout_error(&commit.requested, error.to_string())
                }
            })?;
        }

        let head = self.head()?;
        if head != commit.id {
            tracing::error!(expected = %commit.id, head = %head, "HEAD did not move to the requested commit");
            return Err(checkout_error(
                &commit.requested,
                format!("HEAD is {head} after checkout, expected {}", commit.id),
            ));
        }
        tracing::info!(commit = %commit.id, "source tree at requested commit");
        Ok(())
    }
}

fn checkout_error(commit: &str, reason: String) -> SafetyError {
    SafetyError::Checkout {
        commit: commit.to_string(),
        reason,
    }
}
