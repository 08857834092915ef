//! Best-effort persistence of captured images to a remote git repository.
//!
//! The push sequence mirrors what an operator would type: pull, stage the
//! image directory, commit, push. Any step failing collapses to a single
//! [`PushError`] that the caller logs and forgets; the image file on local
//! disk is the primary outcome and already exists before a push starts.

use crate::config::PushConfig;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Errors that can occur during an image push.
///
/// Never fatal and never retried by the service; the next natural trigger
/// produces the next push attempt.
#[derive(Debug, Error)]
pub enum PushError {
    #[error("Failed to launch git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("git {step} failed with {status}: {stderr}")]
    GitFailed {
        step: &'static str,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Best-effort upload of new images to a remote store.
#[async_trait]
pub trait PersistencePusher {
    /// Persist everything under `image_dir`.
    async fn push(&self, image_dir: &Path) -> Result<(), PushError>;
}

/// Pusher that commits the image directory to a local git clone and
/// pushes it to the configured remote.
pub struct GitPusher {
    repo_path: PathBuf,
    remote: String,
    commit_message: String,
}

impl GitPusher {
    pub fn new(config: &PushConfig) -> Self {
        Self {
            repo_path: config.repo_path.clone(),
            remote: config.remote.clone(),
            commit_message: config.commit_message.clone(),
        }
    }

    async fn run(&self, step: &'static str, args: &[&str]) -> Result<std::process::Output, PushError> {
        debug!(step, ?args, "Running git");

        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo_path)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(output)
    }

    async fn git(&self, step: &'static str, args: &[&str]) -> Result<(), PushError> {
        let output = self.run(step, args).await?;

        if !output.status.success() {
            return Err(PushError::GitFailed {
                step,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl PersistencePusher for GitPusher {
    async fn push(&self, image_dir: &Path) -> Result<(), PushError> {
        self.git("pull", &["pull", "--ff-only", &self.remote]).await?;

        let image_dir = image_dir.to_string_lossy();
        self.git("add", &["add", "--", image_dir.as_ref()]).await?;

        // Nothing staged means the image was already committed (e.g. a
        // previous push staged it before failing later); skip the commit
        // rather than parse git's localized "nothing to commit" message.
        // `diff --cached --quiet` exits non-zero exactly when something
        // is staged.
        let staged = self.run("diff", &["diff", "--cached", "--quiet"]).await?;
        if staged.status.success() {
            debug!("Nothing staged, skipping commit");
        } else {
            self.git("commit", &["commit", "-m", &self.commit_message])
                .await?;
        }

        self.git("push", &["push", &self.remote]).await?;

        Ok(())
    }
}
