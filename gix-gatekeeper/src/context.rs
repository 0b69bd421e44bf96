//! Per-push state which lives outside the repository.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::Error;

/// The scratch space and identity of a single push.
///
/// Created when the push starts and dropped when it ends, which removes the scratch
/// directory and everything checks materialized in it.
#[derive(Debug)]
pub struct PushContext {
    scratch: tempfile::TempDir,
    user: String,
    home: Option<PathBuf>,
    now: SystemTime,
}

impl PushContext {
    /// Create a context for the user running this process, as told by `USER` or `LOGNAME`
    /// and `HOME`.
    pub fn from_env() -> Result<Self, Error> {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("LOGNAME"))
            .unwrap_or_else(|_| "unknown".to_owned());
        let home = std::env::var_os("HOME").map(PathBuf::from);
        Self::new(user, home)
    }

    /// Create a context for `user` whose home directory is `home`.
    pub fn new(user: impl Into<String>, home: Option<PathBuf>) -> Result<Self, Error> {
        let scratch = tempfile::Builder::new().prefix("gatekeeper-").tempdir()?;
        tracing::trace!(dir = %scratch.path().display(), "created push scratch directory");
        Ok(PushContext {
            scratch,
            user: user.into(),
            home,
            now: SystemTime::now(),
        })
    }

    /// Pretend the push happens at `now`.
    pub fn at(mut self, now: SystemTime) -> Self {
        self.now = now;
        self
    }

    /// The name of the pushing user.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// The home directory of the pushing user, if known.
    pub fn home(&self) -> Option<&Path> {
        self.home.as_deref()
    }

    /// The time the push started.
    pub fn now(&self) -> SystemTime {
        self.now
    }

    /// The scratch directory of the push.
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// Create a fresh, empty directory inside the scratch directory, removed when dropped.
    pub fn work_dir(&self, label: &str) -> Result<tempfile::TempDir, Error> {
        Ok(tempfile::Builder::new()
            .prefix(&format!("{label}-"))
            .tempdir_in(self.scratch.path())?)
    }
}
