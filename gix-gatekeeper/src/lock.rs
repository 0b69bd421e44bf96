//! The repository-wide lock serializing pushes.

use std::path::{Path, PathBuf};

use gix_lock::acquire::Fail;

use crate::Error;

/// The name of the locked resource inside the git directory, `.lock` is appended to it.
pub const LOCK_RESOURCE: &str = "gatekeeper";

/// Held while a push is processed, released on drop.
#[derive(Debug)]
pub struct PushLock {
    _marker: gix_lock::Marker,
    path: PathBuf,
}

impl PushLock {
    /// Acquire the lock of the repository at `git_dir`, failing immediately if another push holds it.
    pub fn acquire(git_dir: &Path) -> Result<Self, Error> {
        let resource = git_dir.join(LOCK_RESOURCE);
        let marker = gix_lock::Marker::acquire_to_hold_resource(&resource, Fail::Immediately, None).map_err(|err| {
            tracing::debug!(resource = %resource.display(), %err, "push lock is taken");
            Error::Busy {
                path: lock_path(&resource).display().to_string(),
            }
        })?;
        let path = lock_path(&resource);
        tracing::trace!(path = %path.display(), "acquired push lock");
        Ok(PushLock { _marker: marker, path })
    }

    /// The path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn lock_path(resource: &Path) -> PathBuf {
    let mut path = resource.as_os_str().to_owned();
    path.push(".lock");
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquisition_is_busy_until_the_first_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let lock = PushLock::acquire(dir.path()).unwrap();
        assert_eq!(lock.path(), dir.path().join("gatekeeper.lock"));
        assert!(lock.path().is_file());

        let err = PushLock::acquire(dir.path()).unwrap_err();
        assert_eq!(err.kind(), crate::Kind::Busy);
        assert!(err.to_string().contains("gatekeeper.lock"));

        drop(lock);
        assert!(!dir.path().join("gatekeeper.lock").exists());
        PushLock::acquire(dir.path()).unwrap();
    }
}
