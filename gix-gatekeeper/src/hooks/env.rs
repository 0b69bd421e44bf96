//! Environment passed to external programs.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Builder for the environment variables of external programs.
///
/// Only the variables set here are added, the rest of the process environment is inherited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookEnvironment {
    /// Path to the git directory.
    pub git_dir: Option<PathBuf>,
    /// The project name, as configured or derived from the repository path.
    pub project: Option<String>,
    /// The user performing the push.
    pub user: Option<String>,
    /// Additional environment variables.
    pub additional_vars: BTreeMap<String, String>,
}

impl HookEnvironment {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the git directory, exported as `GIT_DIR`.
    pub fn with_git_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.git_dir = Some(path.into());
        self
    }

    /// Set the project name, exported as `GATEKEEPER_PROJECT`.
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Set the pushing user, exported as `GATEKEEPER_USER`.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Add an additional environment variable.
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_vars.insert(key.into(), value.into());
        self
    }

    /// All variables to set, in a stable order.
    pub fn vars(&self) -> impl Iterator<Item = (String, String)> + '_ {
        let git_dir = self
            .git_dir
            .as_ref()
            .map(|dir| ("GIT_DIR".to_owned(), dir.to_string_lossy().into_owned()));
        let project = self.project.clone().map(|p| ("GATEKEEPER_PROJECT".to_owned(), p));
        let user = self.user.clone().map(|u| ("GATEKEEPER_USER".to_owned(), u));
        git_dir
            .into_iter()
            .chain(project)
            .chain(user)
            .chain(self.additional_vars.iter().map(|(k, v)| (k.clone(), v.clone())))
    }
}
