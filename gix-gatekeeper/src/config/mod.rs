//! Configuration of the gatekeeper.
//!
//! The configuration is git-config text in the `project.config` file of the
//! [`CONFIG_REF`](crate::refs::CONFIG_REF) reference, so it is versioned and pushed like
//! everything else. It is resolved once per push into an immutable [`PolicyConfig`] which is
//! passed by reference to every component; nothing else reads configuration.
//!
//! # Configuration Keys
//!
//! All keys live in the `hooks` section.
//!
//! ## Notifications
//! - `project-name`, `from-domain`, `mailinglist`, `filer-email`
//! - `no-emails`, `max-commit-emails`, `max-email-diff-size`, `commit-email-formatter`
//!
//! ## Checks
//! - `no-precommit-check`, `style-checker`, `style-checker-config-file`, `combined-style-checking`
//! - `allow-non-fast-forward`, `nff-short-name-hint`
//! - `reject-merge-commits`, `disable-merge-commit-checks`, `no-rh-character-range-check`,
//!   `no-rh-empty-line-check`, `max-rh-line-length`, `tn-required`, `tn-regex`
//! - `no-filename-collision-check`, `max-filepath-length`
//! - `allow-lightweight-tag`, `restrict-branch-deletion`, `allow-delete-branch`, `frozen-ref`,
//!   `ignore-refs`
//!
//! ## Namespaces
//! - `branch-ref-namespace`, `tag-ref-namespace`, `use-standard-branch-ref-namespace`,
//!   `use-standard-tag-ref-namespace`
//!
//! ## Hooks
//! - `update-hook`, `commit-extra-checker`, `post-receive-hook`
//! - `debug-level`
//!
//! Reference patterns are regular expressions matching the full reference name. Options taking
//! addresses accept several values and comma-separated lists.

use gix_hash::ObjectId;

use crate::port::Vcs;
use crate::refs::CONFIG_REF;
use crate::snapshot::Snapshot;
use crate::Error;

pub mod hooks;
mod patterns;
pub mod policy;
mod read;

pub use hooks::HookConfig;
pub use patterns::RefPatterns;
pub use policy::{DebugLevel, EmailConfig, NamespaceConfig, PolicyConfig, RevisionLogConfig};

/// The file holding the configuration in the tree of [`CONFIG_REF`].
pub const CONFIG_FILE: &str = "project.config";

/// Load the configuration from the configuration reference as it is in `snapshot`.
///
/// Without configuration reference, or without configuration file in it, defaults apply.
pub fn load(vcs: &(impl Vcs + ?Sized), snapshot: &Snapshot) -> Result<PolicyConfig, Error> {
    match snapshot.get(CONFIG_REF) {
        Some(rev) => load_at(vcs, rev),
        None => Ok(PolicyConfig::default()),
    }
}

/// Load the configuration from the commit `rev`.
pub fn load_at(vcs: &(impl Vcs + ?Sized), rev: &ObjectId) -> Result<PolicyConfig, Error> {
    match vcs.read_file(rev, CONFIG_FILE)? {
        Some(data) => PolicyConfig::from_text(&String::from_utf8_lossy(&data)),
        None => {
            tracing::debug!(rev = %rev, "no {CONFIG_FILE} in {CONFIG_REF}, using defaults");
            Ok(PolicyConfig::default())
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use gix_config::File;

    pub(crate) fn create_config_with_values(values: &[(&str, &str)]) -> File<'static> {
        let mut config_text = String::new();
        let mut sections: std::collections::BTreeMap<String, Vec<(String, String)>> = Default::default();

        for (key, value) in values {
            if let Some((section, name)) = key.split_once('.') {
                sections
                    .entry(section.to_owned())
                    .or_default()
                    .push((name.to_owned(), value.to_string()));
            }
        }
        for (section, keys) in sections {
            config_text.push_str(&format!("[{section}]\n"));
            for (key, value) in keys {
                config_text.push_str(&format!("    {key} = {value}\n"));
            }
        }

        // Create a static string to avoid lifetime issues
        let config_string: &'static str = Box::leak(config_text.into_boxed_str());
        File::try_from(config_string).unwrap()
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let mut repo = crate::memory::Repository::new();
        assert_eq!(load(&repo, &Snapshot::default()).unwrap(), PolicyConfig::default());

        let rev = crate::memory::Repository::commit(&mut repo, "no config").file("README", "x").create();
        repo.set_ref(CONFIG_REF, rev);
        let snapshot = Snapshot::load(&repo).unwrap();
        assert_eq!(load(&repo, &snapshot).unwrap(), PolicyConfig::default());
    }

    #[test]
    fn load_reads_project_config() {
        let mut repo = crate::memory::Repository::new();
        let rev = crate::memory::Repository::commit(&mut repo, "config")
            .file(CONFIG_FILE, "[hooks]\n\tmax-commit-emails = 3\n")
            .create();
        repo.set_ref(CONFIG_REF, rev);
        let snapshot = Snapshot::load(&repo).unwrap();
        assert_eq!(load(&repo, &snapshot).unwrap().email.max_commit_emails, 3);
    }

    #[test]
    fn load_reports_broken_config() {
        let mut repo = crate::memory::Repository::new();
        let rev = crate::memory::Repository::commit(&mut repo, "config").file(CONFIG_FILE, "[hooks]\n\tdebug-level = 9\n").create();
        let err = load_at(&repo, &rev).unwrap_err();
        assert!(err.to_string().contains("hooks.debug-level"));
    }
}
