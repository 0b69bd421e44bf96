//! Configuration of the external programs run during a push.

use std::path::PathBuf;

use gix_config::File;

use super::read::Reader;
use crate::hooks::HookPaths;
use crate::Error;

/// The program run as style checker when none is configured.
pub const DEFAULT_STYLE_CHECKER: &str = "style_checker";

/// Configuration of external programs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookConfig {
    /// `hooks.update-hook`
    pub update_hook: Option<PathBuf>,
    /// `hooks.commit-extra-checker`
    pub commit_extra_checker: Option<PathBuf>,
    /// `hooks.post-receive-hook`
    pub post_receive_hook: Option<PathBuf>,
    /// `hooks.commit-email-formatter`
    pub commit_email_formatter: Option<PathBuf>,
    /// `hooks.style-checker`, looked up in `PATH` unless it is a path.
    pub style_checker: PathBuf,
    /// `hooks.style-checker-config-file`, a path inside the repository.
    pub style_checker_config_file: Option<String>,
    /// `hooks.combined-style-checking`
    pub combined_style_checking: bool,
}

impl Default for HookConfig {
    fn default() -> Self {
        HookConfig {
            update_hook: None,
            commit_extra_checker: None,
            post_receive_hook: None,
            commit_email_formatter: None,
            style_checker: DEFAULT_STYLE_CHECKER.into(),
            style_checker_config_file: None,
            combined_style_checking: false,
        }
    }
}

impl HookConfig {
    /// Load hook configuration from a git config file.
    ///
    /// This method parses the following configuration keys:
    /// - `hooks.update-hook`, `hooks.commit-extra-checker`, `hooks.post-receive-hook`,
    ///   `hooks.commit-email-formatter`: paths to executables
    /// - `hooks.style-checker`: the style checker program (default: `style_checker`)
    /// - `hooks.style-checker-config-file`: repository path of the style checker configuration
    /// - `hooks.combined-style-checking`: check all new commits of an update at once
    pub fn from_config(config: &File<'_>) -> Result<Self, Error> {
        let r = Reader::new(config);
        let default = HookConfig::default();
        Ok(HookConfig {
            update_hook: r.string("hooks.update-hook").map(Into::into),
            commit_extra_checker: r.string("hooks.commit-extra-checker").map(Into::into),
            post_receive_hook: r.string("hooks.post-receive-hook").map(Into::into),
            commit_email_formatter: r.string("hooks.commit-email-formatter").map(Into::into),
            style_checker: r.string("hooks.style-checker").map_or(default.style_checker, Into::into),
            style_checker_config_file: r.string("hooks.style-checker-config-file"),
            combined_style_checking: r.boolean("hooks.combined-style-checking", default.combined_style_checking)?,
        })
    }

    /// The paths of the programs consulted by [`crate::hooks::ExternalHooks`].
    pub fn paths(&self) -> HookPaths {
        HookPaths {
            update: self.update_hook.clone(),
            commit_extra_checker: self.commit_extra_checker.clone(),
            post_receive: self.post_receive_hook.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::create_config_with_values;

    #[test]
    fn defaults() {
        let config = HookConfig::from_config(&create_config_with_values(&[])).unwrap();
        assert_eq!(config, HookConfig::default());
        assert_eq!(config.style_checker, PathBuf::from("style_checker"));
        assert_eq!(config.paths(), HookPaths::default());
    }

    #[test]
    fn paths_and_flags() {
        let config = HookConfig::from_config(&create_config_with_values(&[
            ("hooks.update-hook", "/srv/hooks/update"),
            ("hooks.post-receive-hook", "/srv/hooks/post"),
            ("hooks.style-checker", "/usr/local/bin/cs"),
            ("hooks.style-checker-config-file", "style.yaml"),
            ("hooks.combined-style-checking", "true"),
        ]))
        .unwrap();
        assert_eq!(config.update_hook, Some(PathBuf::from("/srv/hooks/update")));
        assert_eq!(config.paths().post_receive, Some(PathBuf::from("/srv/hooks/post")));
        assert_eq!(config.style_checker, PathBuf::from("/usr/local/bin/cs"));
        assert_eq!(config.style_checker_config_file.as_deref(), Some("style.yaml"));
        assert!(config.combined_style_checking);
    }

    #[test]
    fn invalid_boolean_names_the_option() {
        let err = HookConfig::from_config(&create_config_with_values(&[("hooks.combined-style-checking", "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("hooks.combined-style-checking"));
    }
}
