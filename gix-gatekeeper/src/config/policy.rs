//! Policy configuration parsing from git config.

use gix_config::File;
use regex::Regex;

use super::{hooks::HookConfig, patterns::RefPatterns, read::Reader};
use crate::Error;

/// The ticket-number format used when `hooks.tn-regex` isn't set.
pub const DEFAULT_TN_REGEX: &str = r"\b[A-Z0-9]{2}[0-9]{2}-[A-Z0-9][0-9]{2}\b";

/// References exempt from all checks and notifications unless configured otherwise.
pub const DEFAULT_IGNORE_REFS: &str = "refs/changes/.*";

/// How much the engine logs, from `hooks.debug-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum DebugLevel {
    /// Warnings only.
    #[default]
    Quiet,
    /// Decisions and skipped checks.
    Debug,
    /// Everything, including backend queries.
    Trace,
}

impl DebugLevel {
    fn from_integer(value: i64) -> Option<Self> {
        Some(match value {
            0 => DebugLevel::Quiet,
            1 => DebugLevel::Debug,
            2 => DebugLevel::Trace,
            _ => return None,
        })
    }
}

/// Email related options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailConfig {
    /// `hooks.from-domain`, the domain of the sender address.
    pub from_domain: Option<String>,
    /// `hooks.mailinglist`, addresses or executables producing addresses.
    pub mailinglist: Vec<String>,
    /// `hooks.filer-email`, blind-copied on every email.
    pub filer_email: Vec<String>,
    /// `hooks.no-emails`, references whose updates never cause emails.
    pub no_emails: RefPatterns,
    /// `hooks.max-commit-emails`, the most commit emails a single push may cause.
    pub max_commit_emails: usize,
    /// `hooks.max-email-diff-size`, the size above which diffs are truncated.
    pub max_email_diff_size: Option<usize>,
}

/// Options of the revision-log checks.
#[derive(Debug, Clone)]
pub struct RevisionLogConfig {
    /// `hooks.no-rh-character-range-check`
    pub no_character_range_check: bool,
    /// `hooks.no-rh-empty-line-check`
    pub no_empty_line_check: bool,
    /// `hooks.max-rh-line-length`, `None` if disabled.
    pub max_line_length: Option<usize>,
    /// `hooks.tn-required`
    pub tn_required: bool,
    /// `hooks.tn-regex`, searched anywhere in the message.
    pub tn_regex: Regex,
    /// `hooks.disable-merge-commit-checks`
    pub disable_merge_commit_checks: bool,
    /// `hooks.reject-merge-commits`
    pub reject_merge_commits: RefPatterns,
    /// `hooks.no-filename-collision-check`
    pub no_filename_collision_check: bool,
    /// `hooks.max-filepath-length`, `None` if disabled.
    pub max_filepath_length: Option<usize>,
}

impl PartialEq for RevisionLogConfig {
    fn eq(&self, other: &Self) -> bool {
        self.no_character_range_check == other.no_character_range_check
            && self.no_empty_line_check == other.no_empty_line_check
            && self.max_line_length == other.max_line_length
            && self.tn_required == other.tn_required
            && self.tn_regex.as_str() == other.tn_regex.as_str()
            && self.disable_merge_commit_checks == other.disable_merge_commit_checks
            && self.reject_merge_commits == other.reject_merge_commits
            && self.no_filename_collision_check == other.no_filename_collision_check
            && self.max_filepath_length == other.max_filepath_length
    }
}

/// Namespaces recognized by the reference classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceConfig {
    /// `hooks.branch-ref-namespace`
    pub branch: RefPatterns,
    /// `hooks.tag-ref-namespace`
    pub tag: RefPatterns,
    /// `hooks.use-standard-branch-ref-namespace`
    pub use_standard_branch: bool,
    /// `hooks.use-standard-tag-ref-namespace`
    pub use_standard_tag: bool,
}

/// The immutable policy of a repository, resolved once per push.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyConfig {
    /// `hooks.project-name`, derived from the repository path if unset.
    pub project_name: Option<String>,
    /// `hooks.debug-level`
    pub debug_level: DebugLevel,
    /// Email options.
    pub email: EmailConfig,
    /// External programs.
    pub hooks: HookConfig,
    /// Revision-log check options.
    pub revision_log: RevisionLogConfig,
    /// Classifier namespaces.
    pub namespaces: NamespaceConfig,
    /// `hooks.no-precommit-check`
    pub no_precommit_check: RefPatterns,
    /// `hooks.allow-non-fast-forward`
    pub allow_non_fast_forward: RefPatterns,
    /// `hooks.nff-short-name-hint`, whether a rejected non-fast-forward update also tests the
    /// short reference name against the allow-list, to diagnose configuration written for it.
    pub nff_short_name_hint: bool,
    /// `hooks.allow-lightweight-tag`
    pub allow_lightweight_tag: bool,
    /// `hooks.restrict-branch-deletion`
    pub restrict_branch_deletion: bool,
    /// `hooks.allow-delete-branch`
    pub allow_delete_branch: RefPatterns,
    /// `hooks.frozen-ref`
    pub frozen_ref: RefPatterns,
    /// `hooks.ignore-refs`
    pub ignore_refs: RefPatterns,
}

impl PolicyConfig {
    /// Load policy configuration from a git config file.
    ///
    /// Unset options take their defaults, malformed ones are configuration errors naming the
    /// option and its value.
    pub fn from_config(config: &File<'_>) -> Result<Self, Error> {
        let r = Reader::new(config);

        let debug_level = {
            let value = r.integer("hooks.debug-level", 0)?;
            DebugLevel::from_integer(value).ok_or_else(|| {
                Error::configuration("hooks.debug-level", value.to_string(), "must be between 0 and 2")
            })?
        };

        let tn_regex = {
            let source = r.string("hooks.tn-regex").unwrap_or_else(|| DEFAULT_TN_REGEX.to_owned());
            Regex::new(&source).map_err(|err| Error::configuration("hooks.tn-regex", source.as_str(), err))?
        };

        Ok(PolicyConfig {
            project_name: r.string("hooks.project-name").filter(|name| !name.is_empty()),
            debug_level,
            email: EmailConfig {
                from_domain: r.string("hooks.from-domain"),
                mailinglist: r.list("hooks.mailinglist"),
                filer_email: r.list("hooks.filer-email"),
                no_emails: r.patterns("hooks.no-emails", &[])?,
                max_commit_emails: r.count("hooks.max-commit-emails", 100)?,
                max_email_diff_size: r.limit("hooks.max-email-diff-size", 100_000)?,
            },
            hooks: HookConfig::from_config(config)?,
            revision_log: RevisionLogConfig {
                no_character_range_check: r.boolean("hooks.no-rh-character-range-check", false)?,
                no_empty_line_check: r.boolean("hooks.no-rh-empty-line-check", false)?,
                max_line_length: r.limit("hooks.max-rh-line-length", 0)?,
                tn_required: r.boolean("hooks.tn-required", false)?,
                tn_regex,
                disable_merge_commit_checks: r.boolean("hooks.disable-merge-commit-checks", false)?,
                reject_merge_commits: r.patterns("hooks.reject-merge-commits", &[])?,
                no_filename_collision_check: r.boolean("hooks.no-filename-collision-check", false)?,
                max_filepath_length: r.limit("hooks.max-filepath-length", 150)?,
            },
            namespaces: NamespaceConfig {
                branch: r.patterns("hooks.branch-ref-namespace", &[])?,
                tag: r.patterns("hooks.tag-ref-namespace", &[])?,
                use_standard_branch: r.boolean("hooks.use-standard-branch-ref-namespace", true)?,
                use_standard_tag: r.boolean("hooks.use-standard-tag-ref-namespace", true)?,
            },
            no_precommit_check: r.patterns("hooks.no-precommit-check", &[])?,
            allow_non_fast_forward: r.patterns("hooks.allow-non-fast-forward", &[])?,
            nff_short_name_hint: r.boolean("hooks.nff-short-name-hint", true)?,
            allow_lightweight_tag: r.boolean("hooks.allow-lightweight-tag", false)?,
            restrict_branch_deletion: r.boolean("hooks.restrict-branch-deletion", false)?,
            allow_delete_branch: r.patterns("hooks.allow-delete-branch", &[])?,
            frozen_ref: r.patterns("hooks.frozen-ref", &[])?,
            ignore_refs: r.patterns("hooks.ignore-refs", &[DEFAULT_IGNORE_REFS])?,
        })
    }

    /// Parse git-config `text` into a policy.
    pub fn from_text(text: &str) -> Result<Self, Error> {
        let file = File::try_from(text)
            .map_err(|err| Error::configuration("project.config", text.lines().next().unwrap_or_default(), err))?;
        Self::from_config(&file)
    }

    /// Describe all resolved values, one `key = value` per line.
    pub fn describe(&self) -> String {
        fn list<'a>(items: impl Iterator<Item = &'a str>) -> String {
            items.collect::<Vec<_>>().join(", ")
        }
        fn opt(value: Option<impl std::fmt::Display>) -> String {
            value.map_or_else(|| "(unset)".to_owned(), |v| v.to_string())
        }
        let rh = &self.revision_log;
        let ns = &self.namespaces;
        let lines = [
            ("project-name", opt(self.project_name.as_deref())),
            ("debug-level", format!("{:?}", self.debug_level)),
            ("from-domain", opt(self.email.from_domain.as_deref())),
            ("mailinglist", list(self.email.mailinglist.iter().map(String::as_str))),
            ("filer-email", list(self.email.filer_email.iter().map(String::as_str))),
            ("no-emails", list(self.email.no_emails.sources())),
            ("max-commit-emails", self.email.max_commit_emails.to_string()),
            ("max-email-diff-size", opt(self.email.max_email_diff_size)),
            ("commit-email-formatter", opt(self.hooks.commit_email_formatter.as_ref().map(|p| p.display()))),
            ("post-receive-hook", opt(self.hooks.post_receive_hook.as_ref().map(|p| p.display()))),
            ("update-hook", opt(self.hooks.update_hook.as_ref().map(|p| p.display()))),
            ("commit-extra-checker", opt(self.hooks.commit_extra_checker.as_ref().map(|p| p.display()))),
            ("style-checker", self.hooks.style_checker.display().to_string()),
            ("style-checker-config-file", opt(self.hooks.style_checker_config_file.as_deref())),
            ("combined-style-checking", self.hooks.combined_style_checking.to_string()),
            ("no-precommit-check", list(self.no_precommit_check.sources())),
            ("allow-non-fast-forward", list(self.allow_non_fast_forward.sources())),
            ("nff-short-name-hint", self.nff_short_name_hint.to_string()),
            ("reject-merge-commits", list(rh.reject_merge_commits.sources())),
            ("disable-merge-commit-checks", rh.disable_merge_commit_checks.to_string()),
            ("no-rh-character-range-check", rh.no_character_range_check.to_string()),
            ("no-rh-empty-line-check", rh.no_empty_line_check.to_string()),
            ("max-rh-line-length", opt(rh.max_line_length)),
            ("tn-required", rh.tn_required.to_string()),
            ("tn-regex", rh.tn_regex.as_str().to_owned()),
            ("no-filename-collision-check", rh.no_filename_collision_check.to_string()),
            ("max-filepath-length", opt(rh.max_filepath_length)),
            ("allow-lightweight-tag", self.allow_lightweight_tag.to_string()),
            ("restrict-branch-deletion", self.restrict_branch_deletion.to_string()),
            ("allow-delete-branch", list(self.allow_delete_branch.sources())),
            ("frozen-ref", list(self.frozen_ref.sources())),
            ("ignore-refs", list(self.ignore_refs.sources())),
            ("branch-ref-namespace", list(ns.branch.sources())),
            ("tag-ref-namespace", list(ns.tag.sources())),
            ("use-standard-branch-ref-namespace", ns.use_standard_branch.to_string()),
            ("use-standard-tag-ref-namespace", ns.use_standard_tag.to_string()),
        ];
        lines
            .iter()
            .map(|(key, value)| format!("hooks.{key} = {value}\n"))
            .collect()
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let empty = File::new(gix_config::file::Metadata::api());
        Self::from_config(&empty).unwrap_or_else(|err| unreachable!("built-in defaults are valid: {err}"))
    }
}
