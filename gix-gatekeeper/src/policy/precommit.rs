//! The pre-commit check pipeline.
//!
//! New commits of a reference update are handed to an external style checker, either one at a
//! time against their first parent, or all at once against the base of the update when
//! `hooks.combined-style-checking` is set. The checker sees the changed files materialized in a
//! scratch directory and their paths on stdin.
//!
//! Checks are skipped entirely, in this order, for deletions, for references matching
//! `hooks.no-precommit-check`, if the tip commit mentions a [keyword](NO_PRECOMMIT_CHECK_KEYWORDS),
//! if the pushing user has a fresh [override marker](OVERRIDE_MARKER), and if there are no new
//! commits at all.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;

use gix_hash::ObjectId;

use crate::config::PolicyConfig;
use crate::context::PushContext;
use crate::delta::CommitDelta;
use crate::hooks::env::HookEnvironment;
use crate::hooks::{HookDecision, Invocation};
use crate::port::{peel_to_commit, ChangeStatus, Vcs};
use crate::refs::{short_hex, RefMutation};
use crate::{Error, Rejection, Verdict};

/// Keywords which, in the message of the tip commit, disable pre-commit checks for the update.
pub const NO_PRECOMMIT_CHECK_KEYWORDS: &[&str] = &["no-precommit-check", "no-style-check"];

/// Files for which this attribute is set aren't passed to the checker.
pub const NO_PRECOMMIT_CHECK_ATTRIBUTE: &str = "no-precommit-check";

/// A file in the home directory of the pushing user which disables pre-commit checks while fresh.
pub const OVERRIDE_MARKER: &str = ".no_cvs_check";

/// How long an [`OVERRIDE_MARKER`] stays fresh after it was touched.
pub const OVERRIDE_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Why the checks of an update didn't run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skip {
    /// The reference is being deleted.
    Deletion,
    /// The reference matches this `hooks.no-precommit-check` pattern.
    ExcludedReference(String),
    /// The tip commit contains this keyword.
    Keyword(&'static str),
    /// The pushing user has a fresh override marker.
    Override,
    /// All added commits were already in the repository.
    NoNewCommits,
}

/// How the pipeline ended for an update which wasn't rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing was checked.
    Skipped(Skip),
    /// The checker accepted everything, possibly with output to show as warnings.
    Passed {
        /// Output of successful checker runs.
        warnings: Vec<String>,
    },
}

/// A program judging the files of a commit.
pub trait Checker {
    /// Check `paths`, relative to `work_dir` where they are materialized.
    ///
    /// `config_file` is the materialized `hooks.style-checker-config-file`, if configured.
    fn check(&self, work_dir: &Path, paths: &[String], config_file: Option<&Path>) -> Result<HookDecision, Error>;
}

impl<C: Checker + ?Sized> Checker for &C {
    fn check(&self, work_dir: &Path, paths: &[String], config_file: Option<&Path>) -> Result<HookDecision, Error> {
        (**self).check(work_dir, paths, config_file)
    }
}

/// The [`Checker`] running the configured style checker as `<program> <project> [<config-file>]`.
#[derive(Debug, Clone)]
pub struct StyleChecker {
    program: PathBuf,
    project: String,
    environment: HookEnvironment,
}

impl StyleChecker {
    /// Run `program` for `project`.
    pub fn new(program: impl Into<PathBuf>, project: impl Into<String>, environment: HookEnvironment) -> Self {
        StyleChecker {
            program: program.into(),
            project: project.into(),
            environment,
        }
    }
}

impl Checker for StyleChecker {
    fn check(&self, work_dir: &Path, paths: &[String], config_file: Option<&Path>) -> Result<HookDecision, Error> {
        let mut invocation = Invocation::new(&self.program)
            .arg(&self.project)
            .stdin(paths.join("\n") + "\n")
            .current_dir(work_dir)
            .environment(&self.environment);
        if let Some(config_file) = config_file {
            invocation = invocation.arg(config_file);
        }
        let output = invocation.run().map_err(|err| match err {
            Error::Io(io) => Error::configuration(
                "hooks.style-checker",
                self.program.display().to_string(),
                format!("cannot execute: {io}"),
            ),
            other => other,
        })?;
        Ok(if output.success() {
            HookDecision::allow_with_output(output.combined_text())
        } else {
            HookDecision::deny(output.combined_text(), output.exit_code)
        })
    }
}

/// A [`Checker`] which records the paths of each invocation instead of running a program.
///
/// It rejects any file whose content contains the configured marker.
#[derive(Debug, Default)]
pub struct RecordingChecker {
    reject_marker: Option<String>,
    invocations: RefCell<Vec<Vec<String>>>,
}

impl RecordingChecker {
    /// Accept everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject files containing `marker`.
    pub fn rejecting(marker: impl Into<String>) -> Self {
        RecordingChecker {
            reject_marker: Some(marker.into()),
            ..Default::default()
        }
    }

    /// The paths passed to each invocation so far.
    pub fn invocations(&self) -> Vec<Vec<String>> {
        self.invocations.borrow().clone()
    }
}

impl Checker for RecordingChecker {
    fn check(&self, work_dir: &Path, paths: &[String], _config_file: Option<&Path>) -> Result<HookDecision, Error> {
        self.invocations.borrow_mut().push(paths.to_vec());
        let Some(marker) = &self.reject_marker else {
            return Ok(HookDecision::allow());
        };
        let mut offending = Vec::new();
        for path in paths {
            let content = std::fs::read(work_dir.join(path))?;
            if content.windows(marker.len()).any(|w| w == marker.as_bytes()) {
                offending.push(format!("{path}: contains '{marker}'"));
            }
        }
        Ok(if offending.is_empty() {
            HookDecision::allow()
        } else {
            HookDecision::deny(offending.join("\n"), Some(1))
        })
    }
}

/// Run the pre-commit checks of `mutation`, whose commits are described by `delta`.
pub fn run(
    vcs: &(impl Vcs + ?Sized),
    config: &PolicyConfig,
    checker: &(impl Checker + ?Sized),
    ctx: &PushContext,
    mutation: &RefMutation,
    delta: &CommitDelta,
) -> Result<Verdict<Outcome>, Error> {
    let refname = mutation.name();
    let Some(new) = mutation.new else {
        return Ok(Ok(Outcome::Skipped(Skip::Deletion)));
    };
    if let Some(pattern) = config.no_precommit_check.first_match(refname) {
        tracing::debug!(refname, pattern, "pre-commit checks disabled for reference");
        return Ok(Ok(Outcome::Skipped(Skip::ExcludedReference(pattern.to_owned()))));
    }
    if let Some(tip) = peel_to_commit(vcs, &new)? {
        let message = vcs.commit(&tip)?.message();
        if let Some(keyword) = NO_PRECOMMIT_CHECK_KEYWORDS.iter().copied().find(|k| message.contains(k)) {
            tracing::debug!(refname, rev = %tip, keyword, "pre-commit checks disabled by keyword");
            return Ok(Ok(Outcome::Skipped(Skip::Keyword(keyword))));
        }
    }
    if override_is_fresh(ctx) {
        tracing::warn!(refname, user = ctx.user(), "pre-commit checks disabled by {OVERRIDE_MARKER}");
        return Ok(Ok(Outcome::Skipped(Skip::Override)));
    }
    if !delta.has_new_commits() {
        tracing::debug!(refname, "no new commits, pre-commit checks skipped");
        return Ok(Ok(Outcome::Skipped(Skip::NoNewCommits)));
    }

    let mut warnings = Vec::new();
    if config.hooks.combined_style_checking {
        let warning = crate::verdict!(check_revision(vcs, config, checker, ctx, delta.base.as_ref(), &new));
        warnings.extend(warning);
    } else {
        for added in delta.new_commits() {
            let commit = &added.commit;
            let warning = crate::verdict!(check_revision(
                vcs,
                config,
                checker,
                ctx,
                commit.first_parent(),
                &commit.rev
            ));
            warnings.extend(warning);
        }
    }
    Ok(Ok(Outcome::Passed { warnings }))
}

fn override_is_fresh(ctx: &PushContext) -> bool {
    let Some(home) = ctx.home() else {
        return false;
    };
    let Ok(modified) = std::fs::metadata(home.join(OVERRIDE_MARKER)).and_then(|m| m.modified()) else {
        return false;
    };
    match ctx.now().duration_since(modified) {
        Ok(age) => age < OVERRIDE_MAX_AGE,
        Err(_) => true,
    }
}

/// Check the files changed between `base` and `rev`, with the state of `rev`.
fn check_revision(
    vcs: &(impl Vcs + ?Sized),
    config: &PolicyConfig,
    checker: &(impl Checker + ?Sized),
    ctx: &PushContext,
    base: Option<&ObjectId>,
    rev: &ObjectId,
) -> Result<Verdict<Option<String>>, Error> {
    let mut paths = Vec::new();
    for change in vcs.changes(base, rev)? {
        if change.status == ChangeStatus::Deleted {
            tracing::debug!(rev = %rev, path = %change.path, "deleted file not checked");
        } else if change.is_submodule() {
            tracing::debug!(rev = %rev, path = %change.path, "submodule entry not checked");
        } else {
            paths.push(change.path);
        }
    }
    let attributes = vcs.attributes(rev, NO_PRECOMMIT_CHECK_ATTRIBUTE, &paths)?;
    paths.retain(|path| {
        let excluded = attributes.get(path).is_some_and(|state| state.is_set());
        if excluded {
            tracing::debug!(rev = %rev, path = %path, "file excluded by {NO_PRECOMMIT_CHECK_ATTRIBUTE} attribute");
        }
        !excluded
    });
    if paths.is_empty() {
        tracing::debug!(rev = %rev, "no files to check");
        return Ok(Ok(None));
    }

    let work_dir = ctx.work_dir(&short_hex(rev))?;
    for path in &paths {
        materialize(vcs, rev, path, work_dir.path())?;
    }
    let config_file = match &config.hooks.style_checker_config_file {
        Some(file) => {
            if vcs.read_file(rev, file)?.is_none() {
                return Ok(Err(Rejection::from_lines([
                    format!("Cannot find style checker configuration file '{file}' in commit {}.", short_hex(rev)),
                    "It is required by hooks.style-checker-config-file.".to_owned(),
                ])));
            }
            Some(materialize(vcs, rev, file, work_dir.path())?)
        }
        None => None,
    };

    tracing::debug!(rev = %rev, files = paths.len(), "running pre-commit checks");
    let decision = checker.check(work_dir.path(), &paths, config_file.as_deref())?;
    if decision.allowed {
        return Ok(Ok((!decision.output.is_empty()).then_some(decision.output)));
    }
    let mut rejection = Rejection::new(format!("pre-commit checks failed for commit {}:", short_hex(rev)));
    if !decision.output.is_empty() {
        rejection = rejection.with_note(decision.output);
    }
    Ok(Err(rejection))
}

fn materialize(vcs: &(impl Vcs + ?Sized), rev: &ObjectId, path: &str, dir: &Path) -> Result<PathBuf, Error> {
    let content = vcs
        .read_file(rev, path)?
        .ok_or_else(|| Error::backend("reading file", format!("{path} doesn't exist in {rev}")))?;
    let target = dir.join(path);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&target, content)?;
    Ok(target)
}
