//! Validation of a single classified reference update.
//!
//! [`Validator::validate()`] dispatches on the [`UpdateVariant`]: the reference-level rules of
//! [`branch`], [`tag`] and [`notes`] run first, followed by the checks of the new commits and
//! finally the administrator's update hook. The first rejection ends the validation of the
//! reference.

use crate::classify::{Category, UpdateVariant};
use crate::config::PolicyConfig;
use crate::context::PushContext;
use crate::delta::CommitDelta;
use crate::hooks::Hooks;
use crate::policy::precommit::{self, Checker, Outcome};
use crate::policy::{files, rh};
use crate::port::Vcs;
use crate::refs::{ChangeKind, RefMutation, CONFIG_REF};
use crate::snapshot::Snapshot;
use crate::{verdict, Error, Rejection, Verdict};

pub mod branch;
pub mod notes;
pub mod tag;

/// Everything needed to validate reference updates of one push.
pub struct Validator<'a, V: Vcs + ?Sized> {
    /// The repository.
    pub vcs: &'a V,
    /// The policy of the push.
    pub config: &'a PolicyConfig,
    /// Administrator hooks.
    pub hooks: &'a dyn Hooks,
    /// The pre-commit checker.
    pub checker: &'a dyn Checker,
    /// Scratch space and user identity.
    pub ctx: &'a PushContext,
}

impl<V: Vcs + ?Sized> Validator<'_, V> {
    /// Validate `mutation`, classified as `variant`, whose commits are described by `delta`,
    /// against the other references in `snapshot`.
    ///
    /// Returns warnings to show to the pusher if the update is accepted.
    pub fn validate(
        &self,
        variant: UpdateVariant,
        mutation: &RefMutation,
        delta: &CommitDelta,
        snapshot: &Snapshot,
    ) -> Result<Verdict<Vec<String>>, Error> {
        let refname = mutation.name();
        if let Some(pattern) = self.config.frozen_ref.first_match(refname) {
            return Ok(Err(Rejection::from_lines([
                format!("{refname} is frozen, updates are not allowed (hooks.frozen-ref: '{pattern}')."),
                "Please contact the repository administrators if this is unexpected.".to_owned(),
            ])));
        }

        let mut warnings = Vec::new();
        let reference_warning = match variant.category {
            Category::Branch => verdict!(branch::validate(self.vcs, self.config, snapshot, variant, mutation)),
            Category::AnnotatedTag | Category::LightweightTag => verdict!(tag::validate(self.config, variant, mutation)),
            Category::Notes => verdict!(notes::validate(self.vcs, variant, mutation)),
        };
        warnings.extend(reference_warning);

        if checks_commits(variant, mutation) {
            warnings.extend(verdict!(self.check_new_commits(mutation, delta)));
        }

        let hook_warning = verdict!(self.hooks.update(mutation).map(|d| d.into_verdict(&format!("update of {refname}"))));
        warnings.extend(hook_warning);
        Ok(Ok(warnings))
    }

    fn check_new_commits(&self, mutation: &RefMutation, delta: &CommitDelta) -> Result<Verdict<Vec<String>>, Error> {
        let refname = mutation.name();
        let mut warnings = Vec::new();
        for added in delta.new_commits() {
            let commit = &added.commit;
            if let Err(rejection) = rh::check_commit(commit, refname, &self.config.revision_log) {
                return Ok(Err(rejection));
            }
            verdict!(files::check_commit(self.vcs, commit, &self.config.revision_log));
            let what = format!("commit {}", crate::refs::short_hex(&commit.rev));
            let hook_warning =
                verdict!(self.hooks.commit_extra_check(refname, commit).map(|d| d.into_verdict(&what)));
            warnings.extend(hook_warning);
        }

        match verdict!(precommit::run(self.vcs, self.config, self.checker, self.ctx, mutation, delta)) {
            Outcome::Passed { warnings: checker_warnings } => warnings.extend(checker_warnings),
            Outcome::Skipped(reason) => tracing::debug!(refname, ?reason, "pre-commit checks skipped"),
        }
        Ok(Ok(warnings))
    }
}

/// True if the new commits of an update are checked.
///
/// Deletions have no new commits. Notes commits are generated by git and the configuration
/// reference is validated by parsing it instead.
pub fn checks_commits(variant: UpdateVariant, mutation: &RefMutation) -> bool {
    variant.change != ChangeKind::Delete && variant.category != Category::Notes && mutation.name() != CONFIG_REF
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classifier;
    use crate::config::RefPatterns;
    use crate::hooks::HookDecision;
    use crate::memory::Repository;
    use crate::policy::RecordingChecker;
    use crate::port::Commit;
    use gix_hash::ObjectId;

    #[derive(Default)]
    struct DenyingHooks {
        deny_update: bool,
        deny_commits: bool,
    }

    impl Hooks for DenyingHooks {
        fn update(&self, _mutation: &RefMutation) -> Result<HookDecision, Error> {
            Ok(if self.deny_update {
                HookDecision::deny("not today", Some(1))
            } else {
                HookDecision::allow_with_output("hook says hi")
            })
        }

        fn commit_extra_check(&self, _refname: &str, commit: &Commit) -> Result<HookDecision, Error> {
            Ok(if self.deny_commits {
                HookDecision::deny(format!("no thanks: {}", commit.subject), Some(2))
            } else {
                HookDecision::allow()
            })
        }

        fn post_receive(&self, _mutations: &[RefMutation]) -> Result<HookDecision, Error> {
            Ok(HookDecision::allow())
        }
    }

    struct Setup {
        repo: Repository,
        base: ObjectId,
        ctx: PushContext,
    }

    fn setup() -> Setup {
        let mut repo = Repository::new();
        let base = crate::memory::Repository::commit(&mut repo, "base").file("README", "hello\n").create();
        repo.set_ref("refs/heads/master", base);
        Setup {
            repo,
            base,
            ctx: PushContext::new("alice", None).unwrap(),
        }
    }

    fn validate(
        s: &Setup,
        config: &PolicyConfig,
        hooks: &DenyingHooks,
        checker: &RecordingChecker,
        m: &RefMutation,
    ) -> Verdict<Vec<String>> {
        let snapshot = Snapshot::load(&s.repo).unwrap();
        let variant = Classifier::new(&config.namespaces)
            .unwrap()
            .classify(&s.repo, m)
            .unwrap()
            .unwrap();
        let delta = crate::delta::resolve(&s.repo, m, &snapshot, &config.email.no_emails).unwrap();
        let validator = Validator {
            vcs: &s.repo,
            config,
            hooks,
            checker,
            ctx: &s.ctx,
        };
        validator.validate(variant, m, &delta, &snapshot).unwrap()
    }

    #[test]
    fn accepted_updates_collect_warnings() {
        let mut s = setup();
        let a = crate::memory::Repository::commit(&mut s.repo, "Add feature\n\nDetails.").parent(s.base).file("a.c", "a").create();
        let m = RefMutation::new("refs/heads/master", Some(s.base), Some(a));
        let checker = RecordingChecker::new();

        let warnings = validate(&s, &PolicyConfig::default(), &DenyingHooks::default(), &checker, &m).unwrap();
        assert_eq!(warnings, vec!["hook says hi".to_owned()]);
        assert_eq!(checker.invocations().len(), 1);
    }

    #[test]
    fn frozen_references_reject_everything() {
        let mut s = setup();
        let a = crate::memory::Repository::commit(&mut s.repo, "Add feature").parent(s.base).create();
        let mut config = PolicyConfig::default();
        config.frozen_ref = RefPatterns::new("hooks.frozen-ref", ["refs/heads/master"]).unwrap();
        let m = RefMutation::new("refs/heads/master", Some(s.base), Some(a));

        let rejection = validate(&s, &config, &DenyingHooks::default(), &RecordingChecker::new(), &m).unwrap_err();
        assert!(rejection.reason().contains("is frozen"));
    }

    #[test]
    fn commit_checks_reject_before_the_style_checker_runs() {
        let mut s = setup();
        let a = crate::memory::Repository::commit(&mut s.repo, "Bad\nno separator").parent(s.base).file("a.c", "a").create();
        let m = RefMutation::new("refs/heads/master", Some(s.base), Some(a));
        let checker = RecordingChecker::new();

        let rejection = validate(&s, &PolicyConfig::default(), &DenyingHooks::default(), &checker, &m).unwrap_err();
        assert!(rejection.reason().contains("empty line"));
        assert!(checker.invocations().is_empty());
    }

    #[test]
    fn hooks_can_reject() {
        let mut s = setup();
        let a = crate::memory::Repository::commit(&mut s.repo, "Fine").parent(s.base).file("a.c", "a").create();
        let m = RefMutation::new("refs/heads/master", Some(s.base), Some(a));

        let hooks = DenyingHooks {
            deny_commits: true,
            ..Default::default()
        };
        let rejection = validate(&s, &PolicyConfig::default(), &hooks, &RecordingChecker::new(), &m).unwrap_err();
        assert!(rejection.reason().contains("no thanks: Fine"));
        assert!(rejection.reason().contains("exit code 2"));

        let hooks = DenyingHooks {
            deny_update: true,
            ..Default::default()
        };
        let rejection = validate(&s, &PolicyConfig::default(), &hooks, &RecordingChecker::new(), &m).unwrap_err();
        assert!(rejection.reason().starts_with("update of refs/heads/master rejected by hook"));
    }

    #[test]
    fn pre_existing_commits_are_not_checked_again() {
        let mut s = setup();
        let a = crate::memory::Repository::commit(&mut s.repo, "Topic").parent(s.base).file("a.c", "a").create();
        s.repo.set_ref("refs/heads/topic", a);
        let m = RefMutation::new("refs/heads/master", Some(s.base), Some(a));
        let checker = RecordingChecker::new();
        let hooks = DenyingHooks {
            deny_commits: true,
            ..Default::default()
        };

        assert!(validate(&s, &PolicyConfig::default(), &hooks, &checker, &m).is_ok());
        assert!(checker.invocations().is_empty());
    }
}
