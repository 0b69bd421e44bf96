//! Push-wide coordination of validation and notification.
//!
//! A push is processed one reference at a time, in the order the references were received.
//! Before each of them the [`Snapshot`] is rolled back to the state before the push, and
//! afterwards it is advanced to the new value of that reference, whether it was accepted or not.
//! The repository-wide [`PushLock`] is held throughout.

use std::path::{Path, PathBuf};

use crate::classify::Classifier;
use crate::config::{self, PolicyConfig};
use crate::context::PushContext;
use crate::delta::{self, CommitDelta};
use crate::hooks::env::HookEnvironment;
use crate::hooks::{ExternalHooks, Hooks};
use crate::lock::PushLock;
use crate::notify::assemble::commit_email_count;
use crate::notify::{Assembler, EmailFormatter, EmailQueue, Mailer, Recipients, Sendmail};
use crate::policy::{Checker, StyleChecker};
use crate::port::Vcs;
use crate::refs::{RefMutation, CONFIG_REF};
use crate::snapshot::Snapshot;
use crate::update::Validator;
use crate::{verdict, Error, Rejection, Verdict};

/// The outcome of validating a single reference update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefOutcome {
    /// The updated reference.
    pub refname: String,
    /// Why the update was refused, `None` if it was accepted.
    pub rejection: Option<Rejection>,
    /// Messages for the pusher which don't prevent the update.
    pub warnings: Vec<String>,
}

impl RefOutcome {
    /// True if the update was accepted.
    pub fn is_accepted(&self) -> bool {
        self.rejection.is_none()
    }
}

/// The outcome of validating all reference updates of a push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushOutcome {
    /// One outcome per reference, in the order of the push.
    pub refs: Vec<RefOutcome>,
}

impl PushOutcome {
    /// True if every reference update was accepted.
    pub fn is_accepted(&self) -> bool {
        self.refs.iter().all(RefOutcome::is_accepted)
    }

    /// The outcomes of refused updates.
    pub fn rejected(&self) -> impl Iterator<Item = &RefOutcome> {
        self.refs.iter().filter(|r| !r.is_accepted())
    }
}

/// The outcome of announcing an accepted push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyOutcome {
    /// The number of emails handed to the mailer.
    pub emails_sent: usize,
    /// Problems of best-effort steps, like failing mailing-list scripts or post-receive hooks.
    pub warnings: Vec<String>,
}

/// Validates and announces pushes to one repository.
pub struct Gatekeeper<'a, V: Vcs> {
    vcs: V,
    git_dir: PathBuf,
    ctx: PushContext,
    mailer: Box<dyn Mailer + 'a>,
    hooks: Option<Box<dyn Hooks + 'a>>,
    checker: Option<Box<dyn Checker + 'a>>,
}

impl<'a, V: Vcs> Gatekeeper<'a, V> {
    /// Guard the repository at `git_dir`, accessed through `vcs`, for the push described by `ctx`.
    ///
    /// Emails go through `sendmail`, hooks and the style checker are the configured programs.
    pub fn new(vcs: V, git_dir: impl Into<PathBuf>, ctx: PushContext) -> Self {
        Gatekeeper {
            vcs,
            git_dir: git_dir.into(),
            ctx,
            mailer: Box::new(Sendmail::default()),
            hooks: None,
            checker: None,
        }
    }

    /// Deliver emails with `mailer`.
    pub fn with_mailer(mut self, mailer: impl Mailer + 'a) -> Self {
        self.mailer = Box::new(mailer);
        self
    }

    /// Use `hooks` instead of the configured programs.
    pub fn with_hooks(mut self, hooks: impl Hooks + 'a) -> Self {
        self.hooks = Some(Box::new(hooks));
        self
    }

    /// Use `checker` instead of `hooks.style-checker`.
    pub fn with_checker(mut self, checker: impl Checker + 'a) -> Self {
        self.checker = Some(Box::new(checker));
        self
    }

    /// The repository.
    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    /// The git directory of the repository.
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Load the configuration as currently stored in the repository.
    pub fn load_config(&self) -> Result<PolicyConfig, Error> {
        config::load(&self.vcs, &Snapshot::load(&self.vcs)?)
    }

    /// The project name, configured or derived from the git directory.
    pub fn project_name(&self, config: &PolicyConfig) -> String {
        if let Some(name) = &config.project_name {
            return name.clone();
        }
        let dir = match self.git_dir.file_name() {
            Some(name) if name == ".git" => self.git_dir.parent().and_then(Path::file_name),
            other => other,
        };
        dir.map(|name| {
            let name = name.to_string_lossy();
            name.strip_suffix(".git").unwrap_or(&name).to_owned()
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "repository".to_owned())
    }

    fn environment(&self, config: &PolicyConfig) -> HookEnvironment {
        HookEnvironment::new()
            .with_git_dir(&self.git_dir)
            .with_project(self.project_name(config))
            .with_user(self.ctx.user())
    }

    /// Validate all `mutations` of a push, as received by the `pre-receive` hook.
    ///
    /// A rejected reference doesn't stop the validation of the others, so the pusher learns
    /// about all problems at once.
    pub fn validate_push(&self, mutations: &[RefMutation]) -> Result<PushOutcome, Error> {
        if mutations.len() > 1 && mutations.iter().any(|m| m.name() == CONFIG_REF) {
            return Err(Error::ConfigRefNotAlone {
                config_ref: CONFIG_REF.to_owned(),
                others: mutations
                    .iter()
                    .map(RefMutation::name)
                    .filter(|name| *name != CONFIG_REF)
                    .map(ToOwned::to_owned)
                    .collect(),
            });
        }
        let _lock = PushLock::acquire(&self.git_dir)?;

        let mut snapshot = Snapshot::load(&self.vcs)?;
        snapshot.rollback(mutations);
        let config = config::load(&self.vcs, &snapshot)?;
        let classifier = Classifier::new(&config.namespaces)?;
        let environment = self.environment(&config);
        let external_hooks;
        let hooks: &dyn Hooks = match &self.hooks {
            Some(hooks) => hooks.as_ref(),
            None => {
                external_hooks = ExternalHooks::new(config.hooks.paths(), environment.clone());
                &external_hooks
            }
        };
        let style_checker;
        let checker: &dyn Checker = match &self.checker {
            Some(checker) => checker.as_ref(),
            None => {
                style_checker = StyleChecker::new(
                    &config.hooks.style_checker,
                    self.project_name(&config),
                    environment.clone(),
                );
                &style_checker
            }
        };
        let validator = Validator {
            vcs: &self.vcs,
            config: &config,
            hooks,
            checker,
            ctx: &self.ctx,
        };

        let mut outcome = PushOutcome::default();
        let mut email_count = 0;
        for (index, mutation) in mutations.iter().enumerate() {
            snapshot.rollback(mutations);
            let verdict =
                self.validate_one(&validator, &classifier, &snapshot, mutations, mutation, &mut email_count);
            snapshot.advance(mutation);
            let (rejection, warnings) = match verdict? {
                Ok(warnings) => {
                    tracing::info!(refname = mutation.name(), "update accepted");
                    (None, warnings)
                }
                Err(rejection) => {
                    tracing::info!(refname = mutation.name(), reason = rejection.reason(), "update rejected");
                    (Some(rejection), Vec::new())
                }
            };
            outcome.refs.push(RefOutcome {
                refname: mutation.name().to_owned(),
                rejection,
                warnings,
            });
            if email_count > config.email.max_commit_emails {
                for skipped in &mutations[index + 1..] {
                    tracing::info!(refname = skipped.name(), "update not validated, too many commit emails");
                    outcome.refs.push(RefOutcome {
                        refname: skipped.name().to_owned(),
                        rejection: Some(Rejection::new(
                            "Not validated, the push already exceeds hooks.max-commit-emails.",
                        )),
                        warnings: Vec::new(),
                    });
                }
                break;
            }
        }
        Ok(outcome)
    }

    /// Validate a single `mutation`, as received by the `update` hook.
    pub fn validate_update(&self, mutation: &RefMutation) -> Result<RefOutcome, Error> {
        let mut outcome = self.validate_push(std::slice::from_ref(mutation))?;
        outcome
            .refs
            .pop()
            .ok_or_else(|| Error::backend(format!("update of {}", mutation.name()), "no outcome was produced"))
    }

    fn validate_one(
        &self,
        validator: &Validator<'_, V>,
        classifier: &Classifier,
        snapshot: &Snapshot,
        mutations: &[RefMutation],
        mutation: &RefMutation,
        email_count: &mut usize,
    ) -> Result<Verdict<Vec<String>>, Error> {
        let config = validator.config;
        let refname = mutation.name();
        if let Some(pattern) = config.ignore_refs.first_match(refname) {
            tracing::debug!(refname, pattern, "reference ignored, no checks");
            return Ok(Ok(Vec::new()));
        }
        let variant = verdict!(classifier.classify(&self.vcs, mutation));
        tracing::debug!(refname, %variant, "classified");
        let delta = self.resolve_delta(config, snapshot, mutations, mutation)?;

        *email_count += commit_email_count(config, refname, &delta);
        if *email_count > config.email.max_commit_emails {
            return Ok(Err(Rejection::from_lines([
                format!(
                    "This push would cause {email_count} commit emails, more than the {} allowed by hooks.max-commit-emails.",
                    config.email.max_commit_emails
                ),
                "Please push fewer commits at a time, or ask the repository administrators to raise the limit.".to_owned(),
            ])));
        }
        validator.validate(variant, mutation, &delta, snapshot)
    }

    /// Resolve the delta of `mutation`, keeping commits brought in by references matching
    /// `hooks.no-emails` elsewhere in the same push silent.
    fn resolve_delta(
        &self,
        config: &PolicyConfig,
        snapshot: &Snapshot,
        mutations: &[RefMutation],
        mutation: &RefMutation,
    ) -> Result<CommitDelta, Error> {
        let mut delta = delta::resolve(&self.vcs, mutation, snapshot, &config.email.no_emails)?;
        if let Some(new) = mutation.new {
            let silenced: Vec<_> = mutations
                .iter()
                .filter(|m| m.name() != mutation.name() && config.email.no_emails.matches(m.name()))
                .filter_map(|m| m.new)
                .collect();
            delta::silence_reachable(&self.vcs, &mut delta, &new, &silenced)?;
        }
        Ok(delta)
    }

    /// Announce the accepted `mutations` of a push, as received by the `post-receive` hook.
    ///
    /// The references already point to their new values. Emails assembled before a failure are
    /// still sent, then the failure is returned.
    pub fn notify_push(&self, mutations: &[RefMutation]) -> Result<NotifyOutcome, Error> {
        let _lock = PushLock::acquire(&self.git_dir)?;

        let mut snapshot = Snapshot::load(&self.vcs)?;
        snapshot.rollback(mutations);
        let config = config::load(&self.vcs, &snapshot)?;
        let classifier = Classifier::new(&config.namespaces)?;
        let environment = self.environment(&config);
        let assembler = Assembler::new(
            &self.vcs,
            &config,
            self.project_name(&config),
            self.ctx.user(),
            Recipients::new(config.email.mailinglist.clone(), environment.clone()),
            EmailFormatter::new(config.hooks.commit_email_formatter.clone(), environment.clone()),
        );

        let mut queue = EmailQueue::new();
        let mut outcome = NotifyOutcome::default();
        let assembled = (|| -> Result<(), Error> {
            for mutation in mutations {
                snapshot.rollback(mutations);
                let refname = mutation.name();
                if config.ignore_refs.matches(refname) {
                    tracing::debug!(refname, "reference ignored, no emails");
                    snapshot.advance(mutation);
                    continue;
                }
                let variant = match classifier.classify(&self.vcs, mutation)? {
                    Ok(variant) => variant,
                    Err(rejection) => {
                        tracing::warn!(refname, reason = rejection.reason(), "cannot classify accepted update, no emails");
                        snapshot.advance(mutation);
                        continue;
                    }
                };
                let delta = self.resolve_delta(&config, &snapshot, mutations, mutation)?;
                let (emails, warnings) = assembler.assemble(variant, mutation, &delta)?;
                queue.extend(emails);
                outcome.warnings.extend(warnings);
                snapshot.advance(mutation);
            }
            Ok(())
        })();
        outcome.emails_sent = queue.flush(self.mailer.as_ref())?;
        assembled?;

        let external_hooks;
        let hooks: &dyn Hooks = match &self.hooks {
            Some(hooks) => hooks.as_ref(),
            None => {
                external_hooks = ExternalHooks::new(config.hooks.paths(), environment);
                &external_hooks
            }
        };
        match hooks.post_receive(mutations) {
            Ok(decision) if decision.allowed => {
                if !decision.output.is_empty() {
                    outcome.warnings.push(decision.output);
                }
            }
            Ok(decision) => {
                tracing::warn!(exit_code = ?decision.exit_code, "post-receive hook failed");
                outcome.warnings.push(format!(
                    "The post-receive hook failed (exit code {}):\n{}",
                    decision.exit_code.map_or_else(|| "none".to_owned(), |c| c.to_string()),
                    decision.output
                ));
            }
            Err(err) => {
                tracing::warn!(%err, "post-receive hook could not run");
                outcome.warnings.push(format!("The post-receive hook could not be run: {err}"));
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::NoopHooks;
    use crate::memory::Repository;
    use crate::notify::Capture;
    use crate::policy::RecordingChecker;

    fn gatekeeper<'a>(repo: Repository, dir: &Path, mailer: &'a Capture, checker: &'a RecordingChecker) -> Gatekeeper<'a, Repository> {
        Gatekeeper::new(repo, dir, PushContext::new("alice", None).unwrap())
            .with_hooks(NoopHooks::new())
            .with_checker(checker)
            .with_mailer(mailer)
    }

    #[test]
    fn project_name_derivation() {
        let mailer = Capture::new();
        let checker = RecordingChecker::new();
        let config = PolicyConfig::default();
        for (dir, expected) in [
            ("/srv/git/widgets.git", "widgets"),
            ("/home/alice/widgets/.git", "widgets"),
            ("/srv/git/plain", "plain"),
        ] {
            let g = gatekeeper(Repository::new(), Path::new(dir), &mailer, &checker);
            assert_eq!(g.project_name(&config), expected);
        }
        let configured = PolicyConfig {
            project_name: Some("gadgets".into()),
            ..PolicyConfig::default()
        };
        let g = gatekeeper(Repository::new(), Path::new("/srv/x.git"), &mailer, &checker);
        assert_eq!(g.project_name(&configured), "gadgets");
    }

    #[test]
    fn ignored_references_are_accepted_without_checks() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = Repository::new();
        let c = repo.chain(None, &["a", "b"]);
        repo.set_ref("refs/changes/01/1/1", c[0]);
        let mailer = Capture::new();
        let checker = RecordingChecker::new();
        let g = gatekeeper(repo, dir.path(), &mailer, &checker);

        let outcome = g
            .validate_push(&[RefMutation::new("refs/changes/01/1/1", Some(c[0]), Some(c[1]))])
            .unwrap();
        assert!(outcome.is_accepted());
        assert!(checker.invocations().is_empty());
    }

    #[test]
    fn exceeding_max_commit_emails_stops_validation() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = Repository::new();
        let base = repo.chain(None, &["base"]);
        let config = crate::memory::Repository::commit(&mut repo, "config")
            .file("project.config", "[hooks]\n\tmax-commit-emails = 3\n")
            .create();
        repo.set_ref(CONFIG_REF, config);
        repo.set_ref("refs/heads/master", base[0]);
        let one = repo.chain(Some(base[0]), &["a1", "a2"]);
        let two = repo.chain(Some(base[0]), &["b1", "b2"]);
        let three = repo.chain(Some(base[0]), &["c1"]);
        let mailer = Capture::new();
        let checker = RecordingChecker::new();
        let g = gatekeeper(repo, dir.path(), &mailer, &checker);

        let outcome = g
            .validate_push(&[
                RefMutation::new("refs/heads/master", Some(base[0]), Some(one[1])),
                RefMutation::new("refs/heads/topic", None, Some(two[1])),
                RefMutation::new("refs/heads/other", None, Some(three[0])),
            ])
            .unwrap();
        assert_eq!(outcome.refs.len(), 3);
        assert!(outcome.refs[0].is_accepted());
        let rejection = outcome.refs[1].rejection.as_ref().unwrap();
        assert!(rejection.reason().contains("4 commit emails"));
        assert!(rejection.reason().contains("hooks.max-commit-emails"));
        let skipped = outcome.refs[2].rejection.as_ref().unwrap();
        assert!(skipped.reason().starts_with("Not validated"));
        assert_eq!(
            checker.invocations(),
            vec![vec!["a1.txt".to_owned()], vec!["a2.txt".to_owned()]],
            "nothing is checked once the limit is exceeded"
        );
    }

    #[test]
    fn busy_repositories_fail_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = Repository::new();
        let c = repo.chain(None, &["a"]);
        let mailer = Capture::new();
        let checker = RecordingChecker::new();
        let g = gatekeeper(repo, dir.path(), &mailer, &checker);

        let _held = PushLock::acquire(dir.path()).unwrap();
        let err = g
            .validate_push(&[RefMutation::new("refs/heads/master", None, Some(c[0]))])
            .unwrap_err();
        assert_eq!(err.kind(), crate::Kind::Busy);
        assert_eq!(g.notify_push(&[]).unwrap_err().kind(), crate::Kind::Busy);
    }
}
