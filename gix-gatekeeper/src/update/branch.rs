//! Rules for branches, including the configuration reference.

use crate::classify::UpdateVariant;
use crate::config::{load_at, PolicyConfig, CONFIG_FILE};
use crate::policy::ff;
use crate::port::Vcs;
use crate::refs::{ChangeKind, RefMutation, CONFIG_REF};
use crate::snapshot::Snapshot;
use crate::{Error, Rejection, Verdict};

/// The namespace of retired branches: `refs/heads/retired/<name>` retires `refs/heads/<name>`.
pub const RETIRED_PREFIX: &str = "refs/heads/retired/";

/// Validate a branch `mutation`, returning a warning for allowed non-fast-forward updates.
pub fn validate(
    vcs: &(impl Vcs + ?Sized),
    config: &PolicyConfig,
    snapshot: &Snapshot,
    variant: UpdateVariant,
    mutation: &RefMutation,
) -> Result<Verdict<Option<String>>, Error> {
    let refname = mutation.name();
    if variant.change == ChangeKind::Delete {
        return Ok(check_deletion(config, refname).map(|()| None));
    }

    if let Err(rejection) = check_retired(snapshot, refname) {
        return Ok(Err(rejection));
    }

    let mut warning = None;
    if let (ChangeKind::Update, Some(old), Some(new)) = (variant.change, mutation.old, mutation.new) {
        warning = crate::verdict!(ff::check(
            vcs,
            &mutation.reference,
            &old,
            &new,
            &config.allow_non_fast_forward,
            config.nff_short_name_hint,
        ));
    }

    if refname == CONFIG_REF {
        if let Some(new) = mutation.new {
            if let Err(err) = load_at(vcs, &new) {
                if err.kind() != crate::Kind::Configuration {
                    return Err(err);
                }
                return Ok(Err(Rejection::from_lines([
                    format!("The new configuration in {CONFIG_REF} is invalid:"),
                    format!("  {err}"),
                    format!("Please fix {CONFIG_FILE} and push again."),
                ])));
            }
        }
    }
    Ok(Ok(warning))
}

fn check_deletion(config: &PolicyConfig, refname: &str) -> Verdict {
    if !config.restrict_branch_deletion || config.allow_delete_branch.matches(refname) {
        return Ok(());
    }
    Err(Rejection::from_lines([
        format!("Deleting {refname} is not allowed."),
        "Branch deletion is restricted in this repository (hooks.restrict-branch-deletion),".to_owned(),
        "only branches matching hooks.allow-delete-branch may be deleted.".to_owned(),
    ]))
}

fn check_retired(snapshot: &Snapshot, refname: &str) -> Verdict {
    let Some(name) = refname.strip_prefix("refs/heads/") else {
        return Ok(());
    };
    let retired = format!("{RETIRED_PREFIX}{name}");
    if snapshot.contains(&retired) {
        return Err(Rejection::from_lines([
            format!("Updates to {refname} are no longer accepted: the branch has been retired"),
            format!("and its final state is recorded in {retired}."),
        ]));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Category;
    use crate::config::RefPatterns;
    use crate::memory::Repository;
    use gix_hash::ObjectId;

    fn variant(change: ChangeKind) -> UpdateVariant {
        UpdateVariant {
            category: Category::Branch,
            change,
        }
    }

    fn repo() -> (Repository, Vec<ObjectId>) {
        let mut repo = Repository::new();
        let c = repo.chain(None, &["a", "b"]);
        repo.set_ref("refs/heads/master", c[0]);
        (repo, c)
    }

    #[test]
    fn retired_branches_cannot_be_updated() {
        let (mut repo, c) = repo();
        repo.set_ref("refs/heads/retired/master", c[0]);
        let snapshot = Snapshot::load(&repo).unwrap();
        let m = RefMutation::new("refs/heads/master", Some(c[0]), Some(c[1]));
        let rejection = validate(&repo, &PolicyConfig::default(), &snapshot, variant(ChangeKind::Update), &m)
            .unwrap()
            .unwrap_err();
        assert!(rejection.reason().contains("refs/heads/retired/master"));
    }

    #[test]
    fn deletion_restrictions() {
        let (repo, c) = repo();
        let snapshot = Snapshot::load(&repo).unwrap();
        let m = RefMutation::new("refs/heads/master", Some(c[0]), None);
        let mut config = PolicyConfig::default();
        assert_eq!(
            validate(&repo, &config, &snapshot, variant(ChangeKind::Delete), &m).unwrap(),
            Ok(None)
        );

        config.restrict_branch_deletion = true;
        assert!(validate(&repo, &config, &snapshot, variant(ChangeKind::Delete), &m)
            .unwrap()
            .is_err());

        config.allow_delete_branch = RefPatterns::new("hooks.allow-delete-branch", ["refs/heads/.*"]).unwrap();
        assert_eq!(
            validate(&repo, &config, &snapshot, variant(ChangeKind::Delete), &m).unwrap(),
            Ok(None)
        );
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let (mut repo, _) = repo();
        let snapshot = Snapshot::load(&repo).unwrap();
        let bad = crate::memory::Repository::commit(&mut repo, "config")
            .file(CONFIG_FILE, "[hooks]\n\tmax-commit-emails = lots\n")
            .create();
        let m = RefMutation::new(CONFIG_REF, None, Some(bad));
        let rejection = validate(&repo, &PolicyConfig::default(), &snapshot, variant(ChangeKind::Create), &m)
            .unwrap()
            .unwrap_err();
        assert!(rejection.reason().contains("hooks.max-commit-emails"));

        let good = crate::memory::Repository::commit(&mut repo, "config")
            .file(CONFIG_FILE, "[hooks]\n\tmax-commit-emails = 5\n")
            .create();
        let m = RefMutation::new(CONFIG_REF, None, Some(good));
        assert_eq!(
            validate(&repo, &PolicyConfig::default(), &snapshot, variant(ChangeKind::Create), &m).unwrap(),
            Ok(None)
        );
    }
}
