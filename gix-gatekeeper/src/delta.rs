//! The commits a reference mutation adds and loses.
//!
//! All reachability questions are asked relative to the [`Snapshot`], which holds the state of
//! every reference before the push. A commit which some *other* reference already reaches is
//! *pre-existing*: it is listed among the added commits of this reference, but it was checked
//! and announced when it first entered the repository and won't be checked again.

use std::collections::HashSet;

use gix_hash::ObjectId;

use crate::config::RefPatterns;
use crate::port::{peel_to_commit, Commit, Vcs};
use crate::refs::RefMutation;
use crate::snapshot::Snapshot;
use crate::Error;

/// A commit added to a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedCommit {
    /// The commit.
    pub commit: Commit,
    /// True if another reference reached the commit before the push.
    pub pre_existing: bool,
    /// False if the commit is visible through a reference whose updates don't cause emails.
    pub send_email: bool,
}

/// The change a reference mutation applies to the commit graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitDelta {
    /// Added commits, parents before children.
    pub added: Vec<AddedCommit>,
    /// Commits which no reference reaches anymore after the update, parents before children.
    pub lost: Vec<Commit>,
    /// The revision the added commits build upon. `None` for deletions and for new lineages
    /// without common history with any other reference.
    pub base: Option<ObjectId>,
}

impl CommitDelta {
    /// Added commits which no other reference reached before the push.
    pub fn new_commits(&self) -> impl Iterator<Item = &AddedCommit> {
        self.added.iter().filter(|c| !c.pre_existing)
    }

    /// True if the delta adds commits which no other reference reached before.
    pub fn has_new_commits(&self) -> bool {
        self.new_commits().next().is_some()
    }
}

/// Compute the delta of `mutation` against the other references in `snapshot`.
///
/// Commits reachable through references matching `no_emails` (other than the updated reference
/// itself) are marked so no email is sent for them. Tags are peeled to the commits they point
/// to, tags of other objects have an empty delta.
pub fn resolve(
    vcs: &(impl Vcs + ?Sized),
    mutation: &RefMutation,
    snapshot: &Snapshot,
    no_emails: &RefPatterns,
) -> Result<CommitDelta, Error> {
    let name = mutation.name();
    let others = snapshot.revs_except(name, |_| true);
    let old = peeled(vcs, mutation.old)?;
    let new = peeled(vcs, mutation.new)?;

    let lost = match old {
        Some(old) => {
            let exclude: Vec<_> = new.into_iter().chain(others.iter().copied()).collect();
            commits(vcs, &vcs.rev_list(&[old], &exclude)?)?
        }
        None => Vec::new(),
    };
    let Some(new) = new else {
        return Ok(CommitDelta {
            added: Vec::new(),
            lost,
            base: None,
        });
    };

    let (added, pre_existing, base) = match old {
        Some(old) => {
            let added = vcs.rev_list(&[new], &[old])?;
            let exclude: Vec<_> = others.iter().copied().chain(Some(old)).collect();
            let new_only: HashSet<_> = vcs.rev_list(&[new], &exclude)?.into_iter().collect();
            let pre_existing: HashSet<_> = added.iter().filter(|rev| !new_only.contains(*rev)).copied().collect();
            (added, pre_existing, Some(old))
        }
        None => {
            let new_only = vcs.rev_list(&[new], &others)?;
            if let Some(oldest) = new_only.first() {
                let base = vcs.commit(oldest)?.first_parent().copied();
                (new_only, HashSet::new(), base)
            } else {
                let nearest = nearest_reference(vcs, &new, &others)?;
                let base = match nearest.first() {
                    Some(oldest) => vcs.commit(oldest)?.first_parent().copied(),
                    None => Some(new),
                };
                let pre_existing = nearest.iter().copied().collect();
                (nearest, pre_existing, base)
            }
        }
    };

    let silenced = snapshot.revs_except(name, |other| no_emails.matches(other));
    let emailed: Option<HashSet<ObjectId>> = if silenced.is_empty() {
        None
    } else {
        let exclude: Vec<_> = silenced.into_iter().chain(old).collect();
        Some(vcs.rev_list(&[new], &exclude)?.into_iter().collect())
    };

    let added = commits(vcs, &added)?
        .into_iter()
        .map(|commit| AddedCommit {
            pre_existing: pre_existing.contains(&commit.rev),
            send_email: emailed.as_ref().map_or(true, |set| set.contains(&commit.rev)),
            commit,
        })
        .collect();
    Ok(CommitDelta { added, lost, base })
}

/// Stop emails for the added commits of `delta`, added by updating to `new`, which are
/// reachable from any of `tips`.
///
/// `tips` are the new values of references matching `hooks.no-emails` updated by the same push,
/// so commits they bring in stay silent even if another reference of the push carries them too.
pub fn silence_reachable(
    vcs: &(impl Vcs + ?Sized),
    delta: &mut CommitDelta,
    new: &ObjectId,
    tips: &[ObjectId],
) -> Result<(), Error> {
    if tips.is_empty() || delta.added.is_empty() {
        return Ok(());
    }
    let visible: HashSet<_> = vcs.rev_list(&[*new], tips)?.into_iter().collect();
    for added in delta.added.iter_mut().filter(|c| !visible.contains(&c.commit.rev)) {
        added.send_email = false;
    }
    Ok(())
}

/// The commits reachable from `new` but not from the other reference closest to it.
///
/// Ties go to the reference listed first.
fn nearest_reference(vcs: &(impl Vcs + ?Sized), new: &ObjectId, others: &[ObjectId]) -> Result<Vec<ObjectId>, Error> {
    let mut best: Option<Vec<ObjectId>> = None;
    for other in others {
        let candidate = vcs.rev_list(&[*new], &[*other])?;
        if best.as_ref().map_or(true, |b| candidate.len() < b.len()) {
            let done = candidate.is_empty();
            best = Some(candidate);
            if done {
                break;
            }
        }
    }
    Ok(best.unwrap_or_default())
}

fn peeled(vcs: &(impl Vcs + ?Sized), rev: Option<ObjectId>) -> Result<Option<ObjectId>, Error> {
    match rev {
        Some(rev) => peel_to_commit(vcs, &rev),
        None => Ok(None),
    }
}

fn commits(vcs: &(impl Vcs + ?Sized), revs: &[ObjectId]) -> Result<Vec<Commit>, Error> {
    revs.iter().map(|rev| vcs.commit(rev)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Repository;
    use pretty_assertions::assert_eq;

    fn revs(delta: &CommitDelta) -> Vec<ObjectId> {
        delta.added.iter().map(|c| c.commit.rev).collect()
    }

    fn no_patterns() -> RefPatterns {
        RefPatterns::default()
    }

    #[test]
    fn fast_forward_update() {
        let mut repo = Repository::new();
        let c = repo.chain(None, &["a", "b", "c", "d"]);
        repo.set_ref("refs/heads/master", c[0]);
        let snapshot = Snapshot::load(&repo).unwrap();

        let m = RefMutation::new("refs/heads/master", Some(c[0]), Some(c[3]));
        let delta = resolve(&repo, &m, &snapshot, &no_patterns()).unwrap();
        assert_eq!(revs(&delta), c[1..].to_vec());
        assert!(delta.added.iter().all(|c| !c.pre_existing && c.send_email));
        assert!(delta.lost.is_empty());
        assert_eq!(delta.base, Some(c[0]));
    }

    #[test]
    fn update_marks_commits_reachable_elsewhere_as_pre_existing() {
        let mut repo = Repository::new();
        let c = repo.chain(None, &["a", "b", "c"]);
        repo.set_ref("refs/heads/master", c[0]);
        repo.set_ref("refs/heads/topic", c[1]);
        let snapshot = Snapshot::load(&repo).unwrap();

        let m = RefMutation::new("refs/heads/master", Some(c[0]), Some(c[2]));
        let delta = resolve(&repo, &m, &snapshot, &no_patterns()).unwrap();
        assert_eq!(revs(&delta), vec![c[1], c[2]]);
        assert!(delta.added[0].pre_existing);
        assert!(!delta.added[1].pre_existing);
        assert_eq!(delta.new_commits().count(), 1);
    }

    #[test]
    fn non_fast_forward_loses_commits() {
        let mut repo = Repository::new();
        let c = repo.chain(None, &["a", "b"]);
        let rewritten = crate::memory::Repository::commit(&mut repo, "b'").parent(c[0]).file("x", "y").create();
        repo.set_ref("refs/heads/master", c[1]);
        let snapshot = Snapshot::load(&repo).unwrap();

        let m = RefMutation::new("refs/heads/master", Some(c[1]), Some(rewritten));
        let delta = resolve(&repo, &m, &snapshot, &no_patterns()).unwrap();
        assert_eq!(revs(&delta), vec![rewritten]);
        assert_eq!(delta.lost.iter().map(|c| c.rev).collect::<Vec<_>>(), vec![c[1]]);
    }

    #[test]
    fn lost_commits_still_reachable_elsewhere_are_not_lost() {
        let mut repo = Repository::new();
        let c = repo.chain(None, &["a", "b"]);
        repo.set_ref("refs/heads/master", c[1]);
        repo.set_ref("refs/heads/backup", c[1]);
        let snapshot = Snapshot::load(&repo).unwrap();

        let m = RefMutation::new("refs/heads/master", Some(c[1]), Some(c[0]));
        let delta = resolve(&repo, &m, &snapshot, &no_patterns()).unwrap();
        assert!(delta.added.is_empty());
        assert!(delta.lost.is_empty());
    }

    #[test]
    fn branch_creation_on_top_of_existing_history() {
        let mut repo = Repository::new();
        let c = repo.chain(None, &["a", "b"]);
        let topic = repo.chain(Some(c[1]), &["t1", "t2"]);
        repo.set_ref("refs/heads/master", c[1]);
        let snapshot = Snapshot::load(&repo).unwrap();

        let m = RefMutation::new("refs/heads/topic", None, Some(topic[1]));
        let delta = resolve(&repo, &m, &snapshot, &no_patterns()).unwrap();
        assert_eq!(revs(&delta), topic);
        assert_eq!(delta.base, Some(c[1]));
    }

    #[test]
    fn headless_branch_creation() {
        let mut repo = Repository::new();
        let c = repo.chain(None, &["a"]);
        let orphan = repo.chain(None, &["o1", "o2"]);
        repo.set_ref("refs/heads/master", c[0]);
        let snapshot = Snapshot::load(&repo).unwrap();

        let m = RefMutation::new("refs/heads/orphan", None, Some(orphan[1]));
        let delta = resolve(&repo, &m, &snapshot, &no_patterns()).unwrap();
        assert_eq!(revs(&delta), orphan);
        assert_eq!(delta.base, None);
    }

    #[test]
    fn copying_a_reference_picks_the_nearest_one() {
        let mut repo = Repository::new();
        let c = repo.chain(None, &["a", "b", "c"]);
        repo.set_ref("refs/heads/master", c[2]);
        repo.set_ref("refs/tags/v1", c[0]);
        let snapshot = Snapshot::load(&repo).unwrap();

        let m = RefMutation::new("refs/heads/copy", None, Some(c[2]));
        let delta = resolve(&repo, &m, &snapshot, &no_patterns()).unwrap();
        assert!(delta.added.is_empty(), "master already points there");
        assert_eq!(delta.base, Some(c[2]));

        let m = RefMutation::new("refs/heads/old", None, Some(c[1]));
        let delta = resolve(&repo, &m, &snapshot, &no_patterns()).unwrap();
        assert!(delta.added.is_empty(), "c[1] is an ancestor of master");
    }

    #[test]
    fn deletion_has_no_added_commits() {
        let mut repo = Repository::new();
        let c = repo.chain(None, &["a", "b"]);
        repo.set_ref("refs/heads/master", c[0]);
        repo.set_ref("refs/heads/topic", c[1]);
        let snapshot = Snapshot::load(&repo).unwrap();

        let m = RefMutation::new("refs/heads/topic", Some(c[1]), None);
        let delta = resolve(&repo, &m, &snapshot, &no_patterns()).unwrap();
        assert!(delta.added.is_empty());
        assert_eq!(delta.lost.iter().map(|c| c.rev).collect::<Vec<_>>(), vec![c[1]]);
        assert_eq!(delta.base, None);
    }

    #[test]
    fn commits_visible_through_silenced_references_are_not_emailed() {
        let mut repo = Repository::new();
        let c = repo.chain(None, &["a", "b", "c"]);
        repo.set_ref("refs/heads/master", c[0]);
        repo.set_ref("refs/heads/wip/x", c[1]);
        let snapshot = Snapshot::load(&repo).unwrap();
        let no_emails = RefPatterns::new("hooks.no-emails", ["refs/heads/wip/.*"]).unwrap();

        let m = RefMutation::new("refs/heads/master", Some(c[0]), Some(c[2]));
        let delta = resolve(&repo, &m, &snapshot, &no_emails).unwrap();
        let flags: Vec<_> = delta.added.iter().map(|c| (c.pre_existing, c.send_email)).collect();
        assert_eq!(flags, vec![(true, false), (false, true)]);
    }

    #[test]
    fn commits_of_silenced_references_in_the_same_push_are_not_emailed() {
        let mut repo = Repository::new();
        let c = repo.chain(None, &["a", "vendor import", "local change"]);
        repo.set_ref("refs/heads/master", c[0]);
        let snapshot = Snapshot::load(&repo).unwrap();

        let m = RefMutation::new("refs/heads/master", Some(c[0]), Some(c[2]));
        let mut delta = resolve(&repo, &m, &snapshot, &no_patterns()).unwrap();
        assert!(delta.added.iter().all(|c| c.send_email));
        silence_reachable(&repo, &mut delta, &c[2], &[c[1]]).unwrap();
        let flags: Vec<_> = delta.added.iter().map(|c| c.send_email).collect();
        assert_eq!(flags, vec![false, true]);
    }

    #[test]
    fn resolve_is_idempotent_and_topologically_ordered() {
        let mut repo = Repository::new();
        let base = crate::memory::Repository::commit(&mut repo, "base").create();
        let left = crate::memory::Repository::commit(&mut repo, "left").parent(base).file("l", "1").create();
        let right = crate::memory::Repository::commit(&mut repo, "right").parent(base).file("r", "1").create();
        let merge = crate::memory::Repository::commit(&mut repo, "merge").parent(left).parent(right).create();
        repo.set_ref("refs/heads/master", base);
        let snapshot = Snapshot::load(&repo).unwrap();

        let m = RefMutation::new("refs/heads/master", Some(base), Some(merge));
        let first = resolve(&repo, &m, &snapshot, &no_patterns()).unwrap();
        let second = resolve(&repo, &m, &snapshot, &no_patterns()).unwrap();
        assert_eq!(first, second);

        let order = revs(&first);
        for (idx, added) in first.added.iter().enumerate() {
            for parent in added.commit.parents.as_deref().unwrap_or_default() {
                if let Some(pos) = order.iter().position(|r| r == parent) {
                    assert!(pos < idx, "parents come first");
                }
            }
        }
    }

    #[test]
    fn annotated_tags_are_peeled() {
        let mut repo = Repository::new();
        let c = repo.chain(None, &["a", "b"]);
        repo.set_ref("refs/heads/master", c[0]);
        let tag = crate::memory::Repository::tag(&mut repo, "v2", c[1], "release 2");
        let snapshot = Snapshot::load(&repo).unwrap();

        let m = RefMutation::new("refs/tags/v2", None, Some(tag));
        let delta = resolve(&repo, &m, &snapshot, &no_patterns()).unwrap();
        assert_eq!(revs(&delta), vec![c[1]]);
        assert_eq!(delta.base, Some(c[0]));
    }
}
