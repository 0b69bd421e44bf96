//! An in-memory, rollback-capable view of what every reference points to.
//!
//! During a push the snapshot is rolled back to the pre-push state before each reference is
//! processed, and advanced to the new value of that reference once it was processed, whatever
//! the outcome. Delta computations therefore always see the repository as it was before the
//! push, no matter how many references were handled already.

use std::collections::BTreeMap;

use gix_hash::ObjectId;

use crate::port::Vcs;
use crate::refs::RefMutation;
use crate::Error;

/// What each reference points to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    refs: BTreeMap<String, ObjectId>,
}

impl Snapshot {
    /// Create a snapshot from known reference values.
    pub fn new(refs: BTreeMap<String, ObjectId>) -> Self {
        Snapshot { refs }
    }

    /// Capture all references of `vcs`.
    pub fn load(vcs: &(impl Vcs + ?Sized)) -> Result<Self, Error> {
        Ok(Snapshot::new(vcs.references()?))
    }

    /// Reset every reference touched by `mutations` to its value before the push.
    pub fn rollback(&mut self, mutations: &[RefMutation]) {
        for mutation in mutations {
            self.set(mutation.name(), mutation.old);
        }
    }

    /// Move the reference of `mutation` to its new value.
    pub fn advance(&mut self, mutation: &RefMutation) {
        self.set(mutation.name(), mutation.new);
    }

    fn set(&mut self, name: &str, value: Option<ObjectId>) {
        match value {
            Some(rev) => self.refs.insert(name.to_owned(), rev),
            None => self.refs.remove(name),
        };
    }

    /// The current value of `name`.
    pub fn get(&self, name: &str) -> Option<&ObjectId> {
        self.refs.get(name)
    }

    /// True if `name` currently exists.
    pub fn contains(&self, name: &str) -> bool {
        self.refs.contains_key(name)
    }

    /// All references and their values, ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ObjectId)> {
        self.refs.iter().map(|(name, rev)| (name.as_str(), rev))
    }

    /// The values of all references except `name` for which `filter` returns true.
    pub fn revs_except(&self, name: &str, mut filter: impl FnMut(&str) -> bool) -> Vec<ObjectId> {
        self.iter()
            .filter(|(other, _)| *other != name && filter(other))
            .map(|(_, rev)| *rev)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(n: u8) -> ObjectId {
        ObjectId::from_bytes_or_panic(&[n; 20])
    }

    #[test]
    fn rollback_restores_pre_push_state_and_advance_applies_one() {
        let mut snapshot = Snapshot::new(
            [
                ("refs/heads/a".to_owned(), oid(2)),
                ("refs/heads/new".to_owned(), oid(3)),
            ]
            .into(),
        );
        let mutations = [
            RefMutation::new("refs/heads/a", Some(oid(1)), Some(oid(2))),
            RefMutation::new("refs/heads/new", None, Some(oid(3))),
            RefMutation::new("refs/heads/gone", Some(oid(4)), None),
        ];

        snapshot.rollback(&mutations);
        assert_eq!(snapshot.get("refs/heads/a"), Some(&oid(1)));
        assert!(!snapshot.contains("refs/heads/new"));
        assert_eq!(snapshot.get("refs/heads/gone"), Some(&oid(4)));

        snapshot.advance(&mutations[2]);
        assert!(!snapshot.contains("refs/heads/gone"));

        snapshot.rollback(&mutations);
        assert!(snapshot.contains("refs/heads/gone"));
    }

    #[test]
    fn revs_except_skips_the_reference_itself() {
        let snapshot = Snapshot::new(
            [
                ("refs/heads/a".to_owned(), oid(1)),
                ("refs/heads/b".to_owned(), oid(2)),
                ("refs/tags/t".to_owned(), oid(3)),
            ]
            .into(),
        );
        assert_eq!(snapshot.revs_except("refs/heads/a", |_| true), vec![oid(2), oid(3)]);
        assert_eq!(
            snapshot.revs_except("refs/heads/a", |n| n.starts_with("refs/tags/")),
            vec![oid(3)]
        );
    }
}
