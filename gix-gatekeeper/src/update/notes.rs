//! Rules for notes references.

use crate::classify::UpdateVariant;
use crate::policy::ff;
use crate::port::Vcs;
use crate::refs::{short_hex, ChangeKind, RefMutation};
use crate::{Error, Rejection, Verdict};

/// Validate a notes `mutation`: notes may only be created and fast-forwarded.
pub fn validate(
    vcs: &(impl Vcs + ?Sized),
    variant: UpdateVariant,
    mutation: &RefMutation,
) -> Result<Verdict<Option<String>>, Error> {
    let refname = mutation.name();
    match (variant.change, mutation.old, mutation.new) {
        (ChangeKind::Delete, _, _) => Ok(Err(Rejection::new(format!(
            "Deleting the notes reference {refname} is not allowed."
        )))),
        (ChangeKind::Update, Some(old), Some(new)) if !ff::is_fast_forward(vcs, &old, &new)? => {
            Ok(Err(Rejection::from_lines([
                format!(
                    "Non-fast-forward updates of notes are not allowed ({refname}: {} -> {}).",
                    short_hex(&old),
                    short_hex(&new)
                ),
                "Please fetch the notes, add yours on top, and push again.".to_owned(),
            ])))
        }
        _ => Ok(Ok(None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Category;
    use crate::memory::Repository;

    fn variant(change: ChangeKind) -> UpdateVariant {
        UpdateVariant {
            category: Category::Notes,
            change,
        }
    }

    #[test]
    fn notes_can_only_grow() {
        let mut repo = Repository::new();
        let c = repo.chain(None, &["n1", "n2"]);
        let rewritten = crate::memory::Repository::commit(&mut repo, "n2'").parent(c[0]).create();
        let name = "refs/notes/commits";

        let ff = RefMutation::new(name, Some(c[0]), Some(c[1]));
        assert_eq!(validate(&repo, variant(ChangeKind::Update), &ff).unwrap(), Ok(None));

        let nff = RefMutation::new(name, Some(c[1]), Some(rewritten));
        let rejection = validate(&repo, variant(ChangeKind::Update), &nff).unwrap().unwrap_err();
        assert!(rejection.reason().contains(&short_hex(&rewritten)));

        let delete = RefMutation::new(name, Some(c[1]), None);
        assert!(validate(&repo, variant(ChangeKind::Delete), &delete).unwrap().is_err());
    }
}
