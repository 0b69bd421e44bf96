//! Fast-forward policy.
//!
//! An update is a fast-forward if every commit reachable from the old value remains reachable
//! from the new one. Other updates are accepted only for references matching the configured
//! allow-list or the built-in one, and even then surface a warning.

use gix_hash::ObjectId;

use crate::config::RefPatterns;
use crate::port::Vcs;
use crate::refs::{short_hex, Reference};
use crate::{Error, Rejection, Verdict};

/// References which may always be rewritten.
pub const BUILTIN_ALLOW_NON_FAST_FORWARD: &[&str] = &["refs/heads/topic/.+"];

/// Check if `new` is a fast-forward of `old`.
///
/// `old == new` is trivially a fast-forward.
pub fn is_fast_forward(vcs: &(impl Vcs + ?Sized), old: &ObjectId, new: &ObjectId) -> Result<bool, Error> {
    if old == new {
        return Ok(true);
    }
    Ok(vcs.rev_list(&[*old], &[*new])?.is_empty())
}

/// Decide whether updating `reference` from `old` to `new` is acceptable.
///
/// Fast-forwards pass without consulting `allowed`. Allowed non-fast-forward updates pass with
/// a warning. If `short_name_hint` is set, a rejection also tells whether the short name of the
/// reference would have matched `allowed`, which indicates configuration written for short names.
pub fn check(
    vcs: &(impl Vcs + ?Sized),
    reference: &Reference,
    old: &ObjectId,
    new: &ObjectId,
    allowed: &RefPatterns,
    short_name_hint: bool,
) -> Result<Verdict<Option<String>>, Error> {
    if is_fast_forward(vcs, old, new)? {
        return Ok(Ok(None));
    }
    let name = reference.full_name();
    let builtin = RefPatterns::new("built-in", BUILTIN_ALLOW_NON_FAST_FORWARD)?;
    if let Some(pattern) = allowed.first_match(name).or_else(|| builtin.first_match(name)) {
        tracing::debug!(refname = name, pattern, "non-fast-forward update allowed");
        return Ok(Ok(Some(format!(
            "*** Non-fast-forward update of {name} ({} -> {}), allowed by '{pattern}'.\n\
             *** Commits which were on {name} before may have been discarded.",
            short_hex(old),
            short_hex(new)
        ))));
    }

    let mut rejection = Rejection::from_lines([
        format!(
            "Non-fast-forward updates are not allowed for {name} ({} -> {}).",
            short_hex(old),
            short_hex(new)
        ),
        "Please rebase your changes on top of the current value of the reference,".to_owned(),
        "and then try pushing again.".to_owned(),
    ]);
    if short_name_hint {
        if let Some(pattern) = allowed.first_match(reference.short_name()) {
            rejection = rejection.with_note(format!(
                "Note: hooks.allow-non-fast-forward pattern '{pattern}' matches the short name '{}'.\n\
                 Patterns are matched against full reference names such as '{name}', \
                 the configuration is likely out of date.",
                reference.short_name()
            ));
        }
    }
    Ok(Err(rejection))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Repository;

    fn setup() -> (Repository, Vec<ObjectId>, ObjectId) {
        let mut repo = Repository::new();
        let c = repo.chain(None, &["a", "b", "c"]);
        let rewritten = crate::memory::Repository::commit(&mut repo, "b'").parent(c[0]).file("b'", "x").create();
        (repo, c, rewritten)
    }

    #[test]
    fn descendants_are_fast_forwards_without_consulting_the_allow_list() {
        let (repo, c, _) = setup();
        let r = Reference::new("refs/heads/master");
        assert!(is_fast_forward(&repo, &c[0], &c[2]).unwrap());
        assert!(is_fast_forward(&repo, &c[1], &c[1]).unwrap());
        assert_eq!(check(&repo, &r, &c[0], &c[2], &RefPatterns::default(), true).unwrap(), Ok(None));
    }

    #[test]
    fn rejection_names_both_revisions() {
        let (repo, c, rewritten) = setup();
        let r = Reference::new("refs/heads/master");
        let rejection = check(&repo, &r, &c[2], &rewritten, &RefPatterns::default(), true)
            .unwrap()
            .unwrap_err();
        assert!(rejection.reason().contains(&short_hex(&c[2])));
        assert!(rejection.reason().contains(&short_hex(&rewritten)));
        assert!(!rejection.reason().contains("Note:"));
    }

    #[test]
    fn allow_lists_permit_with_a_warning() {
        let (repo, c, rewritten) = setup();
        let allowed = RefPatterns::new("hooks.allow-non-fast-forward", ["refs/heads/sandbox/.*"]).unwrap();
        for name in ["refs/heads/sandbox/x", "refs/heads/topic/y"] {
            let warning = check(&repo, &Reference::new(name), &c[2], &rewritten, &allowed, true)
                .unwrap()
                .unwrap()
                .unwrap();
            assert!(warning.contains("Non-fast-forward update"));
        }
    }

    #[test]
    fn short_name_matches_produce_a_hint_when_enabled() {
        let (repo, c, rewritten) = setup();
        let allowed = RefPatterns::new("hooks.allow-non-fast-forward", ["master"]).unwrap();
        let r = Reference::new("refs/heads/master");

        let rejection = check(&repo, &r, &c[2], &rewritten, &allowed, true).unwrap().unwrap_err();
        assert!(rejection.reason().contains("matches the short name 'master'"));

        let rejection = check(&repo, &r, &c[2], &rewritten, &allowed, false).unwrap().unwrap_err();
        assert!(!rejection.reason().contains("short name"));
    }
}
