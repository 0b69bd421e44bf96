//! No-operation hook implementation.
//!
//! Useful for tests and for embedding the engine without administrator programs.

use super::{HookDecision, Hooks};
use crate::port::Commit;
use crate::refs::RefMutation;
use crate::Error;

/// A hook implementation that always allows operations and produces no output.
///
/// # Examples
///
/// ```rust
/// use gix_gatekeeper::hooks::{Hooks, NoopHooks};
/// use gix_gatekeeper::RefMutation;
///
/// let hooks = NoopHooks::new();
/// let decision = hooks.update(&RefMutation::new("refs/heads/main", None, None)).unwrap();
/// assert!(decision.allowed);
/// assert_eq!(decision.exit_code, Some(0));
/// assert!(decision.output.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct NoopHooks {
    _private: (),
}

impl NoopHooks {
    /// Create a new NoopHooks instance.
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl Hooks for NoopHooks {
    fn update(&self, _mutation: &RefMutation) -> Result<HookDecision, Error> {
        Ok(HookDecision::allow())
    }

    fn commit_extra_check(&self, _refname: &str, _commit: &Commit) -> Result<HookDecision, Error> {
        Ok(HookDecision::allow())
    }

    fn post_receive(&self, _mutations: &[RefMutation]) -> Result<HookDecision, Error> {
        Ok(HookDecision::allow())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gix_hash::ObjectId;

    #[test]
    fn noop_hooks_always_allow() {
        let hooks = NoopHooks::new();
        let rev = ObjectId::from_bytes_or_panic(&[1; 20]);
        let mutations = [
            RefMutation::new("refs/heads/main", None, Some(rev)),
            RefMutation::new("refs/tags/v1", Some(rev), None),
        ];
        let commit = Commit::from_message(rev, Some(vec![]), "A U Thor", "author@example.com", "subject");

        for mutation in &mutations {
            assert_eq!(hooks.update(mutation).unwrap(), HookDecision::allow());
        }
        assert_eq!(
            hooks.commit_extra_check("refs/heads/main", &commit).unwrap(),
            HookDecision::allow()
        );
        assert!(hooks.post_receive(&mutations).unwrap().allowed);
    }
}
