//! Administrator-provided programs run around reference updates.
//!
//! - `update`: runs per reference after the built-in policies accepted it, may reject it.
//! - `commit_extra_check`: runs per new commit, may reject the reference update.
//! - `post_receive`: runs once after notifications were sent, can't reject anything.
//!
//! [`ExternalHooks`] runs the configured programs, [`NoopHooks`] allows everything, and tests
//! may substitute their own [`Hooks`].

use crate::port::Commit;
use crate::refs::RefMutation;
use crate::{Error, Rejection, Verdict};

pub mod env;
pub mod external;
mod noop;

pub use external::{ExternalHooks, HookPaths, Invocation, Output};
pub use noop::NoopHooks;

/// Result of a hook execution indicating whether to allow or deny the operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookDecision {
    /// Whether the hook allows the operation to proceed.
    pub allowed: bool,
    /// Exit code of the hook process, if one ran.
    pub exit_code: Option<i32>,
    /// Combined output of the hook.
    pub output: String,
}

impl HookDecision {
    /// Create a decision that allows the operation.
    pub fn allow() -> Self {
        Self::allow_with_output(String::new())
    }

    /// Create a decision that allows the operation, with `output` to show as warning.
    pub fn allow_with_output(output: impl Into<String>) -> Self {
        Self {
            allowed: true,
            exit_code: Some(0),
            output: output.into(),
        }
    }

    /// Create a decision that denies the operation.
    pub fn deny(output: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self {
            allowed: false,
            exit_code,
            output: output.into(),
        }
    }

    /// Turn this decision into a verdict, with any output of an allowing hook as warning.
    ///
    /// `what` names the rejected entity for the rejection message.
    pub fn into_verdict(self, what: &str) -> Verdict<Option<String>> {
        if self.allowed {
            return Ok((!self.output.is_empty()).then_some(self.output));
        }
        let mut rejection = Rejection::new(format!(
            "{what} rejected by hook (exit code {})",
            self.exit_code.map_or_else(|| "none".to_owned(), |c| c.to_string())
        ));
        if !self.output.is_empty() {
            rejection = rejection.with_note(self.output);
        }
        Err(rejection)
    }
}

/// The hook seam of the engine.
pub trait Hooks {
    /// Decide about a single reference update.
    fn update(&self, mutation: &RefMutation) -> Result<HookDecision, Error>;

    /// Decide about a single commit newly introduced by an update of `refname`.
    fn commit_extra_check(&self, refname: &str, commit: &Commit) -> Result<HookDecision, Error>;

    /// Run after the whole push was accepted and notifications were sent.
    fn post_receive(&self, mutations: &[RefMutation]) -> Result<HookDecision, Error>;
}

impl<H: Hooks + ?Sized> Hooks for &H {
    fn update(&self, mutation: &RefMutation) -> Result<HookDecision, Error> {
        (**self).update(mutation)
    }

    fn commit_extra_check(&self, refname: &str, commit: &Commit) -> Result<HookDecision, Error> {
        (**self).commit_extra_check(refname, commit)
    }

    fn post_receive(&self, mutations: &[RefMutation]) -> Result<HookDecision, Error> {
        (**self).post_receive(mutations)
    }
}
