/*!
Server-side reference update policy engine for gitoxide.

A push arrives as an ordered list of reference mutations. For each of them the engine

- classifies the mutation into a typed update variant ([`classify`]),
- resolves which commits it really adds and which it loses against the state of all other
  references before the push ([`delta`]),
- validates it with fast-forward, revision-log and pre-commit policies ([`update`], [`policy`]),
- and, once accepted, assembles cover and per-commit notification emails ([`notify`]).

Repository access goes through the [`port::Vcs`] query interface, implemented by
[`port::git::Repository`] on top of the `git` executable, and by [`memory::Repository`] for tests.

Policy declines are [`Rejection`]s and never mix with fatal [`Error`]s: operations which may
produce both return `Result<Verdict<T>, Error>`.

The push-wide entry points live in [`Gatekeeper`].
*/

#![forbid(unsafe_code)]

mod error;
pub use error::{Error, Kind, Rejection, Result, Verdict};

pub mod classify;
pub mod config;
pub mod context;
pub mod delta;
pub mod engine;
pub mod hooks;
pub mod lock;
pub mod memory;
pub mod notify;
pub mod policy;
pub mod port;
pub mod refs;
pub mod snapshot;
pub mod update;

pub use classify::UpdateVariant;
pub use config::PolicyConfig;
pub use context::PushContext;
pub use delta::{AddedCommit, CommitDelta};
pub use engine::{Gatekeeper, NotifyOutcome, PushOutcome, RefOutcome};
pub use port::Vcs;
pub use refs::{ChangeKind, RefMutation, Reference};
pub use snapshot::Snapshot;
