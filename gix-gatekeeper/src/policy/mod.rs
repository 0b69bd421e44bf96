//! Policies applied to reference updates and the commits they introduce.
//!
//! - [`ff`]: fast-forward enforcement with allow-lists.
//! - [`rh`]: revision-log checks on commit messages.
//! - [`files`]: checks on the paths new commits add.
//! - [`precommit`]: the external style checker pipeline.

pub mod ff;
pub mod files;
pub mod precommit;
pub mod rh;

pub use ff::is_fast_forward;
pub use precommit::{Checker, RecordingChecker, StyleChecker};
