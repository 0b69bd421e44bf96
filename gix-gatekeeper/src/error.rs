//! Error handling for reference update validation.
//!
//! Two families of outcomes are kept strictly apart:
//!
//! - [`Rejection`]: a policy decline. It always carries a human-readable, possibly
//!   multi-line explanation and can be fixed by the pusher amending the push.
//! - [`Error`]: a fatal condition (configuration, backend, lock, I/O) which aborts the
//!   whole hook invocation.
//!
//! Operations that may do both return `Result<Verdict<T>, Error>`, so that a backend
//! outage can never be mistaken for a policy decision.

use std::fmt;

/// Stable high-level error classification for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// A configuration option was malformed, or a push-wide configuration rule was violated.
    Configuration,
    /// The version-control backend or a required subprocess failed or returned an unexpected shape.
    Backend,
    /// Another push holds the repository lock.
    Busy,
    /// Filesystem or OS interaction failed.
    Io,
}

impl Kind {
    /// Returns true if retrying the same push later may succeed without changes.
    pub fn is_temporary(self) -> bool {
        matches!(self, Kind::Busy | Kind::Io)
    }
}

/// Fatal errors which abort the push (or the hook invocation) entirely.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A configuration option has an invalid value.
    #[error("invalid configuration option {key}={value:?}: {message}")]
    Configuration {
        /// The fully qualified option name, e.g. `hooks.max-commit-emails`.
        key: String,
        /// The offending raw value.
        value: String,
        /// Why the value was refused.
        message: String,
    },
    /// The configuration reference was pushed together with other references.
    #[error("{config_ref} must be pushed alone, but this push also updates: {}", others.join(", "))]
    ConfigRefNotAlone {
        /// The configuration reference name.
        config_ref: String,
        /// All other references of the same push.
        others: Vec<String>,
    },
    /// The version-control backend failed.
    #[error("{operation} failed: {message}")]
    Backend {
        /// What was attempted, e.g. `git rev-list`.
        operation: String,
        /// Diagnostic output of the failure.
        message: String,
    },
    /// The repository is locked by a concurrent push.
    #[error("another push is currently being processed ({path}), please retry later")]
    Busy {
        /// The lock that could not be acquired.
        path: String,
    },
    /// I/O errors from filesystem or OS interactions.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Fast classification helper returning a stable error kind.
    pub fn kind(&self) -> Kind {
        match self {
            Error::Configuration { .. } | Error::ConfigRefNotAlone { .. } => Kind::Configuration,
            Error::Backend { .. } => Kind::Backend,
            Error::Busy { .. } => Kind::Busy,
            Error::Io(_) => Kind::Io,
        }
    }

    /// Create a configuration error for `key` holding `value`.
    pub fn configuration(key: impl Into<String>, value: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::Configuration {
            key: key.into(),
            value: value.into(),
            message: message.to_string(),
        }
    }

    /// Create a backend error for the given `operation`.
    pub fn backend(operation: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::Backend {
            operation: operation.into(),
            message: message.to_string(),
        }
    }
}

/// A policy decline for a single reference update.
///
/// The explanation is shown verbatim to the pusher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct Rejection {
    reason: String,
}

impl Rejection {
    /// Create a rejection with the given explanation.
    pub fn new(reason: impl Into<String>) -> Self {
        Rejection { reason: reason.into() }
    }

    /// Create a rejection from individual lines of explanation.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let reason = lines
            .into_iter()
            .map(|line| line.as_ref().to_owned())
            .collect::<Vec<_>>()
            .join("\n");
        Rejection { reason }
    }

    /// The full explanation.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Append further explanation, separated by a newline.
    pub fn with_note(mut self, note: impl AsRef<str>) -> Self {
        if !self.reason.is_empty() {
            self.reason.push('\n');
        }
        self.reason.push_str(note.as_ref());
        self
    }
}

/// The outcome of a policy decision: the accepted value, or a [`Rejection`].
pub type Verdict<T = ()> = std::result::Result<T, Rejection>;

/// Result type alias for operations that can fail fatally.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Evaluate a `Result<Verdict<T>, Error>` expression, returning early from the enclosing function
/// with `Ok(Err(rejection))` on a policy decline, and with `Err(..)` on a fatal error.
#[macro_export]
macro_rules! verdict {
    ($e:expr) => {
        match $e? {
            Ok(value) => value,
            Err(rejection) => return Ok(Err(rejection)),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(Error::configuration("hooks.debug-level", "7", "out of range").kind(), Kind::Configuration);
        assert_eq!(Error::backend("git rev-list", "boom").kind(), Kind::Backend);
        assert_eq!(
            Error::Busy {
                path: "repo.git/gatekeeper.lock".into()
            }
            .kind(),
            Kind::Busy
        );
        assert!(Kind::Busy.is_temporary());
        assert!(!Kind::Configuration.is_temporary());
    }

    #[test]
    fn configuration_error_names_key_and_value() {
        let err = Error::configuration("hooks.debug-level", "7", "must be between 0 and 2");
        let msg = err.to_string();
        assert!(msg.contains("hooks.debug-level"));
        assert!(msg.contains("\"7\""));
    }

    #[test]
    fn config_ref_error_names_all_references() {
        let err = Error::ConfigRefNotAlone {
            config_ref: "refs/meta/config".into(),
            others: vec!["refs/heads/master".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("refs/meta/config"));
        assert!(msg.contains("refs/heads/master"));
    }

    #[test]
    fn rejection_lines_and_notes() {
        let r = Rejection::from_lines(["first", "second"]).with_note("third");
        assert_eq!(r.reason(), "first\nsecond\nthird");
        assert_eq!(r.to_string(), r.reason());
    }

    #[test]
    fn verdict_macro_short_circuits_rejections() {
        fn inner(reject: bool) -> Result<Verdict<u8>> {
            if reject {
                Ok(Err(Rejection::new("no")))
            } else {
                Ok(Ok(1))
            }
        }
        fn outer(reject: bool) -> Result<Verdict<u8>> {
            let v = verdict!(inner(reject));
            Ok(Ok(v + 1))
        }
        assert_eq!(outer(false).unwrap(), Ok(2));
        assert_eq!(outer(true).unwrap(), Err(Rejection::new("no")));
    }
}
