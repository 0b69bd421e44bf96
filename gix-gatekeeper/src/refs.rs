//! References and the mutations a push applies to them.
//!
//! Hook input is parsed from lines of the form
//!   "<old-oid> <new-oid> <refname>"
//! as fed by git to the `pre-receive` and `post-receive` hooks, where the all-zero object id
//! denotes a reference that does not exist (yet, or anymore).

use gix_hash::ObjectId;

use crate::Error;

/// The reference holding the repository configuration, which must be pushed alone.
pub const CONFIG_REF: &str = "refs/meta/config";

/// A fully qualified reference name, split into its namespace prefix and short name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reference {
    full_name: String,
    prefix_len: usize,
}

impl Reference {
    /// Parse `full_name` into a reference.
    ///
    /// The namespace prefix is `refs/<category>/`, e.g. `refs/heads/` for `refs/heads/master`.
    /// Names outside of `refs/` have an empty prefix.
    pub fn new(full_name: impl Into<String>) -> Self {
        let full_name = full_name.into();
        let prefix_len = full_name
            .strip_prefix("refs/")
            .and_then(|rest| rest.find('/'))
            .map_or(0, |pos| "refs/".len() + pos + 1);
        Reference { full_name, prefix_len }
    }

    /// The fully qualified name, e.g. `refs/heads/master`.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// The namespace prefix, e.g. `refs/heads/`.
    pub fn namespace_prefix(&self) -> &str {
        &self.full_name[..self.prefix_len]
    }

    /// The name without its namespace prefix, e.g. `master`.
    pub fn short_name(&self) -> &str {
        &self.full_name[self.prefix_len..]
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full_name)
    }
}

/// The kind of change a mutation applies to its reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// The reference did not exist before the push.
    Create,
    /// The reference existed and keeps existing.
    Update,
    /// The reference existed and is removed.
    Delete,
}

impl ChangeKind {
    /// A lower-case verb describing the change, in past tense.
    pub fn past_tense(self) -> &'static str {
        match self {
            ChangeKind::Create => "created",
            ChangeKind::Update => "updated",
            ChangeKind::Delete => "deleted",
        }
    }

    /// A lower-case noun describing the change.
    pub fn noun(self) -> &'static str {
        match self {
            ChangeKind::Create => "creation",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "deletion",
        }
    }
}

/// A single reference update as received from the pusher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefMutation {
    /// The reference being changed.
    pub reference: Reference,
    /// The previous value, `None` if the reference did not exist.
    pub old: Option<ObjectId>,
    /// The new value, `None` if the reference is deleted.
    pub new: Option<ObjectId>,
}

impl RefMutation {
    /// Create a mutation of `name` from `old` to `new`, where `None` means "does not exist".
    pub fn new(name: impl Into<String>, old: Option<ObjectId>, new: Option<ObjectId>) -> Self {
        RefMutation {
            reference: Reference::new(name),
            old,
            new,
        }
    }

    /// The fully qualified name of the changed reference.
    pub fn name(&self) -> &str {
        self.reference.full_name()
    }

    /// Derive the change kind, or fail if neither side exists.
    pub fn change_kind(&self) -> Result<ChangeKind, Error> {
        match (self.old, self.new) {
            (None, None) => Err(Error::backend(
                format!("update of {}", self.name()),
                "deleting a reference that does not exist",
            )),
            (None, Some(_)) => Ok(ChangeKind::Create),
            (Some(_), None) => Ok(ChangeKind::Delete),
            (Some(_), Some(_)) => Ok(ChangeKind::Update),
        }
    }

    /// Format this mutation as hook input line, `<old> <new> <refname>`.
    pub fn to_hook_line(&self) -> String {
        format!("{} {} {}", hex_or_null(self.old), hex_or_null(self.new), self.name())
    }
}

/// Parse hook input from text, one `<old> <new> <refname>` triple per line.
///
/// Empty lines are ignored, the order of lines is preserved.
pub fn parse_hook_input(text: &str) -> Result<Vec<RefMutation>, Error> {
    let mut out = Vec::new();
    for raw_line in text.lines() {
        let line = raw_line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        out.push(parse_hook_line(line)?);
    }
    Ok(out)
}

/// Parse a single `<old> <new> <refname>` line.
pub fn parse_hook_line(line: &str) -> Result<RefMutation, Error> {
    let mut it = line.split_whitespace();
    let (Some(old_hex), Some(new_hex), Some(name)) = (it.next(), it.next(), it.next()) else {
        return Err(Error::backend(
            "hook input parsing",
            format!("expected '<old> <new> <refname>', got {line:?}"),
        ));
    };
    // Refnames can't contain spaces.
    if it.next().is_some() {
        return Err(Error::backend(
            "hook input parsing",
            format!("unexpected tokens after <refname> in {line:?}"),
        ));
    }
    Ok(RefMutation::new(name, parse_rev(old_hex)?, parse_rev(new_hex)?))
}

/// Decode a hex object id, mapping the all-zero id to `None`.
pub fn parse_rev(hex: &str) -> Result<Option<ObjectId>, Error> {
    let oid = ObjectId::from_hex(hex.as_bytes())
        .map_err(|e| Error::backend("hook input parsing", format!("invalid object id '{hex}': {e}")))?;
    Ok((!oid.is_null()).then_some(oid))
}

/// Hex representation of `rev`, or the all-zero id for `None`.
pub fn hex_or_null(rev: Option<ObjectId>) -> String {
    rev.unwrap_or_else(|| ObjectId::null(gix_hash::Kind::Sha1)).to_string()
}

/// The abbreviated hex representation of `rev` used in messages.
pub fn short_hex(rev: &ObjectId) -> String {
    rev.to_hex_with_len(7).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(hex40: &str) -> ObjectId {
        ObjectId::from_hex(hex40.as_bytes()).expect("valid hex")
    }

    #[test]
    fn reference_parts() {
        let r = Reference::new("refs/heads/topic/foo");
        assert_eq!(r.namespace_prefix(), "refs/heads/");
        assert_eq!(r.short_name(), "topic/foo");

        let r = Reference::new("refs/meta/config");
        assert_eq!(r.namespace_prefix(), "refs/meta/");
        assert_eq!(r.short_name(), "config");

        let r = Reference::new("HEAD");
        assert_eq!(r.namespace_prefix(), "");
        assert_eq!(r.short_name(), "HEAD");
    }

    #[test]
    fn create_update_delete_parsing() {
        let text = concat!(
            "0000000000000000000000000000000000000000 1111111111111111111111111111111111111111 refs/heads/main\n",
            "1111111111111111111111111111111111111111 2222222222222222222222222222222222222222 refs/heads/main\r\n",
            "\n",
            "2222222222222222222222222222222222222222 0000000000000000000000000000000000000000 refs/tags/v1\n",
        );
        let list = parse_hook_input(text).unwrap();
        assert_eq!(list.len(), 3);

        assert_eq!(list[0].change_kind().unwrap(), ChangeKind::Create);
        assert_eq!(list[0].new, Some(oid("1111111111111111111111111111111111111111")));
        assert_eq!(list[1].change_kind().unwrap(), ChangeKind::Update);
        assert_eq!(list[2].change_kind().unwrap(), ChangeKind::Delete);
        assert_eq!(list[2].name(), "refs/tags/v1");
    }

    #[test]
    fn both_null_is_an_error() {
        let m = RefMutation::new("refs/heads/main", None, None);
        let err = m.change_kind().unwrap_err();
        assert!(err.to_string().contains("deleting a reference that does not exist"));
    }

    #[test]
    fn invalid_lines_are_errors() {
        assert!(parse_hook_line("zzzz000000000000000000000000000000000000 1111111111111111111111111111111111111111 refs/heads/main").is_err());
        assert!(parse_hook_line("0000000000000000000000000000000000000000 refs/heads/main").is_err());
        assert!(parse_hook_line(
            "0000000000000000000000000000000000000000 1111111111111111111111111111111111111111 refs/heads/main extra"
        )
        .is_err());
    }

    #[test]
    fn hook_line_round_trip_keeps_null_sentinel() {
        let m = RefMutation::new("refs/heads/x", None, Some(oid("1111111111111111111111111111111111111111")));
        assert_eq!(
            m.to_hook_line(),
            "0000000000000000000000000000000000000000 1111111111111111111111111111111111111111 refs/heads/x"
        );
        assert_eq!(short_hex(&oid("1234567890123456789012345678901234567890")), "1234567");
    }
}
