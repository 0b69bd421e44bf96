//! The version-control query interface consumed by the engine.
//!
//! The engine never touches repository storage itself. Everything it needs to know about
//! objects, ancestry, trees and attributes goes through [`Vcs`], which is implemented by
//! [`git::Repository`] for real repositories and by [`crate::memory::Repository`] for tests.
//!
//! All revisions are explicit object ids: reachability questions are answered relative to the
//! revisions the caller passes in, never relative to the references currently stored in the
//! repository. This is what lets the engine reason about pre-push state while refs are being
//! updated underneath it.

use std::collections::BTreeMap;

use gix_hash::ObjectId;

use crate::Error;

pub mod git;

/// The object kind as reported by the backend.
pub use gix_object::Kind as ObjectKind;

/// The mode of tree entries referring to submodule commits.
pub const GITLINK_MODE: u32 = 0o160000;

/// Commit metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// The commit id.
    pub rev: ObjectId,
    /// Parent commits, first parent first. `None` until resolved, `Some(vec![])` for root commits.
    pub parents: Option<Vec<ObjectId>>,
    /// Author name.
    pub author_name: String,
    /// Author email.
    pub author_email: String,
    /// The first line of the message.
    pub subject: String,
    /// All lines of the message after the subject, including the separating blank line if present.
    pub body_lines: Vec<String>,
}

impl Commit {
    /// Build commit metadata from its full `message`, splitting it into subject and body.
    pub fn from_message(
        rev: ObjectId,
        parents: Option<Vec<ObjectId>>,
        author_name: impl Into<String>,
        author_email: impl Into<String>,
        message: &str,
    ) -> Self {
        let mut lines = message.trim_end_matches('\n').split('\n').map(|l| l.trim_end_matches('\r'));
        let subject = lines.next().unwrap_or_default().to_owned();
        let body_lines = lines.map(ToOwned::to_owned).collect();
        Commit {
            rev,
            parents,
            author_name: author_name.into(),
            author_email: author_email.into(),
            subject,
            body_lines,
        }
    }

    /// The full message, subject and body lines joined by newlines.
    pub fn message(&self) -> String {
        std::iter::once(self.subject.as_str())
            .chain(self.body_lines.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The first parent if parents were resolved and the commit isn't a root commit.
    pub fn first_parent(&self) -> Option<&ObjectId> {
        self.parents.as_ref().and_then(|p| p.first())
    }

    /// True if parents were resolved and there is more than one.
    pub fn is_merge(&self) -> bool {
        self.parents.as_ref().is_some_and(|p| p.len() > 1)
    }

    /// `Name <email>` of the author.
    pub fn author(&self) -> String {
        format!("{} <{}>", self.author_name, self.author_email)
    }
}

/// Metadata of an annotated tag object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// The id of the tag object itself.
    pub rev: ObjectId,
    /// The object the tag points to.
    pub target: ObjectId,
    /// The kind of object the tag points to.
    pub target_kind: ObjectKind,
    /// The tag name as recorded in the tag object.
    pub name: String,
    /// The tag message.
    pub message: String,
}

/// The status of a path in a tree comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeStatus {
    /// The path was inserted.
    Added,
    /// The path was removed.
    Deleted,
    /// The content or mode of the path changed.
    Modified,
    /// The path changed its type, e.g. from file to symlink.
    TypeChanged,
}

impl ChangeStatus {
    /// Decode the status letter of `git diff-tree --raw` output.
    pub fn from_letter(letter: u8) -> Option<Self> {
        Some(match letter {
            b'A' => ChangeStatus::Added,
            b'D' => ChangeStatus::Deleted,
            b'M' => ChangeStatus::Modified,
            b'T' => ChangeStatus::TypeChanged,
            _ => return None,
        })
    }

    /// The status letter as used by `git diff-tree --raw`.
    pub fn letter(self) -> char {
        match self {
            ChangeStatus::Added => 'A',
            ChangeStatus::Deleted => 'D',
            ChangeStatus::Modified => 'M',
            ChangeStatus::TypeChanged => 'T',
        }
    }
}

/// A single path changed between two trees. Renames are reported as deletion plus addition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// The path relative to the repository root.
    pub path: String,
    /// What happened to the path.
    pub status: ChangeStatus,
    /// The mode of the path after the change, `0` for deletions.
    pub new_mode: u32,
}

impl FileChange {
    /// True if the path refers to a submodule commit.
    pub fn is_submodule(&self) -> bool {
        self.new_mode == GITLINK_MODE
    }
}

/// The state of an attribute for a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeState {
    /// The attribute is set, e.g. `path attr`.
    Set,
    /// The attribute is explicitly unset, e.g. `path -attr`.
    Unset,
    /// The attribute has a value, e.g. `path attr=value`.
    Value(String),
    /// No attribute file mentions the attribute for this path.
    Unspecified,
}

impl AttributeState {
    /// True if the attribute is set, or set to a value which isn't `false`.
    pub fn is_set(&self) -> bool {
        match self {
            AttributeState::Set => true,
            AttributeState::Value(v) => v != "false",
            AttributeState::Unset | AttributeState::Unspecified => false,
        }
    }
}

/// Queries the engine needs to answer about a repository.
///
/// Implementations must be consistent for the duration of one push: the same question asked
/// twice yields the same answer.
pub trait Vcs {
    /// All references and the objects they point to, symbolic references excluded.
    fn references(&self) -> Result<BTreeMap<String, ObjectId>, Error>;

    /// The kind of the object `rev`.
    fn object_kind(&self, rev: &ObjectId) -> Result<ObjectKind, Error>;

    /// All commits reachable from any of `include` but from none of `exclude`, parents before
    /// children. Tags are peeled to the commits they point to.
    fn rev_list(&self, include: &[ObjectId], exclude: &[ObjectId]) -> Result<Vec<ObjectId>, Error>;

    /// Metadata of the commit `rev`, with parents resolved.
    fn commit(&self, rev: &ObjectId) -> Result<Commit, Error>;

    /// Metadata of the annotated tag object `rev`.
    fn tag(&self, rev: &ObjectId) -> Result<Tag, Error>;

    /// The paths changed between `base` and `rev`. A `base` of `None` compares against the
    /// empty tree.
    fn changes(&self, base: Option<&ObjectId>, rev: &ObjectId) -> Result<Vec<FileChange>, Error>;

    /// A human-readable patch between `base` and `rev`, preceded by a diffstat.
    fn diff_text(&self, base: Option<&ObjectId>, rev: &ObjectId) -> Result<String, Error>;

    /// All file paths in the tree of `rev`.
    fn files(&self, rev: &ObjectId) -> Result<Vec<String>, Error>;

    /// The content of `path` in the tree of `rev`, or `None` if there is no such file.
    fn read_file(&self, rev: &ObjectId, path: &str) -> Result<Option<Vec<u8>>, Error>;

    /// The state of `attribute` for each of `paths`, as defined by the attribute files in the
    /// tree of `rev`.
    fn attributes(
        &self,
        rev: &ObjectId,
        attribute: &str,
        paths: &[String],
    ) -> Result<BTreeMap<String, AttributeState>, Error>;
}

/// Peel `rev` to a commit if it is an annotated tag, following chains of tags.
pub fn peel_to_commit(vcs: &(impl Vcs + ?Sized), rev: &ObjectId) -> Result<Option<ObjectId>, Error> {
    let mut current = *rev;
    loop {
        match vcs.object_kind(&current)? {
            ObjectKind::Commit => return Ok(Some(current)),
            ObjectKind::Tag => current = vcs.tag(&current)?.target,
            ObjectKind::Tree | ObjectKind::Blob => return Ok(None),
        }
    }
}
