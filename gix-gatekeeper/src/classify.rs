//! Classification of reference mutations into update variants.
//!
//! The dispatch table is an ordered list of `(namespace, change kind, object kind) -> category`
//! entries. The first matching entry wins, so when administrators register overlapping
//! namespaces the earlier one governs. Standard namespaces come first, followed by the
//! configured ones, then notes and the configuration reference.

use std::fmt;

use regex::Regex;

use crate::config::NamespaceConfig;
use crate::port::{ObjectKind, Vcs};
use crate::refs::{ChangeKind, RefMutation, CONFIG_REF};
use crate::{Error, Rejection, Verdict};

/// The standard branch namespace.
pub const STANDARD_BRANCH_NAMESPACE: &str = "refs/heads/.+";
/// The standard tag namespace.
pub const STANDARD_TAG_NAMESPACE: &str = "refs/tags/.+";
/// The notes namespace.
pub const NOTES_NAMESPACE: &str = "refs/notes/.+";

/// What kind of reference an update touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// A branch pointing to a commit.
    Branch,
    /// A tag pointing to an annotated tag object.
    AnnotatedTag,
    /// A tag pointing directly to a commit.
    LightweightTag,
    /// A notes reference pointing to a notes commit.
    Notes,
}

impl Category {
    /// The family this category is listed under in diagnostics.
    pub fn family(self) -> Family {
        match self {
            Category::Branch => Family::Branch,
            Category::AnnotatedTag | Category::LightweightTag => Family::Tag,
            Category::Notes => Family::Notes,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Category::Branch => "branch",
            Category::AnnotatedTag => "annotated tag",
            Category::LightweightTag => "lightweight tag",
            Category::Notes => "notes",
        }
    }
}

/// Namespace families, in the order they are listed in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    /// Branch namespaces.
    Branch,
    /// Notes namespaces.
    Notes,
    /// Tag namespaces.
    Tag,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Family::Branch => "branch",
            Family::Notes => "notes",
            Family::Tag => "tag",
        })
    }
}

/// The typed update a reference mutation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UpdateVariant {
    /// The kind of reference.
    pub category: Category,
    /// The kind of change.
    pub change: ChangeKind,
}

impl fmt::Display for UpdateVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.category.describe(), self.change.noun())
    }
}

#[derive(Debug, Clone)]
struct Entry {
    namespace: String,
    regex: Regex,
    change: Option<ChangeKind>,
    object_kind: ObjectKind,
    category: Category,
}

/// The outcome of a table lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// An entry matched.
    Variant(UpdateVariant),
    /// A namespace matched, but no entry accepts the change or object kind.
    Unsupported,
    /// No namespace matched.
    Unrecognized,
}

/// The reference classifier, built from the configured namespaces.
#[derive(Debug, Clone)]
pub struct Classifier {
    entries: Vec<Entry>,
}

impl Classifier {
    /// Build the dispatch table from `namespaces`.
    pub fn new(namespaces: &NamespaceConfig) -> Result<Self, Error> {
        let mut entries = Vec::new();
        let mut add = |key: &str, source: &str, object_kind: ObjectKind, category: Category| -> Result<(), Error> {
            let regex = Regex::new(&format!("^(?:{source})$")).map_err(|err| Error::configuration(key, source, err))?;
            entries.push(Entry {
                namespace: source.to_owned(),
                regex,
                change: None,
                object_kind,
                category,
            });
            Ok(())
        };

        let branches = namespaces
            .use_standard_branch
            .then_some(STANDARD_BRANCH_NAMESPACE)
            .into_iter()
            .chain(namespaces.branch.sources());
        for source in branches {
            add("hooks.branch-ref-namespace", source, ObjectKind::Commit, Category::Branch)?;
        }
        let tags = namespaces
            .use_standard_tag
            .then_some(STANDARD_TAG_NAMESPACE)
            .into_iter()
            .chain(namespaces.tag.sources());
        for source in tags {
            add("hooks.tag-ref-namespace", source, ObjectKind::Tag, Category::AnnotatedTag)?;
            add("hooks.tag-ref-namespace", source, ObjectKind::Commit, Category::LightweightTag)?;
        }
        add("notes", NOTES_NAMESPACE, ObjectKind::Commit, Category::Notes)?;
        add("config", CONFIG_REF, ObjectKind::Commit, Category::Branch)?;
        Ok(Classifier { entries })
    }

    /// Look up the variant for an update of `refname` to or from an object of `object_kind`.
    pub fn lookup(&self, refname: &str, change: ChangeKind, object_kind: ObjectKind) -> Lookup {
        let mut namespace_matched = false;
        for entry in self.entries.iter().filter(|e| e.regex.is_match(refname)) {
            namespace_matched = true;
            if entry.object_kind == object_kind && entry.change.map_or(true, |c| c == change) {
                return Lookup::Variant(UpdateVariant {
                    category: entry.category,
                    change,
                });
            }
        }
        if namespace_matched {
            Lookup::Unsupported
        } else {
            Lookup::Unrecognized
        }
    }

    /// All registered namespaces grouped by family, in table order and without duplicates.
    pub fn namespaces(&self) -> Vec<(Family, Vec<&str>)> {
        let mut out: Vec<(Family, Vec<&str>)> = Vec::new();
        for family in [Family::Branch, Family::Notes, Family::Tag] {
            let mut names: Vec<&str> = Vec::new();
            for entry in self.entries.iter().filter(|e| e.category.family() == family) {
                let name = entry.namespace.as_str();
                if !names.contains(&name) {
                    names.push(name);
                }
            }
            out.push((family, names));
        }
        out
    }

    /// Classify `mutation`, querying `vcs` for the kind of object involved.
    ///
    /// The object kind is the one of the new value, or of the old value for deletions.
    pub fn classify(&self, vcs: &(impl Vcs + ?Sized), mutation: &RefMutation) -> Result<Verdict<UpdateVariant>, Error> {
        let change = mutation.change_kind()?;
        let rev = match change {
            ChangeKind::Delete => mutation.old,
            ChangeKind::Create | ChangeKind::Update => mutation.new,
        };
        let Some(rev) = rev else {
            return Err(Error::backend("classification", format!("no revision for {}", mutation.name())));
        };
        let object_kind = vcs.object_kind(&rev)?;
        Ok(match self.lookup(mutation.name(), change, object_kind) {
            Lookup::Variant(variant) => {
                tracing::debug!(refname = mutation.name(), %variant, "classified");
                Ok(variant)
            }
            Lookup::Unsupported => Err(Rejection::new(format!(
                "unsupported {} of {} pointing to a {object_kind} object",
                change.noun(),
                mutation.name(),
            ))),
            Lookup::Unrecognized => Err(self.unrecognized(mutation.name())),
        })
    }

    fn unrecognized(&self, refname: &str) -> Rejection {
        let mut lines = vec![
            format!("invalid reference name: {refname}"),
            String::new(),
            "The reference namespaces recognized by this repository are:".to_owned(),
        ];
        for (family, names) in self.namespaces() {
            if names.is_empty() {
                continue;
            }
            lines.push(format!("  {family} namespaces:"));
            lines.extend(names.into_iter().map(|n| format!("    {n}")));
        }
        Rejection::from_lines(lines)
    }
}
