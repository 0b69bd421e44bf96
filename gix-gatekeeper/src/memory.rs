//! An in-memory repository implementing [`Vcs`], for tests and experiments.
//!
//! Object ids are handed out sequentially, so the same sequence of construction calls always
//! yields the same ids. Trees are flat maps from path to file, and each commit inherits the
//! tree of its first parent unless told otherwise.
//!
//! ```
//! use gix_gatekeeper::{memory::Repository, Vcs};
//!
//! let mut repo = Repository::new();
//! let a = Repository::commit(&mut repo, "initial").file("README", "hello\n").create();
//! let b = Repository::commit(&mut repo, "second").parent(a).file("README", "hello world\n").create();
//! repo.set_ref("refs/heads/master", b);
//!
//! assert_eq!(repo.rev_list(&[b], &[a]).unwrap(), vec![b]);
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use bstr::ByteSlice;
use gix_hash::ObjectId;

use crate::port::{AttributeState, ChangeStatus, Commit, FileChange, ObjectKind, Tag, Vcs, GITLINK_MODE};
use crate::refs::RefMutation;
use crate::Error;

const FILE_MODE: u32 = 0o100644;

#[derive(Debug, Clone, PartialEq, Eq)]
struct File {
    mode: u32,
    content: Vec<u8>,
}

type Tree = BTreeMap<String, File>;

#[derive(Debug, Clone)]
enum Object {
    Commit { commit: Commit, tree: Tree },
    Tag(Tag),
    Blob,
}

/// An in-memory repository.
#[derive(Debug, Clone, Default)]
pub struct Repository {
    refs: BTreeMap<String, ObjectId>,
    objects: HashMap<ObjectId, Object>,
    next_id: u64,
}

/// Builds a commit, see [`Repository::commit()`].
#[must_use = "call create() to store the commit"]
pub struct CommitBuilder<'a> {
    repo: &'a mut Repository,
    message: String,
    parents: Vec<ObjectId>,
    author: (String, String),
    changes: Vec<(String, Option<File>)>,
}

impl CommitBuilder<'_> {
    /// Add `parent`, the first call sets the first parent.
    pub fn parent(mut self, parent: ObjectId) -> Self {
        self.parents.push(parent);
        self
    }

    /// Set the author.
    pub fn author(mut self, name: &str, email: &str) -> Self {
        self.author = (name.into(), email.into());
        self
    }

    /// Write `content` to `path`.
    pub fn file(mut self, path: &str, content: impl AsRef<[u8]>) -> Self {
        self.changes.push((
            path.into(),
            Some(File {
                mode: FILE_MODE,
                content: content.as_ref().to_vec(),
            }),
        ));
        self
    }

    /// Record a submodule at `path`.
    pub fn gitlink(mut self, path: &str) -> Self {
        self.changes.push((
            path.into(),
            Some(File {
                mode: GITLINK_MODE,
                content: Vec::new(),
            }),
        ));
        self
    }

    /// Remove `path`.
    pub fn remove(mut self, path: &str) -> Self {
        self.changes.push((path.into(), None));
        self
    }

    /// Store the commit and return its id.
    pub fn create(self) -> ObjectId {
        let CommitBuilder {
            repo,
            message,
            parents,
            author,
            changes,
        } = self;
        let mut tree = parents
            .first()
            .and_then(|p| match repo.objects.get(p) {
                Some(Object::Commit { tree, .. }) => Some(tree.clone()),
                _ => None,
            })
            .unwrap_or_default();
        for (path, file) in changes {
            match file {
                Some(file) => tree.insert(path, file),
                None => tree.remove(&path),
            };
        }
        let rev = repo.allocate_id();
        let commit = Commit::from_message(rev, Some(parents), author.0, author.1, &message);
        repo.objects.insert(rev, Object::Commit { commit, tree });
        rev
    }
}

impl Repository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> ObjectId {
        self.next_id += 1;
        let mut bytes = [0u8; 20];
        bytes[12..].copy_from_slice(&self.next_id.to_be_bytes());
        ObjectId::Sha1(bytes)
    }

    /// Start building a commit with `message`, by `A U Thor <author@example.com>`.
    pub fn commit(&mut self, message: &str) -> CommitBuilder<'_> {
        CommitBuilder {
            repo: self,
            message: message.into(),
            parents: Vec::new(),
            author: ("A U Thor".into(), "author@example.com".into()),
            changes: Vec::new(),
        }
    }

    /// Create a linear history of commits on top of `parent`, one per subject, returning their ids.
    pub fn chain(&mut self, parent: Option<ObjectId>, subjects: &[&str]) -> Vec<ObjectId> {
        let mut last = parent;
        let mut out = Vec::with_capacity(subjects.len());
        for (idx, subject) in subjects.iter().enumerate() {
            let mut builder = self.commit(subject).file(&format!("{subject}.txt"), format!("{idx}\n"));
            if let Some(parent) = last {
                builder = builder.parent(parent);
            }
            let rev = builder.create();
            out.push(rev);
            last = Some(rev);
        }
        out
    }

    /// Create an annotated tag object called `name` pointing to `target`.
    pub fn tag(&mut self, name: &str, target: ObjectId, message: &str) -> ObjectId {
        let target_kind = self.kind_of(&target).unwrap_or(ObjectKind::Commit);
        let rev = self.allocate_id();
        self.objects.insert(
            rev,
            Object::Tag(Tag {
                rev,
                target,
                target_kind,
                name: name.into(),
                message: message.into(),
            }),
        );
        rev
    }

    /// Create a blob object which is not part of any tree.
    pub fn blob(&mut self) -> ObjectId {
        let rev = self.allocate_id();
        self.objects.insert(rev, Object::Blob);
        rev
    }

    /// Point `name` at `rev`.
    pub fn set_ref(&mut self, name: &str, rev: ObjectId) {
        self.refs.insert(name.into(), rev);
    }

    /// Remove the reference `name`.
    pub fn remove_ref(&mut self, name: &str) {
        self.refs.remove(name);
    }

    /// Apply `mutation` to the references, as git does after a push was accepted.
    pub fn apply(&mut self, mutation: &RefMutation) {
        match mutation.new {
            Some(new) => self.set_ref(mutation.name(), new),
            None => self.remove_ref(mutation.name()),
        }
    }

    fn kind_of(&self, rev: &ObjectId) -> Option<ObjectKind> {
        self.objects.get(rev).map(|obj| match obj {
            Object::Commit { .. } => ObjectKind::Commit,
            Object::Tag(_) => ObjectKind::Tag,
            Object::Blob => ObjectKind::Blob,
        })
    }

    fn missing(rev: &ObjectId) -> Error {
        Error::backend("object lookup", format!("no such object {rev}"))
    }

    fn commit_and_tree(&self, rev: &ObjectId) -> Result<(&Commit, &Tree), Error> {
        match self.objects.get(rev) {
            Some(Object::Commit { commit, tree }) => Ok((commit, tree)),
            Some(Object::Tag(tag)) => self.commit_and_tree(&tag.target),
            _ => Err(Self::missing(rev)),
        }
    }

    fn tree(&self, rev: Option<&ObjectId>) -> Result<Tree, Error> {
        match rev {
            Some(rev) => Ok(self.commit_and_tree(rev)?.1.clone()),
            None => Ok(Tree::new()),
        }
    }

    fn peel(&self, rev: &ObjectId) -> Option<ObjectId> {
        match self.objects.get(rev)? {
            Object::Commit { .. } => Some(*rev),
            Object::Tag(tag) => self.peel(&tag.target),
            Object::Blob => None,
        }
    }

    fn parents_of(&self, rev: &ObjectId) -> &[ObjectId] {
        match self.objects.get(rev) {
            Some(Object::Commit { commit, .. }) => commit.parents.as_deref().unwrap_or_default(),
            _ => &[],
        }
    }

    fn reachable(&self, tips: &[ObjectId]) -> HashSet<ObjectId> {
        let mut seen = HashSet::new();
        let mut stack: Vec<_> = tips.iter().filter_map(|t| self.peel(t)).collect();
        while let Some(rev) = stack.pop() {
            if seen.insert(rev) {
                stack.extend_from_slice(self.parents_of(&rev));
            }
        }
        seen
    }
}

impl Vcs for Repository {
    fn references(&self) -> Result<BTreeMap<String, ObjectId>, Error> {
        Ok(self.refs.clone())
    }

    fn object_kind(&self, rev: &ObjectId) -> Result<ObjectKind, Error> {
        self.kind_of(rev).ok_or_else(|| Self::missing(rev))
    }

    fn rev_list(&self, include: &[ObjectId], exclude: &[ObjectId]) -> Result<Vec<ObjectId>, Error> {
        let excluded = self.reachable(exclude);
        // Iterative post-order over parents yields parents before children.
        let mut out = Vec::new();
        let mut done = HashSet::new();
        for tip in include.iter().filter_map(|t| self.peel(t)) {
            let mut stack = vec![(tip, false)];
            while let Some((rev, expanded)) = stack.pop() {
                if excluded.contains(&rev) || done.contains(&rev) {
                    continue;
                }
                if expanded {
                    done.insert(rev);
                    out.push(rev);
                    continue;
                }
                stack.push((rev, true));
                for parent in self.parents_of(&rev).iter().rev() {
                    stack.push((*parent, false));
                }
            }
        }
        Ok(out)
    }

    fn commit(&self, rev: &ObjectId) -> Result<Commit, Error> {
        match self.objects.get(rev) {
            Some(Object::Commit { commit, .. }) => Ok(commit.clone()),
            _ => Err(Self::missing(rev)),
        }
    }

    fn tag(&self, rev: &ObjectId) -> Result<Tag, Error> {
        match self.objects.get(rev) {
            Some(Object::Tag(tag)) => Ok(tag.clone()),
            _ => Err(Self::missing(rev)),
        }
    }

    fn changes(&self, base: Option<&ObjectId>, rev: &ObjectId) -> Result<Vec<FileChange>, Error> {
        let old = self.tree(base)?;
        let new = self.tree(Some(rev))?;
        let paths: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
        Ok(paths
            .into_iter()
            .filter_map(|path| {
                let (status, new_mode) = match (old.get(path), new.get(path)) {
                    (None, Some(n)) => (ChangeStatus::Added, n.mode),
                    (Some(_), None) => (ChangeStatus::Deleted, 0),
                    (Some(o), Some(n)) if o == n => return None,
                    (Some(o), Some(n)) if (o.mode == GITLINK_MODE) != (n.mode == GITLINK_MODE) => {
                        (ChangeStatus::TypeChanged, n.mode)
                    }
                    (Some(_), Some(n)) => (ChangeStatus::Modified, n.mode),
                    (None, None) => return None,
                };
                Some(FileChange {
                    path: path.clone(),
                    status,
                    new_mode,
                })
            })
            .collect())
    }

    fn diff_text(&self, base: Option<&ObjectId>, rev: &ObjectId) -> Result<String, Error> {
        let old = self.tree(base)?;
        let new = self.tree(Some(rev))?;
        let changes = self.changes(base, rev)?;
        let mut stat = String::new();
        let mut patch = String::new();
        for change in &changes {
            stat.push_str(&format!(" {} | {}\n", change.path, change.status.letter()));
            patch.push_str(&format!("--- a/{0}\n+++ b/{0}\n", change.path));
            if let Some(file) = old.get(&change.path) {
                for line in file.content.lines() {
                    patch.push_str(&format!("-{}\n", line.to_str_lossy()));
                }
            }
            if let Some(file) = new.get(&change.path) {
                for line in file.content.lines() {
                    patch.push_str(&format!("+{}\n", line.to_str_lossy()));
                }
            }
        }
        stat.push_str(&format!(" {} files changed\n\n", changes.len()));
        Ok(stat + &patch)
    }

    fn files(&self, rev: &ObjectId) -> Result<Vec<String>, Error> {
        Ok(self.tree(Some(rev))?.into_keys().collect())
    }

    fn read_file(&self, rev: &ObjectId, path: &str) -> Result<Option<Vec<u8>>, Error> {
        Ok(self
            .commit_and_tree(rev)?
            .1
            .get(path)
            .filter(|f| f.mode != GITLINK_MODE)
            .map(|f| f.content.clone()))
    }

    fn attributes(
        &self,
        rev: &ObjectId,
        attribute: &str,
        paths: &[String],
    ) -> Result<BTreeMap<String, AttributeState>, Error> {
        let tree = self.tree(Some(rev))?;
        // Attribute files ordered from the root to the deepest directory, so later matches win.
        let mut attribute_files: Vec<(&str, &File)> = tree
            .iter()
            .filter_map(|(path, file)| {
                let dir = path.strip_suffix(".gitattributes")?;
                (dir.is_empty() || dir.ends_with('/')).then_some((dir, file))
            })
            .collect();
        attribute_files.sort_by_key(|(dir, _)| dir.matches('/').count());

        Ok(paths
            .iter()
            .map(|path| {
                let mut state = AttributeState::Unspecified;
                for (dir, file) in &attribute_files {
                    let Some(relative) = path.strip_prefix(dir) else { continue };
                    if let Some(found) = match_attribute_file(&file.content, relative, attribute) {
                        state = found;
                    }
                }
                (path.clone(), state)
            })
            .collect())
    }
}

/// Find the last state of `attribute` for `path` in an attribute file, if any line mentions it.
fn match_attribute_file(content: &[u8], path: &str, attribute: &str) -> Option<AttributeState> {
    let mut state = None;
    for line in content.lines() {
        let mut tokens = line.fields();
        let Some(pattern) = tokens.next() else { continue };
        if pattern.starts_with(b"#") || !pattern_matches(pattern, path) {
            continue;
        }
        for token in tokens {
            let token = token.to_str_lossy();
            let found = if let Some(name) = token.strip_prefix('-') {
                (name == attribute).then_some(AttributeState::Unset)
            } else if let Some(name) = token.strip_prefix('!') {
                (name == attribute).then_some(AttributeState::Unspecified)
            } else if let Some((name, value)) = token.split_once('=') {
                (name == attribute).then(|| AttributeState::Value(value.into()))
            } else {
                (token == attribute).then_some(AttributeState::Set)
            };
            if found.is_some() {
                state = found;
            }
        }
    }
    state
}

fn pattern_matches(pattern: &[u8], path: &str) -> bool {
    use gix_glob::wildmatch::Mode;
    let pattern = pattern.strip_prefix(b"/").unwrap_or(pattern);
    if pattern.contains(&b'/') {
        gix_glob::wildmatch(pattern.as_bstr(), path.as_bytes().as_bstr(), Mode::NO_MATCH_SLASH_LITERAL)
    } else {
        let basename = path.rsplit('/').next().unwrap_or(path);
        gix_glob::wildmatch(pattern.as_bstr(), basename.as_bytes().as_bstr(), Mode::empty())
    }
}
