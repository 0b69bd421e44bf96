//! [`Vcs`] implementation running the `git` executable.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use bstr::ByteSlice;
use gix_hash::ObjectId;

use super::{AttributeState, ChangeStatus, Commit, FileChange, ObjectKind, Tag, Vcs};
use crate::hooks::Invocation;
use crate::Error;

/// A repository accessed through the `git` program, with `GIT_DIR` pointing at `git_dir`.
#[derive(Debug, Clone)]
pub struct Repository {
    git_dir: PathBuf,
    program: OsString,
}

impl Repository {
    /// Access the repository at `git_dir` using `git` from `PATH`.
    pub fn new(git_dir: impl Into<PathBuf>) -> Self {
        Repository {
            git_dir: git_dir.into(),
            program: "git".into(),
        }
    }

    /// Use `program` instead of `git`.
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    /// The git directory.
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    fn invocation(&self, args: &[&str]) -> Invocation {
        Invocation::new(&self.program)
            .args(args.iter().copied())
            .env("GIT_DIR", &self.git_dir)
            .max_output_size(usize::MAX)
    }

    /// Run git with `args`, failing unless it exits successfully.
    fn git(&self, args: &[&str], stdin: Option<Vec<u8>>) -> Result<Vec<u8>, Error> {
        let mut invocation = self.invocation(args);
        if let Some(data) = stdin {
            invocation = invocation.stdin(data);
        }
        let operation = || format!("git {}", args.first().copied().unwrap_or_default());
        let output = invocation
            .run()
            .map_err(|err| Error::backend(operation(), format!("cannot run git: {err}")))?;
        if !output.success() {
            return Err(Error::backend(
                operation(),
                String::from_utf8_lossy(&output.stderr).trim_end(),
            ));
        }
        Ok(output.stdout)
    }

    fn tree_ish(base: Option<&ObjectId>) -> String {
        base.copied()
            .unwrap_or_else(|| ObjectId::empty_tree(gix_hash::Kind::Sha1))
            .to_string()
    }
}

fn parse_oid(hex: &[u8], operation: &str) -> Result<ObjectId, Error> {
    ObjectId::from_hex(hex).map_err(|err| Error::backend(operation, format!("invalid object id {:?}: {err}", hex.as_bstr())))
}

impl Vcs for Repository {
    fn references(&self) -> Result<BTreeMap<String, ObjectId>, Error> {
        let out = self.git(&["for-each-ref", "--format=%(objectname) %(refname) %(symref)"], None)?;
        let mut refs = BTreeMap::new();
        for line in out.lines() {
            let mut tokens = line.splitn_str(3, " ");
            let (Some(hex), Some(name)) = (tokens.next(), tokens.next()) else {
                return Err(Error::backend("git for-each-ref", format!("unexpected line {:?}", line.as_bstr())));
            };
            if tokens.next().is_some_and(|symref| !symref.is_empty()) {
                continue;
            }
            refs.insert(name.to_str_lossy().into_owned(), parse_oid(hex, "git for-each-ref")?);
        }
        Ok(refs)
    }

    fn object_kind(&self, rev: &ObjectId) -> Result<ObjectKind, Error> {
        let out = self.git(&["cat-file", "-t", &rev.to_string()], None)?;
        ObjectKind::from_bytes(out.trim()).map_err(|err| Error::backend("git cat-file", err))
    }

    fn rev_list(&self, include: &[ObjectId], exclude: &[ObjectId]) -> Result<Vec<ObjectId>, Error> {
        if include.is_empty() {
            return Ok(Vec::new());
        }
        let stdin: String = include
            .iter()
            .map(|rev| format!("{rev}\n"))
            .chain(exclude.iter().map(|rev| format!("^{rev}\n")))
            .collect();
        let out = self.git(&["rev-list", "--topo-order", "--reverse", "--stdin"], Some(stdin.into_bytes()))?;
        out.lines().map(|line| parse_oid(line.trim(), "git rev-list")).collect()
    }

    fn commit(&self, rev: &ObjectId) -> Result<Commit, Error> {
        let out = self.git(
            &["show", "-s", "--no-show-signature", "--format=%P%x00%an%x00%ae%x00%B", &rev.to_string()],
            None,
        )?;
        let mut fields = out.splitn_str(4, "\0");
        let (Some(parents), Some(name), Some(email), Some(message)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(Error::backend("git show", format!("unexpected commit format for {rev}")));
        };
        let parents = parents
            .fields()
            .map(|hex| parse_oid(hex, "git show"))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Commit::from_message(
            *rev,
            Some(parents),
            name.to_str_lossy(),
            email.to_str_lossy(),
            &message.to_str_lossy(),
        ))
    }

    fn tag(&self, rev: &ObjectId) -> Result<Tag, Error> {
        let data = self.git(&["cat-file", "tag", &rev.to_string()], None)?;
        let tag = gix_object::TagRef::from_bytes(&data).map_err(|err| Error::backend("git cat-file tag", err))?;
        Ok(Tag {
            rev: *rev,
            target: tag.target(),
            target_kind: tag.target_kind,
            name: tag.name.to_str_lossy().into_owned(),
            message: tag.message.to_str_lossy().into_owned(),
        })
    }

    fn changes(&self, base: Option<&ObjectId>, rev: &ObjectId) -> Result<Vec<FileChange>, Error> {
        let out = self.git(
            &[
                "diff-tree",
                "-r",
                "-z",
                "--raw",
                "--no-renames",
                &Self::tree_ish(base),
                &rev.to_string(),
            ],
            None,
        )?;
        // Records are ":<old-mode> <new-mode> <old-oid> <new-oid> <status>\0<path>\0".
        let mut changes = Vec::new();
        let mut tokens = out.split_str("\0").filter(|t| !t.is_empty());
        while let Some(record) = tokens.next() {
            let malformed = || Error::backend("git diff-tree", format!("unexpected record {:?}", record.as_bstr()));
            let fields: Vec<&[u8]> = record.trim_start_with(|c| c == ':').fields().collect();
            let [_old_mode, new_mode, _old_oid, _new_oid, status] = fields[..] else {
                return Err(malformed());
            };
            let status = status.first().copied().and_then(ChangeStatus::from_letter).ok_or_else(malformed)?;
            let new_mode = std::str::from_utf8(new_mode)
                .ok()
                .and_then(|m| u32::from_str_radix(m, 8).ok())
                .ok_or_else(malformed)?;
            let path = tokens.next().ok_or_else(malformed)?;
            changes.push(FileChange {
                path: path.to_str_lossy().into_owned(),
                status,
                new_mode,
            });
        }
        Ok(changes)
    }

    fn diff_text(&self, base: Option<&ObjectId>, rev: &ObjectId) -> Result<String, Error> {
        let out = self.git(
            &["diff-tree", "-p", "--stat", "-M", &Self::tree_ish(base), &rev.to_string()],
            None,
        )?;
        Ok(out.to_str_lossy().into_owned())
    }

    fn files(&self, rev: &ObjectId) -> Result<Vec<String>, Error> {
        let out = self.git(&["ls-tree", "-r", "-z", "--name-only", &rev.to_string()], None)?;
        Ok(out
            .split_str("\0")
            .filter(|p| !p.is_empty())
            .map(|p| p.to_str_lossy().into_owned())
            .collect())
    }

    fn read_file(&self, rev: &ObjectId, path: &str) -> Result<Option<Vec<u8>>, Error> {
        let spec = format!("{rev}:{path}");
        let exists = self
            .invocation(&["cat-file", "-e", &spec])
            .run()
            .map_err(|err| Error::backend("git cat-file", format!("cannot run git: {err}")))?;
        if !exists.success() {
            return Ok(None);
        }
        self.git(&["cat-file", "blob", &spec], None).map(Some)
    }

    fn attributes(
        &self,
        rev: &ObjectId,
        attribute: &str,
        paths: &[String],
    ) -> Result<BTreeMap<String, AttributeState>, Error> {
        if paths.is_empty() {
            return Ok(BTreeMap::new());
        }
        let stdin: Vec<u8> = paths.iter().flat_map(|p| p.bytes().chain(Some(0))).collect();
        let out = self.git(
            &["check-attr", "--source", &rev.to_string(), "-z", "--stdin", attribute],
            Some(stdin),
        )?;
        // Records are "<path>\0<attribute>\0<info>\0".
        let tokens: Vec<&[u8]> = out.split_str("\0").collect();
        let mut states = BTreeMap::new();
        for record in tokens.chunks_exact(3) {
            let state = match record[2] {
                b"set" => AttributeState::Set,
                b"unset" => AttributeState::Unset,
                b"unspecified" => AttributeState::Unspecified,
                value => AttributeState::Value(value.to_str_lossy().into_owned()),
            };
            states.insert(record[0].to_str_lossy().into_owned(), state);
        }
        Ok(states)
    }
}
