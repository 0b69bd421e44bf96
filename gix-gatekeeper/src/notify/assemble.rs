//! Assembly of the emails announcing an accepted reference update.
//!
//! Each update gets a cover email describing it as a whole, unless it is a plain fast-forward
//! of a branch or notes reference whose added commits are all emailed individually anyway.
//! Each new commit gets an email of its own, unless the reference matches `hooks.no-emails`
//! (nothing is sent for it at all) or the commit is visible through another reference
//! matching it.

use std::collections::BTreeSet;

use gix_hash::ObjectId;

use super::formatter::{EmailFormatter, Event, Rendering};
use super::recipients::Recipients;
use super::{Email, Topic};
use crate::classify::{Category, UpdateVariant};
use crate::config::PolicyConfig;
use crate::delta::{AddedCommit, CommitDelta};
use crate::port::{peel_to_commit, ChangeStatus, Commit, ObjectKind, Vcs};
use crate::refs::{short_hex, ChangeKind, RefMutation};
use crate::Error;

/// True if `added` gets an email of its own.
pub fn is_emailed(added: &AddedCommit) -> bool {
    !added.pre_existing && added.send_email
}

/// The number of commit emails the update of `refname` described by `delta` causes.
pub fn commit_email_count(config: &PolicyConfig, refname: &str, delta: &CommitDelta) -> usize {
    if config.email.no_emails.matches(refname) {
        return 0;
    }
    delta.added.iter().filter(|c| is_emailed(c)).count()
}

/// Builds emails for reference updates.
pub struct Assembler<'a, V: Vcs + ?Sized> {
    vcs: &'a V,
    config: &'a PolicyConfig,
    project: String,
    user: String,
    recipients: Recipients,
    formatter: EmailFormatter,
}

impl<'a, V: Vcs + ?Sized> Assembler<'a, V> {
    /// Create an assembler for emails about `project`, pushed by `user`.
    pub fn new(
        vcs: &'a V,
        config: &'a PolicyConfig,
        project: impl Into<String>,
        user: impl Into<String>,
        recipients: Recipients,
        formatter: EmailFormatter,
    ) -> Self {
        Assembler {
            vcs,
            config,
            project: project.into(),
            user: user.into(),
            recipients,
            formatter,
        }
    }

    /// Build all emails announcing `mutation`, classified as `variant` and described by `delta`.
    ///
    /// Returns the emails in sending order, cover first, and warnings about degraded output.
    pub fn assemble(
        &self,
        variant: UpdateVariant,
        mutation: &RefMutation,
        delta: &CommitDelta,
    ) -> Result<(Vec<Email>, Vec<String>), Error> {
        let refname = mutation.name();
        if let Some(pattern) = self.config.email.no_emails.first_match(refname) {
            tracing::debug!(refname, pattern, "emails disabled for reference");
            return Ok((Vec::new(), Vec::new()));
        }
        if self.recipients.is_empty() {
            tracing::warn!(refname, "hooks.mailinglist is not set, no email sent");
            return Ok((Vec::new(), Vec::new()));
        }

        let mut emails = Vec::new();
        let mut warnings = Vec::new();
        if needs_cover(variant, delta) {
            emails.push(self.cover(variant, mutation, delta, &mut warnings)?);
        } else {
            tracing::debug!(refname, "cover email omitted, all commits are emailed individually");
        }
        for added in delta.added.iter().filter(|c| is_emailed(c)) {
            let email = if variant.category == Category::Notes {
                self.notes_email(mutation, &added.commit, &mut warnings)?
            } else {
                self.commit_email(mutation, &added.commit, &mut warnings)?
            };
            emails.push(email);
        }
        for added in delta.added.iter().filter(|c| !is_emailed(c)) {
            tracing::debug!(refname, rev = %added.commit.rev, pre_existing = added.pre_existing, "no email for commit");
        }
        Ok((emails, warnings))
    }

    fn subject_prefix(&self, mutation: &RefMutation) -> String {
        if mutation.name() == "refs/heads/master" {
            format!("[{}]", self.project)
        } else {
            format!("[{}/{}]", self.project, mutation.reference.short_name())
        }
    }

    fn sender(&self, name: &str) -> String {
        let address = match &self.config.email.from_domain {
            Some(domain) => format!("{}@{domain}", self.user),
            None => self.user.clone(),
        };
        format!("{name} <{address}>")
    }

    fn email(
        &self,
        mutation: &RefMutation,
        from: String,
        files: &[String],
        topic: Topic,
        rendering: Rendering,
        warnings: &mut Vec<String>,
    ) -> Email {
        let (to, script_warnings) = self.recipients.resolve(mutation.name(), files);
        warnings.extend(script_warnings);
        Email {
            from,
            to,
            bcc: self.config.email.filer_email.clone(),
            subject: rendering.subject,
            body: rendering.body,
            diff: rendering.diff,
            refname: mutation.name().to_owned(),
            topic,
        }
    }

    fn cover(
        &self,
        variant: UpdateVariant,
        mutation: &RefMutation,
        delta: &CommitDelta,
        warnings: &mut Vec<String>,
    ) -> Result<Email, Error> {
        let short = mutation.reference.short_name();
        let category = category_name(variant.category);
        let mut lines = vec![
            format!("The {category} '{short}' was {}.", variant.change.past_tense()),
            String::new(),
        ];
        if let Some(old) = mutation.old {
            lines.push(format!("Old: {old}"));
        }
        if let Some(new) = mutation.new {
            lines.push(format!("New: {new}"));
        }

        let mut tag_event = None;
        if variant.category == Category::AnnotatedTag && variant.change != ChangeKind::Delete {
            if let Some(new) = mutation.new {
                let tag = self.vcs.tag(&new)?;
                tag_event = Some(Event::tag(&tag));
                lines.push(String::new());
                lines.push(format!("Tagged object: {} ({})", tag.target, tag.target_kind));
                if let Some(target) = peel_to_commit(self.vcs, &new)? {
                    let commit = self.vcs.commit(&target)?;
                    lines.push(format!("  {} {}", short_hex(&commit.rev), commit.subject));
                }
                lines.push(String::new());
                lines.push("Tag message:".to_owned());
                lines.push(String::new());
                lines.extend(tag.message.trim_end().lines().map(|l| format!("    {l}")));
            }
        }

        if !delta.lost.is_empty() {
            lines.push(String::new());
            lines.push("The following commits are no longer reachable from any reference:".to_owned());
            lines.push(String::new());
            lines.extend(delta.lost.iter().map(|c| format!("  {} {}", short_hex(&c.rev), c.subject)));
        }

        if !delta.added.is_empty() {
            let heading = "Summary of changes (added commits):";
            lines.push(String::new());
            lines.push(heading.to_owned());
            lines.push("-".repeat(heading.len()));
            lines.push(String::new());
            for added in &delta.added {
                let marker = if added.pre_existing {
                    " (*)"
                } else if !added.send_email {
                    " (+)"
                } else {
                    ""
                };
                lines.push(format!("  {} {}{marker}", short_hex(&added.commit.rev), added.commit.subject));
            }
            if delta.added.iter().any(|c| c.pre_existing) {
                lines.push(String::new());
                lines.push("(*) This commit was already in the repository, it is not emailed again.".to_owned());
            }
            if delta.added.iter().any(|c| !c.pre_existing && !c.send_email) {
                lines.push(String::new());
                lines.push(
                    "(+) This commit is visible through a reference whose updates aren't emailed, \
                     no separate email was sent."
                        .to_owned(),
                );
            }
        }

        let files = match (delta.added.is_empty(), mutation.new) {
            (false, Some(new)) => match peel_to_commit(self.vcs, &new)? {
                Some(tip) => changed_paths(self.vcs, delta.base.as_ref(), &tip)?,
                None => Vec::new(),
            },
            _ => Vec::new(),
        };
        let mut rendering = Rendering {
            subject: format!(
                "{} {} {category} '{short}'",
                self.subject_prefix(mutation),
                capitalize(variant.change.past_tense())
            ),
            body: lines.join("\n") + "\n",
            diff: None,
        };
        if let Some(event) = &tag_event {
            rendering = self.formatter.apply(mutation.name(), event, rendering);
        }
        let topic = Topic::Cover {
            old: mutation.old,
            new: mutation.new,
        };
        Ok(self.email(mutation, self.sender(&self.user), &files, topic, rendering, warnings))
    }

    fn commit_email(&self, mutation: &RefMutation, commit: &Commit, warnings: &mut Vec<String>) -> Result<Email, Error> {
        let base = commit.first_parent();
        let mut lines = vec![format!("commit {}", commit.rev)];
        if let Some(parents) = commit.parents.as_ref().filter(|p| p.len() > 1) {
            lines.push(format!(
                "Merge: {}",
                parents.iter().map(short_hex).collect::<Vec<_>>().join(" ")
            ));
        }
        lines.push(format!("Author: {}", commit.author()));
        lines.push(String::new());
        lines.push(commit.message());

        let diff = self.vcs.diff_text(base, &commit.rev)?;
        let default = Rendering {
            subject: format!("{} {}", self.subject_prefix(mutation), commit.subject),
            body: lines.join("\n") + "\n",
            diff: Some(truncate_diff(diff, self.config.email.max_email_diff_size)),
        };
        let rendering = self.formatter.apply(mutation.name(), &Event::commit(commit), default);
        let files = changed_paths(self.vcs, base, &commit.rev)?;
        Ok(self.email(
            mutation,
            self.sender(&commit.author_name),
            &files,
            Topic::Commit(commit.rev),
            rendering,
            warnings,
        ))
    }

    fn notes_email(&self, mutation: &RefMutation, notes: &Commit, warnings: &mut Vec<String>) -> Result<Email, Error> {
        let mut lines = Vec::new();
        let mut annotated_paths = Vec::new();
        let mut first_subject = None;
        for change in self.vcs.changes(notes.first_parent(), &notes.rev)? {
            if change.status == ChangeStatus::Deleted || change.is_submodule() {
                continue;
            }
            let hex: String = change.path.chars().filter(|c| *c != '/').collect();
            let Ok(annotated) = ObjectId::from_hex(hex.as_bytes()) else {
                tracing::debug!(rev = %notes.rev, path = %change.path, "not a note");
                continue;
            };
            let text = self.vcs.read_file(&notes.rev, &change.path)?.unwrap_or_default();
            annotated_paths.push(change.path.clone());

            lines.push("A Git note has been updated; it now contains:".to_owned());
            lines.push(String::new());
            lines.extend(String::from_utf8_lossy(&text).trim_end().lines().map(|l| format!("    {l}")));
            lines.push(String::new());
            match self.vcs.object_kind(&annotated) {
                Ok(ObjectKind::Commit) => {
                    let commit = self.vcs.commit(&annotated)?;
                    first_subject.get_or_insert_with(|| (annotated, Some(commit.subject.clone())));
                    lines.push("This note annotates the following commit:".to_owned());
                    lines.push(String::new());
                    lines.push(format!("commit {}", commit.rev));
                    lines.push(format!("Author: {}", commit.author()));
                    lines.push(String::new());
                    lines.extend(commit.message().lines().map(|l| format!("    {l}")));
                }
                Ok(kind) => {
                    first_subject.get_or_insert((annotated, None));
                    lines.push(format!("This note annotates the following {kind}: {annotated}"));
                }
                Err(err) => {
                    tracing::warn!(rev = %notes.rev, annotated = %annotated, %err, "annotated object not found");
                    first_subject.get_or_insert((annotated, None));
                    lines.push(format!("This note annotates {annotated}, which is not in the repository."));
                }
            }
            lines.push(String::new());
        }
        let prefix = self.subject_prefix(mutation);
        let subject = match first_subject {
            Some((annotated, Some(subject))) => {
                format!("{prefix} notes update for {}: {subject}", short_hex(&annotated))
            }
            Some((annotated, None)) => format!("{prefix} notes update for {}", short_hex(&annotated)),
            None => format!("{prefix} {}", notes.subject),
        };
        let default = Rendering {
            subject,
            body: lines.join("\n"),
            diff: None,
        };
        let rendering = self.formatter.apply(mutation.name(), &Event::note(notes), default);
        Ok(self.email(
            mutation,
            self.sender(&notes.author_name),
            &annotated_paths,
            Topic::Commit(notes.rev),
            rendering,
            warnings,
        ))
    }
}

/// A cover email is omitted for plain fast-forwards of branches and notes whose added commits
/// are all emailed individually.
fn needs_cover(variant: UpdateVariant, delta: &CommitDelta) -> bool {
    let plain_update = matches!(variant.category, Category::Branch | Category::Notes)
        && variant.change == ChangeKind::Update
        && delta.lost.is_empty()
        && !delta.added.is_empty();
    !(plain_update && delta.added.iter().all(is_emailed))
}

fn changed_paths(vcs: &(impl Vcs + ?Sized), base: Option<&ObjectId>, rev: &ObjectId) -> Result<Vec<String>, Error> {
    let paths: BTreeSet<String> = vcs.changes(base, rev)?.into_iter().map(|c| c.path).collect();
    Ok(paths.into_iter().collect())
}

fn category_name(category: Category) -> &'static str {
    match category {
        Category::Branch => "branch",
        Category::AnnotatedTag => "annotated tag",
        Category::LightweightTag => "lightweight tag",
        Category::Notes => "notes reference",
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Truncate `diff` to at most `max` bytes, on a character boundary, with a note.
pub fn truncate_diff(mut diff: String, max: Option<usize>) -> String {
    let Some(max) = max else { return diff };
    if diff.len() <= max {
        return diff;
    }
    let mut cut = max;
    while !diff.is_char_boundary(cut) {
        cut -= 1;
    }
    diff.truncate(cut);
    diff.push_str(&format!("\n\n[Diff truncated after {max} bytes (hooks.max-email-diff-size)]\n"));
    diff
}
