//! The `hooks.commit-email-formatter` override of email contents.
//!
//! The formatter receives a JSON object describing the announced event (a commit, a note or an
//! annotated tag) and its default rendering on stdin, and prints a JSON object with any of
//! `email_subject`, `email_body` and `diff` to replace. Anything else, a non-zero exit code
//! included, falls back to the default rendering with a warning appended to the body.

use std::path::{Path, PathBuf};

use gix_hash::ObjectId;
use serde::{Deserialize, Serialize};

use crate::hooks::env::HookEnvironment;
use crate::hooks::Invocation;
use crate::port::{Commit, Tag};

/// The replaceable parts of an email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendering {
    /// The subject line.
    pub subject: String,
    /// The body text.
    pub body: String,
    /// The diff, `None` to send none.
    pub diff: Option<String>,
}

/// What kind of object an email announces, the `kind` field of the formatter input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A new commit on a branch or tag.
    Commit,
    /// A commit of a notes reference.
    Note,
    /// An annotated tag object.
    Tag,
}

/// The object an email announces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub rev: ObjectId,
    /// Tags carry no author.
    pub author: Option<(String, String)>,
    pub subject: String,
    pub body: String,
}

impl Event {
    /// A new `commit`.
    pub fn commit(commit: &Commit) -> Self {
        Event {
            kind: EventKind::Commit,
            rev: commit.rev,
            author: Some((commit.author_name.clone(), commit.author_email.clone())),
            subject: commit.subject.clone(),
            body: commit.body_lines.join("\n"),
        }
    }

    /// The commit `notes` of a notes reference.
    pub fn note(notes: &Commit) -> Self {
        Event {
            kind: EventKind::Note,
            ..Event::commit(notes)
        }
    }

    /// The annotated `tag`, with the first line of its message as subject.
    pub fn tag(tag: &Tag) -> Self {
        let message = tag.message.trim_end();
        let (subject, body) = message.split_once('\n').unwrap_or((message, ""));
        Event {
            kind: EventKind::Tag,
            rev: tag.rev,
            author: None,
            subject: subject.to_owned(),
            body: body.trim_start_matches('\n').to_owned(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Request<'a> {
    kind: EventKind,
    ref_name: &'a str,
    rev: String,
    author_name: Option<&'a str>,
    author_email: Option<&'a str>,
    subject: &'a str,
    body: &'a str,
    email_subject: &'a str,
    email_body: &'a str,
    diff: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Response {
    email_subject: Option<String>,
    email_body: Option<String>,
    diff: Option<String>,
}

/// Runs the configured formatter, if any.
#[derive(Debug, Clone, Default)]
pub struct EmailFormatter {
    program: Option<PathBuf>,
    environment: HookEnvironment,
}

impl EmailFormatter {
    /// Format with `program`, or keep the default rendering if `None`.
    pub fn new(program: Option<PathBuf>, environment: HookEnvironment) -> Self {
        EmailFormatter { program, environment }
    }

    /// Apply the formatter to the `default` rendering of `event` on `refname`.
    pub fn apply(&self, refname: &str, event: &Event, default: Rendering) -> Rendering {
        let Some(program) = &self.program else {
            return default;
        };
        match self.run(program, refname, event, &default) {
            Ok(response) => Rendering {
                subject: response.email_subject.unwrap_or(default.subject),
                body: response.email_body.unwrap_or(default.body),
                diff: response.diff.or(default.diff),
            },
            Err(problem) => {
                tracing::warn!(
                    hook = %program.display(),
                    refname,
                    rev = %event.rev,
                    kind = ?event.kind,
                    %problem,
                    "commit-email-formatter failed, using default rendering"
                );
                let mut fallback = default;
                fallback.body = format!(
                    "{}\n\n| WARNING:\n| The hooks.commit-email-formatter hook {} failed:\n{}\n| The default email contents were used instead.\n",
                    fallback.body.trim_end(),
                    program.display(),
                    problem.lines().map(|l| format!("|   {l}")).collect::<Vec<_>>().join("\n"),
                );
                fallback
            }
        }
    }

    fn run(&self, program: &Path, refname: &str, event: &Event, default: &Rendering) -> Result<Response, String> {
        let request = Request {
            kind: event.kind,
            ref_name: refname,
            rev: event.rev.to_string(),
            author_name: event.author.as_ref().map(|(name, _)| name.as_str()),
            author_email: event.author.as_ref().map(|(_, email)| email.as_str()),
            subject: &event.subject,
            body: &event.body,
            email_subject: &default.subject,
            email_body: &default.body,
            diff: default.diff.as_deref(),
        };
        let stdin = serde_json::to_vec(&request).map_err(|err| err.to_string())?;
        let output = Invocation::new(program)
            .arg(refname)
            .arg(event.rev.to_string())
            .stdin(stdin)
            .environment(&self.environment)
            .run()
            .map_err(|err| format!("cannot execute: {err}"))?;
        if !output.success() {
            return Err(format!(
                "exit code {}: {}",
                output.exit_code.map_or_else(|| "none".to_owned(), |c| c.to_string()),
                output.combined_text()
            ));
        }
        serde_json::from_slice(&output.stdout).map_err(|err| format!("invalid output: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::ObjectKind;

    fn commit() -> Event {
        Event::commit(&Commit::from_message(
            ObjectId::from_bytes_or_panic(&[7; 20]),
            Some(vec![]),
            "A U Thor",
            "author@example.com",
            "Subject\n\nBody",
        ))
    }

    fn default() -> Rendering {
        Rendering {
            subject: "[project] Subject".into(),
            body: "default body".into(),
            diff: Some("default diff".into()),
        }
    }

    #[test]
    fn without_program_the_default_is_kept() {
        let f = EmailFormatter::default();
        assert_eq!(f.apply("refs/heads/master", &commit(), default()), default());
    }

    #[cfg(unix)]
    fn script(dir: &std::path::Path, text: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("formatter");
        std::fs::write(&path, format!("#!/bin/sh\n{text}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn partial_overrides_are_merged_with_the_default() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), r#"cat > /dev/null; echo '{"email_body": "custom body", "diff": null}'"#);
        let f = EmailFormatter::new(Some(program), HookEnvironment::new());
        let r = f.apply("refs/heads/master", &commit(), default());
        assert_eq!(r.subject, "[project] Subject");
        assert_eq!(r.body, "custom body");
        assert_eq!(r.diff.as_deref(), Some("default diff"));
    }

    #[cfg(unix)]
    #[test]
    fn failures_fall_back_with_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        for text in ["echo 'not json'", "echo '{\"email_subjekt\": \"x\"}'", "echo oops >&2; exit 3"] {
            let program = script(dir.path(), text);
            let f = EmailFormatter::new(Some(program), HookEnvironment::new());
            let r = f.apply("refs/heads/master", &commit(), default());
            assert_eq!(r.subject, "[project] Subject", "{text}");
            assert!(r.body.starts_with("default body\n\n| WARNING:"), "{text}: {}", r.body);
            assert_eq!(r.diff.as_deref(), Some("default diff"));
        }
    }

    #[test]
    fn tags_are_described_without_author() {
        let tag = Tag {
            rev: ObjectId::from_bytes_or_panic(&[3; 20]),
            target: ObjectId::from_bytes_or_panic(&[7; 20]),
            target_kind: ObjectKind::Commit,
            name: "v1.0".into(),
            message: "Release 1.0\n\nWith fixes.\n".into(),
        };
        let event = Event::tag(&tag);
        assert_eq!(event.kind, EventKind::Tag);
        assert_eq!(event.author, None);
        assert_eq!(event.subject, "Release 1.0");
        assert_eq!(event.body, "With fixes.");
    }

    #[cfg(unix)]
    #[test]
    fn the_event_kind_is_passed_to_the_formatter() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(
            dir.path(),
            r#"input=$(cat); kind=$(printf '%s' "$input" | sed 's/.*"kind":"\([a-z]*\)".*/\1/'); echo "{\"email_subject\": \"$kind\"}""#,
        );
        let f = EmailFormatter::new(Some(program), HookEnvironment::new());
        let note = Event {
            kind: EventKind::Note,
            ..commit()
        };
        assert_eq!(f.apply("refs/heads/master", &commit(), default()).subject, "commit");
        assert_eq!(f.apply("refs/notes/commits", &note, default()).subject, "note");
    }
}
