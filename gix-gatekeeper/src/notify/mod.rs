//! Notification emails about accepted pushes.
//!
//! Emails are assembled per reference update by [`assemble::Assembler`], collected in an
//! [`EmailQueue`] and handed to a [`Mailer`] once the whole push was processed.

use gix_hash::ObjectId;

use crate::Error;

pub mod assemble;
pub mod formatter;
pub mod mailer;
pub mod recipients;

pub use assemble::Assembler;
pub use formatter::{EmailFormatter, Event, EventKind, Rendering};
pub use mailer::{Capture, Mailer, Sendmail};
pub use recipients::Recipients;

/// What an email is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topic {
    /// The update of a reference as a whole.
    Cover {
        /// The previous value of the reference.
        old: Option<ObjectId>,
        /// The new value of the reference.
        new: Option<ObjectId>,
    },
    /// A single commit added to a reference.
    Commit(ObjectId),
}

/// A fully rendered email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    /// The sender address.
    pub from: String,
    /// The recipients.
    pub to: Vec<String>,
    /// Blind-copied recipients.
    pub bcc: Vec<String>,
    /// The subject line.
    pub subject: String,
    /// The body text, without diff.
    pub body: String,
    /// The diff to append to the body, if any.
    pub diff: Option<String>,
    /// The updated reference.
    pub refname: String,
    /// What the email is about.
    pub topic: Topic,
}

impl Email {
    /// The revision a commit email is about.
    pub fn commit(&self) -> Option<&ObjectId> {
        match &self.topic {
            Topic::Commit(rev) => Some(rev),
            Topic::Cover { .. } => None,
        }
    }

    /// Render the email as RFC 822 message, as accepted by `sendmail -t`.
    pub fn to_rfc822(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("From: {}\n", self.from));
        out.push_str(&format!("To: {}\n", self.to.join(", ")));
        if !self.bcc.is_empty() {
            out.push_str(&format!("Bcc: {}\n", self.bcc.join(", ")));
        }
        out.push_str(&format!("Subject: {}\n", self.subject));
        out.push_str("MIME-Version: 1.0\n");
        out.push_str("Content-Type: text/plain; charset=utf-8\n");
        out.push_str("Content-Transfer-Encoding: 8bit\n");
        out.push_str(&format!("X-Git-Refname: {}\n", self.refname));
        match &self.topic {
            Topic::Cover { old, new } => {
                out.push_str(&format!("X-Git-Oldrev: {}\n", crate::refs::hex_or_null(*old)));
                out.push_str(&format!("X-Git-Newrev: {}\n", crate::refs::hex_or_null(*new)));
            }
            Topic::Commit(rev) => out.push_str(&format!("X-Git-Rev: {rev}\n")),
        }
        out.push('\n');
        out.push_str(self.body.trim_end());
        out.push('\n');
        if let Some(diff) = &self.diff {
            out.push_str("\nDiff:\n\n");
            out.push_str(diff);
            if !diff.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }
}

/// Emails collected during a push, sent together at its end.
#[derive(Debug, Default)]
pub struct EmailQueue {
    emails: Vec<Email>,
}

impl EmailQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `emails` to the queue.
    pub fn extend(&mut self, emails: impl IntoIterator<Item = Email>) {
        self.emails.extend(emails);
    }

    /// The number of queued emails.
    pub fn len(&self) -> usize {
        self.emails.len()
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }

    /// Send all queued emails in the order they were queued, leaving the queue empty.
    ///
    /// Stops at the first email that can't be sent.
    pub fn flush(&mut self, mailer: &dyn Mailer) -> Result<usize, Error> {
        let emails = std::mem::take(&mut self.emails);
        for email in &emails {
            tracing::debug!(refname = %email.refname, subject = %email.subject, "sending email");
            mailer.send(email)?;
        }
        Ok(emails.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(subject: &str) -> Email {
        Email {
            from: "alice@example.com".into(),
            to: vec!["list@example.com".into(), "other@example.com".into()],
            bcc: vec!["filer@example.com".into()],
            subject: subject.into(),
            body: "body\n\n".into(),
            diff: Some("--- a\n+++ b".into()),
            refname: "refs/heads/master".into(),
            topic: Topic::Commit(ObjectId::from_bytes_or_panic(&[0xaa; 20])),
        }
    }

    #[test]
    fn rfc822_rendering() {
        let text = email("[project] Fix").to_rfc822();
        assert!(text.starts_with("From: alice@example.com\nTo: list@example.com, other@example.com\n"));
        assert!(text.contains("Bcc: filer@example.com\n"));
        assert!(text.contains("Subject: [project] Fix\n"));
        assert!(text.contains(&format!("X-Git-Rev: {}\n", "aa".repeat(20))));
        assert!(text.ends_with("\nbody\n\nDiff:\n\n--- a\n+++ b\n"));
    }

    #[test]
    fn queue_flushes_in_order_once() {
        let mut queue = EmailQueue::new();
        queue.extend([email("one"), email("two")]);
        assert_eq!(queue.len(), 2);
        let mailer = Capture::new();
        assert_eq!(queue.flush(&mailer).unwrap(), 2);
        assert!(queue.is_empty());
        let subjects: Vec<_> = mailer.sent().into_iter().map(|e| e.subject).collect();
        assert_eq!(subjects, vec!["one", "two"]);
    }
}
