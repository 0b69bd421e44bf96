//! Mail transports.

use std::cell::RefCell;
use std::path::PathBuf;

use super::Email;
use crate::hooks::Invocation;
use crate::Error;

/// Delivers emails.
pub trait Mailer {
    /// Deliver `email`.
    fn send(&self, email: &Email) -> Result<(), Error>;
}

impl<M: Mailer + ?Sized> Mailer for &M {
    fn send(&self, email: &Email) -> Result<(), Error> {
        (**self).send(email)
    }
}

/// Delivers emails by piping them to `sendmail -oi -t`.
#[derive(Debug, Clone)]
pub struct Sendmail {
    program: PathBuf,
}

impl Default for Sendmail {
    fn default() -> Self {
        Sendmail {
            program: "sendmail".into(),
        }
    }
}

impl Sendmail {
    /// Use `program` instead of `sendmail` from `PATH`.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Sendmail {
            program: program.into(),
        }
    }
}

impl Mailer for Sendmail {
    fn send(&self, email: &Email) -> Result<(), Error> {
        let output = Invocation::new(&self.program)
            .args(["-oi", "-t"])
            .stdin(email.to_rfc822())
            .run()?;
        if !output.success() {
            return Err(Error::backend(
                format!("{} -oi -t", self.program.display()),
                output.combined_text(),
            ));
        }
        Ok(())
    }
}

/// Keeps emails instead of delivering them.
#[derive(Debug, Default)]
pub struct Capture {
    sent: RefCell<Vec<Email>>,
}

impl Capture {
    /// Create an empty capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// All emails sent so far, in order.
    pub fn sent(&self) -> Vec<Email> {
        self.sent.borrow().clone()
    }
}

impl Mailer for Capture {
    fn send(&self, email: &Email) -> Result<(), Error> {
        self.sent.borrow_mut().push(email.clone());
        Ok(())
    }
}
