//! External process execution via gix-command.
//!
//! Every program the engine talks to (the `git` executable, the style checker, mailing-list
//! scripts, the commit-email formatter and the administrator hooks) is run through an
//! [`Invocation`], which captures output with a size limit and feeds standard input from a
//! separate thread so large inputs can't deadlock against large outputs.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use super::{env::HookEnvironment, HookDecision, Hooks};
use crate::port::Commit;
use crate::refs::{hex_or_null, RefMutation};
use crate::Error;

/// The default limit for captured output, per stream.
pub const DEFAULT_MAX_OUTPUT_SIZE: usize = 4 * 1024 * 1024;

/// A prepared program invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    program: OsString,
    args: Vec<OsString>,
    stdin: Option<Vec<u8>>,
    cwd: Option<PathBuf>,
    env: Vec<(OsString, OsString)>,
    max_output_size: usize,
}

/// The captured result of a finished [`Invocation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    /// The exit code, `None` if the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Standard output, possibly truncated.
    pub stdout: Vec<u8>,
    /// Standard error, possibly truncated.
    pub stderr: Vec<u8>,
}

impl Output {
    /// True if the process exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Standard output as lossily decoded text.
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Standard output followed by standard error as lossily decoded text, trailing newlines removed.
    pub fn combined_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&self.stderr));
        text.trim_end().to_owned()
    }
}

impl Invocation {
    /// Prepare running `program`, which is looked up in `PATH` unless it is a path.
    pub fn new(program: impl Into<OsString>) -> Self {
        Invocation {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            cwd: None,
            env: Vec::new(),
            max_output_size: DEFAULT_MAX_OUTPUT_SIZE,
        }
    }

    /// Append a single argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append all `args`.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Feed `data` to the standard input of the process. Without it, standard input is empty.
    pub fn stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    /// Run the process in `dir`.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Set the environment variable `key` to `value`.
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set all variables of `environment`.
    pub fn environment(mut self, environment: &HookEnvironment) -> Self {
        self.env
            .extend(environment.vars().map(|(k, v)| (OsString::from(k), OsString::from(v))));
        self
    }

    /// Limit each captured output stream to `bytes`.
    pub fn max_output_size(mut self, bytes: usize) -> Self {
        self.max_output_size = bytes;
        self
    }

    /// The program to run.
    pub fn program(&self) -> &Path {
        Path::new(&self.program)
    }

    /// Spawn the process, feed its input and wait for it to finish.
    ///
    /// Failing to spawn is an error, a non-zero exit code is not.
    pub fn run(self) -> Result<Output, Error> {
        let Invocation {
            program,
            args,
            stdin,
            cwd,
            env,
            max_output_size,
        } = self;

        let mut prepare = gix_command::prepare(program)
            .args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in env {
            prepare = prepare.env(key, value);
        }
        let mut cmd: std::process::Command = prepare.into();
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn()?;
        let writer = match (stdin, child.stdin.take()) {
            (Some(data), Some(mut pipe)) => Some(std::thread::spawn(move || {
                // The process may legitimately exit without consuming its input.
                match pipe.write_all(&data) {
                    Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
                    other => other,
                }
            })),
            _ => None,
        };
        let output = child.wait_with_output()?;
        if let Some(writer) = writer {
            writer
                .join()
                .map_err(|_| Error::backend("writing process input", "writer thread panicked"))??;
        }

        Ok(Output {
            exit_code: output.status.code(),
            stdout: truncate(output.stdout, max_output_size),
            stderr: truncate(output.stderr, max_output_size),
        })
    }
}

fn truncate(mut buf: Vec<u8>, max: usize) -> Vec<u8> {
    if buf.len() > max {
        buf.truncate(max);
        buf.extend_from_slice(format!("\n... [truncated: output exceeded {max} bytes]\n").as_bytes());
    }
    buf
}

/// Paths of the administrator-provided programs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookPaths {
    /// Run per reference update with `<ref> <old> <new>`.
    pub update: Option<PathBuf>,
    /// Run per new commit with `<ref> <rev>` and a JSON description on stdin.
    pub commit_extra_checker: Option<PathBuf>,
    /// Run after notifications were sent, with the post-receive input on stdin.
    pub post_receive: Option<PathBuf>,
}

/// [`Hooks`] running external programs.
///
/// Hooks which aren't configured allow everything.
#[derive(Debug, Clone)]
pub struct ExternalHooks {
    paths: HookPaths,
    environment: HookEnvironment,
}

impl ExternalHooks {
    /// Run the programs in `paths` with `environment`.
    pub fn new(paths: HookPaths, environment: HookEnvironment) -> Self {
        ExternalHooks { paths, environment }
    }

    fn execute(&self, path: &Path, args: &[String], stdin: Option<Vec<u8>>) -> Result<HookDecision, Error> {
        let mut invocation = Invocation::new(path).args(args).environment(&self.environment);
        if let Some(data) = stdin {
            invocation = invocation.stdin(data);
        }
        let output = invocation.run().map_err(|err| match err {
            Error::Io(io) => Error::configuration("hook", path.display().to_string(), format!("cannot execute: {io}")),
            other => other,
        })?;
        Ok(if output.success() {
            HookDecision::allow_with_output(output.combined_text())
        } else {
            HookDecision::deny(output.combined_text(), output.exit_code)
        })
    }
}

impl Hooks for ExternalHooks {
    fn update(&self, mutation: &RefMutation) -> Result<HookDecision, Error> {
        let Some(path) = &self.paths.update else {
            return Ok(HookDecision::allow());
        };
        let args = [
            mutation.name().to_owned(),
            hex_or_null(mutation.old),
            hex_or_null(mutation.new),
        ];
        tracing::debug!(refname = mutation.name(), hook = %path.display(), "running update hook");
        self.execute(path, &args, None)
    }

    fn commit_extra_check(&self, refname: &str, commit: &Commit) -> Result<HookDecision, Error> {
        let Some(path) = &self.paths.commit_extra_checker else {
            return Ok(HookDecision::allow());
        };
        let description = serde_json::json!({
            "ref_name": refname,
            "rev": commit.rev.to_string(),
            "author_name": commit.author_name,
            "author_email": commit.author_email,
            "subject": commit.subject,
            "body": commit.body_lines.join("\n"),
        });
        let args = [refname.to_owned(), commit.rev.to_string()];
        tracing::debug!(refname, rev = %commit.rev, hook = %path.display(), "running commit extra checker");
        self.execute(path, &args, Some(description.to_string().into_bytes()))
    }

    fn post_receive(&self, mutations: &[RefMutation]) -> Result<HookDecision, Error> {
        let Some(path) = &self.paths.post_receive else {
            return Ok(HookDecision::allow());
        };
        let stdin: String = mutations.iter().map(|m| m.to_hook_line() + "\n").collect();
        tracing::debug!(hook = %path.display(), "running post-receive hook");
        self.execute(path, &[], Some(stdin.into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_marks_output() {
        let out = truncate(b"0123456789".to_vec(), 4);
        assert!(out.starts_with(b"0123\n... [truncated"));
        assert_eq!(truncate(b"012".to_vec(), 4), b"012".to_vec());
    }

    #[test]
    fn combined_text_trims_trailing_whitespace() {
        let out = Output {
            exit_code: Some(1),
            stdout: b"out\n".to_vec(),
            stderr: b"err\n\n".to_vec(),
        };
        assert!(!out.success());
        assert_eq!(out.combined_text(), "out\nerr");
    }

    #[test]
    fn unconfigured_hooks_allow() {
        let hooks = ExternalHooks::new(HookPaths::default(), HookEnvironment::new());
        let m = RefMutation::new("refs/heads/main", None, None);
        assert!(hooks.update(&m).unwrap().allowed);
        assert!(hooks.post_receive(&[m]).unwrap().allowed);
    }

    #[cfg(unix)]
    #[test]
    fn invocation_feeds_stdin_and_captures_exit_code() {
        let out = Invocation::new("sh")
            .args(["-c", "cat; echo oops >&2; exit 3"])
            .stdin("hello\n")
            .run()
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stdout, b"hello\n");
        assert_eq!(out.stderr, b"oops\n");
    }

    #[cfg(unix)]
    #[test]
    fn invocation_runs_in_current_dir_with_env() {
        let dir = tempfile::tempdir().unwrap();
        let out = Invocation::new("sh")
            .args(["-c", "pwd; echo $GATEKEEPER_TEST"])
            .current_dir(dir.path())
            .env("GATEKEEPER_TEST", "yes")
            .run()
            .unwrap();
        let text = out.stdout_text();
        let canonical = dir.path().canonicalize().unwrap();
        assert!(text.contains(canonical.to_str().unwrap()) || text.contains(dir.path().to_str().unwrap()));
        assert!(text.ends_with("yes\n"));
    }
}
