//! Resolution of `hooks.mailinglist` into addresses.
//!
//! Entries are addresses, except for paths to executable files: those are run with the
//! reference name as only argument and the changed files on stdin, and each non-empty line
//! they print is an address. A failing script contributes no address and causes a warning.

use std::path::Path;

use crate::hooks::env::HookEnvironment;
use crate::hooks::Invocation;

/// Resolves the recipients of emails.
#[derive(Debug, Clone)]
pub struct Recipients {
    entries: Vec<String>,
    environment: HookEnvironment,
}

impl Recipients {
    /// Resolve `entries` of `hooks.mailinglist`, running scripts with `environment`.
    pub fn new(entries: Vec<String>, environment: HookEnvironment) -> Self {
        Recipients { entries, environment }
    }

    /// True if no entry is configured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The addresses to notify about changes to `files` of `refname`, and warnings about
    /// scripts which failed.
    pub fn resolve(&self, refname: &str, files: &[String]) -> (Vec<String>, Vec<String>) {
        let mut addresses = Vec::new();
        let mut warnings = Vec::new();
        for entry in &self.entries {
            if !is_executable(Path::new(entry)) {
                push_unique(&mut addresses, entry.clone());
                continue;
            }
            let mut stdin = files.join("\n");
            stdin.push('\n');
            let result = Invocation::new(entry)
                .arg(refname)
                .stdin(stdin)
                .environment(&self.environment)
                .run();
            match result {
                Ok(output) if output.success() => {
                    for line in output.stdout_text().lines().map(str::trim).filter(|l| !l.is_empty()) {
                        push_unique(&mut addresses, line.to_owned());
                    }
                }
                Ok(output) => {
                    tracing::warn!(hook = entry.as_str(), refname, exit_code = ?output.exit_code, "mailing-list script failed");
                    warnings.push(format!(
                        "The mailing-list script {entry} failed (exit code {}):\n{}",
                        output.exit_code.map_or_else(|| "none".to_owned(), |c| c.to_string()),
                        output.combined_text()
                    ));
                }
                Err(err) => {
                    tracing::warn!(hook = entry.as_str(), refname, %err, "mailing-list script could not run");
                    warnings.push(format!("The mailing-list script {entry} could not be run: {err}"));
                }
            }
        }
        (addresses, warnings)
    }
}

fn push_unique(addresses: &mut Vec<String>, address: String) {
    if !addresses.contains(&address) {
        addresses.push(address);
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.is_absolute()
        && std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_absolute() && path.is_file()
}
