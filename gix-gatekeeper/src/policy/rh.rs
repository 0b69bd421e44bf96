//! Revision-log checks, applied to the message of each new commit.
//!
//! The first failing check rejects the commit. All checks are skipped for commits whose
//! message contains [`NO_RH_CHECK`], and the ticket-number check alone for those containing
//! [`NO_TN_CHECK`].

use std::sync::OnceLock;

use regex::Regex;

use crate::config::RevisionLogConfig;
use crate::port::Commit;
use crate::refs::short_hex;
use crate::{Rejection, Verdict};

/// Disables all revision-log checks of a commit.
pub const NO_RH_CHECK: &str = "no-rh-check";
/// Disables the ticket-number check of a commit.
pub const NO_TN_CHECK: &str = "no-tn-check";

/// Characters of ISO-8859-15 which differ from ISO-8859-1, as Unicode scalar values.
const LATIN9_SPECIFIC: [char; 8] = ['€', 'Š', 'š', 'Ž', 'ž', 'Œ', 'œ', 'Ÿ'];
/// Code points of ISO-8859-1 replaced in ISO-8859-15.
const LATIN1_REPLACED: [u32; 8] = [0xA4, 0xA6, 0xA8, 0xB4, 0xB8, 0xBC, 0xBD, 0xBE];

fn in_charset(c: char) -> bool {
    match c as u32 {
        0x09 | 0x20..=0x7E => true,
        cp @ 0xA0..=0xFF => !LATIN1_REPLACED.contains(&cp),
        _ => LATIN9_SPECIFIC.contains(&c),
    }
}

fn default_merge_message() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^Merge (remote-tracking )?branch '.*'( of .*)?( into .*)?$")
            .unwrap_or_else(|err| unreachable!("constant regex is valid: {err}"))
    })
}

fn invalid(commit: &Commit) -> String {
    format!("Invalid revision history for commit {}:", short_hex(&commit.rev))
}

/// Check the message of `commit`, pushed to `refname`, against `config`.
pub fn check_commit(commit: &Commit, refname: &str, config: &RevisionLogConfig) -> Verdict {
    let message = commit.message();
    if message.contains(NO_RH_CHECK) {
        tracing::debug!(rev = %commit.rev, "revision-log checks disabled by keyword");
        return Ok(());
    }
    let lines: Vec<&str> = message.split('\n').collect();

    if !config.no_character_range_check {
        check_charset(commit, &lines)?;
    }
    if !config.no_empty_line_check {
        check_empty_line(commit)?;
    }
    if let Some(max) = config.max_line_length {
        check_line_length(commit, &lines, max)?;
    }
    if !config.disable_merge_commit_checks {
        check_default_merge_message(commit)?;
    }
    check_conflicts_section(commit, &lines)?;
    if config.tn_required && !message.contains(NO_TN_CHECK) {
        check_ticket_number(commit, &message, config)?;
    }
    if commit.is_merge() {
        if let Some(pattern) = config.reject_merge_commits.first_match(refname) {
            return Err(Rejection::from_lines([
                format!("Merge commits are not allowed on {refname} (hooks.reject-merge-commits: '{pattern}')."),
                format!("Commit {} has {} parents.", short_hex(&commit.rev), commit.parents.as_ref().map_or(0, Vec::len)),
                "Please rebase your changes instead of merging.".to_owned(),
            ]));
        }
    }
    Ok(())
}

fn check_charset(commit: &Commit, lines: &[&str]) -> Verdict {
    for (line_idx, line) in lines.iter().enumerate() {
        if let Some((column, bad)) = line.chars().enumerate().find(|(_, c)| !in_charset(*c)) {
            return Err(Rejection::from_lines([
                invalid(commit),
                "It contains characters not in the ISO-8859-15 charset.".to_owned(),
                format!(
                    "Below is the first line where this was detected (line {}, column {}, character {:?}):",
                    line_idx + 1,
                    column + 1,
                    bad
                ),
                format!("| {line}"),
                format!("  {}^", " ".repeat(column)),
            ]));
        }
    }
    Ok(())
}

fn check_empty_line(commit: &Commit) -> Verdict {
    match commit.body_lines.first() {
        Some(first) if !first.trim().is_empty() => Err(Rejection::from_lines([
            invalid(commit),
            "The first line should be the subject of the commit,".to_owned(),
            "followed by an empty line.".to_owned(),
            String::new(),
            "Below are the first few lines of the revision history:".to_owned(),
            format!("| {}", commit.subject),
            format!("| {first}"),
        ])),
        _ => Ok(()),
    }
}

fn check_line_length(commit: &Commit, lines: &[&str], max: usize) -> Verdict {
    for (line_idx, line) in lines.iter().enumerate() {
        let len = line.chars().count();
        if len > max {
            return Err(Rejection::from_lines([
                invalid(commit),
                format!("Line {} is too long ({len} > {max}):", line_idx + 1),
                format!("| {line}"),
            ]));
        }
    }
    Ok(())
}

fn check_default_merge_message(commit: &Commit) -> Verdict {
    if commit.is_merge() && default_merge_message().is_match(&commit.subject) {
        return Err(Rejection::from_lines([
            format!("Pattern of a default merge commit message detected in {}:", short_hex(&commit.rev)),
            format!("| {}", commit.subject),
            String::new(),
            "This usually indicates an unintentional merge commit, typically the result of".to_owned(),
            "'git pull' with local changes. Please rebase your changes instead, or edit the".to_owned(),
            "merge commit message if the merge is intentional.".to_owned(),
        ]));
    }
    Ok(())
}

fn check_conflicts_section(commit: &Commit, lines: &[&str]) -> Verdict {
    if let Some(line_idx) = lines.iter().position(|l| l.trim_start_matches('#').trim() == "Conflicts:") {
        return Err(Rejection::from_lines([
            invalid(commit),
            format!("Line {} starts a 'Conflicts:' section left over from resolving conflicts.", line_idx + 1),
            "Please edit the revision history to remove it, or to explain how conflicts were resolved.".to_owned(),
        ]));
    }
    Ok(())
}

fn check_ticket_number(commit: &Commit, message: &str, config: &RevisionLogConfig) -> Verdict {
    if config.tn_regex.is_match(message) {
        return Ok(());
    }
    Err(Rejection::from_lines([
        format!("The revision history for commit {} is missing a ticket number.", short_hex(&commit.rev)),
        String::new(),
        format!("The ticket number must match '{}' and may appear", config.tn_regex.as_str()),
        "anywhere in the revision history.".to_owned(),
        String::new(),
        format!("If no ticket applies, add the keyword '{NO_TN_CHECK}' to the revision history."),
    ]))
}
