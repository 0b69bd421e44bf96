//! Checks on the file names a commit introduces.

use std::collections::{BTreeMap, HashSet};

use crate::config::RevisionLogConfig;
use crate::port::{ChangeStatus, Commit, Vcs};
use crate::refs::short_hex;
use crate::{Error, Rejection, Verdict};

/// Check the paths added by `commit` against `config`.
///
/// Added paths may not exceed the configured length, and may not differ only in case from any
/// other path of the tree of `commit`, which would make the tree unusable on case-insensitive
/// filesystems. A path of a merge is added only if none of its parents has it.
pub fn check_commit(vcs: &(impl Vcs + ?Sized), commit: &Commit, config: &RevisionLogConfig) -> Result<Verdict, Error> {
    if config.no_filename_collision_check && config.max_filepath_length.is_none() {
        return Ok(Ok(()));
    }
    let mut added = added_paths(vcs, commit.first_parent(), commit)?;
    for parent in commit.parents.iter().flatten().skip(1) {
        if added.is_empty() {
            break;
        }
        let from_parent: HashSet<String> = added_paths(vcs, Some(parent), commit)?.into_iter().collect();
        added.retain(|path| from_parent.contains(path));
    }
    if added.is_empty() {
        return Ok(Ok(()));
    }

    if let Some(max) = config.max_filepath_length {
        let too_long: Vec<_> = added.iter().filter(|path| path.chars().count() > max).collect();
        if !too_long.is_empty() {
            let mut lines = vec![format!(
                "The following files added by commit {} have a path longer than {max} characters:",
                short_hex(&commit.rev)
            )];
            lines.extend(too_long.iter().map(|path| format!("  {path} ({} characters)", path.chars().count())));
            lines.push("Please rename them to shorten their path.".to_owned());
            return Ok(Err(Rejection::from_lines(lines)));
        }
    }

    if !config.no_filename_collision_check {
        let mut by_folded: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for path in vcs.files(&commit.rev)? {
            by_folded.entry(path.to_lowercase()).or_default().push(path);
        }
        let collisions: Vec<&Vec<String>> = by_folded
            .values()
            .filter(|paths| paths.len() > 1 && paths.iter().any(|p| added.contains(p)))
            .collect();
        if !collisions.is_empty() {
            let mut lines = vec![
                format!(
                    "The following filename collisions were introduced by commit {}:",
                    short_hex(&commit.rev)
                ),
                "These files would overwrite each other on case-insensitive filesystems.".to_owned(),
            ];
            for paths in collisions {
                lines.push(String::new());
                lines.extend(paths.iter().map(|p| format!("  {p}")));
            }
            return Ok(Err(Rejection::from_lines(lines)));
        }
    }
    Ok(Ok(()))
}

fn added_paths(vcs: &(impl Vcs + ?Sized), base: Option<&gix_hash::ObjectId>, commit: &Commit) -> Result<Vec<String>, Error> {
    Ok(vcs
        .changes(base, &commit.rev)?
        .into_iter()
        .filter(|change| change.status == ChangeStatus::Added)
        .map(|change| change.path)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolicyConfig;
    use crate::memory::Repository;

    fn config() -> RevisionLogConfig {
        PolicyConfig::default().revision_log
    }

    #[test]
    fn case_collisions_with_existing_files_are_rejected() {
        let mut repo = Repository::new();
        let base = crate::memory::Repository::commit(&mut repo, "base").file("src/Makefile", "all:").create();
        let rev = crate::memory::Repository::commit(&mut repo, "collide").parent(base).file("src/makefile", "all:").create();
        let commit = Vcs::commit(&repo, &rev).unwrap();

        let rejection = check_commit(&repo, &commit, &config()).unwrap().unwrap_err();
        assert!(rejection.reason().contains("src/Makefile"));
        assert!(rejection.reason().contains("src/makefile"));

        let mut cfg = config();
        cfg.no_filename_collision_check = true;
        assert_eq!(check_commit(&repo, &commit, &cfg).unwrap(), Ok(()));
    }

    #[test]
    fn collisions_not_introduced_by_the_commit_are_ignored() {
        let mut repo = Repository::new();
        let base = crate::memory::Repository::commit(&mut repo, "base").file("README", "a").file("readme", "b").create();
        let rev = crate::memory::Repository::commit(&mut repo, "unrelated").parent(base).file("NEWS", "c").create();
        let commit = Vcs::commit(&repo, &rev).unwrap();
        assert_eq!(check_commit(&repo, &commit, &config()).unwrap(), Ok(()));
    }

    #[test]
    fn long_added_paths_are_rejected() {
        let mut repo = Repository::new();
        let long = format!("dir/{}", "x".repeat(200));
        let base = crate::memory::Repository::commit(&mut repo, "base").file(&long, "old").create();
        let modify = crate::memory::Repository::commit(&mut repo, "modify").parent(base).file(&long, "new").create();
        assert_eq!(
            check_commit(&repo, &Vcs::commit(&repo, &modify).unwrap(), &config()).unwrap(),
            Ok(()),
            "only added files count"
        );

        let rev = crate::memory::Repository::commit(&mut repo, "add").parent(modify).file(&format!("{long}.bak"), "x").create();
        let rejection = check_commit(&repo, &Vcs::commit(&repo, &rev).unwrap(), &config()).unwrap().unwrap_err();
        assert!(rejection.reason().contains("longer than 150 characters"));

        let mut cfg = config();
        cfg.max_filepath_length = None;
        assert_eq!(check_commit(&repo, &Vcs::commit(&repo, &rev).unwrap(), &cfg).unwrap(), Ok(()));
    }

    #[test]
    fn merges_are_only_checked_for_paths_new_to_all_parents() {
        let mut repo = Repository::new();
        let long = format!("dir/{}", "x".repeat(200));
        let base = crate::memory::Repository::commit(&mut repo, "base").file("README", "r").create();
        let side = crate::memory::Repository::commit(&mut repo, "side")
            .parent(base)
            .file(&long, "x")
            .file("docs/Guide", "a")
            .file("docs/guide", "b")
            .create();
        let main = crate::memory::Repository::commit(&mut repo, "main").parent(base).file("NEWS", "n").create();
        let merge = crate::memory::Repository::commit(&mut repo, "merge side")
            .parent(main)
            .parent(side)
            .file(&long, "x")
            .file("docs/Guide", "a")
            .file("docs/guide", "b")
            .create();
        assert_eq!(
            check_commit(&repo, &Vcs::commit(&repo, &merge).unwrap(), &config()).unwrap(),
            Ok(()),
            "paths brought in from the second parent were checked there"
        );

        let evil = crate::memory::Repository::commit(&mut repo, "merge side again")
            .parent(main)
            .parent(side)
            .file(&long, "x")
            .file(&format!("{long}.bak"), "y")
            .create();
        let rejection = check_commit(&repo, &Vcs::commit(&repo, &evil).unwrap(), &config())
            .unwrap()
            .unwrap_err();
        assert!(rejection.reason().contains(".bak"));
    }
}
