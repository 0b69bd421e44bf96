use std::path::PathBuf;

#[derive(Debug, clap::Parser)]
#[clap(name = "gix-gatekeeper", about = "Validate and announce pushes from git server hooks", version)]
#[clap(subcommand_required = true)]
pub struct Args {
    /// The git directory of the repository, defaults to `GIT_DIR` or the current directory.
    #[clap(long, global = true)]
    pub git_dir: Option<PathBuf>,

    /// Log more, repeat for even more. Adds to `hooks.debug-level`.
    #[clap(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Print emails to stdout instead of sending them.
    #[clap(long, global = true)]
    pub dry_run: bool,

    #[clap(subcommand)]
    pub cmd: Subcommands,
}

#[derive(Debug, clap::Subcommand)]
pub enum Subcommands {
    /// Validate all reference updates of a push, read as `<old> <new> <ref>` lines from stdin.
    PreReceive,
    /// Validate the update of a single reference.
    Update {
        /// The fully qualified reference name.
        refname: String,
        /// The previous object id, all zeros if the reference is created.
        old: String,
        /// The new object id, all zeros if the reference is deleted.
        new: String,
    },
    /// Send notifications about an accepted push, read as `<old> <new> <ref>` lines from stdin.
    PostReceive,
    /// Validate the configuration and print the resolved values.
    CheckConfig {
        /// The revision or reference to read the configuration from instead of `refs/meta/config`.
        rev: Option<String>,
    },
}
