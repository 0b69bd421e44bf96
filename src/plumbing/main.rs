use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use gix_gatekeeper::config::{self, DebugLevel};
use gix_gatekeeper::notify::Capture;
use gix_gatekeeper::port::git;
use gix_gatekeeper::refs::{parse_hook_input, parse_rev, RefMutation};
use gix_gatekeeper::{Gatekeeper, PushContext, PushOutcome, Snapshot, Vcs};

use crate::plumbing::options::{Args, Subcommands};

pub fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if !run(args)? {
        std::process::exit(1);
    }
    Ok(())
}

/// Returns `false` if the push was refused.
fn run(args: Args) -> anyhow::Result<bool> {
    let git_dir = args
        .git_dir
        .clone()
        .or_else(|| std::env::var_os("GIT_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    let repo = git::Repository::new(&git_dir);
    let capture = Capture::new();
    let mailer = args.dry_run.then_some(&capture);

    let accepted = match args.cmd {
        Subcommands::CheckConfig { rev } => {
            let config = match rev {
                Some(rev) => {
                    let id = resolve(&repo, &rev)?;
                    config::load_at(&repo, &id)
                }
                None => config::load(&repo, &Snapshot::load(&repo)?),
            }
            .context("invalid configuration")?;
            init_tracing(config.debug_level, args.verbose);
            println!("{}", config.describe());
            true
        }
        Subcommands::PreReceive => {
            let gatekeeper = gatekeeper(repo, &git_dir, mailer, args.verbose)?;
            report(&gatekeeper.validate_push(&read_mutations()?)?)
        }
        Subcommands::Update { refname, old, new } => {
            let mutation = RefMutation::new(refname, parse_rev(&old)?, parse_rev(&new)?);
            let gatekeeper = gatekeeper(repo, &git_dir, mailer, args.verbose)?;
            report(&PushOutcome {
                refs: vec![gatekeeper.validate_update(&mutation)?],
            })
        }
        Subcommands::PostReceive => {
            let gatekeeper = gatekeeper(repo, &git_dir, mailer, args.verbose)?;
            let outcome = gatekeeper.notify_push(&read_mutations()?)?;
            for warning in &outcome.warnings {
                eprintln!("*** {}", warning.replace('\n', "\n*** "));
            }
            tracing::info!(emails = outcome.emails_sent, "notifications sent");
            true
        }
    };

    for email in capture.sent() {
        println!("{}", email.to_rfc822());
    }
    Ok(accepted)
}

/// Set up the engine and logging as configured in the repository.
fn gatekeeper<'a>(
    repo: git::Repository,
    git_dir: &Path,
    mailer: Option<&'a Capture>,
    verbose: u8,
) -> anyhow::Result<Gatekeeper<'a, git::Repository>> {
    let ctx = PushContext::from_env().context("could not set up the push")?;
    let mut gatekeeper = Gatekeeper::new(repo, git_dir, ctx);
    if let Some(mailer) = mailer {
        gatekeeper = gatekeeper.with_mailer(mailer);
    }
    let config = gatekeeper.load_config().context("invalid configuration")?;
    init_tracing(config.debug_level, verbose);
    Ok(gatekeeper)
}

fn read_mutations() -> anyhow::Result<Vec<RefMutation>> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("could not read reference updates from stdin")?;
    Ok(parse_hook_input(&input)?)
}

fn resolve(repo: &git::Repository, rev: &str) -> anyhow::Result<gix_hash::ObjectId> {
    if let Ok(Some(id)) = parse_rev(rev) {
        return Ok(id);
    }
    match repo.references()?.get(rev) {
        Some(id) => Ok(*id),
        None => bail!("no such reference or object id: {rev}"),
    }
}

/// Print warnings and rejections for the pusher, returning `true` if everything was accepted.
fn report(outcome: &PushOutcome) -> bool {
    for r in &outcome.refs {
        for warning in &r.warnings {
            eprintln!("*** {}: {}", r.refname, warning.replace('\n', "\n*** "));
        }
        if let Some(rejection) = &r.rejection {
            eprintln!("*** {} rejected:", r.refname);
            for line in rejection.reason().lines() {
                eprintln!("*** {line}");
            }
        }
    }
    outcome.is_accepted()
}

fn init_tracing(debug_level: DebugLevel, verbose: u8) {
    let levels = [
        tracing::Level::WARN,
        tracing::Level::INFO,
        tracing::Level::DEBUG,
        tracing::Level::TRACE,
    ];
    let configured = match debug_level {
        DebugLevel::Quiet => 0,
        DebugLevel::Debug => 2,
        DebugLevel::Trace => 3,
    };
    let level = levels[(configured + usize::from(verbose)).min(levels.len() - 1)];
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
