//! ferry - CLI entry point.
//!
//! Results are printed to stdout as JSON. Logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use semver::Version;
use serde::Serialize;
use serde_json::json;
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use ferry::changelog::generate_summary;
use ferry::git::PullStrategy;
use ferry::{
    ChangelogError, ChangelogFormat, ChangelogStyle, CommitStyle, Config, Git2Provider,
    Pipeline, PipelineError,
};

/// Environment variable holding the log filter.
const LOG_ENV_VAR: &str = "FERRY_LOG";

/// Classify, screen, commit and push working tree changes.
#[derive(Parser, Debug)]
#[command(name = "ferry")]
#[command(about = "Classify, screen, commit and push working tree changes")]
#[command(version)]
struct Cli {
    /// Repository root
    #[arg(long, global = true, default_value = ".")]
    repo: PathBuf,

    /// Config file (overrides FERRY_CONFIG and <repo>/.ferry.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Branch, tracking and working tree status
    Status,

    /// Classify pending changes
    Analyze,

    /// Screen pending changes for secrets and blocked files
    Scan,

    /// Propose a commit message without committing
    Plan {
        /// conventional or plain
        #[arg(long)]
        style: Option<CommitStyle>,
    },

    /// Build a changelog entry for pending changes
    Changelog {
        /// structured, human or conventional
        #[arg(long, default_value = "human")]
        format: ChangelogFormat,

        /// conventional or keep-a-changelog
        #[arg(long, default_value = "conventional")]
        style: ChangelogStyle,

        /// Insert the entry into CHANGELOG.md
        #[arg(long)]
        write: bool,

        /// Version heading to write (defaults to the computed next version)
        #[arg(long = "set-version")]
        version: Option<Version>,
    },

    /// Push the current branch with retry
    Push {
        #[arg(long)]
        remote: Option<String>,

        #[arg(long)]
        branch: Option<String>,

        /// Force push (with lease). Refused on protected branches.
        #[arg(long)]
        force: bool,

        /// Skip the force push confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Stage everything and commit with a synthesized message
    Commit {
        #[arg(long)]
        style: Option<CommitStyle>,
    },

    /// Pull from the remote
    Pull {
        #[arg(long)]
        remote: Option<String>,

        #[arg(long)]
        branch: Option<String>,

        /// merge or rebase
        #[arg(long, default_value = "merge")]
        strategy: PullStrategy,
    },

    /// Recent commits
    Log {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(cli.config.as_deref(), Some(&cli.repo))
        .context("Failed to load configuration")?;
    let provider = Git2Provider::new(config.general.default_remote.clone());
    let pipeline = Pipeline::new(provider, config).context("Invalid configuration")?;

    match run(&pipeline, &cli).await {
        Ok(code) => Ok(code),
        Err(e) => {
            emit(&e.report());
            Ok(ExitCode::FAILURE)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init()
        .ok();
}

async fn run(pipeline: &Pipeline<Git2Provider>, cli: &Cli) -> Result<ExitCode, PipelineError> {
    let repo = cli.repo.as_path();

    match &cli.command {
        Command::Status => emit(&pipeline.scan_repository(repo)?),
        Command::Analyze => emit(&pipeline.analyze_changes(repo)?),
        Command::Scan => {
            let report = pipeline.security_scan(repo)?;
            emit(&report);
            if report.blocking {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Plan { style } => emit(&pipeline.plan_commit(repo, *style)?),
        Command::Changelog {
            format,
            style,
            write,
            version,
        } => {
            let entry = pipeline.build_changelog(repo, *format, *style)?;
            if !*write {
                emit(&entry);
                return Ok(ExitCode::SUCCESS);
            }

            let version = version
                .clone()
                .or_else(|| entry.next_version.clone())
                .ok_or(ChangelogError::MissingVersion)?;
            let path = pipeline.write_changelog(repo, &entry, Some(&version)).await?;
            emit(&json!({
                "entry": entry,
                "written": path,
                "summary": generate_summary(&entry, &version),
            }));
        }
        Command::Push {
            remote,
            branch,
            force,
            yes,
        } => {
            if *force && !*yes && !confirm_force_push(branch.as_deref()) {
                emit(&json!({ "status": "cancelled" }));
                return Ok(ExitCode::FAILURE);
            }

            let report = pipeline
                .execute_push(repo, remote.as_deref(), branch.as_deref(), *force)
                .await?;
            match report.error() {
                None => emit(&report),
                Some(e) => {
                    emit(&json!({ "push": report, "error": e.report() }));
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Command::Commit { style } => emit(&pipeline.commit_changes(repo, *style).await?),
        Command::Pull {
            remote,
            branch,
            strategy,
        } => {
            let receipt = pipeline
                .pull_changes(repo, remote.as_deref(), branch.as_deref(), *strategy)
                .await?;
            emit(&receipt);
        }
        Command::Log { limit } => emit(&pipeline.history(repo, *limit)?),
    }

    Ok(ExitCode::SUCCESS)
}

fn confirm_force_push(branch: Option<&str>) -> bool {
    let target = branch.unwrap_or("the current branch");
    Confirm::new()
        .with_prompt(format!("Force push {target}? Remote commits may be overwritten"))
        .default(false)
        .interact()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Could not read confirmation; not force pushing");
            false
        })
}

fn emit<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(out) => println!("{out}"),
        Err(e) => eprintln!("Failed to serialize output: {e}"),
    }
}
