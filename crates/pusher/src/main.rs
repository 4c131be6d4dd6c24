// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! serial-pusher: serial merge daemon CLI.

use anyhow::Context;
use clap::Parser;
use pp_pusher::{PusherConfig, PusherDaemon, PusherError, EXIT_FATAL};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "serial-pusher",
    about = "Serially merge published agent branches into the integration branch",
    version
)]
struct Args {
    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Repository checkout the daemon owns
    #[arg(long)]
    repo: Option<PathBuf>,

    /// Remote name (default: origin)
    #[arg(long)]
    remote: Option<String>,

    /// Integration branch (default: main)
    #[arg(long)]
    branch: Option<String>,

    /// Ref prefix workers publish under (default: refs/pushpals/agent/)
    #[arg(long)]
    prefix: Option<String>,

    /// Seconds between poll ticks
    #[arg(long)]
    interval: Option<u64>,

    /// State directory (lock file + merge_queue.db)
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Delete the agent branch on the remote after a successful merge
    #[arg(long)]
    delete_after_merge: bool,

    /// Validate and report without advancing the integration branch
    #[arg(long)]
    dry_run: bool,

    /// Skip the dirty-working-tree guard at startup
    #[arg(long)]
    skip_clean_check: bool,
}

fn resolve_config(args: Args) -> anyhow::Result<PusherConfig> {
    let file = match &args.config {
        Some(path) => pp_pusher::FileConfig::load(path).context("loading config file")?,
        None => pp_pusher::FileConfig::default(),
    };
    let cli = pp_pusher::CliOverrides {
        repo: args.repo,
        remote: args.remote,
        branch: args.branch,
        prefix: args.prefix,
        interval_secs: args.interval,
        state_dir: args.state_dir,
        delete_after_merge: args.delete_after_merge,
        dry_run: args.dry_run,
        skip_clean_check: args.skip_clean_check,
    };
    Ok(PusherConfig::resolve(file, cli)?)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = match resolve_config(args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("serial-pusher: {e:#}");
            std::process::exit(EXIT_FATAL);
        }
    };

    let daemon = match PusherDaemon::start(config) {
        Ok(daemon) => daemon,
        Err(PusherError::LockHeld(path)) => {
            eprintln!("serial-pusher: another instance holds the lock at {path}");
            std::process::exit(EXIT_FATAL);
        }
        Err(e) => {
            eprintln!("serial-pusher: {e}");
            std::process::exit(EXIT_FATAL);
        }
    };

    let code = daemon.run().await;
    std::process::exit(code);
}
