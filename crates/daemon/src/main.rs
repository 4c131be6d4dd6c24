// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ppd: the pushpals coordination daemon.

use clap::Parser;
use pp_daemon::{env, lifecycle, router};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ppd", about = "pushpals coordination daemon", version)]
struct Args {
    /// State directory (default: PP_DATA_DIR or ~/.local/state/pushpals)
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Listen address (default: PP_HTTP_ADDR or 127.0.0.1:7447)
    #[arg(long)]
    addr: Option<String>,

    /// Log to stderr instead of the daemon log file
    #[arg(long)]
    foreground: bool,
}

fn init_tracing(args: &Args, log_path: &std::path::Path) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if args.foreground {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return None;
    }
    let appender = tracing_appender::rolling::never(
        log_path.parent().unwrap_or(std::path::Path::new(".")),
        log_path.file_name().unwrap_or(std::ffi::OsStr::new("daemon.log")),
    );
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).with_ansi(false).init();
    Some(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let state_dir = args.state_dir.clone().unwrap_or_else(env::data_dir);
    let addr = args.addr.clone().unwrap_or_else(env::http_addr);
    let config = lifecycle::Config::from_state_dir(state_dir, addr);

    std::fs::create_dir_all(&config.state_dir)?;
    let _log_guard = init_tracing(&args, &config.log_path);

    let daemon = match lifecycle::startup(config, env::auth_token()) {
        Ok(daemon) => daemon,
        Err(lifecycle::LifecycleError::LockFailed(path)) => {
            eprintln!("ppd: another instance holds the lock at {}", path.display());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("ppd: {e}");
            std::process::exit(1);
        }
    };

    let listener = tokio::net::TcpListener::bind(&daemon.config.addr).await?;
    info!(addr = %daemon.config.addr, "listening");

    let shutdown = daemon.shutdown.clone();
    let app = router(daemon.state.clone());
    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        let sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate());
        match sigterm {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("SIGINT: shutting down"),
                    _ = sigterm.recv() => info!("SIGTERM: shutting down"),
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                info!("SIGINT: shutting down");
            }
        }
        shutdown.cancel();
    });
    serve.await?;

    info!("daemon stopped");
    Ok(())
}
