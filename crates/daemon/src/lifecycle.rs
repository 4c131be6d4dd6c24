// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: startup, background tasks, shutdown.

use crate::http::{AppState, SharedState};
use fs2::FileExt;
use parking_lot::Mutex;
use pp_core::{Clock, SystemClock};
use pp_engine::{spawn_supervised, LoopConfig, WatchdogConfig};
use pp_storage::Store;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("another daemon holds the lock at {0}")]
    LockFailed(PathBuf),

    #[error(transparent)]
    Storage(#[from] pp_storage::StorageError),
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/pushpals)
    pub state_dir: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to the SQLite database
    pub db_path: PathBuf,
    /// Path to daemon log file
    pub log_path: PathBuf,
    /// HTTP listen address
    pub addr: String,
}

impl Config {
    pub fn from_state_dir(state_dir: PathBuf, addr: String) -> Self {
        Self {
            lock_path: state_dir.join("daemon.pid"),
            db_path: state_dir.join("pushpals.db"),
            log_path: state_dir.join("daemon.log"),
            state_dir,
            addr,
        }
    }
}

/// Running daemon state.
pub struct DaemonState {
    pub config: Config,
    // NOTE(lifetime): held to maintain the exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub state: SharedState,
    pub shutdown: CancellationToken,
}

/// Acquire the lock, open the store, wire the app state, and start the
/// watchdog sweep.
pub fn startup(config: Config, auth_token: Option<String>) -> Result<DaemonState, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;

    // Lock first: a second instance must exit before touching shared state.
    // Open without truncating so a losing contender does not wipe the
    // winner's PID.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(|_| LifecycleError::LockFailed(config.lock_path.clone()))?;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    let store = Arc::new(Mutex::new(Store::open(&config.db_path)?));
    let state = AppState::new(Arc::clone(&store), auth_token);

    let shutdown = CancellationToken::new();
    spawn_watchdog(Arc::clone(&store), shutdown.clone());

    info!(state_dir = %config.state_dir.display(), addr = %config.addr, "daemon started");
    Ok(DaemonState { config, lock_file, state, shutdown })
}

fn spawn_watchdog(store: pp_engine::SharedStore, token: CancellationToken) {
    let watchdog = WatchdogConfig::default();
    let loop_config =
        LoopConfig { interval: crate::env::sweep_interval(), ..LoopConfig::default() };
    spawn_supervised("watchdog", loop_config, token, move || {
        let store = Arc::clone(&store);
        let watchdog = watchdog.clone();
        async move {
            let now = SystemClock.epoch_ms();
            let recovered = watchdog.sweep(&mut store.lock(), now)?;
            for claim in &recovered {
                tracing::warn!(job_id = %claim.job_id, worker = ?claim.worker_id,
                               "watchdog recovered claim");
            }
            Ok::<(), pp_engine::EngineError>(())
        }
    });
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
