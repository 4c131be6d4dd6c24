// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The serial pusher daemon loop.
//!
//! One instance per repository, guarded by an advisory file lock in the
//! state directory. The loop is strictly serial: discover candidates,
//! claim at most one merge job, run the pipeline, land the outcome, sleep.

use crate::config::{PusherConfig, SourceMode};
use crate::error::PusherError;
use crate::pipeline::{MergeOutcome, Pipeline, SkipReason};
use crate::source::{CompletionSource, RemoteScanSource, ServerClaimSource};
use fs2::FileExt;
use pp_core::{Clock, ErrorBlob, SystemClock};
use pp_git::Repo;
use pp_storage::Store;
use std::fs::File;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FATAL: i32 = 1;
pub const EXIT_SIGINT: i32 = 130;
pub const EXIT_SIGTERM: i32 = 143;

const SIG_NONE: u8 = 0;
const SIG_INT: u8 = 2;
const SIG_TERM: u8 = 15;

pub struct PusherDaemon {
    config: PusherConfig,
    store: Store,
    pipeline: Pipeline,
    source: Box<dyn CompletionSource>,
    clock: SystemClock,
    // NOTE(lifetime): held to maintain the exclusive lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    running: Arc<AtomicBool>,
    signal: Arc<AtomicU8>,
}

impl PusherDaemon {
    /// Acquire the lock, open the queue database, and wire the source.
    ///
    /// A second instance must exit non-zero with a clear message rather
    /// than race the first, so the lock is taken before anything else.
    pub fn start(config: PusherConfig) -> Result<Self, PusherError> {
        std::fs::create_dir_all(&config.state_dir).map_err(|e| {
            PusherError::Fatal(format!(
                "cannot create state dir {}: {e}",
                config.state_dir.display()
            ))
        })?;

        // Open without truncating: the file may hold the live owner's PID.
        let lock_path = config.lock_path();
        let mut lock_file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| PusherError::Fatal(format!("cannot open lock file: {e}")))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| PusherError::LockHeld(lock_path.display().to_string()))?;
        lock_file.set_len(0).ok();
        let _ = writeln!(lock_file, "{}", std::process::id());

        let store = Store::open(&config.db_path())?;
        let checkout = if config.isolate_worktree {
            ensure_worktree(&config)?
        } else {
            config.repo_path.clone()
        };
        let repo = Repo::new(&checkout, config.git_timeout);
        let source: Box<dyn CompletionSource> = match config.source {
            SourceMode::RemoteScan => Box::new(RemoteScanSource::new(
                repo.clone(),
                config.remote.clone(),
                config.branch_prefix.clone(),
                config.max_attempts,
            )),
            SourceMode::ServerClaim => Box::new(ServerClaimSource::new(
                config.server_url.clone().unwrap_or_default(),
                config.auth_token.clone(),
                config.remote.clone(),
                config.max_attempts,
            )),
        };
        let pipeline = Pipeline::new(repo, config.clone());
        info!(repo = %config.repo_path.display(), state = %config.state_dir.display(),
              "serial pusher started");

        Ok(Self {
            config,
            store,
            pipeline,
            source,
            clock: SystemClock,
            lock_file,
            running: Arc::new(AtomicBool::new(true)),
            signal: Arc::new(AtomicU8::new(SIG_NONE)),
        })
    }

    /// Install SIGINT/SIGTERM handlers that flip the running flag; the
    /// in-flight tick always completes before shutdown.
    fn install_signal_handlers(&self) {
        for (kind, code) in [
            (tokio::signal::unix::SignalKind::interrupt(), SIG_INT),
            (tokio::signal::unix::SignalKind::terminate(), SIG_TERM),
        ] {
            let running = Arc::clone(&self.running);
            let signal = Arc::clone(&self.signal);
            match tokio::signal::unix::signal(kind) {
                Ok(mut stream) => {
                    tokio::spawn(async move {
                        stream.recv().await;
                        signal.store(code, Ordering::SeqCst);
                        running.store(false, Ordering::SeqCst);
                    });
                }
                Err(e) => warn!(error = %e, "cannot install signal handler"),
            }
        }
    }

    /// Main loop; returns the process exit code.
    pub async fn run(mut self) -> i32 {
        self.install_signal_handlers();
        while self.running.load(Ordering::SeqCst) {
            match self.tick().await {
                Ok(()) => {}
                Err(PusherError::Fatal(message)) => {
                    error!(message, "fatal; exiting");
                    return EXIT_FATAL;
                }
                Err(e) => {
                    // Transient tick failure: keep the daemon alive.
                    warn!(error = %e, "tick failed");
                }
            }
            // Interruptible sleep so signals cut the idle wait short.
            let mut slept = std::time::Duration::ZERO;
            while slept < self.config.interval && self.running.load(Ordering::SeqCst) {
                let step = std::time::Duration::from_millis(200).min(self.config.interval - slept);
                tokio::time::sleep(step).await;
                slept += step;
            }
        }
        info!("draining and shutting down");
        match self.signal.load(Ordering::SeqCst) {
            SIG_INT => EXIT_SIGINT,
            SIG_TERM => EXIT_SIGTERM,
            _ => EXIT_OK,
        }
    }

    /// One serial pass: discover, claim one job, run it, land the outcome.
    pub async fn tick(&mut self) -> Result<(), PusherError> {
        let now = self.clock.epoch_ms();
        if let Err(e) = self.source.discover(&mut self.store, now).await {
            warn!(error = %e, "discovery failed; will retry next tick");
        }

        let Some(job) = self.store.claim_merge_job("serial-pusher", self.clock.epoch_ms())?
        else {
            return Ok(());
        };
        info!(job = %job.describe(), attempt = job.attempts, "claimed merge job");

        let outcome = self.pipeline.run(&job).await?;
        let now = self.clock.epoch_ms();
        match &outcome {
            MergeOutcome::Merged { new_head } => {
                info!(job = %job.describe(), new_head = %pp_core::time_fmt::short(new_head, 7),
                      "merged");
                self.store.complete_merge_job(job.id.as_str(), now)?;
            }
            MergeOutcome::Skipped { reason } => {
                info!(job = %job.describe(), "skipped");
                self.store.skip_merge_job(job.id.as_str(), &reason.as_blob(), now)?;
            }
            MergeOutcome::Requeue { reason } => {
                info!(job = %job.describe(), reason, "requeueing");
                if !self.store.requeue_merge_job(job.id.as_str(), now)? {
                    // Attempts exhausted while we were classifying
                    let blob = SkipReason::AttemptsExhausted { detail: reason.clone() }.as_blob();
                    self.store.skip_merge_job(job.id.as_str(), &blob, now)?;
                }
            }
            MergeOutcome::Failed { error } => {
                warn!(job = %job.describe(), error = %error.message, "failed");
                self.store.fail_merge_job(job.id.as_str(), error, now)?;
            }
            MergeOutcome::DryRun { would_merge } => {
                info!(job = %job.describe(), would_merge = %pp_core::time_fmt::short(would_merge, 7),
                      "dry run: leaving job pending");
                if !self.store.requeue_merge_job(job.id.as_str(), now)? {
                    let blob = ErrorBlob::new("skipped: dry-run exhausted attempts");
                    self.store.skip_merge_job(job.id.as_str(), &blob, now)?;
                }
            }
        }
        self.source.acknowledge(&job, &outcome).await.ok();
        Ok(())
    }

    /// Direct access to the merge queue store (status inspection, tests).
    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }
}

/// Create (or reuse) the daemon's merge worktree under
/// `<state_dir>/worktrees/merge`. The integration branch must not be
/// checked out in the primary checkout; git refuses that itself.
fn ensure_worktree(config: &PusherConfig) -> Result<std::path::PathBuf, PusherError> {
    let path = config.state_dir.join("worktrees").join("merge");
    if path.join(".git").exists() {
        return Ok(path);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| PusherError::Fatal(format!("cannot create worktrees dir: {e}")))?;
    }
    let output = std::process::Command::new("git")
        .arg("-C")
        .arg(&config.repo_path)
        .args(["worktree", "add", "--detach"])
        .arg(&path)
        .output()
        .map_err(|e| PusherError::Fatal(format!("cannot spawn git worktree add: {e}")))?;
    if !output.status.success() {
        return Err(PusherError::Fatal(format!(
            "git worktree add failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    info!(worktree = %path.display(), "created merge worktree");
    Ok(path)
}

#[cfg(test)]
#[path = "daemon_tests.rs"]
mod tests;
