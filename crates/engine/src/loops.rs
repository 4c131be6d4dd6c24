// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervised polling loops.
//!
//! Every background loop in a daemon (queue drain, watchdog sweep, remote
//! scan) runs through this harness: a cancellation token, capped backoff
//! after a failed tick, and a graceful-stop path that always finishes the
//! in-flight iteration before exiting.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Delay between successful ticks.
    pub interval: Duration,
    /// Backoff ceiling after consecutive failures.
    pub max_backoff: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(5), max_backoff: Duration::from_secs(60) }
    }
}

/// Spawn a named supervised loop.
///
/// The tick runs to completion even when cancellation fires mid-tick; the
/// token is only consulted between iterations.
pub fn spawn_supervised<F, Fut, E>(
    name: &'static str,
    config: LoopConfig,
    token: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send,
    E: std::fmt::Display + Send,
{
    tokio::spawn(async move {
        let mut backoff = config.interval;
        loop {
            if token.is_cancelled() {
                break;
            }
            match tick().await {
                Ok(()) => {
                    backoff = config.interval;
                }
                Err(e) => {
                    warn!(loop_name = name, error = %e, "tick failed, backing off");
                    backoff = (backoff * 2).min(config.max_backoff);
                }
            }
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(backoff) => {}
            }
        }
        debug!(loop_name = name, "loop stopped");
    })
}

#[cfg(test)]
#[path = "loops_tests.rs"]
mod tests;
