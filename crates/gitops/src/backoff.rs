// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capped exponential backoff for transient I/O.
//!
//! The retry policy for remote-facing surfaces: up to 10 attempts, delays
//! doubling from 2 s and capped at 30 s.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Backoff {
    pub initial: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(2),
            cap: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (1-based; attempt 1 is the
    /// first retry).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial.saturating_mul(factor).min(self.cap)
    }
}

/// Retry an async operation under a backoff policy.
///
/// The final error is returned once attempts are exhausted.
pub async fn retry<T, E, F, Fut>(label: &str, policy: &Backoff, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt + 1 < policy.max_attempts => {
                attempt += 1;
                let delay = policy.delay(attempt);
                warn!(label, attempt, delay_ms = delay.as_millis() as u64, error = %e,
                      "transient failure, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
