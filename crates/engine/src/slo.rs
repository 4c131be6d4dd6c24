// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sliding-window SLO summary over terminal queue items.

use pp_core::ErrorBlob;
use pp_storage::SloRow;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Failures whose error text matches this are counted as timeouts so
/// budget exhaustion is visible separately from ordinary failures.
fn timeout_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // static pattern, verified by tests
        Regex::new(r"(?i)timeout|timed out|deadline exceeded|heartbeat stale|watchdog").unwrap()
    })
}

/// Whether an error blob describes a budget/timeout failure.
///
/// Matches the whole structured blob, not just the message: watchdog
/// recoveries carry their evidence in `detail`.
pub fn is_timeout_error(error: &ErrorBlob) -> bool {
    if timeout_re().is_match(&error.message) {
        return true;
    }
    if error.detail.is_null() {
        return false;
    }
    serde_json::to_string(&error.detail)
        .map(|detail| timeout_re().is_match(&detail))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PercentileSet {
    pub p50: u64,
    pub p95: u64,
    pub avg: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SloSummary {
    pub window_hours: u32,
    pub terminal: u64,
    pub completed: u64,
    pub failed: u64,
    pub timeout_failed: u64,
    pub skipped: u64,
    pub success_rate: f64,
    pub timeout_rate: f64,
    pub duration_ms: PercentileSet,
    pub queue_wait_ms: PercentileSet,
}

/// Aggregate terminal rows (already windowed by the store query).
pub fn summarize(rows: &[SloRow], window_hours: u32) -> SloSummary {
    use pp_core::QueueItemStatus::*;

    let mut completed = 0u64;
    let mut failed = 0u64;
    let mut timeout_failed = 0u64;
    let mut skipped = 0u64;
    let mut durations = Vec::new();
    let mut waits = Vec::new();

    for row in rows {
        match row.status {
            Completed => completed += 1,
            Failed => {
                failed += 1;
                if row.error.as_ref().map(is_timeout_error).unwrap_or(false) {
                    timeout_failed += 1;
                }
            }
            Skipped => skipped += 1,
            Pending | Claimed => continue,
        }
        if let Some(d) = row.duration_ms {
            durations.push(d);
        }
        if let Some(w) = row.queue_wait_ms {
            waits.push(w);
        }
    }

    let terminal = completed + failed + skipped;
    let rate = |n: u64| if terminal == 0 { 0.0 } else { n as f64 / terminal as f64 };
    SloSummary {
        window_hours,
        terminal,
        completed,
        failed,
        timeout_failed,
        skipped,
        success_rate: rate(completed),
        timeout_rate: rate(timeout_failed),
        duration_ms: percentiles(&mut durations),
        queue_wait_ms: percentiles(&mut waits),
    }
}

fn percentiles(values: &mut Vec<u64>) -> PercentileSet {
    if values.is_empty() {
        return PercentileSet::default();
    }
    values.sort_unstable();
    let at = |p: f64| {
        let idx = ((values.len() as f64 - 1.0) * p).round() as usize;
        values[idx.min(values.len() - 1)]
    };
    let sum: u64 = values.iter().sum();
    PercentileSet { p50: at(0.50), p95: at(0.95), avg: sum / values.len() as u64 }
}

#[cfg(test)]
#[path = "slo_tests.rs"]
mod tests;
