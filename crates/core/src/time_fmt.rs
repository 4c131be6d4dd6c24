// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Small formatting helpers for timestamps and identifiers.

use chrono::{TimeZone, Utc};

/// Render epoch milliseconds as an ISO-8601 UTC timestamp.
///
/// Out-of-range values (far future) clamp to the epoch rather than panic.
pub fn iso_ms(epoch_ms: u64) -> String {
    let ts = Utc
        .timestamp_millis_opt(epoch_ms as i64)
        .single()
        .unwrap_or_else(|| Utc.timestamp_millis_opt(0).single().unwrap_or_default());
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Returns a string slice truncated to at most `n` characters.
pub fn short(s: &str, n: usize) -> &str {
    if s.len() <= n {
        s
    } else {
        &s[..n]
    }
}
