// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

/// Resolve state directory: PP_DATA_DIR > XDG_STATE_HOME/pushpals > ~/.local/state/pushpals
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PP_DATA_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("pushpals");
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".local/state/pushpals")
}

/// Listen address (default loopback).
pub fn http_addr() -> String {
    std::env::var("PP_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:7447".to_string())
}

/// Bearer token required on every route when set.
pub fn auth_token() -> Option<String> {
    std::env::var("PP_AUTH_TOKEN").ok().filter(|t| !t.is_empty())
}

/// Watchdog sweep interval (default 15s, configurable via `PP_POLL_MS`).
pub fn sweep_interval() -> Duration {
    std::env::var("PP_POLL_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(15))
}
