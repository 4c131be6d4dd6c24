// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pp-daemon: the coordination server.
//!
//! HTTP surface over the session hub and the three item queues, plus the
//! background watchdog sweep. One instance per state directory, guarded by
//! a file lock.

pub mod env;
pub mod http;
pub mod lifecycle;

pub use http::{router, AppState, SharedState};
pub use lifecycle::{startup, Config, DaemonState, LifecycleError};
