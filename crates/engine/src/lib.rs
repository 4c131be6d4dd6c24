// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pp-engine: the coordination logic above the store.
//!
//! Session hub (persist-before-broadcast fan-out), scheduler estimates,
//! SLO summaries, the stale-claim watchdog, and the supervised-loop
//! harness every polling task runs on.

mod error;
mod failure;
mod hub;
mod loops;
mod scheduler;
mod slo;
mod watchdog;

pub use error::EngineError;
pub use failure::{classify_job_failure, CLARIFICATION_EXIT_CODE};
pub use hub::{EventFrame, JoinResult, SessionHub, SharedStore, Subscription};
pub use loops::{spawn_supervised, LoopConfig};
pub use scheduler::{eta_for_position, QueueSnapshot, StatsSnapshot};
pub use slo::{is_timeout_error, summarize, PercentileSet, SloSummary};
pub use watchdog::{RecoveredClaim, WatchdogConfig};
