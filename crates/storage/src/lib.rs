// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pp-storage: SQLite persistence for the coordination core.
//!
//! One database file per daemon. Everything that crosses a process or
//! crash boundary lives here: the session event log, the three item
//! queues, the merge queue, the worker registry, and the activity
//! evidence the watchdog reads.

mod activity;
mod db;
mod error;
mod events;
mod merge_queue;
mod queues;
mod workers;

pub use activity::SloRow;
pub use db::Store;
pub use error::StorageError;
pub use queues::{PriorityCounts, StatusCounts};
