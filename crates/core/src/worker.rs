// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker registry model.
//!
//! Workers self-register on first claim and report liveness through
//! heartbeats; a worker is online iff its last heartbeat is within the TTL.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Default heartbeat TTL before a worker counts as offline.
pub const WORKER_ONLINE_TTL_MS: u64 = 15_000;

/// Free-form worker identifier, trimmed and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn parse(id: impl AsRef<str>) -> Result<Self, CoreError> {
        let trimmed = id.as_ref().trim();
        if trimmed.is_empty() {
            return Err(CoreError::Validation("workerId must be non-empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for WorkerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for WorkerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Reported worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    #[default]
    Idle,
    Busy,
    Error,
    Offline,
}

impl WorkerStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "busy" => Some(Self::Busy),
            "error" => Some(Self::Error),
            "offline" => Some(Self::Offline),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Error => "error",
            Self::Offline => "offline",
        }
    }
}

crate::simple_display! {
    WorkerStatus {
        Idle => "idle",
        Busy => "busy",
        Error => "error",
        Offline => "offline",
    }
}

/// Registry row for a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub status: WorkerStatus,
    pub current_job_id: Option<String>,
    pub last_heartbeat_ms: u64,
    /// Capability / environment blob, opaque to the core.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl WorkerRecord {
    /// A worker is online iff `now − last_heartbeat ≤ ttl`.
    pub fn online(&self, now_ms: u64, ttl_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_heartbeat_ms) <= ttl_ms
    }

    /// Heartbeating within TTL and busy on exactly this job.
    pub fn busy_on(&self, job_id: &str, now_ms: u64, ttl_ms: u64) -> bool {
        self.online(now_ms, ttl_ms)
            && self.status == WorkerStatus::Busy
            && self.current_job_id.as_deref() == Some(job_id)
    }
}

crate::builder! {
    pub struct WorkerRecordBuilder => WorkerRecord {
        set {
            id: WorkerId = WorkerId("w1".to_string()),
            status: WorkerStatus = WorkerStatus::Idle,
            last_heartbeat_ms: u64 = 1_000_000,
            details: serde_json::Value = serde_json::Value::Null,
        }
        option {
            current_job_id: String = None,
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
