// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session event model.
//!
//! Events are append-only and cursor-indexed per store (not per session).
//! The envelope is an opaque typed blob; the kind is derived from the
//! envelope's type tag and drawn from a closed set.

use crate::session::SessionId;
use serde::{Deserialize, Serialize};

/// Default page size for `events_after`.
pub const EVENTS_DEFAULT_LIMIT: usize = 1_000;
/// Hard cap for `events_after`.
pub const EVENTS_MAX_LIMIT: usize = 10_000;

/// Closed set of event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// User and assistant chat messages
    Chat,
    /// Task lifecycle (created, progress, done)
    Task,
    /// Tool invocations reported by agents
    Tool,
    /// Job lifecycle (enqueued, claimed, completed, failed)
    Job,
    /// Approval requests and resolutions
    Approval,
    /// Agent status transitions
    AgentStatus,
}

impl EventKind {
    /// Classify an envelope type tag into a kind.
    ///
    /// Unknown tags fall back to [`EventKind::Chat`] only for the message
    /// family; everything else lands in [`EventKind::AgentStatus`] so the
    /// set stays closed without rejecting forward-compatible envelopes.
    pub fn classify(event_type: &str) -> Self {
        match event_type {
            "message" | "assistant_message" => Self::Chat,
            "task_created" | "task_progress" | "task_done" => Self::Task,
            "tool_call" | "tool_result" => Self::Tool,
            "job_enqueued" | "job_claimed" | "job_completed" | "job_failed" => Self::Job,
            "approval_requested" | "approval_resolved" => Self::Approval,
            _ => Self::AgentStatus,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Task => "task",
            Self::Tool => "tool",
            Self::Job => "job",
            Self::Approval => "approval",
            Self::AgentStatus => "agent_status",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "chat" => Some(Self::Chat),
            "task" => Some(Self::Task),
            "tool" => Some(Self::Tool),
            "job" => Some(Self::Job),
            "approval" => Some(Self::Approval),
            "agent_status" => Some(Self::AgentStatus),
            _ => None,
        }
    }
}

crate::simple_display! {
    EventKind {
        Chat => "chat",
        Task => "task",
        Tool => "tool",
        Job => "job",
        Approval => "approval",
        AgentStatus => "agent_status",
    }
}

/// Opaque typed event payload as posted by clients and agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

impl Envelope {
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self { event_type: event_type.into(), data }
    }

    /// Envelope for a user chat message.
    pub fn message(text: impl Into<String>) -> Self {
        Self::new("message", serde_json::json!({ "text": text.into() }))
    }

    pub fn kind(&self) -> EventKind {
        EventKind::classify(&self.event_type)
    }
}

/// A persisted event row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub cursor: i64,
    pub session_id: SessionId,
    pub kind: EventKind,
    pub ts_ms: u64,
    pub envelope: Envelope,
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
