// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session hub: create-or-join, message/command ingestion, and event
//! fan-out.
//!
//! The ordering contract is persist-before-broadcast: an event reaches the
//! store (and has its cursor) before any subscriber hears about it, so a
//! reconnecting subscriber that replays from its last cursor always
//! observes a prefix of the live stream.

use crate::error::EngineError;
use parking_lot::Mutex;
use pp_core::{Clock, CoreError, Envelope, EventRecord, SessionId};
use pp_storage::Store;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Store handle shared across the daemon's tasks.
pub type SharedStore = Arc<Mutex<Store>>;

/// Broadcast capacity per session. Laggards resume by cursor replay, so a
/// bounded channel is safe.
const TOPIC_CAPACITY: usize = 256;

/// One live event as pushed to subscribers: the wire framing is this
/// struct serialized as a single JSON line.
#[derive(Debug, Clone, Serialize)]
pub struct EventFrame {
    pub cursor: i64,
    pub envelope: Envelope,
}

/// Result of `create_or_join`.
#[derive(Debug, Clone, Serialize)]
pub struct JoinResult {
    pub session_id: SessionId,
    pub created: bool,
}

/// A catch-up-then-tail subscription.
///
/// `backlog` holds the replayed records; `live` tails appends. Frames that
/// were already covered by the backlog are dropped by [`Subscription::admit`].
pub struct Subscription {
    pub backlog: Vec<EventRecord>,
    pub live: broadcast::Receiver<EventFrame>,
    delivered_through: i64,
}

impl Subscription {
    /// Filter a live frame against what the backlog already delivered.
    pub fn admit(&mut self, frame: EventFrame) -> Option<EventFrame> {
        if frame.cursor <= self.delivered_through {
            return None;
        }
        self.delivered_through = frame.cursor;
        Some(frame)
    }
}

/// Thin control plane atop the event store.
pub struct SessionHub<C: Clock> {
    store: SharedStore,
    clock: C,
    topics: Mutex<HashMap<String, broadcast::Sender<EventFrame>>>,
}

impl<C: Clock> SessionHub<C> {
    pub fn new(store: SharedStore, clock: C) -> Self {
        Self { store, clock, topics: Mutex::new(HashMap::new()) }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Create the session if absent; join it otherwise. A missing id gets
    /// a generated one.
    pub fn create_or_join(
        &self,
        id: Option<&str>,
        label: Option<&str>,
    ) -> Result<JoinResult, EngineError> {
        let session_id = match id {
            Some(raw) => SessionId::parse(raw)?,
            None => SessionId::generate(),
        };
        let now = self.clock.epoch_ms();
        let created = self.store.lock().create_session(&session_id, label, now)?;
        debug!(session = %session_id, created, "create_or_join");
        Ok(JoinResult { session_id, created })
    }

    /// Append a user chat message and broadcast it.
    pub fn post_message(&self, session: &str, text: &str) -> Result<i64, EngineError> {
        if text.is_empty() {
            return Err(CoreError::Validation("message text must be non-empty".into()).into());
        }
        self.publish(session, Envelope::message(text))
    }

    /// Append an arbitrary typed event (agents post `assistant_message`,
    /// `task_progress`, `status`, ... through this).
    pub fn post_command(&self, session: &str, envelope: Envelope) -> Result<i64, EngineError> {
        if envelope.event_type.is_empty() {
            return Err(CoreError::Validation("envelope requires a type".into()).into());
        }
        self.publish(session, envelope)
    }

    /// Persist, then broadcast. Returns the assigned cursor.
    fn publish(&self, session: &str, envelope: Envelope) -> Result<i64, EngineError> {
        let session_id = SessionId::parse(session)?;
        let now = self.clock.epoch_ms();
        let cursor = self.store.lock().append_event(&session_id, &envelope, now)?;

        // Broadcast after the store accepted the event. No receivers is fine.
        if let Some(tx) = self.topics.lock().get(session_id.as_str()) {
            let _ = tx.send(EventFrame { cursor, envelope });
        }
        Ok(cursor)
    }

    /// Subscribe from a cursor: replay first, then tail.
    ///
    /// The live receiver is registered before the backlog read so no event
    /// can fall between replay and tail; overlap is deduplicated by
    /// [`Subscription::admit`].
    pub fn subscribe(
        &self,
        session: &str,
        after: Option<i64>,
    ) -> Result<Subscription, EngineError> {
        let store = self.store.lock();
        if store.get_session(session)?.is_none() {
            return Err(CoreError::NotFound(format!("session '{session}'")).into());
        }
        let live = {
            let mut topics = self.topics.lock();
            topics
                .entry(session.to_string())
                .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
                .subscribe()
        };
        let backlog = store.events_after(session, after.unwrap_or(0), None)?;
        let delivered_through = backlog.last().map(|e| e.cursor).unwrap_or(after.unwrap_or(0));
        Ok(Subscription { backlog, live, delivered_through })
    }

    /// Bounded replay without a live tail (plain paginated reads).
    pub fn events_after(
        &self,
        session: &str,
        after: i64,
        limit: Option<usize>,
    ) -> Result<Vec<EventRecord>, EngineError> {
        let store = self.store.lock();
        if store.get_session(session)?.is_none() {
            return Err(CoreError::NotFound(format!("session '{session}'")).into());
        }
        Ok(store.events_after(session, after, limit)?)
    }

    pub fn latest_cursor(&self, session: &str) -> Result<i64, EngineError> {
        Ok(self.store.lock().latest_cursor(session)?)
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
