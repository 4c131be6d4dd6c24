// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only session event log.
//!
//! Cursors are store-wide (the rowid), strictly increasing. `append` runs
//! in a single transaction so it is linearizable with respect to any other
//! append; callers broadcast only after it returns.

use crate::db::Store;
use crate::error::StorageError;
use pp_core::{
    CoreError, Envelope, EventKind, EventRecord, SessionId, SessionMeta, EVENTS_DEFAULT_LIMIT,
    EVENTS_MAX_LIMIT,
};
use rusqlite::{params, OptionalExtension};

impl Store {
    /// Create the session row if absent. Returns `true` when created.
    pub fn create_session(
        &mut self,
        id: &SessionId,
        label: Option<&str>,
        now_ms: u64,
    ) -> Result<bool, StorageError> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO sessions (id, created_at_ms, label) VALUES (?1, ?2, ?3)",
            params![id.as_str(), now_ms as i64, label],
        )?;
        Ok(changed == 1)
    }

    pub fn get_session(&self, id: &str) -> Result<Option<SessionMeta>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, created_at_ms, label FROM sessions WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(id, created_at_ms, label)| {
            let id = SessionId::parse(&id)
                .map_err(|e| StorageError::Corrupt(format!("bad session id in store: {e}")))?;
            Ok(SessionMeta { id, created_at_ms: created_at_ms as u64, label })
        })
        .transpose()
    }

    pub fn list_sessions(&self) -> Result<Vec<SessionMeta>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, created_at_ms, label FROM sessions ORDER BY created_at_ms")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, Option<String>>(2)?))
        })?;
        let mut sessions = Vec::new();
        for row in rows {
            let (id, created_at_ms, label) = row?;
            let id = SessionId::parse(&id)
                .map_err(|e| StorageError::Corrupt(format!("bad session id in store: {e}")))?;
            sessions.push(SessionMeta { id, created_at_ms: created_at_ms as u64, label });
        }
        Ok(sessions)
    }

    /// Persist one event. Fails with `InvariantViolation` when the session
    /// row is missing — the hub must `create_session` first; orphan events
    /// are rejected rather than silently adopted.
    pub fn append_event(
        &mut self,
        session: &SessionId,
        envelope: &Envelope,
        now_ms: u64,
    ) -> Result<i64, StorageError> {
        let tx = self.conn.transaction()?;
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM sessions WHERE id = ?1)",
            params![session.as_str()],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(CoreError::InvariantViolation(format!(
                "append for unknown session '{session}'"
            ))
            .into());
        }
        tx.execute(
            "INSERT INTO events (session_id, kind, ts_ms, envelope) VALUES (?1, ?2, ?3, ?4)",
            params![
                session.as_str(),
                envelope.kind().as_str(),
                now_ms as i64,
                serde_json::to_string(envelope)?,
            ],
        )?;
        let cursor = tx.last_insert_rowid();
        tx.commit()?;
        Ok(cursor)
    }

    /// Events for `session` with cursor > `after`, oldest first.
    ///
    /// `limit` defaults to 1 000 and is capped at 10 000.
    pub fn events_after(
        &self,
        session: &str,
        after: i64,
        limit: Option<usize>,
    ) -> Result<Vec<EventRecord>, StorageError> {
        let limit = limit.unwrap_or(EVENTS_DEFAULT_LIMIT).min(EVENTS_MAX_LIMIT);
        let mut stmt = self.conn.prepare(
            "SELECT cursor, session_id, kind, ts_ms, envelope FROM events
             WHERE session_id = ?1 AND cursor > ?2
             ORDER BY cursor ASC LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![session, after, limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        let mut events = Vec::new();
        for row in rows {
            let (cursor, session_id, kind, ts_ms, envelope) = row?;
            events.push(EventRecord {
                cursor,
                session_id: SessionId::parse(&session_id)
                    .map_err(|e| StorageError::Corrupt(format!("bad session id: {e}")))?,
                kind: EventKind::parse(&kind)
                    .ok_or_else(|| StorageError::Corrupt(format!("unknown event kind '{kind}'")))?,
                ts_ms: ts_ms as u64,
                envelope: serde_json::from_str(&envelope)?,
            });
        }
        Ok(events)
    }

    /// Highest cursor for the session, 0 when it has no events.
    pub fn latest_cursor(&self, session: &str) -> Result<i64, StorageError> {
        let cursor: Option<i64> = self.conn.query_row(
            "SELECT MAX(cursor) FROM events WHERE session_id = ?1",
            params![session],
            |row| row.get(0),
        )?;
        Ok(cursor.unwrap_or(0))
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
