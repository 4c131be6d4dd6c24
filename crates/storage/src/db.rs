// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Database handle, pragmas, and schema migrations.

use crate::error::StorageError;
use rusqlite::Connection;
use std::path::Path;
use tracing::info;

/// Current schema version, written to `PRAGMA user_version`.
const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id            TEXT PRIMARY KEY,
    created_at_ms INTEGER NOT NULL,
    label         TEXT
);

CREATE TABLE IF NOT EXISTS events (
    cursor     INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(id),
    kind       TEXT NOT NULL,
    ts_ms      INTEGER NOT NULL,
    envelope   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_session ON events(session_id, cursor);

CREATE TABLE IF NOT EXISTS queue_items (
    id                     TEXT PRIMARY KEY,
    queue                  TEXT NOT NULL,
    session_id             TEXT NOT NULL,
    status                 TEXT NOT NULL DEFAULT 'pending',
    owner                  TEXT,
    payload                TEXT NOT NULL DEFAULT 'null',
    result                 TEXT,
    error                  TEXT,
    attempts               INTEGER NOT NULL DEFAULT 0,
    max_attempts           INTEGER NOT NULL DEFAULT 3,
    priority               TEXT NOT NULL DEFAULT 'normal',
    queue_wait_budget_ms   INTEGER NOT NULL DEFAULT 90000,
    execution_budget_ms    INTEGER NOT NULL DEFAULT 900000,
    finalization_budget_ms INTEGER NOT NULL DEFAULT 120000,
    target_owner           TEXT,
    task_id                TEXT,
    kind                   TEXT,
    commit_ref             TEXT,
    branch_ref             TEXT,
    enqueued_at_ms         INTEGER NOT NULL,
    claimed_at_ms          INTEGER,
    started_at_ms          INTEGER,
    first_activity_at_ms   INTEGER,
    completed_at_ms        INTEGER,
    failed_at_ms           INTEGER,
    duration_ms            INTEGER
);
CREATE INDEX IF NOT EXISTS idx_queue_claim
    ON queue_items(queue, status, priority, enqueued_at_ms);
CREATE UNIQUE INDEX IF NOT EXISTS idx_completion_dedup
    ON queue_items(queue, session_id, commit_ref, branch_ref)
    WHERE commit_ref IS NOT NULL;

CREATE TABLE IF NOT EXISTS merge_jobs (
    id             TEXT PRIMARY KEY,
    remote         TEXT NOT NULL,
    branch         TEXT NOT NULL,
    head_sha       TEXT NOT NULL,
    status         TEXT NOT NULL DEFAULT 'pending',
    priority       INTEGER NOT NULL DEFAULT 0,
    owner          TEXT,
    attempts       INTEGER NOT NULL DEFAULT 0,
    max_attempts   INTEGER NOT NULL DEFAULT 3,
    last_error     TEXT,
    enqueued_at_ms INTEGER NOT NULL,
    claimed_at_ms  INTEGER,
    completed_at_ms INTEGER,
    failed_at_ms   INTEGER,
    duration_ms    INTEGER,
    UNIQUE(remote, branch, head_sha)
);
CREATE INDEX IF NOT EXISTS idx_merge_claim ON merge_jobs(status, priority, enqueued_at_ms);

CREATE TABLE IF NOT EXISTS workers (
    id                TEXT PRIMARY KEY,
    status            TEXT NOT NULL DEFAULT 'idle',
    current_job_id    TEXT,
    last_heartbeat_ms INTEGER NOT NULL DEFAULT 0,
    details           TEXT NOT NULL DEFAULT 'null'
);

CREATE TABLE IF NOT EXISTS job_log (
    job_id TEXT NOT NULL,
    ts_ms  INTEGER NOT NULL,
    line   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_job_log ON job_log(job_id, ts_ms);

CREATE TABLE IF NOT EXISTS seen_branches (
    remote         TEXT NOT NULL,
    branch         TEXT NOT NULL,
    head_sha       TEXT NOT NULL,
    observed_at_ms INTEGER NOT NULL,
    PRIMARY KEY (remote, branch)
);
"#;

/// Owning handle over one SQLite database.
///
/// Not `Sync`: callers share a `Store` behind a mutex. All multi-statement
/// operations run in `BEGIN IMMEDIATE` transactions so a crash mid-call
/// leaves no partial state.
pub struct Store {
    pub(crate) conn: Connection,
}

impl Store {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Corrupt(format!("cannot create state dir {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(path)?;
        let store = Self::init(conn)?;
        info!(db = %path.display(), "opened store");
        Ok(store)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        // WAL for concurrent readers; 5s busy timeout for contended files.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        migrate(&conn)?;
        Ok(Self { conn })
    }
}

fn migrate(conn: &Connection) -> Result<(), StorageError> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version < SCHEMA_VERSION {
        conn.execute_batch(SCHEMA)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        if version > 0 {
            info!(from = version, to = SCHEMA_VERSION, "migrated schema");
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "db_tests.rs"]
mod tests;
