// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event store and session hub specs: cursor monotonicity, replay as a
//! prefix of the live stream, reconnect-from-cursor.

use parking_lot::Mutex;
use pp_core::{Envelope, FakeClock, SessionId};
use pp_engine::SessionHub;
use pp_storage::Store;
use std::sync::Arc;

fn hub_on_disk(dir: &std::path::Path) -> SessionHub<FakeClock> {
    let store = Store::open(&dir.join("pushpals.db")).unwrap();
    SessionHub::new(Arc::new(Mutex::new(store)), FakeClock::new())
}

#[test]
fn cursors_strictly_increase_across_sessions_and_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let mut last = 0;
    {
        let hub = hub_on_disk(dir.path());
        hub.create_or_join(Some("a"), None).unwrap();
        hub.create_or_join(Some("b"), None).unwrap();
        for i in 0..50 {
            let session = if i % 2 == 0 { "a" } else { "b" };
            let cursor = hub.post_message(session, &format!("m{i}")).unwrap();
            assert!(cursor > last, "cursor went backwards: {cursor} after {last}");
            last = cursor;
        }
    }

    // Reopen the same database: cursors keep increasing
    let hub = hub_on_disk(dir.path());
    let cursor = hub.post_message("a", "after restart").unwrap();
    assert!(cursor > last);
}

#[test]
fn replay_is_a_prefix_of_the_full_stream() {
    let dir = tempfile::tempdir().unwrap();
    let hub = hub_on_disk(dir.path());
    hub.create_or_join(Some("s"), None).unwrap();
    for i in 0..100 {
        hub.post_message("s", &format!("m{i}")).unwrap();
    }

    let full = hub.events_after("s", 0, None).unwrap();
    assert_eq!(full.len(), 100);
    for probe in [0, 1, 42, 99] {
        let after = full[probe].cursor;
        let replay = hub.events_after("s", after, None).unwrap();
        let expected: Vec<i64> = full[probe + 1..].iter().map(|e| e.cursor).collect();
        let got: Vec<i64> = replay.iter().map(|e| e.cursor).collect();
        assert_eq!(got, expected, "replay after cursor {after} is not a suffix");
    }
}

#[test]
fn reconnect_from_cursor_42_sees_43_through_100_then_live() {
    let dir = tempfile::tempdir().unwrap();
    let hub = hub_on_disk(dir.path());
    hub.create_or_join(Some("s"), None).unwrap();
    let mut cursors = Vec::new();
    for i in 1..=100 {
        cursors.push(hub.post_message("s", &format!("event {i}")).unwrap());
    }

    // "Reconnect with after=42": 42nd event's cursor
    let mut sub = hub.subscribe("s", Some(cursors[41])).unwrap();
    let replayed: Vec<i64> = sub.backlog.iter().map(|e| e.cursor).collect();
    assert_eq!(replayed, cursors[42..].to_vec());

    let live_cursor = hub.post_message("s", "live tail").unwrap();
    let frame = sub.live.try_recv().unwrap();
    let frame = sub.admit(frame).unwrap();
    assert_eq!(frame.cursor, live_cursor);
}

#[test]
fn store_rejects_events_for_unknown_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = Store::open(&dir.path().join("pushpals.db")).unwrap();
    let err = store
        .append_event(&SessionId::test("never-created"), &Envelope::message("x"), 1_000)
        .unwrap_err();
    assert!(matches!(
        err,
        pp_storage::StorageError::Core(pp_core::CoreError::InvariantViolation(_))
    ));
}

#[test]
fn events_survive_reopen_with_same_order() {
    let dir = tempfile::tempdir().unwrap();
    let sent: Vec<i64> = {
        let hub = hub_on_disk(dir.path());
        hub.create_or_join(Some("s"), None).unwrap();
        (0..10).map(|i| hub.post_message("s", &format!("m{i}")).unwrap()).collect()
    };

    let hub = hub_on_disk(dir.path());
    let replayed: Vec<i64> =
        hub.events_after("s", 0, None).unwrap().iter().map(|e| e.cursor).collect();
    assert_eq!(replayed, sent);
}
