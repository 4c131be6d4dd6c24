// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn config(dir: &std::path::Path) -> Config {
    Config::from_state_dir(dir.to_path_buf(), "127.0.0.1:0".to_string())
}

#[tokio::test]
async fn startup_writes_pid_and_locks() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = startup(config(dir.path()), None).unwrap();

    let pid = std::fs::read_to_string(&daemon.config.lock_path).unwrap();
    assert_eq!(pid.trim(), std::process::id().to_string());
    assert!(daemon.config.db_path.exists());
    daemon.shutdown.cancel();
}

#[tokio::test]
async fn second_instance_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let first = startup(config(dir.path()), None).unwrap();
    let err = startup(config(dir.path()), None).unwrap_err();
    assert!(matches!(err, LifecycleError::LockFailed(_)));
    first.shutdown.cancel();
}

#[tokio::test]
async fn lock_released_after_drop() {
    let dir = tempfile::tempdir().unwrap();
    let first = startup(config(dir.path()), None).unwrap();
    first.shutdown.cancel();
    drop(first);
    let second = startup(config(dir.path()), None).unwrap();
    second.shutdown.cancel();
}
