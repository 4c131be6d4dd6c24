// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pusher configuration: TOML file, environment, CLI flags.
//!
//! Precedence: CLI flag > environment > config file > default.

use crate::error::PusherError;
use pp_core::MergeStrategy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where merge candidates come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SourceMode {
    /// Poll the remote for published agent branches.
    #[default]
    RemoteScan,
    /// Claim completions from the coordination server.
    ServerClaim,
}

/// Resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct PusherConfig {
    pub repo_path: PathBuf,
    pub remote: String,
    pub main_branch: String,
    /// Ref prefix the workers publish under.
    pub branch_prefix: String,
    pub merge_strategy: MergeStrategy,
    pub checks: Vec<String>,
    pub check_timeout: Duration,
    pub git_timeout: Duration,
    pub interval: Duration,
    pub state_dir: PathBuf,
    pub max_attempts: u32,
    pub delete_after_merge: bool,
    pub push_main_after_merge: bool,
    pub push_agent_branch: bool,
    pub dry_run: bool,
    pub skip_clean_check: bool,
    pub auto_create_main_branch: bool,
    /// Run merges in a dedicated worktree under `<state_dir>/worktrees/`
    /// instead of the primary checkout. The integration branch must not be
    /// checked out anywhere else (git enforces this).
    pub isolate_worktree: bool,
    pub source: SourceMode,
    pub server_url: Option<String>,
    pub auth_token: Option<String>,
}

/// The subset readable from a TOML file; every field optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileConfig {
    pub repo: Option<PathBuf>,
    pub remote: Option<String>,
    pub branch: Option<String>,
    pub prefix: Option<String>,
    pub merge_strategy: Option<String>,
    pub checks: Option<Vec<String>>,
    pub check_timeout_secs: Option<u64>,
    pub interval_secs: Option<u64>,
    pub state_dir: Option<PathBuf>,
    pub max_attempts: Option<u32>,
    pub delete_after_merge: Option<bool>,
    pub push_main_after_merge: Option<bool>,
    pub push_agent_branch: Option<bool>,
    pub skip_clean_check: Option<bool>,
    pub auto_create_main_branch: Option<bool>,
    pub isolate_worktree: Option<bool>,
    pub source: Option<SourceMode>,
    pub server_url: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, PusherError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| PusherError::Config(format!("cannot read {}: {e}", path.display())))?;
        toml::from_str(&raw)
            .map_err(|e| PusherError::Config(format!("invalid config {}: {e}", path.display())))
    }
}

/// Flag-level overrides from the CLI (everything optional).
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub repo: Option<PathBuf>,
    pub remote: Option<String>,
    pub branch: Option<String>,
    pub prefix: Option<String>,
    pub interval_secs: Option<u64>,
    pub state_dir: Option<PathBuf>,
    pub delete_after_merge: bool,
    pub dry_run: bool,
    pub skip_clean_check: bool,
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn default_state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PP_DATA_DIR") {
        return PathBuf::from(dir).join("pusher");
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("pushpals").join("pusher");
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".local/state/pushpals/pusher")
}

impl PusherConfig {
    /// Merge file, environment, and CLI layers into a resolved config.
    pub fn resolve(file: FileConfig, cli: CliOverrides) -> Result<Self, PusherError> {
        let merge_strategy = match file.merge_strategy.as_deref() {
            Some(raw) => MergeStrategy::parse(raw)
                .map_err(|e| PusherError::Config(e.to_string()))?,
            None => MergeStrategy::default(),
        };
        let interval_secs = cli
            .interval_secs
            .or_else(|| {
                std::env::var("PP_POLL_MS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(|ms| ms.div_ceil(1_000))
            })
            .or(file.interval_secs)
            .unwrap_or(15);

        let config = Self {
            repo_path: cli
                .repo
                .or(file.repo)
                .ok_or_else(|| PusherError::Config("repo path is required".into()))?,
            remote: cli.remote.or(file.remote).unwrap_or_else(|| "origin".to_string()),
            main_branch: cli.branch.or(file.branch).unwrap_or_else(|| "main".to_string()),
            branch_prefix: cli
                .prefix
                .or(file.prefix)
                .unwrap_or_else(|| "refs/pushpals/agent/".to_string()),
            merge_strategy,
            checks: file.checks.unwrap_or_default(),
            check_timeout: Duration::from_secs(file.check_timeout_secs.unwrap_or(300)),
            git_timeout: Duration::from_secs(60),
            interval: Duration::from_secs(interval_secs.max(1)),
            state_dir: cli.state_dir.or(file.state_dir).unwrap_or_else(default_state_dir),
            max_attempts: file.max_attempts.unwrap_or(3).max(1),
            delete_after_merge: cli.delete_after_merge
                || file.delete_after_merge.unwrap_or(false),
            push_main_after_merge: file.push_main_after_merge.unwrap_or(false),
            push_agent_branch: file.push_agent_branch.unwrap_or(false),
            dry_run: cli.dry_run,
            skip_clean_check: cli.skip_clean_check
                || file.skip_clean_check.unwrap_or(false)
                || env_flag("SERIAL_PUSHER_SKIP_CLEAN_CHECK"),
            auto_create_main_branch: file.auto_create_main_branch.unwrap_or(false)
                || env_flag("SERIAL_PUSHER_AUTO_CREATE_MAIN_BRANCH"),
            isolate_worktree: file.isolate_worktree.unwrap_or(false),
            source: file.source.unwrap_or_default(),
            server_url: std::env::var("PP_SERVER_URL").ok().or(file.server_url),
            auth_token: std::env::var("PP_AUTH_TOKEN").ok().filter(|t| !t.is_empty()),
        };
        if config.source == SourceMode::ServerClaim && config.server_url.is_none() {
            return Err(PusherError::Config(
                "source = server-claim requires a server URL (PP_SERVER_URL)".into(),
            ));
        }
        Ok(config)
    }

    pub fn db_path(&self) -> PathBuf {
        self.state_dir.join("merge_queue.db")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join("lock")
    }

    /// Full ref for the integration branch on the remote.
    pub fn remote_main_ref(&self) -> String {
        format!("{}/{}", self.remote, self.main_branch)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
