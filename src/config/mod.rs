//! Configuration management.
//!
//! This module provides functions for discovering epictrack directories,
//! resolving the cache location, loading settings, and identifying the
//! repository being tracked.
//!
//! # Layout
//!
//! - **Base**: `~/.epictrack/` (override with `--cache-dir` or `EPICTRACK_HOME`)
//! - **Caches**: `<base>/cache/<hash>.json`, one per repository identity
//! - **Settings**: `<base>/config.json`, overlaid by `<repo>/.epictrack/config.json`

mod repo;
mod settings;

pub use repo::{
    RepoIdentity, detect_repo_identity, identity_hash, parse_remote_url, resolve_repo_identity,
};
pub use settings::{GithubSettings, Settings, TrackingSettings, load_settings, merge_settings};

use std::path::{Path, PathBuf};

/// Get the global epictrack directory location.
///
/// Priority:
/// 1. `EPICTRACK_HOME` environment variable
/// 2. `~/.epictrack/`
#[must_use]
pub fn global_epictrack_dir() -> Option<PathBuf> {
    if let Ok(home) = std::env::var("EPICTRACK_HOME") {
        if !home.trim().is_empty() {
            return Some(PathBuf::from(home));
        }
    }
    directories::BaseDirs::new().map(|b| b.home_dir().join(".epictrack"))
}

/// Resolve the base directory holding caches and the global config.
///
/// An explicit `--cache-dir` wins over everything else.
#[must_use]
pub fn resolve_base_dir(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }
    global_epictrack_dir()
}

/// Get the git repository root directory.
#[must_use]
pub fn git_toplevel() -> Option<PathBuf> {
    std::process::Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| PathBuf::from(String::from_utf8_lossy(&o.stdout).trim().to_string()))
}

/// Get the default actor name for journey attribution.
///
/// Priority:
/// 1. `EPICTRACK_ACTOR` environment variable
/// 2. Git user name
/// 3. System username
/// 4. "unknown"
#[must_use]
pub fn default_actor() -> String {
    if let Ok(actor) = std::env::var("EPICTRACK_ACTOR") {
        if !actor.is_empty() {
            return actor;
        }
    }

    if let Ok(output) = std::process::Command::new("git")
        .args(["config", "user.name"])
        .output()
    {
        if output.status.success() {
            let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !name.is_empty() {
                return name;
            }
        }
    }

    if let Ok(user) = std::env::var("USER") {
        return user;
    }

    "unknown".to_string()
}
