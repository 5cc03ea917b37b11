//! Sync result types.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Result of syncing a single epic.
///
/// Fatal remote failures are not an outcome; they are returned as `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// `tracking.autoUpdateEpics` is off; nothing was attempted.
    Disabled,
    /// The epic was not dirty; no remote call was made.
    AlreadyClean,
    /// Pushed; the dirty flag is cleared and the cache saved.
    Synced,
    /// Transient remote failure; the epic stays dirty for the next pass.
    Deferred(String),
}

impl SyncOutcome {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::AlreadyClean => "already_clean",
            Self::Synced => "synced",
            Self::Deferred(_) => "deferred",
        }
    }
}

/// An epic whose push was postponed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeferredSync {
    pub epic: u64,
    pub reason: String,
}

/// An epic whose push failed in a way retrying will not fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedSync {
    pub epic: u64,
    /// Machine-readable error code.
    pub code: String,
    pub message: String,
}

/// Aggregate result of a batch sync.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// True when sync is disabled by configuration.
    pub disabled: bool,
    pub synced: Vec<u64>,
    pub deferred: Vec<DeferredSync>,
    pub failed: Vec<FailedSync>,
    pub skipped: Vec<u64>,
}

impl SyncReport {
    /// Number of epics attempted or skipped.
    #[must_use]
    pub fn total(&self) -> usize {
        self.synced.len() + self.deferred.len() + self.failed.len() + self.skipped.len()
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Summary of a cache's sync state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub identity: String,
    pub auto_update: bool,
    pub total_epics: usize,
    pub open_epics: usize,
    pub dirty_epics: Vec<u64>,
    pub tracking_epics: usize,
    pub open_mirror_items: usize,
    pub known_issues: usize,
    /// Most recent confirmed push across all epics.
    pub last_synced_at: Option<DateTime<Utc>>,
}
