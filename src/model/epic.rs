//! Epic model.
//!
//! An epic is the local aggregate for one remote tracker issue: its labels
//! and state, the dirty flag driving sync, the append-only journey, and
//! the mirror items it owns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Open/closed state shared by epics, sub-issues, and mirror items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    #[default]
    Open,
    Closed,
}

impl ItemState {
    /// Get the string representation for display.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

/// How an epic mirrors work items. The two modes never mix on one epic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorMode {
    /// Tasks created by this engine from the epic's own plan.
    SelfTracked,
    /// Open items of an external project.
    External,
}

/// One timestamped event in an epic's progress log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneyEntry {
    pub timestamp: DateTime<Utc>,
    /// Free-form category tag (`task_complete`, `skill_invocation`, ...).
    pub event: String,
    /// Human-readable text, stripped of control characters.
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, serde_json::Value>>,
}

impl JourneyEntry {
    /// Create an entry stamped with the current time.
    ///
    /// Fields are stored as given; [`crate::tracking::add_journey_entry`]
    /// is the validating, sanitizing entry point.
    #[must_use]
    pub fn new(event: &str, message: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            event: event.to_string(),
            message: message.to_string(),
            agent: None,
            metadata: None,
        }
    }

    /// Attribute the entry to an actor.
    #[must_use]
    pub fn with_agent(mut self, agent: &str) -> Self {
        self.agent = Some(agent.to_string());
        self
    }

    /// Attach one structured metadata value.
    #[must_use]
    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.into());
        self
    }

    /// Override the timestamp.
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Look up a metadata value as a string.
    #[must_use]
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.as_ref()?.get(key)?.as_str()
    }
}

/// A task issue created for a self-tracked epic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubIssue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub state: ItemState,
    /// Index of the plan task this issue implements, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_index: Option<usize>,
}

/// A mirror of one external project item owned by a tracking epic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedItem {
    /// External identifier (`owner/repo#N`); the reconciliation key.
    pub external_id: String,
    pub number: u64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub state: ItemState,
    /// Remote record created to track this item, when mirroring as issues.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<u64>,
    pub first_seen_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

/// An epic record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Epic {
    /// Remote issue number; primary key, immutable once assigned.
    pub number: u64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_file: Option<String>,
    #[serde(default)]
    pub state: ItemState,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    /// Local changes not yet confirmed pushed.
    #[serde(default)]
    pub dirty: bool,
    /// Insertion order (oldest first); sorted only when rendered.
    #[serde(default)]
    pub journey: Vec<JourneyEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_issues: Vec<SubIssue>,
    /// `owner/repo` whose open items this epic mirrors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_project: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tracked_items: Vec<TrackedItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Time of the last confirmed push.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
    /// Journey length at the last confirmed push.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_len: Option<usize>,
}

impl Epic {
    /// Create a clean, open epic with no journey.
    #[must_use]
    pub fn new(number: u64, title: &str) -> Self {
        let now = Utc::now();
        Self {
            number,
            title: title.to_string(),
            plan_file: None,
            state: ItemState::Open,
            labels: BTreeSet::new(),
            dirty: false,
            journey: Vec::new(),
            sub_issues: Vec::new(),
            external_project: None,
            tracked_items: Vec::new(),
            created_at: now,
            updated_at: now,
            synced_at: None,
            reported_len: None,
        }
    }

    /// Set the source plan file.
    #[must_use]
    pub fn with_plan(mut self, plan_file: &str) -> Self {
        self.plan_file = Some(plan_file.to_string());
        self
    }

    /// Make this a tracking epic for an external project.
    #[must_use]
    pub fn tracking(mut self, external_project: &str) -> Self {
        self.external_project = Some(external_project.to_string());
        self
    }

    /// Add a label.
    #[must_use]
    pub fn with_label(mut self, label: &str) -> Self {
        self.labels.insert(label.to_string());
        self
    }

    #[must_use]
    pub fn mirror_mode(&self) -> MirrorMode {
        if self.external_project.is_some() {
            MirrorMode::External
        } else {
            MirrorMode::SelfTracked
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Journey entries newest first. Ties keep insertion order.
    #[must_use]
    pub fn journey_newest_first(&self) -> Vec<&JourneyEntry> {
        let mut entries: Vec<&JourneyEntry> = self.journey.iter().collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries
    }

    /// Journey entries appended after the last confirmed push, oldest first.
    ///
    /// Position decides, not timestamp: backdated entries (commit
    /// completions carry the commit time) are still reported. Caches
    /// written before `reported_len` existed fall back to `synced_at`.
    #[must_use]
    pub fn unreported_entries(&self) -> Vec<&JourneyEntry> {
        match (self.reported_len, self.synced_at) {
            (Some(len), _) => self.journey.iter().skip(len).collect(),
            (None, Some(since)) => self.journey.iter().filter(|e| e.timestamp > since).collect(),
            (None, None) => self.journey.iter().collect(),
        }
    }

    /// Record a confirmed push of everything currently in the journey.
    pub fn mark_synced(&mut self, at: DateTime<Utc>) {
        self.dirty = false;
        self.updated_at = at;
        self.synced_at = Some(at);
        self.reported_len = Some(self.journey.len());
    }

    /// Open mirror items (tracked items for tracking epics).
    #[must_use]
    pub fn open_tracked_ids(&self) -> BTreeSet<&str> {
        self.tracked_items
            .iter()
            .filter(|t| t.state.is_open())
            .map(|t| t.external_id.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_epic_is_clean() {
        let epic = Epic::new(42, "Auth overhaul").with_plan("docs/plans/auth.md");
        assert_eq!(epic.number, 42);
        assert!(!epic.dirty);
        assert!(epic.journey.is_empty());
        assert_eq!(epic.mirror_mode(), MirrorMode::SelfTracked);
        assert_eq!(epic.plan_file.as_deref(), Some("docs/plans/auth.md"));
    }

    #[test]
    fn test_tracking_epic_mode() {
        let epic = Epic::new(7, "Upstream bugs").tracking("acme/widgets");
        assert_eq!(epic.mirror_mode(), MirrorMode::External);
    }

    #[test]
    fn test_journey_newest_first_keeps_storage_order() {
        let now = Utc::now();
        let mut epic = Epic::new(1, "x");
        epic.journey.push(JourneyEntry::new("a", "first").at(now - Duration::minutes(10)));
        epic.journey.push(JourneyEntry::new("b", "second").at(now));
        epic.journey.push(JourneyEntry::new("c", "third").at(now - Duration::minutes(5)));

        let display: Vec<&str> = epic
            .journey_newest_first()
            .iter()
            .map(|e| e.message.as_str())
            .collect();
        assert_eq!(display, vec!["second", "third", "first"]);
        assert_eq!(epic.journey[0].message, "first");
    }

    #[test]
    fn test_unreported_entries() {
        let now = Utc::now();
        let mut epic = Epic::new(1, "x");
        epic.journey.push(JourneyEntry::new("a", "old").at(now - Duration::hours(2)));
        epic.journey.push(JourneyEntry::new("b", "new").at(now));
        assert_eq!(epic.unreported_entries().len(), 2);

        epic.synced_at = Some(now - Duration::hours(1));
        let unreported = epic.unreported_entries();
        assert_eq!(unreported.len(), 1);
        assert_eq!(unreported[0].message, "new");
    }

    #[test]
    fn test_backdated_entry_after_sync_is_unreported() {
        let now = Utc::now();
        let mut epic = Epic::new(1, "x");
        epic.journey.push(JourneyEntry::new("note", "before"));
        epic.mark_synced(now);
        assert!(epic.unreported_entries().is_empty());
        assert!(!epic.dirty);

        epic.journey
            .push(JourneyEntry::new("task_complete", "from commit").at(now - Duration::minutes(10)));
        let unreported = epic.unreported_entries();
        assert_eq!(unreported.len(), 1);
        assert_eq!(unreported[0].message, "from commit");
    }

    #[test]
    fn test_serde_skips_empty_mirrors() {
        let epic = Epic::new(3, "x");
        let json = serde_json::to_value(&epic).unwrap();
        assert!(json.get("sub_issues").is_none());
        assert!(json.get("tracked_items").is_none());
        assert_eq!(json["state"], "open");

        let back: Epic = serde_json::from_value(json).unwrap();
        assert_eq!(back, epic);
    }

    #[test]
    fn test_journey_entry_metadata() {
        let entry = JourneyEntry::new("task_complete", "done")
            .with_agent("commit")
            .with_meta("commit", "abc123")
            .with_meta("issue", 12);
        assert_eq!(entry.meta_str("commit"), Some("abc123"));
        assert_eq!(entry.meta_str("issue"), None);
        assert_eq!(entry.agent.as_deref(), Some("commit"));
    }
}
