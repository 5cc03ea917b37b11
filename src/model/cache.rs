//! The per-repository tracking cache.
//!
//! Persisted as ordered lists for stable diffs; number→position indexes
//! are rebuilt after load ([`Cache::reindex`]) and never serialized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::epic::{Epic, ItemState, JourneyEntry, MirrorMode, SubIssue};
use super::labels::{EpicStatus, STATUS_NAMESPACE, replace_in_namespace};
use crate::error::{Error, Result};
use crate::tracking::journey::sanitize;

/// A known task/sub-issue, independent of which epic owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedIssue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub state: ItemState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_epic: Option<u64>,
}

/// Cached reference to the repository's project board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectBoard {
    pub id: String,
    pub number: u64,
    pub title: String,
    pub url: String,
    pub detected_at: DateTime<Utc>,
}

/// Tracking state for one repository.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cache {
    #[serde(default)]
    epics: Vec<Epic>,
    #[serde(default)]
    issues: Vec<CachedIssue>,
    #[serde(default)]
    project_board: Option<ProjectBoard>,
    #[serde(skip)]
    epic_index: HashMap<u64, usize>,
    #[serde(skip)]
    issue_index: HashMap<u64, usize>,
}

impl Cache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the lookup indexes, collapsing duplicate numbers (last wins).
    ///
    /// Returns the number of duplicates dropped.
    pub fn reindex(&mut self) -> usize {
        let before = self.epics.len() + self.issues.len();
        self.epics = dedupe_last_wins(std::mem::take(&mut self.epics), |e| e.number);
        self.issues = dedupe_last_wins(std::mem::take(&mut self.issues), |i| i.number);

        self.epic_index = self
            .epics
            .iter()
            .enumerate()
            .map(|(i, e)| (e.number, i))
            .collect();
        self.issue_index = self
            .issues
            .iter()
            .enumerate()
            .map(|(i, issue)| (issue.number, i))
            .collect();

        before - (self.epics.len() + self.issues.len())
    }

    // ── Epics ────────────────────────────────────────────────

    /// All epics in insertion order.
    #[must_use]
    pub fn epics(&self) -> &[Epic] {
        &self.epics
    }

    #[must_use]
    pub fn epic(&self, number: u64) -> Option<&Epic> {
        self.epic_index.get(&number).map(|&i| &self.epics[i])
    }

    pub fn epic_mut(&mut self, number: u64) -> Option<&mut Epic> {
        self.epic_index.get(&number).map(|&i| &mut self.epics[i])
    }

    /// Look up an epic or fail with `EpicNotFound`.
    ///
    /// # Errors
    ///
    /// Returns `EpicNotFound` if no epic has this number.
    pub fn require_epic_mut(&mut self, number: u64) -> Result<&mut Epic> {
        self.epic_mut(number).ok_or(Error::EpicNotFound { number })
    }

    /// Insert an epic, replacing any existing epic with the same number.
    ///
    /// Returns `true` if an existing record was replaced.
    pub fn upsert_epic(&mut self, epic: Epic) -> bool {
        if let Some(&i) = self.epic_index.get(&epic.number) {
            self.epics[i] = epic;
            true
        } else {
            self.epic_index.insert(epic.number, self.epics.len());
            self.epics.push(epic);
            false
        }
    }

    /// Numbers of epics with unpushed changes.
    #[must_use]
    pub fn dirty_epic_numbers(&self) -> Vec<u64> {
        self.epics.iter().filter(|e| e.dirty).map(|e| e.number).collect()
    }

    /// Numbers of open epics that mirror an external project.
    #[must_use]
    pub fn tracking_epic_numbers(&self) -> Vec<u64> {
        self.epics
            .iter()
            .filter(|e| e.is_open() && e.mirror_mode() == MirrorMode::External)
            .map(|e| e.number)
            .collect()
    }

    /// Flag an epic as having unpushed changes.
    ///
    /// # Errors
    ///
    /// Returns `EpicNotFound` if no epic has this number.
    pub fn mark_dirty(&mut self, number: u64) -> Result<()> {
        self.require_epic_mut(number)?.dirty = true;
        Ok(())
    }

    /// Replace the epic's status label and mark it dirty.
    ///
    /// Returns `false` (and leaves the epic untouched) when the status is
    /// already set.
    ///
    /// # Errors
    ///
    /// Returns `EpicNotFound` if no epic has this number.
    pub fn set_status(&mut self, number: u64, status: EpicStatus) -> Result<bool> {
        let epic = self.require_epic_mut(number)?;
        let next = replace_in_namespace(&epic.labels, STATUS_NAMESPACE, status.as_str());
        if next == epic.labels {
            return Ok(false);
        }
        epic.labels = next;
        epic.dirty = true;
        Ok(true)
    }

    /// Close an epic and mark it dirty. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `EpicNotFound` if no epic has this number.
    pub fn close_epic(&mut self, number: u64) -> Result<bool> {
        let epic = self.require_epic_mut(number)?;
        if !epic.is_open() {
            return Ok(false);
        }
        epic.state = ItemState::Closed;
        epic.dirty = true;
        Ok(true)
    }

    // ── Issues ───────────────────────────────────────────────

    /// All known issues in insertion order.
    #[must_use]
    pub fn issues(&self) -> &[CachedIssue] {
        &self.issues
    }

    #[must_use]
    pub fn issue(&self, number: u64) -> Option<&CachedIssue> {
        self.issue_index.get(&number).map(|&i| &self.issues[i])
    }

    /// Insert or replace an issue in the flat index.
    pub fn upsert_issue(&mut self, issue: CachedIssue) {
        if let Some(&i) = self.issue_index.get(&issue.number) {
            self.issues[i] = issue;
        } else {
            self.issue_index.insert(issue.number, self.issues.len());
            self.issues.push(issue);
        }
    }

    /// Find the epic that owns an issue, via the issue record or the
    /// epics' sub-issue lists.
    #[must_use]
    pub fn owning_epic(&self, issue_number: u64) -> Option<u64> {
        if let Some(parent) = self.issue(issue_number).and_then(|i| i.parent_epic) {
            if self.epic(parent).is_some() {
                return Some(parent);
            }
        }
        self.epics
            .iter()
            .find(|e| e.sub_issues.iter().any(|s| s.number == issue_number))
            .map(|e| e.number)
    }

    /// Attach a task issue to a self-tracked epic.
    ///
    /// The sub-issue list, the flat issue index, a `sub_issue_linked`
    /// journey entry, and the dirty flag change together.
    ///
    /// # Errors
    ///
    /// Returns `EpicNotFound` for an unknown epic, `RequiredField` when the
    /// title is empty once control characters are stripped, and
    /// `Validation` when the epic mirrors an external project or the issue
    /// is the epic itself.
    pub fn link_sub_issue(&mut self, epic_number: u64, mut sub: SubIssue) -> Result<()> {
        sub.title = sanitize(&sub.title).trim().to_string();
        if sub.title.is_empty() {
            return Err(Error::RequiredField { field: "title" });
        }
        if sub.number == epic_number {
            return Err(Error::Validation(format!(
                "epic number #{epic_number} cannot be its own sub-issue"
            )));
        }
        let epic = self.require_epic_mut(epic_number)?;
        if epic.mirror_mode() == MirrorMode::External {
            return Err(Error::Validation(format!(
                "epic #{epic_number} mirrors an external project and cannot own sub-issues"
            )));
        }

        let message = format!("Linked task #{}: {}", sub.number, sub.title);
        let cached = CachedIssue {
            number: sub.number,
            title: sub.title.clone(),
            state: sub.state,
            parent_epic: Some(epic_number),
        };

        match epic.sub_issues.iter_mut().find(|s| s.number == sub.number) {
            Some(existing) => *existing = sub,
            None => epic.sub_issues.push(sub),
        }
        epic.journey.push(
            JourneyEntry::new("sub_issue_linked", &message).with_meta("issue", cached.number),
        );
        epic.dirty = true;

        self.upsert_issue(cached);
        Ok(())
    }

    /// Mark an issue closed in the flat index and in its owning epic's
    /// sub-issue list.
    ///
    /// Returns the owning epic's number. Does not touch the journey or the
    /// dirty flag; the caller records why the issue closed.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` if the issue has no owning epic.
    pub fn close_sub_issue(&mut self, issue_number: u64) -> Result<u64> {
        let epic_number = self
            .owning_epic(issue_number)
            .ok_or(Error::IssueNotFound { number: issue_number })?;

        if let Some(&i) = self.issue_index.get(&issue_number) {
            self.issues[i].state = ItemState::Closed;
        }
        if let Some(epic) = self.epic_mut(epic_number) {
            for sub in epic.sub_issues.iter_mut().filter(|s| s.number == issue_number) {
                sub.state = ItemState::Closed;
            }
        }
        Ok(epic_number)
    }

    // ── Project board ────────────────────────────────────────

    #[must_use]
    pub fn project_board(&self) -> Option<&ProjectBoard> {
        self.project_board.as_ref()
    }

    pub fn set_project_board(&mut self, board: ProjectBoard) {
        self.project_board = Some(board);
    }
}

fn dedupe_last_wins<T>(items: Vec<T>, key: impl Fn(&T) -> u64) -> Vec<T> {
    let mut last: HashMap<u64, usize> = HashMap::new();
    for (i, item) in items.iter().enumerate() {
        last.insert(key(item), i);
    }
    items
        .into_iter()
        .enumerate()
        .filter(|(i, item)| last.get(&key(item)) == Some(i))
        .map(|(_, item)| item)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(number: u64, title: &str) -> SubIssue {
        SubIssue {
            number,
            title: title.to_string(),
            state: ItemState::Open,
            task_index: None,
        }
    }

    #[test]
    fn test_upsert_keeps_numbers_unique() {
        let mut cache = Cache::new();
        assert!(!cache.upsert_epic(Epic::new(10, "First")));
        assert!(!cache.upsert_epic(Epic::new(11, "Second")));
        assert!(cache.upsert_epic(Epic::new(10, "First, renamed")));

        assert_eq!(cache.epics().len(), 2);
        assert_eq!(cache.epic(10).unwrap().title, "First, renamed");
    }

    #[test]
    fn test_reindex_collapses_duplicates_last_wins() {
        let json = serde_json::json!({
            "epics": [
                Epic::new(5, "old"),
                Epic::new(6, "other"),
                Epic::new(5, "new"),
            ],
            "issues": [],
            "project_board": null,
        });
        let mut cache: Cache = serde_json::from_value(json).unwrap();
        assert_eq!(cache.reindex(), 1);
        assert_eq!(cache.epics().len(), 2);
        assert_eq!(cache.epic(5).unwrap().title, "new");
        assert_eq!(cache.epic(6).unwrap().title, "other");
    }

    #[test]
    fn test_indexes_are_not_serialized() {
        let mut cache = Cache::new();
        cache.upsert_epic(Epic::new(1, "x"));
        let json = serde_json::to_value(&cache).unwrap();
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 3);
        assert!(json.get("epic_index").is_none());
    }

    #[test]
    fn test_set_status_replaces_label_and_marks_dirty() {
        let mut cache = Cache::new();
        cache.upsert_epic(Epic::new(1, "x").with_label("epic").with_label("status:planning"));

        assert!(cache.set_status(1, EpicStatus::InProgress).unwrap());
        let epic = cache.epic(1).unwrap();
        assert!(epic.dirty);
        assert!(epic.labels.contains("status:in-progress"));
        assert!(!epic.labels.contains("status:planning"));
        assert!(epic.labels.contains("epic"));

        cache.epic_mut(1).unwrap().dirty = false;
        assert!(!cache.set_status(1, EpicStatus::InProgress).unwrap());
        assert!(!cache.epic(1).unwrap().dirty);
    }

    #[test]
    fn test_link_and_close_sub_issue() {
        let mut cache = Cache::new();
        cache.upsert_epic(Epic::new(1, "Epic"));
        cache.link_sub_issue(1, sub(20, "Write parser")).unwrap();

        let epic = cache.epic(1).unwrap();
        assert!(epic.dirty);
        assert_eq!(epic.journey.len(), 1);
        assert_eq!(cache.owning_epic(20), Some(1));
        assert_eq!(cache.issue(20).unwrap().parent_epic, Some(1));

        assert_eq!(cache.close_sub_issue(20).unwrap(), 1);
        assert_eq!(cache.issue(20).unwrap().state, ItemState::Closed);
        assert_eq!(cache.epic(1).unwrap().sub_issues[0].state, ItemState::Closed);
    }

    #[test]
    fn test_link_strips_control_characters_from_title() {
        let mut cache = Cache::new();
        cache.upsert_epic(Epic::new(1, "Epic"));
        cache.link_sub_issue(1, sub(2, "Pars\0er\u{1b}[31m")).unwrap();

        let epic = cache.epic(1).unwrap();
        assert_eq!(epic.sub_issues[0].title, "Parser[31m");
        assert_eq!(cache.issue(2).unwrap().title, "Parser[31m");
        let message = &epic.journey[0].message;
        assert_eq!(message, "Linked task #2: Parser[31m");
        assert!(!message.chars().any(char::is_control));
    }

    #[test]
    fn test_link_rejects_control_only_title() {
        let mut cache = Cache::new();
        cache.upsert_epic(Epic::new(1, "Epic"));
        let result = cache.link_sub_issue(1, sub(2, "\u{7}\n"));
        assert!(matches!(result, Err(Error::RequiredField { field: "title" })));
        assert!(cache.epic(1).unwrap().sub_issues.is_empty());
    }

    #[test]
    fn test_link_rejected_on_tracking_epic() {
        let mut cache = Cache::new();
        cache.upsert_epic(Epic::new(1, "Upstream").tracking("acme/widgets"));
        let result = cache.link_sub_issue(1, sub(2, "nope"));
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(!cache.epic(1).unwrap().dirty);
    }

    #[test]
    fn test_close_unknown_issue() {
        let mut cache = Cache::new();
        assert!(matches!(
            cache.close_sub_issue(99),
            Err(Error::IssueNotFound { number: 99 })
        ));
    }

    #[test]
    fn test_missing_epic_errors() {
        let mut cache = Cache::new();
        assert!(matches!(cache.mark_dirty(3), Err(Error::EpicNotFound { number: 3 })));
        assert!(cache.epic(3).is_none());
    }

    #[test]
    fn test_tracking_epic_numbers_excludes_closed() {
        let mut cache = Cache::new();
        cache.upsert_epic(Epic::new(1, "a").tracking("acme/a"));
        let mut closed = Epic::new(2, "b").tracking("acme/b");
        closed.state = ItemState::Closed;
        cache.upsert_epic(closed);
        cache.upsert_epic(Epic::new(3, "c"));
        assert_eq!(cache.tracking_epic_numbers(), vec![1]);
    }
}
