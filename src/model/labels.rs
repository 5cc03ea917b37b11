//! Label namespace helpers.
//!
//! Labels are plain strings; a "namespace" is a shared prefix such as
//! `status:`. Status changes always go through [`replace_in_namespace`]
//! so an epic carries at most one label per namespace.

use std::collections::BTreeSet;
use std::fmt;

/// Prefix of workflow status labels.
pub const STATUS_NAMESPACE: &str = "status:";

/// Workflow status carried as a `status:*` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EpicStatus {
    Planning,
    InProgress,
    Review,
    Done,
    Blocked,
}

impl EpicStatus {
    /// All statuses, in workflow order.
    pub const ALL: [Self; 5] = [
        Self::Planning,
        Self::InProgress,
        Self::Review,
        Self::Done,
        Self::Blocked,
    ];

    /// Canonical value (without the namespace prefix).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::InProgress => "in-progress",
            Self::Review => "review",
            Self::Done => "done",
            Self::Blocked => "blocked",
        }
    }

    /// Full label, e.g. `status:in-progress`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{STATUS_NAMESPACE}{}", self.as_str())
    }

    /// Parse a canonical value.
    #[must_use]
    pub fn from_value(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }

    /// Read the status from a label set, if any status label is present.
    #[must_use]
    pub fn from_labels(labels: &BTreeSet<String>) -> Option<Self> {
        labels
            .iter()
            .filter_map(|l| l.strip_prefix(STATUS_NAMESPACE))
            .find_map(Self::from_value)
    }
}

impl fmt::Display for EpicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remove every label starting with `namespace`, then add `namespace + value`.
#[must_use]
pub fn replace_in_namespace(labels: &BTreeSet<String>, namespace: &str, value: &str) -> BTreeSet<String> {
    let mut next: BTreeSet<String> = labels
        .iter()
        .filter(|l| !l.starts_with(namespace))
        .cloned()
        .collect();
    next.insert(format!("{namespace}{value}"));
    next
}
