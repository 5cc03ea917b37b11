//! Input validation for agent ergonomics.
//!
//! Agents type statuses loosely ("wip", "complete", "in progress").
//! Resolution is three-tier: exact match → synonym lookup → error with
//! the closest suggestion.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::model::EpicStatus;

/// Synonyms for the canonical status values.
pub static STATUS_SYNONYMS: LazyLock<HashMap<&str, EpicStatus>> = LazyLock::new(|| {
    [
        ("todo", EpicStatus::Planning),
        ("planned", EpicStatus::Planning),
        ("plan", EpicStatus::Planning),
        ("new", EpicStatus::Planning),
        ("wip", EpicStatus::InProgress),
        ("active", EpicStatus::InProgress),
        ("started", EpicStatus::InProgress),
        ("working", EpicStatus::InProgress),
        ("implementing", EpicStatus::InProgress),
        ("reviewing", EpicStatus::Review),
        ("in-review", EpicStatus::Review),
        ("pr", EpicStatus::Review),
        ("complete", EpicStatus::Done),
        ("completed", EpicStatus::Done),
        ("finished", EpicStatus::Done),
        ("closed", EpicStatus::Done),
        ("shipped", EpicStatus::Done),
        ("stuck", EpicStatus::Blocked),
        ("waiting", EpicStatus::Blocked),
        ("on-hold", EpicStatus::Blocked),
    ]
    .into_iter()
    .collect()
});

/// Normalize a status name to an [`EpicStatus`].
///
/// Case, surrounding whitespace, a leading `status:` and `_`/space
/// separators are ignored.
///
/// # Errors
///
/// Returns `Validation` naming the closest known status, if any.
pub fn normalize_status(input: &str) -> Result<EpicStatus> {
    let lower = input.trim().to_lowercase();
    let key = lower
        .strip_prefix(crate::model::STATUS_NAMESPACE)
        .unwrap_or(&lower)
        .replace(['_', ' '], "-");

    if let Some(status) = EpicStatus::from_value(&key) {
        return Ok(status);
    }
    if let Some(&status) = STATUS_SYNONYMS.get(key.as_str()) {
        return Ok(status);
    }

    let message = match closest_status(&key) {
        Some(s) => format!("unknown status '{input}'; did you mean '{s}'?"),
        None => format!("unknown status '{input}'"),
    };
    Err(Error::Validation(message))
}

fn closest_status(input: &str) -> Option<EpicStatus> {
    let canonical = EpicStatus::ALL.iter().map(|s| (s.as_str(), *s));
    let synonyms: BTreeMap<&str, EpicStatus> =
        STATUS_SYNONYMS.iter().map(|(k, v)| (*k, *v)).collect();

    canonical
        .chain(synonyms)
        .map(|(name, status)| (levenshtein_distance(input, name), status))
        .filter(|(dist, _)| *dist <= 3)
        .min_by_key(|(dist, _)| *dist)
        .map(|(_, status)| status)
}

/// Parse a `key=value` metadata pair. Values that parse as JSON scalars
/// (numbers, booleans) keep their type; everything else is a string.
///
/// # Errors
///
/// Returns `Validation` when there is no `=` or the key is empty.
pub fn parse_meta_pair(input: &str) -> Result<(String, serde_json::Value)> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| Error::Validation(format!("metadata must be key=value, got '{input}'")))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(Error::Validation(format!("metadata key is empty in '{input}'")));
    }

    let value = match serde_json::from_str::<serde_json::Value>(value.trim()) {
        Ok(v @ (serde_json::Value::Number(_) | serde_json::Value::Bool(_))) => v,
        _ => serde_json::Value::String(value.to_string()),
    };
    Ok((key.to_string(), value))
}

/// Compute the Levenshtein edit distance between two strings.
#[must_use]
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
