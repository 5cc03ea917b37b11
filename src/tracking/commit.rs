//! Commit-message task-completion detector.
//!
//! Commits that say `closes #12` (or fix/resolve variants) complete the
//! cached task #12. The git read path never fails: any error yields an
//! empty commit list.

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use std::path::Path;
use std::process::Command;
use std::sync::LazyLock;

use super::journey::{NewJourneyEntry, add_journey_entry};
use crate::error::{Error, Result};
use crate::model::Cache;

static CLOSING_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(close[sd]?|fix(?:e[sd])?|resolve[sd]?)\s+#(\d+)\b").expect("valid regex")
});

const FIELD_SEP: char = '\u{1f}';
const RECORD_SEP: char = '\u{1e}';

/// A closing reference found in a commit message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReference {
    pub issue_number: u64,
    /// Keyword as written, lowercased (`closes`, `fixed`, ...).
    pub keyword: String,
}

/// One commit read from git.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: String,
    pub timestamp: DateTime<Utc>,
    pub author: String,
    /// Full message (subject and body).
    pub message: String,
}

impl CommitInfo {
    #[must_use]
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or_default().trim()
    }

    #[must_use]
    pub fn short_sha(&self) -> &str {
        self.sha.get(..7).unwrap_or(&self.sha)
    }
}

/// A commit that completes a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedTask {
    pub issue_number: u64,
    pub keyword: String,
    pub commit: CommitInfo,
}

/// Find the first closing keyword followed by `#N` in a commit message.
#[must_use]
pub fn detect_task_from_commit(message: &str) -> Option<TaskReference> {
    let caps = CLOSING_REF.captures(message)?;
    let issue_number = caps[2].parse().ok()?;
    Some(TaskReference {
        issue_number,
        keyword: caps[1].to_lowercase(),
    })
}

/// Parse `git log` output produced with unit/record separators.
fn parse_log(raw: &str) -> Vec<CommitInfo> {
    raw.split(RECORD_SEP)
        .filter_map(|record| {
            let mut fields = record.trim_start_matches('\n').splitn(4, FIELD_SEP);
            let sha = fields.next()?.trim();
            let timestamp = DateTime::parse_from_rfc3339(fields.next()?.trim()).ok()?;
            let author = fields.next()?.trim();
            let message = fields.next()?.trim();
            if sha.is_empty() {
                return None;
            }
            Some(CommitInfo {
                sha: sha.to_string(),
                timestamp: timestamp.with_timezone(&Utc),
                author: author.to_string(),
                message: message.to_string(),
            })
        })
        .collect()
}

/// Commits in `repo_path` since `since`, oldest first.
///
/// Returns an empty list if git is missing, the path is not a repository,
/// or the output cannot be read.
#[must_use]
pub fn commits_since(repo_path: &Path, since: DateTime<Utc>) -> Vec<CommitInfo> {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo_path)
        .args([
            "log",
            "--reverse",
            &format!("--since={}", since.to_rfc3339()),
            "--format=%H%x1f%aI%x1f%an%x1f%B%x1e",
        ])
        .output();

    match output {
        Ok(out) if out.status.success() => parse_log(&String::from_utf8_lossy(&out.stdout)),
        Ok(out) => {
            tracing::debug!(
                path = %repo_path.display(),
                stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                "git log failed"
            );
            Vec::new()
        }
        Err(e) => {
            tracing::debug!(error = %e, "Could not run git");
            Vec::new()
        }
    }
}

/// Apply the detector to each commit, keeping commit order.
#[must_use]
pub fn completed_tasks_in(commits: &[CommitInfo]) -> Vec<CompletedTask> {
    commits
        .iter()
        .filter_map(|commit| {
            detect_task_from_commit(&commit.message).map(|r| CompletedTask {
                issue_number: r.issue_number,
                keyword: r.keyword,
                commit: commit.clone(),
            })
        })
        .collect()
}

/// Commits since `since` that complete a task, oldest first.
#[must_use]
pub fn detect_completed_tasks(repo_path: &Path, since: DateTime<Utc>) -> Vec<CompletedTask> {
    completed_tasks_in(&commits_since(repo_path, since))
}

/// What [`record_commit_completions`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionReport {
    /// `(issue, epic)` pairs recorded.
    pub recorded: Vec<(u64, u64)>,
    /// Issues not linked to any cached epic.
    pub unknown: Vec<u64>,
    /// Completions already in the journey.
    pub already_recorded: usize,
}

fn already_recorded(cache: &Cache, epic_number: u64, task: &CompletedTask) -> bool {
    cache.epic(epic_number).is_some_and(|epic| {
        epic.journey.iter().any(|e| {
            e.event == "task_complete"
                && e.meta_str("commit") == Some(task.commit.sha.as_str())
                && e.metadata
                    .as_ref()
                    .and_then(|m| m.get("issue"))
                    .and_then(serde_json::Value::as_u64)
                    == Some(task.issue_number)
        })
    })
}

/// Close cached tasks referenced by commits and journal the completions.
///
/// # Errors
///
/// Propagates journey validation errors.
pub fn record_commit_completions(
    cache: &mut Cache,
    tasks: &[CompletedTask],
) -> Result<CompletionReport> {
    let mut report = CompletionReport::default();

    for task in tasks {
        let Some(epic_number) = cache.owning_epic(task.issue_number) else {
            tracing::debug!(issue = task.issue_number, "Commit references an unknown issue");
            report.unknown.push(task.issue_number);
            continue;
        };
        if already_recorded(cache, epic_number, task) {
            report.already_recorded += 1;
            continue;
        }

        cache.close_sub_issue(task.issue_number)?;
        let mut entry = NewJourneyEntry::new(
            "task_complete",
            format!(
                "Task #{} completed by {} ({})",
                task.issue_number,
                task.commit.short_sha(),
                task.commit.subject()
            ),
        )
        .agent("commit")
        .meta("commit", task.commit.sha.as_str())
        .meta("keyword", task.keyword.as_str())
        .meta("issue", task.issue_number);
        entry.timestamp = Some(task.commit.timestamp);
        add_journey_entry(cache, epic_number, entry)?;
        cache.mark_dirty(epic_number)?;

        report.recorded.push((task.issue_number, epic_number));
    }

    Ok(report)
}

/// Parse a `--since` bound: RFC 3339, or a relative `Nd` / `Nh` / `Nm`.
///
/// # Errors
///
/// Returns `Validation` for anything else.
pub fn parse_since(value: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }

    let invalid = || {
        Error::Validation(format!(
            "invalid --since '{value}': use RFC 3339 or a relative value like 7d, 12h, 30m"
        ))
    };
    let (split, _) = value.char_indices().last().ok_or_else(invalid)?;
    let (amount, unit) = value.split_at(split);
    let amount: i64 = amount.parse().map_err(|_| invalid())?;
    if amount < 0 {
        return Err(invalid());
    }
    let span = match unit {
        "d" => Duration::try_days(amount),
        "h" => Duration::try_hours(amount),
        "m" => Duration::try_minutes(amount),
        _ => return Err(invalid()),
    };
    span.and_then(|span| now.checked_sub_signed(span))
        .ok_or_else(|| Error::Validation(format!("--since '{value}' is out of range")))
}
