//! Remote body rendering.
//!
//! The remote record's body is rebuilt from scratch on every push: plan
//! goal and task checklist, mirrored items, then the journey newest first.

use std::fmt::Write;

use crate::model::{Epic, EpicStatus, JourneyEntry, ParsedPlan, SubIssue};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M UTC";

/// Trailer identifying bodies written by epictrack.
pub const BODY_MARKER: &str = "<!-- epictrack -->";

fn task_done(sub_issues: &[SubIssue], index: usize, task: &str) -> bool {
    sub_issues.iter().any(|s| {
        !s.state.is_open()
            && (s.task_index == Some(index) || s.title.trim().eq_ignore_ascii_case(task.trim()))
    })
}

fn render_journey_line(out: &mut String, entry: &JourneyEntry) {
    let _ = write!(
        out,
        "- **{}** `{}` {}",
        entry.timestamp.format(TIMESTAMP_FORMAT),
        entry.event,
        entry.message
    );
    if let Some(agent) = &entry.agent {
        let _ = write!(out, " _(by {agent})_");
    }
    out.push('\n');
}

/// Render the full remote body for an epic.
///
/// Without a plan, the goal section falls back to the title and the
/// checklist is built from the epic's sub-issues.
#[must_use]
pub fn render_epic_body(epic: &Epic, plan: Option<&ParsedPlan>) -> String {
    let mut out = String::new();

    let goal = plan
        .and_then(|p| p.goal.as_deref())
        .unwrap_or(epic.title.as_str());
    let _ = write!(out, "## Goal\n\n{goal}\n\n");

    if let Some(status) = EpicStatus::from_labels(&epic.labels) {
        let _ = writeln!(out, "**Status:** {status}");
    }
    if let Some(priority) = plan.and_then(|p| p.priority.as_deref()) {
        let _ = writeln!(out, "**Priority:** {priority}");
    }
    if let Some(path) = &epic.plan_file {
        let _ = writeln!(out, "**Plan:** `{path}`");
    }

    let tasks = plan.map(|p| p.tasks.as_slice()).unwrap_or_default();
    if !tasks.is_empty() {
        out.push_str("\n## Tasks\n\n");
        for (i, task) in tasks.iter().enumerate() {
            let mark = if task_done(&epic.sub_issues, i, task) { 'x' } else { ' ' };
            let _ = writeln!(out, "- [{mark}] {task}");
        }
    } else if !epic.sub_issues.is_empty() {
        out.push_str("\n## Tasks\n\n");
        for sub in &epic.sub_issues {
            let mark = if sub.state.is_open() { ' ' } else { 'x' };
            let _ = writeln!(out, "- [{mark}] #{} {}", sub.number, sub.title);
        }
    }

    if let Some(project) = &epic.external_project {
        let open = epic.tracked_items.iter().filter(|t| t.state.is_open()).count();
        let _ = write!(out, "\n## Tracked items ({project})\n\n");
        let _ = writeln!(out, "{open} open of {} seen.\n", epic.tracked_items.len());
        for item in &epic.tracked_items {
            let mark = if item.state.is_open() { ' ' } else { 'x' };
            match &item.url {
                Some(url) => {
                    let _ = writeln!(out, "- [{mark}] [{}]({url}) {}", item.external_id, item.title);
                }
                None => {
                    let _ = writeln!(out, "- [{mark}] {} {}", item.external_id, item.title);
                }
            }
        }
    }

    let journey = epic.journey_newest_first();
    if !journey.is_empty() {
        out.push_str("\n## Journey\n\n");
        for entry in journey {
            render_journey_line(&mut out, entry);
        }
    }

    out.push('\n');
    out.push_str(BODY_MARKER);
    out.push('\n');
    out
}

/// Render a progress comment for entries not yet reported, oldest first.
#[must_use]
pub fn render_progress_comment(entries: &[JourneyEntry]) -> String {
    let mut out = String::from("**Progress update**\n\n");
    for entry in entries {
        render_journey_line(&mut out, entry);
    }
    out
}
