//! Trigger detector commands.
//!
//! - `epictrack detect skill <message>` - Skill announcements move epic status
//! - `epictrack detect commits --since 7d` - Closing keywords complete tasks

use std::io::Read;
use std::path::Path;

use chrono::Utc;
use colored::Colorize;
use serde::Serialize;

use super::{Workspace, print_json};
use crate::cli::DetectCommands;
use crate::error::Result;
use crate::tracking::commit::parse_since;
use crate::tracking::{
    CompletedTask, apply_skill_invocation, detect_completed_tasks, detect_skill_invocation,
    record_commit_completions,
};

#[derive(Serialize)]
struct SkillOutput<'a> {
    detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    skill: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phase: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    plan_path: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    epic: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'static str>,
    status_changed: bool,
    applied: bool,
}

#[derive(Serialize)]
struct CommitMatch<'a> {
    issue: u64,
    keyword: &'a str,
    sha: &'a str,
    subject: &'a str,
}

#[derive(Serialize)]
struct CommitsOutput<'a> {
    matches: Vec<CommitMatch<'a>>,
    applied: bool,
    recorded: Vec<RecordedTask>,
    unknown: Vec<u64>,
    already_recorded: usize,
}

#[derive(Serialize)]
struct RecordedTask {
    issue: u64,
    epic: u64,
}

/// Execute a detect command.
///
/// # Errors
///
/// Returns input, validation, or persistence errors.
pub fn execute(command: &DetectCommands, ws: &Workspace, json: bool) -> Result<()> {
    match command {
        DetectCommands::Skill { message, dry_run } => execute_skill(message, *dry_run, ws, json),
        DetectCommands::Commits {
            since,
            path,
            dry_run,
        } => execute_commits(since, path.as_deref(), *dry_run, ws, json),
    }
}

fn read_message(arg: &str) -> Result<String> {
    if arg == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    Ok(arg.to_string())
}

fn execute_skill(arg: &str, dry_run: bool, ws: &Workspace, json: bool) -> Result<()> {
    let message = read_message(arg)?;

    if dry_run {
        let found = detect_skill_invocation(&message);
        if json {
            return print_json(&SkillOutput {
                detected: found.is_some(),
                skill: found.as_ref().map(|m| m.phase.skill()),
                phase: found.as_ref().map(|m| m.phase.stage()),
                plan_path: found.as_ref().and_then(|m| m.plan_path.as_deref()),
                epic: None,
                status: found
                    .as_ref()
                    .and_then(|m| m.phase.target_status())
                    .map(|s| s.as_str()),
                status_changed: false,
                applied: false,
            });
        }
        match found {
            Some(m) => println!("Detected {} ({})", m.phase.skill().cyan(), m.phase.stage()),
            None => println!("{}", "No skill invocation detected.".dimmed()),
        }
        return Ok(());
    }

    let mut cache = ws.load();
    let trigger = apply_skill_invocation(&mut cache, &message, Some(ws.actor.as_str()))?;
    if trigger.is_some() {
        ws.save(&cache)?;
    }

    if json {
        return print_json(&SkillOutput {
            detected: trigger.is_some(),
            skill: trigger.as_ref().map(|t| t.phase.skill()),
            phase: trigger.as_ref().map(|t| t.phase.stage()),
            plan_path: None,
            epic: trigger.as_ref().map(|t| t.epic_number),
            status: trigger.as_ref().and_then(|t| t.status).map(|s| s.as_str()),
            status_changed: trigger.as_ref().is_some_and(|t| t.status_changed),
            applied: trigger.is_some(),
        });
    }

    match trigger {
        Some(t) => {
            let status = t
                .status
                .filter(|_| t.status_changed)
                .map(|s| format!(", status now {s}"))
                .unwrap_or_default();
            println!(
                "Recorded {} on epic #{}{status}",
                t.phase.skill().cyan(),
                t.epic_number
            );
        }
        None => println!("{}", "No skill invocation applied.".dimmed()),
    }
    Ok(())
}

fn execute_commits(
    since: &str,
    path: Option<&Path>,
    dry_run: bool,
    ws: &Workspace,
    json: bool,
) -> Result<()> {
    let since = parse_since(since, Utc::now())?;
    let repo_path = path.unwrap_or_else(|| ws.root());
    let tasks = detect_completed_tasks(repo_path, since);
    tracing::debug!(count = tasks.len(), since = %since, "Scanned commits");

    if dry_run {
        if json {
            return print_json(&CommitsOutput {
                matches: matches_of(&tasks),
                applied: false,
                recorded: Vec::new(),
                unknown: Vec::new(),
                already_recorded: 0,
            });
        }
        if tasks.is_empty() {
            println!("{}", "No task-closing commits found.".dimmed());
        }
        for task in &tasks {
            println!(
                "  {} {} #{} {}",
                task.commit.short_sha().dimmed(),
                task.keyword,
                task.issue_number,
                task.commit.subject()
            );
        }
        return Ok(());
    }

    let mut cache = ws.load();
    let report = record_commit_completions(&mut cache, &tasks)?;
    if !report.recorded.is_empty() {
        ws.save(&cache)?;
    }

    if json {
        return print_json(&CommitsOutput {
            matches: matches_of(&tasks),
            applied: true,
            recorded: report
                .recorded
                .iter()
                .map(|&(issue, epic)| RecordedTask { issue, epic })
                .collect(),
            unknown: report.unknown,
            already_recorded: report.already_recorded,
        });
    }

    for (issue, epic) in &report.recorded {
        println!("  {} #{issue} on epic #{epic}", "completed".green());
    }
    if !report.unknown.is_empty() {
        let list: Vec<String> = report.unknown.iter().map(|n| format!("#{n}")).collect();
        println!("  {} {}", "not cached:".dimmed(), list.join(", "));
    }
    println!(
        "{} recorded, {} already recorded, {} unknown",
        report.recorded.len(),
        report.already_recorded,
        report.unknown.len()
    );
    Ok(())
}

fn matches_of(tasks: &[CompletedTask]) -> Vec<CommitMatch<'_>> {
    tasks
        .iter()
        .map(|t| CommitMatch {
            issue: t.issue_number,
            keyword: &t.keyword,
            sha: &t.commit.sha,
            subject: t.commit.subject(),
        })
        .collect()
}
