//! Epic management commands.
//!
//! - `epictrack epic register <number> <title>` - Cache an existing remote issue
//! - `epictrack epic link <epic> <issue> <title>` - Attach a task issue
//! - `epictrack epic status <epic> <status>` - Replace the status label
//! - `epictrack epic close <epic>` - Close the epic

use colored::Colorize;
use serde::Serialize;

use super::{Workspace, print_json};
use crate::cli::{EpicCommands, EpicRegisterArgs};
use crate::error::{Error, Result};
use crate::model::{Epic, EpicStatus, ItemState, STATUS_NAMESPACE, SubIssue, replace_in_namespace};
use crate::remote::ExternalProjectRef;
use crate::tracking::{NewJourneyEntry, add_journey_entry};
use crate::validate::normalize_status;

#[derive(Serialize)]
struct EpicOutput<'a> {
    number: u64,
    title: &'a str,
    state: &'static str,
    labels: Vec<&'a str>,
    dirty: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    plan_file: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    external_project: Option<&'a str>,
}

impl<'a> From<&'a Epic> for EpicOutput<'a> {
    fn from(e: &'a Epic) -> Self {
        Self {
            number: e.number,
            title: &e.title,
            state: e.state.as_str(),
            labels: e.labels.iter().map(String::as_str).collect(),
            dirty: e.dirty,
            plan_file: e.plan_file.as_deref(),
            external_project: e.external_project.as_deref(),
        }
    }
}

/// Execute an epic command.
///
/// # Errors
///
/// Returns validation, not-found, or persistence errors.
pub fn execute(command: &EpicCommands, ws: &Workspace, json: bool) -> Result<()> {
    match command {
        EpicCommands::Register(args) => execute_register(args, ws, json),
        EpicCommands::Link {
            epic,
            issue,
            title,
            task_index,
        } => execute_link(*epic, *issue, title, *task_index, ws, json),
        EpicCommands::Status { epic, status } => execute_status(*epic, status, ws, json),
        EpicCommands::Close { epic } => execute_close(*epic, ws, json),
    }
}

fn require_positive(number: u64, what: &str) -> Result<()> {
    if number == 0 {
        return Err(Error::Validation(format!("{what} must be a positive integer")));
    }
    Ok(())
}

fn execute_register(args: &EpicRegisterArgs, ws: &Workspace, json: bool) -> Result<()> {
    require_positive(args.number, "epic number")?;
    let title = args.title.trim();
    if title.is_empty() {
        return Err(Error::RequiredField { field: "title" });
    }

    let mut cache = ws.load();
    if cache.epic(args.number).is_some() {
        return Err(Error::Validation(format!(
            "epic number #{} is already registered",
            args.number
        )));
    }

    let mut epic = Epic::new(args.number, title);
    if let Some(plan) = &args.plan {
        epic = epic.with_plan(plan);
    }
    if let Some(track) = &args.track {
        let project = ExternalProjectRef::parse(track).map_err(Error::Validation)?;
        epic = epic.tracking(&project.to_string());
    }
    for label in &args.labels {
        let label = label.trim();
        if !label.is_empty() {
            epic = epic.with_label(label);
        }
    }
    if EpicStatus::from_labels(&epic.labels).is_none() {
        epic.labels = replace_in_namespace(
            &epic.labels,
            STATUS_NAMESPACE,
            EpicStatus::Planning.as_str(),
        );
    }

    cache.upsert_epic(epic);
    ws.save(&cache)?;
    tracing::info!(epic = args.number, "Registered epic");

    if let Some(epic) = cache.epic(args.number) {
        if json {
            return print_json(&EpicOutput::from(epic));
        }
        println!("{} #{} {}", "Registered".green(), epic.number, epic.title);
    }
    Ok(())
}

fn execute_link(
    epic_number: u64,
    issue: u64,
    title: &str,
    task_index: Option<usize>,
    ws: &Workspace,
    json: bool,
) -> Result<()> {
    require_positive(epic_number, "epic number")?;
    require_positive(issue, "issue number")?;
    let title = title.trim();
    if title.is_empty() {
        return Err(Error::RequiredField { field: "title" });
    }

    let mut cache = ws.load();
    cache.link_sub_issue(
        epic_number,
        SubIssue {
            number: issue,
            title: title.to_string(),
            state: ItemState::Open,
            task_index,
        },
    )?;
    ws.save(&cache)?;

    if json {
        return print_json(&serde_json::json!({
            "epic": epic_number,
            "issue": issue,
            "title": title,
            "task_index": task_index,
        }));
    }
    println!("Linked #{issue} to epic #{epic_number}");
    Ok(())
}

fn execute_status(epic_number: u64, status: &str, ws: &Workspace, json: bool) -> Result<()> {
    let status = normalize_status(status)?;
    let mut cache = ws.load();

    let changed = cache.set_status(epic_number, status)?;
    if changed {
        add_journey_entry(
            &mut cache,
            epic_number,
            NewJourneyEntry::new("status_change", format!("Status set to {status}"))
                .agent(ws.actor.as_str())
                .meta("status", status.as_str()),
        )?;
        ws.save(&cache)?;
    }

    if json {
        return print_json(&serde_json::json!({
            "epic": epic_number,
            "status": status.as_str(),
            "changed": changed,
        }));
    }
    if changed {
        println!("Epic #{epic_number} is now {}", status.as_str().cyan());
    } else {
        println!("Epic #{epic_number} is already {status}");
    }
    Ok(())
}

fn execute_close(epic_number: u64, ws: &Workspace, json: bool) -> Result<()> {
    let mut cache = ws.load();

    let closed = cache.close_epic(epic_number)?;
    if closed {
        cache.set_status(epic_number, EpicStatus::Done)?;
        add_journey_entry(
            &mut cache,
            epic_number,
            NewJourneyEntry::new("epic_closed", "Epic closed").agent(ws.actor.as_str()),
        )?;
        ws.save(&cache)?;
    }

    if json {
        return print_json(&serde_json::json!({
            "epic": epic_number,
            "closed": closed,
        }));
    }
    if closed {
        println!("{} epic #{epic_number}", "Closed".green());
    } else {
        println!("Epic #{epic_number} was already closed");
    }
    Ok(())
}
