//! Journey commands.
//!
//! - `epictrack journey add <epic> --event E --message M` - Append and mark dirty
//! - `epictrack journey show <epic>` - Print entries newest first

use colored::Colorize;
use serde::Serialize;

use super::{Workspace, print_json};
use crate::cli::{JourneyAddArgs, JourneyCommands};
use crate::error::{Error, Result};
use crate::model::JourneyEntry;
use crate::tracking::{NewJourneyEntry, add_journey_entry};
use crate::validate::parse_meta_pair;

#[derive(Serialize)]
struct JourneyOutput<'a> {
    epic: u64,
    dirty: bool,
    entries: Vec<&'a JourneyEntry>,
    count: usize,
}

/// Execute a journey command.
///
/// # Errors
///
/// Returns validation, not-found, or persistence errors.
pub fn execute(command: &JourneyCommands, ws: &Workspace, json: bool) -> Result<()> {
    match command {
        JourneyCommands::Add(args) => execute_add(args, ws, json),
        JourneyCommands::Show { epic, limit } => execute_show(*epic, *limit, ws, json),
    }
}

fn execute_add(args: &JourneyAddArgs, ws: &Workspace, json: bool) -> Result<()> {
    let mut entry = NewJourneyEntry::new(args.event.as_str(), args.message.as_str())
        .agent(args.agent.as_deref().unwrap_or(ws.actor.as_str()));
    for pair in &args.meta {
        let (key, value) = parse_meta_pair(pair)?;
        entry.metadata.insert(key, value);
    }

    let mut cache = ws.load();
    add_journey_entry(&mut cache, args.epic, entry)?;
    cache.mark_dirty(args.epic)?;
    ws.save(&cache)?;

    let stored = cache
        .epic(args.epic)
        .and_then(|e| e.journey.last())
        .ok_or(Error::EpicNotFound { number: args.epic })?;

    if json {
        return print_json(&serde_json::json!({
            "epic": args.epic,
            "dirty": true,
            "entry": stored,
        }));
    }
    println!(
        "Added {} to epic #{} (pending sync)",
        stored.event.cyan(),
        args.epic
    );
    Ok(())
}

fn execute_show(epic_number: u64, limit: Option<usize>, ws: &Workspace, json: bool) -> Result<()> {
    let cache = ws.load();
    let epic = cache
        .epic(epic_number)
        .ok_or(Error::EpicNotFound { number: epic_number })?;

    let mut entries = epic.journey_newest_first();
    if let Some(limit) = limit {
        entries.truncate(limit);
    }

    if json {
        return print_json(&JourneyOutput {
            epic: epic.number,
            dirty: epic.dirty,
            count: entries.len(),
            entries,
        });
    }

    println!("{} #{} {}", "Journey".bold(), epic.number, epic.title);
    if entries.is_empty() {
        println!("{}", "  No entries yet.".dimmed());
        return Ok(());
    }
    for entry in entries {
        let agent = entry
            .agent
            .as_deref()
            .map(|a| format!(" (by {a})"))
            .unwrap_or_default();
        println!(
            "  {} {:<18} {}{}",
            entry.timestamp.format("%Y-%m-%d %H:%M").to_string().dimmed(),
            entry.event.as_str().cyan(),
            entry.message,
            agent.as_str().dimmed()
        );
    }
    Ok(())
}
