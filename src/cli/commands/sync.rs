//! Sync command implementation.
//!
//! Pushes dirty epics to the remote tracker. A single epic can be pushed
//! with `--epic`; otherwise every dirty epic is attempted and failures
//! are reported together at the end.

use colored::Colorize;
use serde::Serialize;

use super::{Workspace, print_json, runtime};
use crate::error::{Error, Result};
use crate::sync::{SyncEngine, SyncOutcome, SyncReport};

#[derive(Serialize)]
struct EpicSyncOutput<'a> {
    epic: u64,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

/// Execute the sync command.
///
/// # Errors
///
/// Returns a fatal remote error for a single epic, `BatchFailed` when any
/// epic in a batch failed fatally, or a persistence error.
pub fn execute(epic: Option<u64>, ws: &Workspace, json: bool) -> Result<()> {
    let engine = SyncEngine::new(
        ws.remote()?,
        ws.plan_reader(),
        ws.settings.tracking.clone(),
        ws.store.clone(),
        ws.identity(),
    );
    let rt = runtime()?;
    let mut cache = ws.load();

    if let Some(number) = epic {
        let outcome = rt.block_on(engine.sync_epic(&mut cache, number))?;
        if json {
            let reason = match &outcome {
                SyncOutcome::Deferred(reason) => Some(reason.as_str()),
                _ => None,
            };
            return print_json(&EpicSyncOutput {
                epic: number,
                outcome: outcome.as_str(),
                reason,
            });
        }
        print_outcome(number, &outcome);
        return Ok(());
    }

    let report = rt.block_on(engine.sync_dirty(&mut cache))?;
    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    if report.has_failures() {
        return Err(Error::BatchFailed {
            operation: "sync",
            count: report.failed.len(),
        });
    }
    Ok(())
}

fn print_outcome(number: u64, outcome: &SyncOutcome) {
    match outcome {
        SyncOutcome::Disabled => println!(
            "{}",
            "Auto-update is disabled; nothing pushed.".yellow()
        ),
        SyncOutcome::AlreadyClean => println!("Epic #{number} is already in sync"),
        SyncOutcome::Synced => println!("{} epic #{number}", "Synced".green()),
        SyncOutcome::Deferred(reason) => println!(
            "{} epic #{number}: {reason} (will retry on next sync)",
            "Deferred".yellow()
        ),
    }
}

fn print_report(report: &SyncReport) {
    if report.disabled {
        println!(
            "{} {} dirty epic(s) left pending.",
            "Auto-update is disabled;".yellow(),
            report.skipped.len()
        );
        return;
    }
    if report.total() == 0 {
        println!("{}", "Nothing to sync.".dimmed());
        return;
    }

    for number in &report.synced {
        println!("  {} #{number}", "synced".green());
    }
    for deferred in &report.deferred {
        println!("  {} #{}: {}", "deferred".yellow(), deferred.epic, deferred.reason);
    }
    for failed in &report.failed {
        println!(
            "  {} #{} [{}]: {}",
            "failed".red(),
            failed.epic,
            failed.code,
            failed.message
        );
    }
    println!(
        "{} synced, {} deferred, {} failed",
        report.synced.len(),
        report.deferred.len(),
        report.failed.len()
    );
}
