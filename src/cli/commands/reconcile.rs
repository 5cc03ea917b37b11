//! Reconcile command implementation.

use colored::Colorize;
use serde::Serialize;

use super::{Workspace, print_json, runtime};
use crate::error::{Error, Result};
use crate::tracking::{ReconcileStats, reconcile_all, reconcile_tracking_epic};

#[derive(Serialize)]
struct EpicReconcileOutput {
    epic: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<ReconcileStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<serde_json::Value>,
}

/// Execute the reconcile command.
///
/// The cache is saved even when a pass fails part way, so mirror items
/// created before the failure are not recreated on the next run.
///
/// # Errors
///
/// Returns the failure for a single epic, or `BatchFailed` when any
/// tracking epic failed with a non-transient error.
pub fn execute(epic: Option<u64>, ws: &Workspace, json: bool) -> Result<()> {
    let remote = ws.remote()?;
    let rt = runtime()?;
    let mut cache = ws.load();
    let settings = &ws.settings.tracking;

    if let Some(number) = epic {
        let result = rt.block_on(reconcile_tracking_epic(&mut cache, number, &remote, settings));
        ws.save(&cache)?;
        let stats = result?;
        if json {
            return print_json(&EpicReconcileOutput {
                epic: number,
                stats: Some(stats),
                error: None,
            });
        }
        print_stats(number, &stats);
        return Ok(());
    }

    let results = rt.block_on(reconcile_all(&mut cache, &remote, settings));
    ws.save(&cache)?;

    let failed = results
        .iter()
        .filter(|(_, r)| r.as_ref().is_err_and(|e| !e.is_transient()))
        .count();

    if json {
        let out: Vec<EpicReconcileOutput> = results
            .iter()
            .map(|(number, r)| EpicReconcileOutput {
                epic: *number,
                stats: r.as_ref().ok().copied(),
                error: r.as_ref().err().map(Error::to_structured_json),
            })
            .collect();
        print_json(&out)?;
    } else if results.is_empty() {
        println!("{}", "No tracking epics to reconcile.".dimmed());
    } else {
        for (number, result) in &results {
            match result {
                Ok(stats) => print_stats(*number, stats),
                Err(e) if e.is_transient() => {
                    println!("  {} #{number}: {e}", "deferred".yellow());
                }
                Err(e) => println!("  {} #{number}: {e}", "failed".red()),
            }
        }
    }

    if failed > 0 {
        return Err(Error::BatchFailed {
            operation: "reconcile",
            count: failed,
        });
    }
    Ok(())
}

fn print_stats(number: u64, stats: &ReconcileStats) {
    if stats.changed() {
        println!(
            "  {} #{number}: {} created, {} reopened, {} closed, {} renamed, {} unchanged",
            "reconciled".green(),
            stats.created,
            stats.reopened,
            stats.closed,
            stats.retitled,
            stats.unchanged
        );
    } else {
        println!("  #{number}: no changes ({} open)", stats.unchanged);
    }
}
