//! Sync status display.
//!
//! Summarises which epics still need pushing and how far the external
//! mirrors extend, for the `status` command.

use colored::Colorize;

use crate::config::TrackingSettings;
use crate::model::{Cache, EpicStatus};
use crate::sync::types::SyncStatus;

/// Summarise the sync state of a loaded cache.
#[must_use]
pub fn sync_status(identity: &str, cache: &Cache, settings: &TrackingSettings) -> SyncStatus {
    let epics = cache.epics();
    SyncStatus {
        identity: identity.to_string(),
        auto_update: settings.auto_update_epics,
        total_epics: epics.len(),
        open_epics: epics.iter().filter(|e| e.is_open()).count(),
        dirty_epics: cache.dirty_epic_numbers(),
        tracking_epics: cache.tracking_epic_numbers().len(),
        open_mirror_items: epics.iter().map(|e| e.open_tracked_ids().len()).sum(),
        known_issues: cache.issues().len(),
        last_synced_at: epics.iter().filter_map(|e| e.synced_at).max(),
    }
}

/// Print the per-epic listing and sync summary to stdout.
pub fn print_status(status: &SyncStatus, cache: &Cache) {
    println!("{} {}", "Epic Tracking".bold().underline(), status.identity.dimmed());
    println!();

    if cache.epics().is_empty() {
        println!("{}", "No epics cached for this repository.".dimmed());
        println!(
            "{}",
            "Run 'epictrack epic register <number> <title>' to start tracking.".dimmed()
        );
        return;
    }

    println!("{}", "Epics:".blue().bold());
    for epic in cache.epics() {
        let marker = if epic.dirty {
            "●".yellow()
        } else {
            "○".green()
        };
        let state = if epic.is_open() {
            epic.state.as_str().normal()
        } else {
            epic.state.as_str().dimmed()
        };
        let status = EpicStatus::from_labels(&epic.labels)
            .map(|s| format!(" [{s}]"))
            .unwrap_or_default();
        println!(
            "  {marker} #{:<5} {:<40} {state}{}",
            epic.number,
            epic.title,
            status.as_str().cyan()
        );
        if let Some(project) = &epic.external_project {
            println!(
                "      tracking {project}: {} open",
                epic.open_tracked_ids().len()
            );
        }
    }
    println!();

    if !status.auto_update {
        println!(
            "{}",
            "Auto-update is disabled (tracking.autoUpdateEpics = false).".yellow()
        );
    }

    if status.dirty_epics.is_empty() {
        println!("{}", "All epics are in sync.".green());
    } else {
        let list: Vec<String> = status.dirty_epics.iter().map(|n| format!("#{n}")).collect();
        println!(
            "{} {}",
            "Pending sync:".yellow().bold(),
            list.join(", ")
        );
        println!("{}", "Run 'epictrack sync' to push pending changes.".dimmed());
    }

    if status.tracking_epics > 0 {
        println!(
            "Tracking epics: {} ({} open mirror items)",
            status.tracking_epics, status.open_mirror_items
        );
    }
    match status.last_synced_at {
        Some(ts) => println!("Last sync: {}", ts.format("%Y-%m-%d %H:%M UTC")),
        None => println!("{}", "Never synced.".dimmed()),
    }
}
