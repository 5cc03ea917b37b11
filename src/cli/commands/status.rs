//! Status command implementation.

use serde::Serialize;

use super::{Workspace, print_json};
use crate::error::Result;
use crate::model::EpicStatus;
use crate::sync::{SyncStatus, print_status, sync_status};

#[derive(Serialize)]
struct EpicLine {
    number: u64,
    title: String,
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'static str>,
    dirty: bool,
    journey_entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    external_project: Option<String>,
}

#[derive(Serialize)]
struct StatusOutput {
    #[serde(flatten)]
    summary: SyncStatus,
    epics: Vec<EpicLine>,
}

/// Execute the status command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(ws: &Workspace, json: bool) -> Result<()> {
    let cache = ws.load();
    let summary = sync_status(&ws.identity(), &cache, &ws.settings.tracking);

    if json {
        let epics = cache
            .epics()
            .iter()
            .map(|e| EpicLine {
                number: e.number,
                title: e.title.clone(),
                state: e.state.as_str(),
                status: EpicStatus::from_labels(&e.labels).map(|s| s.as_str()),
                dirty: e.dirty,
                journey_entries: e.journey.len(),
                external_project: e.external_project.clone(),
            })
            .collect();
        return print_json(&StatusOutput { summary, epics });
    }

    print_status(&summary, &cache);
    Ok(())
}
