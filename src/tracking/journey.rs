//! Journey log primitive.
//!
//! [`add_journey_entry`] is the single validated entry point for appending
//! to an epic's journey. It never touches the dirty flag.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::model::{Cache, JourneyEntry};

/// Input for [`add_journey_entry`].
#[derive(Debug, Clone, Default)]
pub struct NewJourneyEntry {
    pub event: String,
    pub message: String,
    pub agent: Option<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Defaults to now.
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewJourneyEntry {
    #[must_use]
    pub fn new(event: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            message: message.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    #[must_use]
    pub fn meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Strip control characters (including NUL, CR, LF and TAB).
#[must_use]
pub fn sanitize(input: &str) -> String {
    input.chars().filter(|c| !c.is_control()).collect()
}

fn required(field: &'static str, raw: &str) -> Result<String> {
    if raw.trim().is_empty() {
        return Err(Error::RequiredField { field });
    }
    let clean = sanitize(raw);
    if clean.trim().is_empty() {
        return Err(Error::Validation(format!(
            "{field} contains only control characters"
        )));
    }
    Ok(clean)
}

/// Validate, sanitize, and append a journey entry to an epic.
///
/// # Errors
///
/// Returns `Validation` for epic number 0, `EpicNotFound` for an unknown
/// epic, and `RequiredField`/`Validation` for an empty event or message.
pub fn add_journey_entry(cache: &mut Cache, epic_number: u64, entry: NewJourneyEntry) -> Result<()> {
    if epic_number == 0 {
        return Err(Error::Validation(
            "epic number must be a positive integer".to_string(),
        ));
    }
    if cache.epic(epic_number).is_none() {
        return Err(Error::EpicNotFound {
            number: epic_number,
        });
    }

    let event = required("event", &entry.event)?;
    let message = required("message", &entry.message)?;
    let agent = entry
        .agent
        .as_deref()
        .map(sanitize)
        .filter(|a| !a.trim().is_empty());

    let record = JourneyEntry {
        timestamp: entry.timestamp.unwrap_or_else(Utc::now),
        event,
        message,
        agent,
        metadata: (!entry.metadata.is_empty()).then_some(entry.metadata),
    };

    cache.require_epic_mut(epic_number)?.journey.push(record);
    Ok(())
}
