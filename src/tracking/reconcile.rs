//! External-project reconciliation.
//!
//! A tracking epic mirrors the open items of an external project. Each
//! pass diffs the remote open set against the cached mirror by external
//! id: new ids become open mirror items, ids that vanished are closed,
//! and previously closed ids that reappear are reopened. After a
//! complete pass the mirror's open subset equals the remote open set.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;

use super::journey::{NewJourneyEntry, add_journey_entry};
use crate::config::TrackingSettings;
use crate::error::{Error, Result};
use crate::model::{Cache, ItemState, MirrorMode, TrackedItem};
use crate::remote::{ExternalProjectRef, RemoteItem, RemoteTracker, bounded};

/// Label applied to remote tracking records created for mirror items.
pub const TRACKING_LABEL: &str = "tracking";

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub created: usize,
    pub reopened: usize,
    pub closed: usize,
    /// Still open remotely, but the title changed.
    pub retitled: usize,
    pub unchanged: usize,
}

impl ReconcileStats {
    #[must_use]
    pub const fn changed(&self) -> bool {
        self.created + self.reopened + self.closed + self.retitled > 0
    }
}

fn tracking_record_body(project: &ExternalProjectRef, item: &RemoteItem) -> String {
    let link = item
        .url
        .clone()
        .unwrap_or_else(|| project.item_id(item.number));
    format!("Tracking {} from {project}.\n\nUpstream: {link}\n", item.id)
}

async fn create_tracking_record<R: RemoteTracker>(
    remote: &R,
    limit: Duration,
    project: &ExternalProjectRef,
    item: &RemoteItem,
) -> Result<u64> {
    let title = format!("[{}] {}", item.id, item.title);
    let body = tracking_record_body(project, item);
    let labels = [TRACKING_LABEL.to_string()];
    Ok(bounded(limit, remote.create_record(&title, &body, &labels)).await?)
}

/// Diff the remote open set against the mirror, calling out to the remote
/// for tracking records when enabled. Stops at the first remote failure;
/// `items` and `stats` hold whatever was done before it.
async fn converge<R: RemoteTracker>(
    items: &mut Vec<TrackedItem>,
    stats: &mut ReconcileStats,
    project: &ExternalProjectRef,
    open: &[RemoteItem],
    remote: &R,
    settings: &TrackingSettings,
) -> Result<()> {
    let limit = Duration::from_secs(settings.request_timeout_secs);
    let now = Utc::now();

    for item in open {
        match items.iter_mut().find(|t| t.external_id == item.id) {
            Some(existing) if existing.state.is_open() => {
                if existing.title == item.title {
                    stats.unchanged += 1;
                } else {
                    existing.title.clone_from(&item.title);
                    stats.retitled += 1;
                }
            }
            Some(existing) => {
                // The old tracking record was closed with the item; a
                // returning item gets a fresh one.
                if settings.mirror_as_issues {
                    existing.tracking_number =
                        Some(create_tracking_record(remote, limit, project, item).await?);
                }
                existing.state = ItemState::Open;
                existing.closed_at = None;
                existing.title.clone_from(&item.title);
                stats.reopened += 1;
            }
            None => {
                let tracking_number = if settings.mirror_as_issues {
                    Some(create_tracking_record(remote, limit, project, item).await?)
                } else {
                    None
                };
                items.push(TrackedItem {
                    external_id: item.id.clone(),
                    number: item.number,
                    title: item.title.clone(),
                    url: item.url.clone(),
                    state: ItemState::Open,
                    tracking_number,
                    first_seen_at: now,
                    closed_at: None,
                });
                stats.created += 1;
            }
        }
    }

    let still_open: HashSet<&str> = open.iter().map(|i| i.id.as_str()).collect();
    for tracked in items.iter_mut() {
        if !tracked.state.is_open() || still_open.contains(tracked.external_id.as_str()) {
            continue;
        }
        if settings.mirror_as_issues {
            if let Some(number) = tracked.tracking_number {
                bounded(limit, remote.close_record(number)).await?;
            }
        }
        tracked.state = ItemState::Closed;
        tracked.closed_at = Some(now);
        stats.closed += 1;
    }

    Ok(())
}

/// Reconcile one tracking epic against its external project.
///
/// A pass with changes replaces the mirror list, appends a
/// `tracking_update` journey entry and sets dirty in one mutation. If a
/// remote call fails partway, the changes made so far are kept the same
/// way and the error is returned.
///
/// # Errors
///
/// Returns `EpicNotFound` for an unknown epic, `Validation` for an epic
/// that is not a tracking epic, and `Remote` when the listing or a
/// tracking-record call fails.
pub async fn reconcile_tracking_epic<R: RemoteTracker>(
    cache: &mut Cache,
    epic_number: u64,
    remote: &R,
    settings: &TrackingSettings,
) -> Result<ReconcileStats> {
    let epic = cache
        .epic(epic_number)
        .ok_or(Error::EpicNotFound { number: epic_number })?;
    if epic.mirror_mode() != MirrorMode::External {
        return Err(Error::Validation(format!(
            "epic #{epic_number} does not track an external project"
        )));
    }
    if !epic.sub_issues.is_empty() {
        return Err(Error::Validation(format!(
            "epic #{epic_number} has sub-issues and cannot also mirror an external project"
        )));
    }
    if !epic.is_open() {
        tracing::debug!(epic = epic_number, "Skipping reconciliation of closed epic");
        return Ok(ReconcileStats::default());
    }

    let slug = epic.external_project.clone().unwrap_or_default();
    let project = ExternalProjectRef::parse(&slug).map_err(Error::Validation)?;
    let mut items = epic.tracked_items.clone();

    let limit = Duration::from_secs(settings.request_timeout_secs);
    let open = bounded(limit, remote.list_open_items(&project)).await?;

    let mut stats = ReconcileStats::default();
    let outcome = converge(&mut items, &mut stats, &project, &open, remote, settings).await;

    if stats.changed() {
        let summary = format!(
            "Reconciled {project}: {} new, {} closed, {} reopened, {} renamed{}",
            stats.created,
            stats.closed,
            stats.reopened,
            stats.retitled,
            if outcome.is_err() { " (incomplete)" } else { "" }
        );
        cache.require_epic_mut(epic_number)?.tracked_items = items;
        add_journey_entry(
            cache,
            epic_number,
            NewJourneyEntry::new("tracking_update", summary)
                .agent("reconcile")
                .meta("project", project.to_string())
                .meta("created", stats.created)
                .meta("closed", stats.closed)
                .meta("reopened", stats.reopened)
                .meta("retitled", stats.retitled),
        )?;
        cache.mark_dirty(epic_number)?;
    }

    match outcome {
        Ok(()) => {
            if stats.changed() {
                tracing::info!(
                    epic = epic_number,
                    project = %project,
                    created = stats.created,
                    closed = stats.closed,
                    reopened = stats.reopened,
                    retitled = stats.retitled,
                    "Reconciled tracking epic"
                );
            } else {
                tracing::debug!(epic = epic_number, project = %project, "Mirror already converged");
            }
            Ok(stats)
        }
        Err(e) => {
            tracing::warn!(epic = epic_number, project = %project, error = %e, "Reconciliation incomplete");
            Err(e)
        }
    }
}

/// Reconcile every open tracking epic. One failure does not stop the rest.
pub async fn reconcile_all<R: RemoteTracker>(
    cache: &mut Cache,
    remote: &R,
    settings: &TrackingSettings,
) -> Vec<(u64, Result<ReconcileStats>)> {
    let mut results = Vec::new();
    for number in cache.tracking_epic_numbers() {
        let result = reconcile_tracking_epic(cache, number, remote, settings).await;
        results.push((number, result));
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Epic;
    use crate::remote::{RemoteError, RemoteResult};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct StubProject {
        open: Mutex<Vec<RemoteItem>>,
        title_prefix: Mutex<Option<String>>,
        list_error: Mutex<Option<RemoteError>>,
        fail_create_after: Mutex<Option<usize>>,
        created: Mutex<Vec<String>>,
        closed: Mutex<Vec<u64>>,
        next_number: AtomicU64,
    }

    impl StubProject {
        fn with_open(ids: &[u64]) -> Self {
            let stub = Self {
                next_number: AtomicU64::new(500),
                ..Self::default()
            };
            stub.set_open(ids);
            stub
        }

        fn set_open(&self, ids: &[u64]) {
            let prefix = self
                .title_prefix
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| "Item".to_string());
            *self.open.lock().unwrap() = ids
                .iter()
                .map(|&n| RemoteItem {
                    id: format!("acme/widgets#{n}"),
                    number: n,
                    title: format!("{prefix} {n}"),
                    url: None,
                })
                .collect();
        }
    }

    impl RemoteTracker for StubProject {
        async fn create_record(&self, title: &str, _body: &str, _labels: &[String]) -> RemoteResult<u64> {
            let mut created = self.created.lock().unwrap();
            if let Some(limit) = *self.fail_create_after.lock().unwrap() {
                if created.len() >= limit {
                    return Err(RemoteError::RateLimited { retry_after: None });
                }
            }
            created.push(title.to_string());
            Ok(self.next_number.fetch_add(1, Ordering::SeqCst))
        }

        async fn update_record_body(&self, _number: u64, _body: &str) -> RemoteResult<()> {
            Ok(())
        }

        async fn set_labels(&self, _number: u64, _labels: &[String]) -> RemoteResult<()> {
            Ok(())
        }

        async fn add_comment(&self, _number: u64, _text: &str) -> RemoteResult<()> {
            Ok(())
        }

        async fn close_record(&self, number: u64) -> RemoteResult<()> {
            self.closed.lock().unwrap().push(number);
            Ok(())
        }

        async fn list_open_items(&self, _project: &ExternalProjectRef) -> RemoteResult<Vec<RemoteItem>> {
            if let Some(err) = self.list_error.lock().unwrap().clone() {
                return Err(err);
            }
            Ok(self.open.lock().unwrap().clone())
        }
    }

    fn tracking_cache() -> Cache {
        let mut cache = Cache::new();
        cache.upsert_epic(Epic::new(1, "Upstream").tracking("acme/widgets"));
        cache
    }

    fn open_ids(cache: &Cache) -> Vec<String> {
        cache
            .epic(1)
            .unwrap()
            .open_tracked_ids()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_converges_to_remote_open_set() {
        let mut cache = tracking_cache();
        let settings = TrackingSettings::default();
        let remote = StubProject::with_open(&[1, 2, 3]);

        let stats = reconcile_tracking_epic(&mut cache, 1, &remote, &settings).await.unwrap();
        assert_eq!(stats.created, 3);
        assert_eq!(open_ids(&cache), vec!["acme/widgets#1", "acme/widgets#2", "acme/widgets#3"]);
        assert!(cache.epic(1).unwrap().dirty);
        assert!(remote.created.lock().unwrap().is_empty());

        cache.epic_mut(1).unwrap().dirty = false;
        remote.set_open(&[2, 3, 4]);
        let stats = reconcile_tracking_epic(&mut cache, 1, &remote, &settings).await.unwrap();
        assert_eq!(
            stats,
            ReconcileStats {
                created: 1,
                reopened: 0,
                closed: 1,
                retitled: 0,
                unchanged: 2
            }
        );
        assert_eq!(open_ids(&cache), vec!["acme/widgets#2", "acme/widgets#3", "acme/widgets#4"]);

        let epic = cache.epic(1).unwrap();
        assert!(epic.dirty);
        let closed = epic
            .tracked_items
            .iter()
            .find(|t| t.external_id == "acme/widgets#1")
            .unwrap();
        assert_eq!(closed.state, ItemState::Closed);
        assert!(closed.closed_at.is_some());

        let entry = epic.journey.last().unwrap();
        assert_eq!(entry.event, "tracking_update");
        assert_eq!(entry.agent.as_deref(), Some("reconcile"));
    }

    #[tokio::test]
    async fn test_reopens_returning_items() {
        let mut cache = tracking_cache();
        let settings = TrackingSettings::default();
        let remote = StubProject::with_open(&[1]);
        reconcile_tracking_epic(&mut cache, 1, &remote, &settings).await.unwrap();

        remote.set_open(&[]);
        reconcile_tracking_epic(&mut cache, 1, &remote, &settings).await.unwrap();
        assert!(open_ids(&cache).is_empty());

        remote.set_open(&[1]);
        let stats = reconcile_tracking_epic(&mut cache, 1, &remote, &settings).await.unwrap();
        assert_eq!(stats.reopened, 1);
        assert_eq!(cache.epic(1).unwrap().tracked_items.len(), 1);
        assert_eq!(open_ids(&cache), vec!["acme/widgets#1"]);
    }

    #[tokio::test]
    async fn test_returning_item_gets_fresh_tracking_record() {
        let mut cache = tracking_cache();
        let settings = TrackingSettings {
            mirror_as_issues: true,
            ..TrackingSettings::default()
        };
        let remote = StubProject::with_open(&[1]);
        reconcile_tracking_epic(&mut cache, 1, &remote, &settings).await.unwrap();
        assert_eq!(cache.epic(1).unwrap().tracked_items[0].tracking_number, Some(500));

        remote.set_open(&[]);
        reconcile_tracking_epic(&mut cache, 1, &remote, &settings).await.unwrap();
        assert_eq!(*remote.closed.lock().unwrap(), vec![500]);

        remote.set_open(&[1]);
        let stats = reconcile_tracking_epic(&mut cache, 1, &remote, &settings).await.unwrap();
        assert_eq!(stats.reopened, 1);
        assert_eq!(remote.created.lock().unwrap().len(), 2);
        let item = &cache.epic(1).unwrap().tracked_items[0];
        assert_eq!(item.state, ItemState::Open);
        assert_eq!(item.tracking_number, Some(501));
    }

    #[tokio::test]
    async fn test_title_change_alone_is_persisted() {
        let mut cache = tracking_cache();
        let settings = TrackingSettings::default();
        let remote = StubProject::with_open(&[1, 2]);
        reconcile_tracking_epic(&mut cache, 1, &remote, &settings).await.unwrap();
        cache.epic_mut(1).unwrap().dirty = false;

        *remote.title_prefix.lock().unwrap() = Some("Renamed".to_string());
        remote.set_open(&[1, 2]);
        let stats = reconcile_tracking_epic(&mut cache, 1, &remote, &settings).await.unwrap();
        assert_eq!(stats.retitled, 2);
        assert_eq!(stats.unchanged, 0);
        assert!(stats.changed());

        let epic = cache.epic(1).unwrap();
        assert!(epic.dirty);
        assert_eq!(epic.tracked_items[0].title, "Renamed 1");
        assert_eq!(epic.journey.last().unwrap().event, "tracking_update");
    }

    #[tokio::test]
    async fn test_truncated_listing_changes_nothing() {
        let mut cache = tracking_cache();
        let settings = TrackingSettings::default();
        let remote = StubProject::with_open(&[1, 2]);
        reconcile_tracking_epic(&mut cache, 1, &remote, &settings).await.unwrap();
        cache.epic_mut(1).unwrap().dirty = false;

        *remote.list_error.lock().unwrap() = Some(RemoteError::Truncated { pages: 50 });
        let err = reconcile_tracking_epic(&mut cache, 1, &remote, &settings)
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        assert_eq!(open_ids(&cache).len(), 2);
        assert!(!cache.epic(1).unwrap().dirty);
    }

    #[tokio::test]
    async fn test_no_change_leaves_epic_untouched() {
        let mut cache = tracking_cache();
        let settings = TrackingSettings::default();
        let remote = StubProject::with_open(&[1]);
        reconcile_tracking_epic(&mut cache, 1, &remote, &settings).await.unwrap();
        cache.epic_mut(1).unwrap().dirty = false;
        let journey_len = cache.epic(1).unwrap().journey.len();

        let stats = reconcile_tracking_epic(&mut cache, 1, &remote, &settings).await.unwrap();
        assert!(!stats.changed());
        assert_eq!(stats.unchanged, 1);
        assert!(!cache.epic(1).unwrap().dirty);
        assert_eq!(cache.epic(1).unwrap().journey.len(), journey_len);
    }

    #[tokio::test]
    async fn test_mirror_as_issues_creates_and_closes_records() {
        let mut cache = tracking_cache();
        let settings = TrackingSettings {
            mirror_as_issues: true,
            ..TrackingSettings::default()
        };
        let remote = StubProject::with_open(&[10, 11]);
        reconcile_tracking_epic(&mut cache, 1, &remote, &settings).await.unwrap();
        assert_eq!(remote.created.lock().unwrap().len(), 2);
        assert_eq!(
            cache.epic(1).unwrap().tracked_items[0].tracking_number,
            Some(500)
        );

        remote.set_open(&[11]);
        reconcile_tracking_epic(&mut cache, 1, &remote, &settings).await.unwrap();
        assert_eq!(*remote.closed.lock().unwrap(), vec![500]);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_progress_and_retry_does_not_duplicate() {
        let mut cache = tracking_cache();
        let settings = TrackingSettings {
            mirror_as_issues: true,
            ..TrackingSettings::default()
        };
        let remote = StubProject::with_open(&[1, 2, 3]);
        *remote.fail_create_after.lock().unwrap() = Some(1);

        let err = reconcile_tracking_epic(&mut cache, 1, &remote, &settings)
            .await
            .unwrap_err();
        assert!(err.is_transient());
        let epic = cache.epic(1).unwrap();
        assert_eq!(epic.tracked_items.len(), 1);
        assert!(epic.dirty);

        *remote.fail_create_after.lock().unwrap() = None;
        let stats = reconcile_tracking_epic(&mut cache, 1, &remote, &settings).await.unwrap();
        assert_eq!(stats.created, 2);
        assert_eq!(stats.unchanged, 1);
        assert_eq!(remote.created.lock().unwrap().len(), 3);
        assert_eq!(open_ids(&cache).len(), 3);
    }

    #[tokio::test]
    async fn test_listing_failure_changes_nothing() {
        let mut cache = tracking_cache();
        let remote = StubProject::with_open(&[1]);
        *remote.list_error.lock().unwrap() = Some(RemoteError::Timeout);

        let result =
            reconcile_tracking_epic(&mut cache, 1, &remote, &TrackingSettings::default()).await;
        assert!(matches!(result, Err(Error::Remote(RemoteError::Timeout))));
        assert!(!cache.epic(1).unwrap().dirty);
        assert!(cache.epic(1).unwrap().journey.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_self_tracked_epic() {
        let mut cache = Cache::new();
        cache.upsert_epic(Epic::new(2, "Own plan"));
        let remote = StubProject::with_open(&[]);
        let result =
            reconcile_tracking_epic(&mut cache, 2, &remote, &TrackingSettings::default()).await;
        assert!(matches!(result, Err(Error::Validation(_))));
        let missing =
            reconcile_tracking_epic(&mut cache, 3, &remote, &TrackingSettings::default()).await;
        assert!(matches!(missing, Err(Error::EpicNotFound { number: 3 })));
    }

    #[tokio::test]
    async fn test_reconcile_all_continues_past_failures() {
        let mut cache = tracking_cache();
        cache.upsert_epic(Epic::new(2, "Broken").tracking("not-a-slug"));
        cache.upsert_epic(Epic::new(3, "Self tracked"));
        let remote = StubProject::with_open(&[5]);

        let results = reconcile_all(&mut cache, &remote, &TrackingSettings::default()).await;
        assert_eq!(results.len(), 2);
        assert!(results[0].1.is_ok());
        assert!(matches!(results[1].1, Err(Error::Validation(_))));
        assert_eq!(open_ids(&cache), vec!["acme/widgets#5"]);
    }
}
