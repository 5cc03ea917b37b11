//! Dirty-flag sync engine.
//!
//! An epic moves `clean -> dirty` when a trigger changes it, and back to
//! `clean` only after every remote write for it succeeded and the cache
//! was saved. Transient failures leave it dirty; fatal ones are returned.

use chrono::Utc;
use std::time::Duration;

use super::render::{render_epic_body, render_progress_comment};
use super::types::{DeferredSync, FailedSync, SyncOutcome, SyncReport};
use crate::config::TrackingSettings;
use crate::error::{Error, ErrorCode, Result};
use crate::model::{Cache, JourneyEntry, PlanSource};
use crate::remote::{RemoteResult, RemoteTracker, bounded};
use crate::storage::CacheStore;

/// Everything a push needs, captured from the epic before any remote call.
struct PushPlan {
    body: String,
    labels: Vec<String>,
    close: bool,
    comment: Option<String>,
}

/// Pushes dirty epics to a remote tracker and persists the result.
pub struct SyncEngine<R, P> {
    remote: R,
    plans: P,
    settings: TrackingSettings,
    store: CacheStore,
    identity: String,
}

impl<R: RemoteTracker, P: PlanSource> SyncEngine<R, P> {
    pub fn new(
        remote: R,
        plans: P,
        settings: TrackingSettings,
        store: CacheStore,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            remote,
            plans,
            settings,
            store,
            identity: identity.into(),
        }
    }

    #[must_use]
    pub const fn remote(&self) -> &R {
        &self.remote
    }

    fn limit(&self) -> Duration {
        Duration::from_secs(self.settings.request_timeout_secs)
    }

    fn prepare(&self, cache: &Cache, number: u64) -> Result<PushPlan> {
        let epic = cache.epic(number).ok_or(Error::EpicNotFound { number })?;

        let plan = epic.plan_file.as_deref().and_then(|path| {
            self.plans
                .parse_plan(path)
                .map_err(|e| tracing::debug!(epic = number, plan = path, error = %e, "Plan unavailable"))
                .ok()
        });

        let comment = if self.settings.comment_on_progress {
            let fresh: Vec<JourneyEntry> = epic.unreported_entries().into_iter().cloned().collect();
            (!fresh.is_empty()).then(|| render_progress_comment(&fresh))
        } else {
            None
        };

        Ok(PushPlan {
            body: render_epic_body(epic, plan.as_ref()),
            labels: epic.labels.iter().cloned().collect(),
            close: !epic.is_open(),
            comment,
        })
    }

    async fn push(&self, number: u64, plan: &PushPlan) -> RemoteResult<()> {
        let limit = self.limit();
        bounded(limit, self.remote.update_record_body(number, &plan.body)).await?;
        bounded(limit, self.remote.set_labels(number, &plan.labels)).await?;
        if plan.close {
            bounded(limit, self.remote.close_record(number)).await?;
        }
        if let Some(comment) = &plan.comment {
            bounded(limit, self.remote.add_comment(number, comment)).await?;
        }
        Ok(())
    }

    /// Push one epic if it is dirty.
    ///
    /// # Errors
    ///
    /// Returns `EpicNotFound` for an unknown epic, `Remote` for a fatal
    /// remote failure (the epic stays dirty), and `Io`/`Json` when the
    /// cache cannot be saved after a successful push.
    pub async fn sync_epic(&self, cache: &mut Cache, number: u64) -> Result<SyncOutcome> {
        if !self.settings.auto_update_epics {
            tracing::debug!(epic = number, "Auto-update disabled; skipping sync");
            return Ok(SyncOutcome::Disabled);
        }
        let epic = cache.epic(number).ok_or(Error::EpicNotFound { number })?;
        if !epic.dirty {
            tracing::debug!(epic = number, "Epic already in sync");
            return Ok(SyncOutcome::AlreadyClean);
        }

        let plan = self.prepare(cache, number)?;
        match self.push(number, &plan).await {
            Ok(()) => {
                cache.require_epic_mut(number)?.mark_synced(Utc::now());
                self.store.save(&self.identity, cache)?;
                tracing::info!(epic = number, "Synced epic");
                Ok(SyncOutcome::Synced)
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(epic = number, error = %e, "Sync deferred; epic stays dirty");
                Ok(SyncOutcome::Deferred(e.to_string()))
            }
            Err(e) => Err(Error::Remote(e)),
        }
    }

    /// Push every dirty epic, continuing past individual failures.
    ///
    /// # Errors
    ///
    /// Only cache save failures are returned; remote failures are
    /// collected in the report.
    pub async fn sync_dirty(&self, cache: &mut Cache) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let dirty = cache.dirty_epic_numbers();

        if !self.settings.auto_update_epics {
            tracing::debug!(count = dirty.len(), "Auto-update disabled; skipping batch sync");
            report.disabled = true;
            report.skipped = dirty;
            return Ok(report);
        }

        for number in dirty {
            match self.sync_epic(cache, number).await {
                Ok(SyncOutcome::Synced) => report.synced.push(number),
                Ok(SyncOutcome::Deferred(reason)) => report.deferred.push(DeferredSync {
                    epic: number,
                    reason,
                }),
                Ok(SyncOutcome::AlreadyClean | SyncOutcome::Disabled) => report.skipped.push(number),
                Err(e) if matches!(e.error_code(), ErrorCode::IoError | ErrorCode::JsonError) => {
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!(epic = number, error = %e, "Sync failed; needs attention");
                    report.failed.push(FailedSync {
                        epic: number,
                        code: e.error_code().as_str().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            synced = report.synced.len(),
            deferred = report.deferred.len(),
            failed = report.failed.len(),
            "Batch sync finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemState, ParsedPlan};
    use crate::remote::{ExternalProjectRef, RemoteError, RemoteItem};
    use crate::tracking::{NewJourneyEntry, add_journey_entry};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Body(u64, String),
        Labels(u64, Vec<String>),
        Comment(u64, String),
        Close(u64),
    }

    #[derive(Default)]
    struct StubTracker {
        calls: Mutex<Vec<Call>>,
        failures: Mutex<HashMap<u64, RemoteError>>,
    }

    impl StubTracker {
        fn failing(number: u64, err: RemoteError) -> Self {
            let stub = Self::default();
            stub.failures.lock().unwrap().insert(number, err);
            stub
        }

        fn record(&self, number: u64, call: Call) -> RemoteResult<()> {
            if let Some(err) = self.failures.lock().unwrap().get(&number) {
                return Err(err.clone());
            }
            self.calls.lock().unwrap().push(call);
            Ok(())
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl RemoteTracker for StubTracker {
        async fn create_record(&self, _title: &str, _body: &str, _labels: &[String]) -> RemoteResult<u64> {
            Ok(1)
        }

        async fn update_record_body(&self, number: u64, body: &str) -> RemoteResult<()> {
            self.record(number, Call::Body(number, body.to_string()))
        }

        async fn set_labels(&self, number: u64, labels: &[String]) -> RemoteResult<()> {
            self.record(number, Call::Labels(number, labels.to_vec()))
        }

        async fn add_comment(&self, number: u64, text: &str) -> RemoteResult<()> {
            self.record(number, Call::Comment(number, text.to_string()))
        }

        async fn close_record(&self, number: u64) -> RemoteResult<()> {
            self.record(number, Call::Close(number))
        }

        async fn list_open_items(&self, _project: &ExternalProjectRef) -> RemoteResult<Vec<RemoteItem>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct StubPlans(HashMap<String, ParsedPlan>);

    impl PlanSource for StubPlans {
        fn parse_plan(&self, path: &str) -> Result<ParsedPlan> {
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| Error::Other(format!("no plan at {path}")))
        }
    }

    #[derive(Clone, Default)]
    struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

    impl CaptureWriter {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
        }
    }

    impl std::io::Write for CaptureWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CaptureWriter {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    const IDENTITY: &str = "acme/widgets";

    fn engine(
        dir: &TempDir,
        remote: StubTracker,
        settings: TrackingSettings,
    ) -> SyncEngine<StubTracker, StubPlans> {
        SyncEngine::new(
            remote,
            StubPlans::default(),
            settings,
            CacheStore::new(dir.path()),
            IDENTITY,
        )
    }

    fn cache_with_dirty_epic(number: u64) -> Cache {
        let mut cache = Cache::new();
        cache.upsert_epic(crate::model::Epic::new(number, "Search"));
        add_journey_entry(&mut cache, number, NewJourneyEntry::new("task_complete", "Task 1 done"))
            .unwrap();
        cache.mark_dirty(number).unwrap();
        cache
    }

    #[tokio::test]
    async fn test_journey_then_sync_clears_dirty() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, StubTracker::default(), TrackingSettings::default());
        let mut cache = cache_with_dirty_epic(5);
        let before = cache.epic(5).unwrap().updated_at;

        let outcome = engine.sync_epic(&mut cache, 5).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Synced);

        let epic = cache.epic(5).unwrap();
        assert_eq!(epic.journey.len(), 1);
        assert!(!epic.dirty);
        assert!(epic.updated_at >= before);
        assert!(epic.synced_at.is_some());

        let calls = engine.remote().calls();
        assert!(matches!(&calls[0], Call::Body(5, body) if body.contains("Task 1 done")));
        assert!(matches!(&calls[1], Call::Labels(5, _)));
        assert_eq!(calls.len(), 2);

        let saved = CacheStore::new(dir.path()).load(IDENTITY);
        assert!(!saved.epic(5).unwrap().dirty);
    }

    #[tokio::test]
    async fn test_second_sync_makes_no_remote_call() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, StubTracker::default(), TrackingSettings::default());
        let mut cache = cache_with_dirty_epic(5);

        engine.sync_epic(&mut cache, 5).await.unwrap();
        let calls_after_first = engine.remote().calls().len();
        let snapshot = cache.epic(5).unwrap().clone();

        let outcome = engine.sync_epic(&mut cache, 5).await.unwrap();
        assert_eq!(outcome, SyncOutcome::AlreadyClean);
        assert_eq!(engine.remote().calls().len(), calls_after_first);
        assert_eq!(cache.epic(5).unwrap(), &snapshot);
    }

    #[tokio::test]
    async fn test_rate_limit_keeps_dirty_and_warns() {
        let writer = CaptureWriter::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(writer.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let dir = TempDir::new().unwrap();
        let remote = StubTracker::failing(5, RemoteError::RateLimited { retry_after: Some(60) });
        let engine = engine(&dir, remote, TrackingSettings::default());
        let mut cache = cache_with_dirty_epic(5);

        let report = engine.sync_dirty(&mut cache).await.unwrap();
        assert_eq!(report.deferred.len(), 1);
        assert!(report.synced.is_empty());
        assert!(report.failed.is_empty());
        assert!(cache.epic(5).unwrap().dirty);
        assert!(cache.epic(5).unwrap().synced_at.is_none());

        let logs = writer.contents();
        assert!(logs.contains("WARN"));
        assert!(logs.contains("Sync deferred"));
        assert!(!CacheStore::new(dir.path()).path_for(IDENTITY).exists());
    }

    #[tokio::test]
    async fn test_fatal_error_propagates_from_single_sync() {
        let dir = TempDir::new().unwrap();
        let remote = StubTracker::failing(5, RemoteError::NotFound("issue 5".into()));
        let engine = engine(&dir, remote, TrackingSettings::default());
        let mut cache = cache_with_dirty_epic(5);

        let err = engine.sync_epic(&mut cache, 5).await.unwrap_err();
        assert!(matches!(err, Error::Remote(RemoteError::NotFound(_))));
        assert!(!err.is_transient());
        assert!(cache.epic(5).unwrap().dirty);
    }

    #[tokio::test]
    async fn test_batch_continues_past_failures() {
        let dir = TempDir::new().unwrap();
        let remote = StubTracker::failing(2, RemoteError::Unauthorized("bad token".into()));
        remote
            .failures
            .lock()
            .unwrap()
            .insert(3, RemoteError::Timeout);
        let engine = engine(&dir, remote, TrackingSettings::default());

        let mut cache = Cache::new();
        for n in 1..=4 {
            cache.upsert_epic(crate::model::Epic::new(n, &format!("Epic {n}")));
            add_journey_entry(&mut cache, n, NewJourneyEntry::new("note", "changed")).unwrap();
        }
        for n in [1, 2, 3] {
            cache.mark_dirty(n).unwrap();
        }

        let report = engine.sync_dirty(&mut cache).await.unwrap();
        assert_eq!(report.synced, vec![1]);
        assert_eq!(report.deferred.len(), 1);
        assert_eq!(report.deferred[0].epic, 3);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].epic, 2);
        assert_eq!(report.failed[0].code, "REMOTE_FATAL");
        assert_eq!(cache.dirty_epic_numbers(), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_disabled_is_noop() {
        let dir = TempDir::new().unwrap();
        let settings = TrackingSettings {
            auto_update_epics: false,
            ..TrackingSettings::default()
        };
        let engine = engine(&dir, StubTracker::default(), settings);
        let mut cache = cache_with_dirty_epic(5);

        assert_eq!(engine.sync_epic(&mut cache, 5).await.unwrap(), SyncOutcome::Disabled);
        assert_eq!(engine.sync_epic(&mut cache, 99).await.unwrap(), SyncOutcome::Disabled);
        let report = engine.sync_dirty(&mut cache).await.unwrap();
        assert!(report.disabled);
        assert_eq!(report.skipped, vec![5]);
        assert!(engine.remote().calls().is_empty());
        assert!(cache.epic(5).unwrap().dirty);
    }

    #[tokio::test]
    async fn test_unknown_epic_is_not_found() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, StubTracker::default(), TrackingSettings::default());
        let mut cache = Cache::new();
        assert!(matches!(
            engine.sync_epic(&mut cache, 8).await,
            Err(Error::EpicNotFound { number: 8 })
        ));
    }

    #[tokio::test]
    async fn test_closed_epic_with_progress_comment() {
        let dir = TempDir::new().unwrap();
        let settings = TrackingSettings {
            comment_on_progress: true,
            ..TrackingSettings::default()
        };
        let mut plans = StubPlans::default();
        plans.0.insert(
            "docs/plan.md".into(),
            ParsedPlan {
                goal: Some("Ship search".into()),
                tasks: vec!["Index".into()],
                ..ParsedPlan::default()
            },
        );
        let engine = SyncEngine::new(
            StubTracker::default(),
            plans,
            settings,
            CacheStore::new(dir.path()),
            IDENTITY,
        );

        let mut cache = Cache::new();
        cache.upsert_epic(crate::model::Epic::new(6, "Search").with_plan("docs/plan.md"));
        add_journey_entry(&mut cache, 6, NewJourneyEntry::new("task_complete", "Index built")).unwrap();
        cache.close_epic(6).unwrap();
        assert_eq!(cache.epic(6).unwrap().state, ItemState::Closed);

        engine.sync_epic(&mut cache, 6).await.unwrap();
        let calls = engine.remote().calls();
        assert_eq!(calls.len(), 4);
        assert!(matches!(&calls[0], Call::Body(6, body) if body.contains("Ship search") && body.contains("- [ ] Index")));
        assert_eq!(calls[2], Call::Close(6));
        assert!(matches!(&calls[3], Call::Comment(6, text) if text.contains("Index built")));

        let mut follow_up = NewJourneyEntry::new("note", "Follow-up");
        follow_up.timestamp = Some(Utc::now() + chrono::Duration::seconds(1));
        add_journey_entry(&mut cache, 6, follow_up).unwrap();
        cache.mark_dirty(6).unwrap();
        engine.sync_epic(&mut cache, 6).await.unwrap();
        let calls = engine.remote().calls();
        assert!(matches!(calls.last(), Some(Call::Comment(6, text)) if text.contains("Follow-up") && !text.contains("Index built")));
    }

    #[tokio::test]
    async fn test_commit_completion_recorded_after_sync_is_commented() {
        use crate::model::SubIssue;
        use crate::tracking::{CommitInfo, CompletedTask, record_commit_completions};

        let dir = TempDir::new().unwrap();
        let settings = TrackingSettings {
            comment_on_progress: true,
            ..TrackingSettings::default()
        };
        let engine = engine(&dir, StubTracker::default(), settings);
        let mut cache = Cache::new();
        cache.upsert_epic(crate::model::Epic::new(5, "Search"));
        cache
            .link_sub_issue(
                5,
                SubIssue {
                    number: 21,
                    title: "Index".into(),
                    state: ItemState::Open,
                    task_index: None,
                },
            )
            .unwrap();
        engine.sync_epic(&mut cache, 5).await.unwrap();
        let first_pass = engine.remote().calls().len();

        let task = CompletedTask {
            issue_number: 21,
            keyword: "fixes".into(),
            commit: CommitInfo {
                sha: "abc1234def".into(),
                timestamp: Utc::now() - chrono::Duration::minutes(10),
                author: "dev".into(),
                message: "Build index, fixes #21".into(),
            },
        };
        record_commit_completions(&mut cache, &[task]).unwrap();
        assert!(cache.epic(5).unwrap().dirty);

        engine.sync_epic(&mut cache, 5).await.unwrap();
        let calls = engine.remote().calls();
        assert!(matches!(
            calls.last(),
            Some(Call::Comment(5, text)) if text.contains("Task #21 completed")
        ));
        assert!(calls.len() > first_pass + 2);
    }
}
