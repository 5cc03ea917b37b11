//! Trigger detectors and the journey primitive.
//!
//! Everything here mutates a loaded [`Cache`](crate::model::Cache) in
//! memory; callers persist it.
//!
//! - [`journey`] - validated, sanitized journey appends
//! - [`skill`] - workflow skill announcements in agent messages
//! - [`commit`] - closing keywords in commit messages
//! - [`reconcile`] - external-project mirror convergence

pub mod commit;
pub mod journey;
pub mod reconcile;
pub mod skill;

pub use commit::{
    CommitInfo, CompletedTask, CompletionReport, TaskReference, commits_since,
    detect_completed_tasks, detect_task_from_commit, record_commit_completions,
};
pub use journey::{NewJourneyEntry, add_journey_entry, sanitize};
pub use reconcile::{ReconcileStats, reconcile_all, reconcile_tracking_epic};
pub use skill::{SkillMatch, SkillPhase, SkillTrigger, apply_skill_invocation, detect_skill_invocation};
