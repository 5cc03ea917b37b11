//! Data models for epictrack.
//!
//! This module contains all domain models:
//! - Epic, JourneyEntry, SubIssue, TrackedItem
//! - Cache (per-repository aggregate), CachedIssue, ProjectBoard
//! - Status label namespace helpers
//! - Plan documents

pub mod cache;
pub mod epic;
pub mod labels;
pub mod plan;

pub use cache::{Cache, CachedIssue, ProjectBoard};
pub use epic::{Epic, ItemState, JourneyEntry, MirrorMode, SubIssue, TrackedItem};
pub use labels::{EpicStatus, STATUS_NAMESPACE, replace_in_namespace};
pub use plan::{MarkdownPlanReader, ParsedPlan, PlanSource};
