//! epictrack - local epic tracking cache with dirty-flag sync
//!
//! Keeps a per-repository cache of epics, their journey logs and task
//! sub-issues, and pushes changes to a remote issue tracker on demand.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Data types (Epic, JourneyEntry, SubIssue, TrackedItem, Cache)
//! - [`storage`] - Per-identity JSON cache files
//! - [`tracking`] - Journey logging, skill and commit detectors, reconciliation
//! - [`sync`] - Rendering and the dirty-flag sync engine
//! - [`remote`] - Remote tracker trait and the GitHub client
//! - [`config`] - Settings and repository identity
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod tracking;
pub mod validate;

pub use error::{Error, Result};
