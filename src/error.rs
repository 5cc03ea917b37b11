//! Error types for epictrack.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (3=not_found, 4=validation, 6=remote, etc.)
//! - Retryability flags so callers can tell "deferred" from "needs attention"
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use crate::remote::RemoteError;
use thiserror::Error;

/// Result type alias for epictrack operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Agents match on the string; shell scripts on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Not Found (exit 3)
    EpicNotFound,
    IssueNotFound,

    // Validation (exit 4)
    InvalidArgument,
    RequiredField,

    // Remote (exit 6)
    RemoteTransient,
    RemoteFatal,

    // Config (exit 7)
    ConfigError,
    RepoNotDetected,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::EpicNotFound => "EPIC_NOT_FOUND",
            Self::IssueNotFound => "ISSUE_NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::RequiredField => "REQUIRED_FIELD",
            Self::RemoteTransient => "REMOTE_TRANSIENT",
            Self::RemoteFatal => "REMOTE_FATAL",
            Self::ConfigError => "CONFIG_ERROR",
            Self::RepoNotDetected => "REPO_NOT_DETECTED",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::EpicNotFound | Self::IssueNotFound => 3,
            Self::InvalidArgument | Self::RequiredField => 4,
            Self::RemoteTransient | Self::RemoteFatal => 6,
            Self::ConfigError | Self::RepoNotDetected => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether retrying the same operation later can succeed.
    ///
    /// True only for transient remote failures (rate limits, timeouts,
    /// network errors). Everything else needs a change of input or state.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteTransient)
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in epictrack operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Epic not found: #{number}")]
    EpicNotFound { number: u64 },

    #[error("Issue not found in cache: #{number}")]
    IssueNotFound { number: u64 },

    #[error("Invalid argument: {0}")]
    Validation(String),

    #[error("Required field missing or empty: {field}")]
    RequiredField { field: &'static str },

    #[error("Remote tracker error: {0}")]
    Remote(#[from] RemoteError),

    #[error("{operation} failed for {count} epic(s)")]
    BatchFailed { operation: &'static str, count: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Could not determine repository identity")]
    RepoNotDetected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::EpicNotFound { .. } => ErrorCode::EpicNotFound,
            Self::IssueNotFound { .. } => ErrorCode::IssueNotFound,
            Self::Validation(_) => ErrorCode::InvalidArgument,
            Self::RequiredField { .. } => ErrorCode::RequiredField,
            Self::Remote(e) => {
                if e.is_transient() {
                    ErrorCode::RemoteTransient
                } else {
                    ErrorCode::RemoteFatal
                }
            }
            Self::BatchFailed { .. } => ErrorCode::RemoteFatal,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::RepoNotDetected => ErrorCode::RepoNotDetected,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Whether this is a transient remote failure (sync deferred, will retry).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.error_code().is_retryable()
    }

    /// Context-aware recovery hint for agents and humans.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::EpicNotFound { number } => Some(format!(
                "Epic #{number} is not in the local cache. \
                 Use `epictrack status` to list cached epics or `epictrack epic register` to add it."
            )),

            Self::IssueNotFound { number } => Some(format!(
                "Issue #{number} is not linked to any cached epic. \
                 Link it with `epictrack epic link <epic> {number} <title>`."
            )),

            Self::Validation(msg) => {
                if msg.contains("status") {
                    Some(
                        "Valid statuses: planning, in-progress, review, done, blocked. \
                         Synonyms: wip→in-progress, complete→done, todo→planning"
                            .to_string(),
                    )
                } else if msg.contains("epic number") {
                    Some("Epic numbers are positive integers (the remote issue number).".to_string())
                } else {
                    None
                }
            }

            Self::RequiredField { field } => {
                Some(format!("Provide a non-empty value for `{field}`."))
            }

            Self::Remote(e) if e.is_transient() => Some(
                "The remote tracker is temporarily unavailable. \
                 Local changes are kept and will be pushed on the next `epictrack sync`."
                    .to_string(),
            ),
            Self::Remote(RemoteError::Unauthorized(_)) => Some(
                "Set GITHUB_TOKEN (or github.token in ~/.epictrack/config.json) \
                 to a token with issue write access."
                    .to_string(),
            ),
            Self::Remote(RemoteError::NotFound(_)) => Some(
                "The remote issue no longer exists. Check the epic number \
                 or re-register the epic against the correct repository."
                    .to_string(),
            ),

            Self::BatchFailed { .. } => Some(
                "Failed epics stay dirty. Fix the reported errors (token, missing issues), \
                 then re-run the command."
                    .to_string(),
            ),

            Self::RepoNotDetected => Some(
                "Run inside a git repository with an `origin` remote, \
                 or pass --repo owner/repo (or set EPICTRACK_REPO)."
                    .to_string(),
            ),

            Self::Remote(_) | Self::Config(_) | Self::Io(_) | Self::Json(_) | Self::Other(_) => {
                None
            }
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
