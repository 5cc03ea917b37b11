//! Remote issue tracker interface.
//!
//! The sync engine and the reconciliation pass talk to the tracker only
//! through [`RemoteTracker`]. Every failure is a [`RemoteError`], split
//! into transient (retry later, keep the dirty flag) and fatal (state
//! mismatch, surface to the caller) variants.
//!
//! - [`github`] - GitHub REST implementation over `reqwest`

pub mod github;

pub use github::GithubClient;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

/// Result type for remote tracker calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Failures reported by a remote tracker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("rate limited{}", retry_after.map(|s| format!(" (retry after {s}s)")).unwrap_or_default())]
    RateLimited { retry_after: Option<u64> },

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("open item listing exceeded {pages} pages; refusing a partial set")]
    Truncated { pages: u32 },
}

impl RemoteError {
    /// Transient failures leave local state untouched and are retried on
    /// the next pass; everything else needs attention.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Timeout | Self::Network(_) | Self::Server { .. }
        )
    }
}

/// Run a remote call with an upper bound; elapsed maps to [`RemoteError::Timeout`].
///
/// # Errors
///
/// Returns the call's own error, or `Timeout` when `limit` elapses first.
pub async fn bounded<T>(
    limit: std::time::Duration,
    call: impl Future<Output = RemoteResult<T>>,
) -> RemoteResult<T> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(RemoteError::Timeout))
}

/// Reference to an external project whose open items a tracking epic mirrors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalProjectRef {
    pub owner: String,
    pub repo: String,
}

impl ExternalProjectRef {
    /// Parse an `owner/repo` slug.
    ///
    /// # Errors
    ///
    /// Returns a message if the slug does not have exactly two non-empty parts.
    pub fn parse(slug: &str) -> std::result::Result<Self, String> {
        let trimmed = slug.trim().trim_end_matches(".git");
        let mut parts = trimmed.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => Ok(Self {
                owner: owner.to_string(),
                repo: repo.to_string(),
            }),
            _ => Err(format!("expected owner/repo, got '{slug}'")),
        }
    }

    /// Identifier prefix used for items from this project (`owner/repo#N`).
    #[must_use]
    pub fn item_id(&self, number: u64) -> String {
        format!("{self}#{number}")
    }
}

impl fmt::Display for ExternalProjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// One open work item reported by an external project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
    /// Stable identifier, unique across projects (`owner/repo#N`).
    pub id: String,
    pub number: u64,
    pub title: String,
    pub url: Option<String>,
}

/// Client for the remote issue tracker.
///
/// Implemented by [`GithubClient`] and by in-memory stubs in tests.
/// Methods return `impl Future` so implementors can use plain `async fn`.
pub trait RemoteTracker: Send + Sync {
    /// Create a record and return its number.
    fn create_record(
        &self,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> impl Future<Output = RemoteResult<u64>> + Send;

    /// Overwrite the body of an existing record.
    fn update_record_body(
        &self,
        number: u64,
        body: &str,
    ) -> impl Future<Output = RemoteResult<()>> + Send;

    /// Replace the full label set of an existing record.
    fn set_labels(
        &self,
        number: u64,
        labels: &[String],
    ) -> impl Future<Output = RemoteResult<()>> + Send;

    /// Post a comment on a record.
    fn add_comment(&self, number: u64, text: &str)
    -> impl Future<Output = RemoteResult<()>> + Send;

    /// Close a record. Closing an already-closed record succeeds.
    fn close_record(&self, number: u64) -> impl Future<Output = RemoteResult<()>> + Send;

    /// List every open item of an external project.
    fn list_open_items(
        &self,
        project: &ExternalProjectRef,
    ) -> impl Future<Output = RemoteResult<Vec<RemoteItem>>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(RemoteError::RateLimited { retry_after: None }.is_transient());
        assert!(RemoteError::Timeout.is_transient());
        assert!(RemoteError::Network("reset".into()).is_transient());
        assert!(
            RemoteError::Server {
                status: 502,
                message: "bad gateway".into()
            }
            .is_transient()
        );
        assert!(!RemoteError::NotFound("x".into()).is_transient());
        assert!(!RemoteError::Unauthorized("x".into()).is_transient());
        assert!(
            !RemoteError::Rejected {
                status: 422,
                message: "x".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn test_rate_limited_message() {
        let err = RemoteError::RateLimited { retry_after: Some(30) };
        assert_eq!(err.to_string(), "rate limited (retry after 30s)");
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let slow = async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok::<_, RemoteError>(1)
        };
        let result = bounded(std::time::Duration::from_secs(1), slow).await;
        assert_eq!(result, Err(RemoteError::Timeout));

        let fast = bounded(std::time::Duration::from_secs(1), async { Ok(2) }).await;
        assert_eq!(fast, Ok(2));
    }

    #[test]
    fn test_external_project_ref_parse() {
        let project = ExternalProjectRef::parse("acme/widgets").unwrap();
        assert_eq!(project.owner, "acme");
        assert_eq!(project.repo, "widgets");
        assert_eq!(project.item_id(7), "acme/widgets#7");
        assert_eq!(project.to_string(), "acme/widgets");

        assert!(ExternalProjectRef::parse("acme").is_err());
        assert!(ExternalProjectRef::parse("acme/").is_err());
        assert!(ExternalProjectRef::parse("a/b/c").is_err());
    }
}
