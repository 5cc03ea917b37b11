//! GitHub REST implementation of [`RemoteTracker`].
//!
//! Records are issues in the tracked repository; external projects are
//! other repositories whose open issues are mirrored into tracking epics.

use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, RETRY_AFTER, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use super::{ExternalProjectRef, RemoteError, RemoteItem, RemoteResult, RemoteTracker};
use crate::config::{RepoIdentity, Settings};

const PAGE_SIZE: usize = 100;
const MAX_PAGES: u32 = 50;

/// GitHub issues client scoped to one repository.
pub struct GithubClient {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
    repo: RepoIdentity,
}

impl GithubClient {
    /// Create a client for `repo` using the API URL, token, and timeout from settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(repo: RepoIdentity, settings: &Settings) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.tracking.request_timeout_secs))
            .build()
            .map_err(|e| crate::Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: settings.github.api_url.trim_end_matches('/').to_string(),
            token: settings.github.token.clone(),
            repo,
        })
    }

    fn issues_url(&self) -> String {
        format!("{}/repos/{}/{}/issues", self.api_url, self.repo.owner, self.repo.repo)
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, concat!("epictrack/", env!("CARGO_PKG_VERSION")));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> RemoteResult<reqwest::Response> {
        let response = builder.send().await.map_err(map_transport_error)?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        Err(classify_response(status, &headers, &body))
    }

    async fn patch_issue(&self, number: u64, patch: &IssuePatch<'_>) -> RemoteResult<()> {
        let url = format!("{}/{number}", self.issues_url());
        self.send(self.request(Method::PATCH, &url).json(patch)).await?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct CreateIssueRequest<'a> {
    title: &'a str,
    body: &'a str,
    labels: &'a [String],
}

#[derive(Debug, Default, Serialize)]
struct IssuePatch<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    labels: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct CommentRequest<'a> {
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct IssueResponse {
    number: u64,
    title: String,
    html_url: Option<String>,
    /// Present only on pull requests, which the issues API also returns.
    pull_request: Option<serde_json::Value>,
}

impl RemoteTracker for GithubClient {
    async fn create_record(&self, title: &str, body: &str, labels: &[String]) -> RemoteResult<u64> {
        let request = CreateIssueRequest { title, body, labels };
        let response = self
            .send(self.request(Method::POST, &self.issues_url()).json(&request))
            .await?;
        let issue: IssueResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(format!("create issue response: {e}")))?;
        Ok(issue.number)
    }

    async fn update_record_body(&self, number: u64, body: &str) -> RemoteResult<()> {
        self.patch_issue(
            number,
            &IssuePatch {
                body: Some(body),
                ..IssuePatch::default()
            },
        )
        .await
    }

    async fn set_labels(&self, number: u64, labels: &[String]) -> RemoteResult<()> {
        self.patch_issue(
            number,
            &IssuePatch {
                labels: Some(labels),
                ..IssuePatch::default()
            },
        )
        .await
    }

    async fn add_comment(&self, number: u64, text: &str) -> RemoteResult<()> {
        let url = format!("{}/{number}/comments", self.issues_url());
        self.send(self.request(Method::POST, &url).json(&CommentRequest { body: text }))
            .await?;
        Ok(())
    }

    async fn close_record(&self, number: u64) -> RemoteResult<()> {
        self.patch_issue(
            number,
            &IssuePatch {
                state: Some("closed"),
                ..IssuePatch::default()
            },
        )
        .await
    }

    async fn list_open_items(&self, project: &ExternalProjectRef) -> RemoteResult<Vec<RemoteItem>> {
        let url = format!("{}/repos/{}/{}/issues", self.api_url, project.owner, project.repo);
        let mut items = Vec::new();

        for page in 1..=MAX_PAGES {
            let builder = self.request(Method::GET, &url).query(&[
                ("state", "open".to_string()),
                ("per_page", PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ]);
            let response = self.send(builder).await?;
            let batch: Vec<IssueResponse> = response
                .json()
                .await
                .map_err(|e| RemoteError::Decode(format!("issue list page {page}: {e}")))?;

            let fetched = batch.len();
            items.extend(
                batch
                    .into_iter()
                    .filter(|issue| issue.pull_request.is_none())
                    .map(|issue| RemoteItem {
                        id: project.item_id(issue.number),
                        number: issue.number,
                        title: issue.title,
                        url: issue.html_url,
                    }),
            );

            if !more_pages(page, fetched)? {
                return Ok(items);
            }
        }
        Err(RemoteError::Truncated { pages: MAX_PAGES })
    }
}

/// Whether another page follows one that returned `fetched` issues.
///
/// A full page at the cap is an error, never a partial open set.
fn more_pages(page: u32, fetched: usize) -> RemoteResult<bool> {
    if fetched < PAGE_SIZE {
        Ok(false)
    } else if page >= MAX_PAGES {
        tracing::warn!(pages = MAX_PAGES, "Open item listing hit the page limit");
        Err(RemoteError::Truncated { pages: MAX_PAGES })
    } else {
        Ok(true)
    }
}

fn map_transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else if err.is_connect() || err.is_request() {
        RemoteError::Network(err.to_string())
    } else if err.is_decode() || err.is_body() {
        RemoteError::Decode(err.to_string())
    } else {
        RemoteError::Network(err.to_string())
    }
}

/// Map a non-success HTTP response to a [`RemoteError`].
///
/// GitHub signals primary rate limits with 403 + `x-ratelimit-remaining: 0`
/// and secondary limits with 403/429 and a "rate limit" message, so both
/// are checked before treating 403 as an authorization failure.
#[must_use]
pub fn classify_response(status: StatusCode, headers: &HeaderMap, body: &str) -> RemoteError {
    let message = error_message(body);
    let retry_after = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let quota_exhausted = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0");

    match status.as_u16() {
        429 => RemoteError::RateLimited { retry_after },
        403 if quota_exhausted || message.to_lowercase().contains("rate limit") => {
            RemoteError::RateLimited { retry_after }
        }
        401 | 403 => RemoteError::Unauthorized(message),
        404 | 410 => RemoteError::NotFound(message),
        408 => RemoteError::Timeout,
        code if status.is_server_error() => RemoteError::Server {
            status: code,
            message,
        },
        code => RemoteError::Rejected {
            status: code,
            message,
        },
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}
