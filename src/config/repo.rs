//! Repository identity detection.
//!
//! The identity (`owner/repo`) addresses the local cache and scopes the
//! remote client. It comes from `--repo`/`EPICTRACK_REPO` or from the
//! `origin` remote of the current git checkout.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{Error, Result};

/// Owner and name of a tracked repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoIdentity {
    pub owner: String,
    pub repo: String,
}

impl RepoIdentity {
    /// Parse an explicit `owner/repo` slug.
    #[must_use]
    pub fn parse(slug: &str) -> Option<Self> {
        let slug = slug.trim().trim_end_matches('/').trim_end_matches(".git");
        let (owner, repo) = slug.split_once('/')?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    /// The `owner/repo` slug.
    #[must_use]
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Stable short hash of the slug, used to name the cache file.
    #[must_use]
    pub fn cache_key(&self) -> String {
        identity_hash(&self.slug())
    }
}

impl fmt::Display for RepoIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// First 16 hex chars of SHA-256 over the lowercased identity.
#[must_use]
pub fn identity_hash(identity: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identity.trim().to_lowercase().as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..16].to_string()
}

/// Parse a git remote URL into a repository identity.
///
/// Accepts `https://host/owner/repo(.git)`, `git@host:owner/repo(.git)`
/// and `ssh://git@host/owner/repo(.git)`.
#[must_use]
pub fn parse_remote_url(url: &str) -> Option<RepoIdentity> {
    let url = url.trim();

    let path = if let Some(rest) = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .or_else(|| url.strip_prefix("ssh://"))
        .or_else(|| url.strip_prefix("git://"))
    {
        // Drop host (and any user@ prefix / port)
        rest.split_once('/')?.1
    } else if let Some((_, rest)) = url.split_once(':') {
        // scp-like: git@github.com:owner/repo.git
        if !url[..url.find(':')?].contains('@') {
            return None;
        }
        rest
    } else {
        return None;
    };

    RepoIdentity::parse(path)
}

/// Detect the identity from the `origin` remote of the current checkout.
#[must_use]
pub fn detect_repo_identity() -> Option<RepoIdentity> {
    std::process::Command::new("git")
        .args(["remote", "get-url", "origin"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| parse_remote_url(&String::from_utf8_lossy(&o.stdout)))
}

/// Resolve the identity for a command.
///
/// Priority:
/// 1. Explicit `--repo` flag
/// 2. `EPICTRACK_REPO` environment variable
/// 3. `origin` remote of the current git checkout
///
/// # Errors
///
/// Returns `Validation` for a malformed explicit slug and `RepoNotDetected`
/// when nothing resolves.
pub fn resolve_repo_identity(explicit: Option<&str>) -> Result<RepoIdentity> {
    if let Some(slug) = explicit {
        return RepoIdentity::parse(slug)
            .ok_or_else(|| Error::Validation(format!("expected owner/repo, got '{slug}'")));
    }

    if let Ok(slug) = std::env::var("EPICTRACK_REPO") {
        if !slug.trim().is_empty() {
            return RepoIdentity::parse(&slug)
                .ok_or_else(|| Error::Validation(format!("EPICTRACK_REPO is not owner/repo: '{slug}'")));
        }
    }

    detect_repo_identity().ok_or(Error::RepoNotDetected)
}
