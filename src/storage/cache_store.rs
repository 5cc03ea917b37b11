//! JSON cache store.
//!
//! One file per repository identity, named by a hash of the identity:
//! `<dir>/<hash>.json`. Loading never fails: a missing file yields an
//! empty cache. A corrupt file, or one that belongs to another identity,
//! is set aside and replaced by an empty cache, so the next save cannot
//! overwrite it. Saving must succeed or the caller's operation fails.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::file::atomic_write;
use crate::config::{RepoIdentity, identity_hash};
use crate::error::Result;
use crate::model::Cache;

const FORMAT_VERSION: u32 = 1;

/// On-disk envelope around a [`Cache`].
#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    identity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    saved_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    cache: Cache,
}

/// Loads and saves caches under one directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    /// Store caches directly in `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store caches in `<base>/cache/`.
    #[must_use]
    pub fn in_base_dir(base: &Path) -> Self {
        Self::new(base.join("cache"))
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the cache file for an identity.
    #[must_use]
    pub fn path_for(&self, identity: &str) -> PathBuf {
        self.dir.join(format!("{}.json", identity_hash(identity)))
    }

    /// Load the cache for an identity.
    ///
    /// Returns an empty cache when none exists or the file is unreadable.
    /// Corrupt files are renamed to `<hash>.json.corrupt`, files naming a
    /// different identity to `<hash>.json.foreign`. Both are logged.
    #[must_use]
    pub fn load(&self, identity: &str) -> Cache {
        let path = self.path_for(identity);
        if !path.exists() {
            return Cache::new();
        }

        let parsed = fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|content| {
                serde_json::from_str::<CacheFile>(&content).map_err(|e| e.to_string())
            });

        let file = match parsed {
            Ok(file) => file,
            Err(reason) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %reason,
                    "Cache file is corrupt; starting from an empty cache"
                );
                set_aside(&path, "corrupt");
                return Cache::new();
            }
        };

        if !file.identity.is_empty() && !file.identity.eq_ignore_ascii_case(identity.trim()) {
            tracing::warn!(
                path = %path.display(),
                expected = %identity,
                found = %file.identity,
                "Cache file belongs to a different repository; starting from an empty cache"
            );
            set_aside(&path, "foreign");
            return Cache::new();
        }

        let mut cache = file.cache;
        let dropped = cache.reindex();
        if dropped > 0 {
            tracing::warn!(
                path = %path.display(),
                dropped,
                "Collapsed duplicate records in cache file"
            );
        }
        cache
    }

    /// Persist the whole cache for an identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be serialized or written.
    pub fn save(&self, identity: &str, cache: &Cache) -> Result<()> {
        let path = self.path_for(identity);
        let file = CacheFileRef {
            version: FORMAT_VERSION,
            identity: identity.trim(),
            saved_at: Utc::now(),
            cache,
        };
        let json = serde_json::to_vec_pretty(&file)?;
        atomic_write(&path, &json)?;
        tracing::debug!(path = %path.display(), "Saved cache");
        Ok(())
    }

    /// Convenience wrapper for [`load`](Self::load) with a repository identity.
    #[must_use]
    pub fn load_repo(&self, repo: &RepoIdentity) -> Cache {
        self.load(&repo.slug())
    }

    /// Convenience wrapper for [`save`](Self::save) with a repository identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be serialized or written.
    pub fn save_repo(&self, repo: &RepoIdentity, cache: &Cache) -> Result<()> {
        self.save(&repo.slug(), cache)
    }
}

/// Borrowing twin of [`CacheFile`] for serialization.
#[derive(Serialize)]
struct CacheFileRef<'a> {
    version: u32,
    identity: &'a str,
    saved_at: DateTime<Utc>,
    #[serde(flatten)]
    cache: &'a Cache,
}

fn set_aside(path: &Path, suffix: &str) {
    let mut aside = path.as_os_str().to_os_string();
    aside.push(".");
    aside.push(suffix);
    if let Err(e) = fs::rename(path, &aside) {
        tracing::warn!(path = %path.display(), error = %e, "Could not set cache file aside");
    }
}
