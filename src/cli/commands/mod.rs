//! Command implementations.

pub mod completions;
pub mod detect;
pub mod epic;
pub mod journey;
pub mod reconcile;
pub mod status;
pub mod sync;
pub mod version;

use std::path::{Path, PathBuf};

use crate::cli::Cli;
use crate::config::{
    RepoIdentity, Settings, default_actor, git_toplevel, load_settings, resolve_base_dir,
    resolve_repo_identity,
};
use crate::error::{Error, Result};
use crate::model::{Cache, MarkdownPlanReader};
use crate::remote::GithubClient;
use crate::storage::CacheStore;

/// Resolved environment shared by cache-touching commands.
pub struct Workspace {
    pub repo: RepoIdentity,
    pub store: CacheStore,
    pub settings: Settings,
    pub project_root: Option<PathBuf>,
    pub actor: String,
}

impl Workspace {
    /// Resolve base directory, repository, settings and actor from flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory, the repository identity, or
    /// the settings cannot be resolved.
    pub fn open(cli: &Cli) -> Result<Self> {
        let base_dir = resolve_base_dir(cli.cache_dir.as_deref())
            .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;
        let repo = resolve_repo_identity(cli.repo.as_deref())?;
        let project_root = git_toplevel();
        let settings = load_settings(Some(&base_dir), project_root.as_deref())?;
        let actor = cli.actor.clone().unwrap_or_else(default_actor);

        tracing::debug!(
            base = %base_dir.display(),
            repo = %repo,
            "Resolved workspace"
        );

        Ok(Self {
            repo,
            store: CacheStore::in_base_dir(&base_dir),
            settings,
            project_root,
            actor,
        })
    }

    #[must_use]
    pub fn identity(&self) -> String {
        self.repo.slug()
    }

    #[must_use]
    pub fn load(&self) -> Cache {
        self.store.load(&self.identity())
    }

    /// # Errors
    ///
    /// Returns an error if the cache cannot be written.
    pub fn save(&self, cache: &Cache) -> Result<()> {
        self.store.save(&self.identity(), cache)
    }

    /// Repository root, falling back to the current directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.project_root.as_deref().unwrap_or_else(|| Path::new("."))
    }

    #[must_use]
    pub fn plan_reader(&self) -> MarkdownPlanReader {
        MarkdownPlanReader::new(self.root())
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn remote(&self) -> Result<GithubClient> {
        GithubClient::new(self.repo.clone(), &self.settings)
    }
}

/// Create the runtime remote-calling commands block on.
///
/// # Errors
///
/// Returns an error if the runtime cannot be created.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))
}

/// Print a value as a single JSON line.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
