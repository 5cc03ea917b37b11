//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// epictrack - Epic tracking cache and dirty-flag sync for remote issue trackers
#[derive(Parser, Debug)]
#[command(name = "epictrack", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Base directory for caches and config (default: ~/.epictrack)
    #[arg(long, global = true, env = "EPICTRACK_HOME")]
    pub cache_dir: Option<PathBuf>,

    /// Repository identity as owner/repo (default: detected from git origin)
    #[arg(long, global = true, env = "EPICTRACK_REPO")]
    pub repo: Option<String>,

    /// Actor name for journey attribution
    #[arg(long, global = true, env = "EPICTRACK_ACTOR")]
    pub actor: Option<String>,

    /// Output as JSON (for agent integration)
    #[arg(long, alias = "robot", global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print version information
    Version,

    /// Show cached epics and pending sync work
    Status,

    /// Epic management
    Epic {
        #[command(subcommand)]
        command: EpicCommands,
    },

    /// Journey log for an epic
    Journey {
        #[command(subcommand)]
        command: JourneyCommands,
    },

    /// Push dirty epics to the remote tracker
    Sync {
        /// Sync only this epic
        #[arg(long)]
        epic: Option<u64>,
    },

    /// Run trigger detectors against messages or commits
    Detect {
        #[command(subcommand)]
        command: DetectCommands,
    },

    /// Reconcile tracking epics with their external projects
    Reconcile {
        /// Reconcile only this epic
        #[arg(long)]
        epic: Option<u64>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Epic Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum EpicCommands {
    /// Register an existing remote issue as an epic
    Register(EpicRegisterArgs),

    /// Link a task issue to a self-tracked epic
    Link {
        /// Epic number
        epic: u64,

        /// Task issue number
        issue: u64,

        /// Task title
        title: String,

        /// Index of the plan task this issue implements (0-based)
        #[arg(long)]
        task_index: Option<usize>,
    },

    /// Set an epic's workflow status (planning, in-progress, review, done, blocked)
    Status {
        /// Epic number
        epic: u64,

        /// New status (synonyms like wip, complete are accepted)
        status: String,
    },

    /// Close an epic
    Close {
        /// Epic number
        epic: u64,
    },
}

#[derive(Args, Debug)]
pub struct EpicRegisterArgs {
    /// Remote issue number
    pub number: u64,

    /// Epic title
    pub title: String,

    /// Source plan file (relative to the repository root)
    #[arg(long)]
    pub plan: Option<String>,

    /// Mirror the open items of an external project (owner/repo)
    #[arg(long)]
    pub track: Option<String>,

    /// Labels to attach (repeatable)
    #[arg(long = "label", short = 'l')]
    pub labels: Vec<String>,
}

// ============================================================================
// Journey Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum JourneyCommands {
    /// Append an entry and mark the epic for sync
    Add(JourneyAddArgs),

    /// Show an epic's journey, newest first
    Show {
        /// Epic number
        epic: u64,

        /// Maximum entries to show
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },
}

#[derive(Args, Debug)]
pub struct JourneyAddArgs {
    /// Epic number
    pub epic: u64,

    /// Event category (task_complete, note, ...)
    #[arg(long, short = 'e')]
    pub event: String,

    /// Human-readable message
    #[arg(long, short = 'm')]
    pub message: String,

    /// Actor attribution (default: --actor)
    #[arg(long)]
    pub agent: Option<String>,

    /// Structured metadata as key=value (repeatable)
    #[arg(long = "meta")]
    pub meta: Vec<String>,
}

// ============================================================================
// Detect Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum DetectCommands {
    /// Detect a workflow skill announcement and apply it
    Skill {
        /// Message text, or `-` to read stdin
        message: String,

        /// Report the match without changing the cache
        #[arg(long)]
        dry_run: bool,
    },

    /// Detect task-closing commits and record completions
    Commits {
        /// Lower time bound: RFC 3339 or relative (7d, 12h, 30m)
        #[arg(long)]
        since: String,

        /// Repository working copy (default: repository root)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Report matches without changing the cache
        #[arg(long)]
        dry_run: bool,
    },
}
