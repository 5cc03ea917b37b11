//! Plan documents.
//!
//! Plans are markdown files (PRDs, implementation plans) that an epic was
//! created from. The sync engine re-reads them to rebuild the goal and
//! task checklist of the remote body.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::error::{Error, Result};

static GOAL_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*\*\*Goal:?\*\*:?\s*(.+?)\s*$").expect("valid regex"));
static PRIORITY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*\*\*Priority:?\*\*:?\s*([A-Za-z0-9-]+)").expect("valid regex")
});
static TASK_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^#{2,4}\s+Task\s+\d+\s*[:.)-]\s*(.+?)\s*$").expect("valid regex")
});
static CHECKLIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*[-*]\s+\[[ xX]\]\s+(.+?)\s*$").expect("valid regex"));

/// The parts of a plan the remote body is built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPlan {
    pub title: Option<String>,
    pub goal: Option<String>,
    pub tasks: Vec<String>,
    pub priority: Option<String>,
}

impl ParsedPlan {
    /// Parse plan markdown.
    ///
    /// Tasks come from `### Task N: ...` headings; when there are none,
    /// checklist items (`- [ ] ...`) are used instead.
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let title = content
            .lines()
            .map(str::trim)
            .find_map(|l| l.strip_prefix("# "))
            .map(|t| t.trim().to_string());

        let goal = GOAL_LINE
            .captures(content)
            .map(|c| c[1].to_string())
            .or_else(|| goal_section(content));

        let priority = PRIORITY_LINE
            .captures(content)
            .map(|c| c[1].to_lowercase());

        let mut tasks: Vec<String> = TASK_HEADING
            .captures_iter(content)
            .map(|c| c[1].to_string())
            .collect();
        if tasks.is_empty() {
            tasks = CHECKLIST_ITEM
                .captures_iter(content)
                .map(|c| c[1].to_string())
                .collect();
        }

        Self {
            title,
            goal,
            tasks,
            priority,
        }
    }
}

/// First paragraph under a `## Goal` heading.
fn goal_section(content: &str) -> Option<String> {
    let mut lines = content.lines().skip_while(|l| {
        let t = l.trim().to_lowercase();
        !(t == "## goal" || t == "## goals")
    });
    lines.next()?;

    let paragraph: Vec<&str> = lines
        .map(str::trim)
        .skip_while(|l| l.is_empty())
        .take_while(|l| !l.is_empty() && !l.starts_with('#'))
        .collect();

    if paragraph.is_empty() {
        None
    } else {
        Some(paragraph.join(" "))
    }
}

/// Source of parsed plans for epics.
pub trait PlanSource {
    /// Read and parse the plan at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error when the plan cannot be read.
    fn parse_plan(&self, path: &str) -> Result<ParsedPlan>;
}

/// Reads plan files from disk, resolving relative paths against a root.
#[derive(Debug, Clone)]
pub struct MarkdownPlanReader {
    root: PathBuf,
}

impl MarkdownPlanReader {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        }
    }
}

impl PlanSource for MarkdownPlanReader {
    fn parse_plan(&self, path: &str) -> Result<ParsedPlan> {
        let resolved = self.resolve(path);
        let content = std::fs::read_to_string(&resolved).map_err(|e| {
            Error::Other(format!("Failed to read plan {}: {e}", resolved.display()))
        })?;
        Ok(ParsedPlan::parse(&content))
    }
}
