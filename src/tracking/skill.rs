//! Skill-invocation detector.
//!
//! Agents announce workflow skills in free text ("I'm using the
//! executing-plans skill to implement docs/plans/auth.md"). Each known
//! skill maps to a phase; some phases imply an epic status change.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

use super::journey::{NewJourneyEntry, add_journey_entry};
use crate::error::Result;
use crate::model::{Cache, Epic, EpicStatus};

/// Workflow skills the detector recognises, in match order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillPhase {
    FinishingBranch,
    RequestingReview,
    ExecutingPlans,
    SubagentDriven,
    WritingPlans,
    Brainstorming,
    TestDriven,
    SystematicDebugging,
    Verification,
}

/// How a phase finds the epic it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// The epic whose `plan_file` is named in the message.
    PlanPath,
    /// The epic currently being worked on.
    ActiveEpic,
}

impl SkillPhase {
    /// Skill identifier as agents spell it.
    #[must_use]
    pub const fn skill(&self) -> &'static str {
        match self {
            Self::FinishingBranch => "finishing-a-development-branch",
            Self::RequestingReview => "requesting-code-review",
            Self::ExecutingPlans => "executing-plans",
            Self::SubagentDriven => "subagent-driven-development",
            Self::WritingPlans => "writing-plans",
            Self::Brainstorming => "brainstorming",
            Self::TestDriven => "test-driven-development",
            Self::SystematicDebugging => "systematic-debugging",
            Self::Verification => "verification-before-completion",
        }
    }

    /// Coarse workflow stage recorded in journey metadata.
    #[must_use]
    pub const fn stage(&self) -> &'static str {
        match self {
            Self::Brainstorming => "design",
            Self::WritingPlans => "planning",
            Self::ExecutingPlans | Self::SubagentDriven => "implementation",
            Self::TestDriven | Self::SystematicDebugging | Self::Verification => "quality",
            Self::RequestingReview | Self::FinishingBranch => "review",
        }
    }

    #[must_use]
    pub const fn target_status(&self) -> Option<EpicStatus> {
        match self {
            Self::FinishingBranch | Self::RequestingReview => Some(EpicStatus::Review),
            Self::ExecutingPlans | Self::SubagentDriven => Some(EpicStatus::InProgress),
            Self::WritingPlans => Some(EpicStatus::Planning),
            Self::Brainstorming | Self::TestDriven | Self::SystematicDebugging | Self::Verification => {
                None
            }
        }
    }

    #[must_use]
    pub const fn target(&self) -> TargetKind {
        match self {
            Self::ExecutingPlans | Self::SubagentDriven | Self::WritingPlans | Self::Brainstorming => {
                TargetKind::PlanPath
            }
            Self::FinishingBranch
            | Self::RequestingReview
            | Self::TestDriven
            | Self::SystematicDebugging
            | Self::Verification => TargetKind::ActiveEpic,
        }
    }
}

fn skill_regex(alternatives: &[&str]) -> Regex {
    let body = alternatives.join("|");
    Regex::new(&format!(r"(?i)(?:^|[^\w-])(?:{body})(?:$|[^\w-])")).expect("valid regex")
}

static SKILL_PATTERNS: LazyLock<Vec<(SkillPhase, Regex)>> = LazyLock::new(|| {
    vec![
        (
            SkillPhase::FinishingBranch,
            skill_regex(&[
                r"(?:superpowers:)?finishing-a-development-branch",
                r"finish(?:ing)? (?:the|this) (?:development )?branch",
            ]),
        ),
        (
            SkillPhase::RequestingReview,
            skill_regex(&[
                r"(?:superpowers:)?requesting-code-review",
                r"request(?:ing)? (?:a )?code review",
            ]),
        ),
        (
            SkillPhase::ExecutingPlans,
            skill_regex(&[
                r"(?:superpowers:)?executing-plans",
                r"execut(?:e|ing) (?:the|this) (?:implementation )?plan",
            ]),
        ),
        (
            SkillPhase::SubagentDriven,
            skill_regex(&[r"(?:superpowers:)?subagent-driven-development"]),
        ),
        (
            SkillPhase::WritingPlans,
            skill_regex(&[
                r"(?:superpowers:)?writing-plans",
                r"writ(?:e|ing) (?:an?|the) implementation plan",
            ]),
        ),
        (
            SkillPhase::Brainstorming,
            skill_regex(&[r"superpowers:brainstorming", r"brainstorming skill"]),
        ),
        (
            SkillPhase::TestDriven,
            skill_regex(&[r"(?:superpowers:)?test-driven-development"]),
        ),
        (
            SkillPhase::SystematicDebugging,
            skill_regex(&[r"(?:superpowers:)?systematic-debugging"]),
        ),
        (
            SkillPhase::Verification,
            skill_regex(&[r"(?:superpowers:)?verification-before-completion"]),
        ),
    ]
});

static PLAN_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[\s`'(\x22])((?:[\w.-]+/)*[\w.-]+\.(?:md|markdown))\b").expect("valid regex")
});

/// A detected skill announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillMatch {
    pub phase: SkillPhase,
    /// First markdown path mentioned in the message, if any.
    pub plan_path: Option<String>,
}

/// Result of applying a skill announcement to the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillTrigger {
    pub phase: SkillPhase,
    pub epic_number: u64,
    /// Status applied, when the phase implies one.
    pub status: Option<EpicStatus>,
    /// Whether the status label actually changed.
    pub status_changed: bool,
}

/// Match a message against the known skill phrases. First match wins.
#[must_use]
pub fn detect_skill_invocation(message: &str) -> Option<SkillMatch> {
    let phase = SKILL_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(message))
        .map(|(phase, _)| *phase)?;

    let plan_path = PLAN_PATH
        .captures(message)
        .map(|c| c[1].trim_start_matches("./").to_string());

    Some(SkillMatch { phase, plan_path })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlanMatch {
    Exact,
    Suffix,
}

/// Compare paths by whole components, so `auth.md` never matches `oauth.md`.
fn plan_match(plan_file: &str, mentioned: &str) -> Option<PlanMatch> {
    let a = Path::new(plan_file.trim_start_matches("./"));
    let b = Path::new(mentioned.trim_start_matches("./"));
    if a == b {
        Some(PlanMatch::Exact)
    } else if a.ends_with(b) || b.ends_with(a) {
        Some(PlanMatch::Suffix)
    } else {
        None
    }
}

fn most_recent<'a>(epics: impl Iterator<Item = &'a Epic>) -> Option<u64> {
    epics
        .max_by(|a, b| a.updated_at.cmp(&b.updated_at))
        .map(|e| e.number)
}

/// The epic currently being worked on: the most recently updated open
/// epic labelled in-progress, else the most recently updated open epic.
#[must_use]
pub fn active_epic(cache: &Cache) -> Option<u64> {
    let in_progress = EpicStatus::InProgress.label();
    most_recent(
        cache
            .epics()
            .iter()
            .filter(|e| e.is_open() && e.labels.contains(&in_progress)),
    )
    .or_else(|| most_recent(cache.epics().iter().filter(|e| e.is_open())))
}

/// Open epic whose plan file matches `path`.
///
/// An exact path match wins (most recently updated first). A partial
/// path only resolves when it names a single epic's plan.
#[must_use]
pub fn epic_for_plan(cache: &Cache, path: &str) -> Option<u64> {
    let candidates: Vec<(&Epic, PlanMatch)> = cache
        .epics()
        .iter()
        .filter(|e| e.is_open())
        .filter_map(|e| Some((e, plan_match(e.plan_file.as_deref()?, path)?)))
        .collect();

    let exact = candidates
        .iter()
        .filter(|(_, m)| *m == PlanMatch::Exact)
        .map(|(e, _)| *e);
    if let Some(number) = most_recent(exact) {
        return Some(number);
    }

    match candidates.as_slice() {
        [(epic, _)] => Some(epic.number),
        [] => None,
        several => {
            tracing::debug!(
                path,
                candidates = several.len(),
                "Plan path is ambiguous; not resolving an epic"
            );
            None
        }
    }
}

fn resolve_target(cache: &Cache, found: &SkillMatch) -> Option<u64> {
    match found.phase.target() {
        TargetKind::ActiveEpic => active_epic(cache),
        TargetKind::PlanPath => found
            .plan_path
            .as_deref()
            .and_then(|path| epic_for_plan(cache, path)),
    }
}

/// Detect a skill announcement and record it on the target epic.
///
/// Appends a `skill_invocation` journey entry, applies the phase's
/// status (if any), and marks the epic dirty. Returns `None` when the
/// message names no skill or no epic can be resolved.
///
/// # Errors
///
/// Propagates journey validation errors.
pub fn apply_skill_invocation(
    cache: &mut Cache,
    message: &str,
    agent: Option<&str>,
) -> Result<Option<SkillTrigger>> {
    let Some(found) = detect_skill_invocation(message) else {
        return Ok(None);
    };
    let Some(epic_number) = resolve_target(cache, &found) else {
        tracing::debug!(
            skill = found.phase.skill(),
            plan = ?found.plan_path,
            "Skill detected but no epic matched"
        );
        return Ok(None);
    };

    let phase = found.phase;
    let status = phase.target_status();
    let text = match status {
        Some(s) => format!("Skill {} started; status -> {s}", phase.skill()),
        None => format!("Skill {} started", phase.skill()),
    };

    let mut entry = NewJourneyEntry::new("skill_invocation", text)
        .meta("skill", phase.skill())
        .meta("phase", phase.stage());
    if let Some(s) = status {
        entry = entry.meta("status", s.as_str());
    }
    if let Some(agent) = agent {
        entry = entry.agent(agent);
    }
    add_journey_entry(cache, epic_number, entry)?;

    let status_changed = match status {
        Some(s) => cache.set_status(epic_number, s)?,
        None => false,
    };
    cache.mark_dirty(epic_number)?;

    tracing::info!(
        epic = epic_number,
        skill = phase.skill(),
        status_changed,
        "Recorded skill invocation"
    );

    Ok(Some(SkillTrigger {
        phase,
        epic_number,
        status,
        status_changed,
    }))
}
