//! Complaint entity and its resolution state machine
//!
//! A complaint is filed once, open, and may move to resolved exactly once:
//!
//! ```text
//! Open ──resolve(agent)──► Resolved(at, by)
//!                            │
//!                            └─resolve(same agent)──► no-op
//!                            └─resolve(other agent)─► AlreadyResolved
//! ```
//!
//! The resolution is a single optional value, so "resolved without a
//! resolver" cannot be represented. The flat on-disk fields
//! (`resolution_state`, `resolved_at`, `resolved_by`) are produced and checked
//! by [`ComplaintRecord`].

use crate::error::{Error, Result};
use crate::ids::{AgentId, ComplaintId, ProjectId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum length of the task description.
pub const MAX_TASK_LEN: usize = 1000;

/// Maximum length of each optional free-text field.
pub const MAX_DETAIL_LEN: usize = 5000;

// ============================================
// Severity
// ============================================

/// How badly the missing information blocked the agent
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(Error::validation(
                "severity",
                format!("unknown severity {s:?} (expected low, medium, high, critical)"),
            )),
        }
    }
}

// ============================================
// Resolution
// ============================================

/// Open/resolved marker as written to disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionState {
    Open,
    Resolved,
}

impl ResolutionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionState::Open => "open",
            ResolutionState::Resolved => "resolved",
        }
    }
}

/// When and by whom a complaint was closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    resolved_at: DateTime<Utc>,
    resolved_by: AgentId,
}

impl Resolution {
    /// A resolution stamped with the current time.
    fn now(resolved_by: AgentId) -> Self {
        Self {
            resolved_at: Utc::now(),
            resolved_by,
        }
    }

    pub fn resolved_at(&self) -> DateTime<Utc> {
        self.resolved_at
    }

    pub fn resolved_by(&self) -> &AgentId {
        &self.resolved_by
    }
}

/// What a call to [`Complaint::resolve`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// The complaint moved from open to resolved.
    Resolved,
    /// Already resolved by the same agent; nothing changed.
    Unchanged,
}

// ============================================
// Complaint
// ============================================

/// Caller-supplied fields for a new complaint.
///
/// The ID and timestamp are assigned by [`Complaint::file`].
#[derive(Debug, Clone)]
pub struct NewComplaint {
    pub agent_id: AgentId,
    pub session_id: SessionId,
    pub project_id: ProjectId,
    pub task_description: String,
    pub context_info: String,
    pub missing_info: String,
    pub confused_by: String,
    pub future_wishes: String,
    pub severity: Severity,
}

impl NewComplaint {
    /// A draft with only the required fields set.
    pub fn new(agent_id: AgentId, task_description: impl Into<String>, severity: Severity) -> Self {
        Self {
            agent_id,
            session_id: SessionId::default(),
            project_id: ProjectId::default(),
            task_description: task_description.into(),
            context_info: String::new(),
            missing_info: String::new(),
            confused_by: String::new(),
            future_wishes: String::new(),
            severity,
        }
    }
}

/// A structured record of missing or confusing information filed by an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ComplaintRecord", into = "ComplaintRecord")]
pub struct Complaint {
    id: ComplaintId,
    agent_id: AgentId,
    session_id: SessionId,
    project_id: ProjectId,
    task_description: String,
    context_info: String,
    missing_info: String,
    confused_by: String,
    future_wishes: String,
    severity: Severity,
    timestamp: DateTime<Utc>,
    resolution: Option<Resolution>,
}

impl Complaint {
    /// File a new open complaint with a fresh ID and the current time.
    pub fn file(draft: NewComplaint) -> Result<Self> {
        let complaint = Self {
            id: ComplaintId::generate(),
            agent_id: draft.agent_id,
            session_id: draft.session_id,
            project_id: draft.project_id,
            task_description: draft.task_description,
            context_info: draft.context_info,
            missing_info: draft.missing_info,
            confused_by: draft.confused_by,
            future_wishes: draft.future_wishes,
            severity: draft.severity,
            timestamp: Utc::now(),
            resolution: None,
        };
        complaint.validate()?;
        Ok(complaint)
    }

    /// Check every field constraint.
    pub fn validate(&self) -> Result<()> {
        if !self.id.is_valid() {
            return Err(Error::validation("id", "not a valid complaint ID"));
        }
        if !self.agent_id.is_valid() {
            return Err(Error::validation("agent_id", "not a valid agent ID"));
        }
        let task = self.task_description.trim();
        if task.is_empty() {
            return Err(Error::validation("task_description", "must not be empty"));
        }
        check_len("task_description", &self.task_description, MAX_TASK_LEN)?;
        check_len("context_info", &self.context_info, MAX_DETAIL_LEN)?;
        check_len("missing_info", &self.missing_info, MAX_DETAIL_LEN)?;
        check_len("confused_by", &self.confused_by, MAX_DETAIL_LEN)?;
        check_len("future_wishes", &self.future_wishes, MAX_DETAIL_LEN)?;
        if let Some(resolution) = &self.resolution {
            if resolution.resolved_by.is_empty() {
                return Err(Error::validation("resolved_by", "must not be empty"));
            }
            if resolution.resolved_at < self.timestamp {
                return Err(Error::validation(
                    "resolved_at",
                    "must not precede the complaint timestamp",
                ));
            }
        }
        Ok(())
    }

    /// Move to resolved, stamped with the current time.
    ///
    /// Re-resolving with the same agent is a successful no-op. A different
    /// agent gets [`Error::AlreadyResolved`] and the record is untouched.
    pub fn resolve(&mut self, resolver: &AgentId) -> Result<ResolveOutcome> {
        match &self.resolution {
            None => {
                self.resolution = Some(Resolution::now(resolver.clone()));
                Ok(ResolveOutcome::Resolved)
            }
            Some(existing) if existing.resolved_by == *resolver => Ok(ResolveOutcome::Unchanged),
            Some(existing) => Err(Error::AlreadyResolved {
                id: self.id.to_string(),
                resolved_by: existing.resolved_by.to_string(),
            }),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    pub fn state(&self) -> ResolutionState {
        if self.is_resolved() {
            ResolutionState::Resolved
        } else {
            ResolutionState::Open
        }
    }

    /// Case-insensitive substring match over the descriptive text fields.
    ///
    /// `needle` must already be lowercase.
    pub fn matches_text(&self, needle: &str) -> bool {
        [
            &self.task_description,
            &self.context_info,
            &self.missing_info,
            &self.confused_by,
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
    }

    pub fn id(&self) -> &ComplaintId {
        &self.id
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    pub fn task_description(&self) -> &str {
        &self.task_description
    }

    pub fn context_info(&self) -> &str {
        &self.context_info
    }

    pub fn missing_info(&self) -> &str {
        &self.missing_info
    }

    pub fn confused_by(&self) -> &str {
        &self.confused_by
    }

    pub fn future_wishes(&self) -> &str {
        &self.future_wishes
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn resolution(&self) -> Option<&Resolution> {
        self.resolution.as_ref()
    }

    /// Replace the editable text fields and severity, keeping identity,
    /// timestamp, and resolution.
    pub fn amend(&mut self, draft: NewComplaint) -> Result<()> {
        let mut amended = self.clone();
        amended.agent_id = draft.agent_id;
        amended.session_id = draft.session_id;
        amended.project_id = draft.project_id;
        amended.task_description = draft.task_description;
        amended.context_info = draft.context_info;
        amended.missing_info = draft.missing_info;
        amended.confused_by = draft.confused_by;
        amended.future_wishes = draft.future_wishes;
        amended.severity = draft.severity;
        amended.validate()?;
        *self = amended;
        Ok(())
    }
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len > max {
        return Err(Error::validation(
            field,
            format!("too long ({len} chars, max {max})"),
        ));
    }
    Ok(())
}

// ============================================
// On-disk record
// ============================================

/// Flat JSON shape of a complaint as stored on disk.
///
/// Converting back into a [`Complaint`] re-validates every field and the
/// agreement between `resolution_state`, `resolved_at`, and `resolved_by`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplaintRecord {
    pub id: ComplaintId,
    pub agent_id: AgentId,
    #[serde(default)]
    pub session_id: SessionId,
    #[serde(default)]
    pub project_id: ProjectId,
    pub task_description: String,
    #[serde(default)]
    pub context_info: String,
    #[serde(default)]
    pub missing_info: String,
    #[serde(default)]
    pub confused_by: String,
    #[serde(default)]
    pub future_wishes: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub resolution_state: ResolutionState,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_by: String,
}

impl From<Complaint> for ComplaintRecord {
    fn from(c: Complaint) -> Self {
        let state = c.state();
        let (resolved_at, resolved_by) = match c.resolution {
            Some(r) => (Some(r.resolved_at), String::from(r.resolved_by)),
            None => (None, String::new()),
        };
        Self {
            id: c.id,
            agent_id: c.agent_id,
            session_id: c.session_id,
            project_id: c.project_id,
            task_description: c.task_description,
            context_info: c.context_info,
            missing_info: c.missing_info,
            confused_by: c.confused_by,
            future_wishes: c.future_wishes,
            severity: c.severity,
            timestamp: c.timestamp,
            resolution_state: state,
            resolved_at,
            resolved_by,
        }
    }
}

impl TryFrom<ComplaintRecord> for Complaint {
    type Error = Error;

    fn try_from(r: ComplaintRecord) -> Result<Self> {
        let resolution = match (r.resolution_state, r.resolved_at, r.resolved_by.as_str()) {
            (ResolutionState::Open, None, "") => None,
            (ResolutionState::Open, _, _) => {
                return Err(Error::validation(
                    "resolution_state",
                    "open complaint carries resolution data",
                ))
            }
            (ResolutionState::Resolved, Some(at), by) if !by.is_empty() => Some(Resolution {
                resolved_at: at,
                resolved_by: AgentId::new(by)?,
            }),
            (ResolutionState::Resolved, _, _) => {
                return Err(Error::validation(
                    "resolution_state",
                    "resolved complaint needs both resolved_at and resolved_by",
                ))
            }
        };
        let complaint = Complaint {
            id: r.id,
            agent_id: r.agent_id,
            session_id: r.session_id,
            project_id: r.project_id,
            task_description: r.task_description,
            context_info: r.context_info,
            missing_info: r.missing_info,
            confused_by: r.confused_by,
            future_wishes: r.future_wishes,
            severity: r.severity,
            timestamp: r.timestamp,
            resolution,
        };
        complaint.validate()?;
        Ok(complaint)
    }
}
