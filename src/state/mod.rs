//! Canonical project state for a sprint run.
//!
//! `ProjectState` is the single source of truth, owned exclusively by the
//! workflow engine while a run is in progress. Stage nodes and task
//! executors never mutate it directly; they return [`StateDelta`] values
//! that the engine folds in through the reducers in [`reducers`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub mod reducers;

pub use reducers::{merge, reducer_table, Reducer};

/// Short hex identifier in the style the rest of the tooling expects
/// (first 8 chars of a v4 UUID).
pub fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketKind {
    Feature,
    Bug,
    Chore,
}

impl TicketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketKind::Feature => "feature",
            TicketKind::Bug => "bug",
            TicketKind::Chore => "chore",
        }
    }

    /// Branch namespace prefix for work on this kind of ticket.
    pub fn branch_prefix(&self) -> &'static str {
        match self {
            TicketKind::Feature => "feature",
            TicketKind::Bug => "bugfix",
            TicketKind::Chore => "chore",
        }
    }
}

/// Ticket lifecycle. Transitions are monotonic along the declaration
/// order, except `Rejected`, which is reachable from any non-terminal
/// status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Draft,
    Approved,
    InProgress,
    Review,
    Testing,
    Done,
    Rejected,
}

impl TicketStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TicketStatus::Done | TicketStatus::Rejected)
    }

    /// Whether a transition from `self` to `to` is legal.
    pub fn can_transition(self, to: TicketStatus) -> bool {
        if to == TicketStatus::Rejected {
            return !self.is_terminal();
        }
        if self == TicketStatus::Rejected {
            return false;
        }
        to > self
    }
}

/// A unit of work flowing through the sprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub title: String,
    pub description: String,
    pub kind: TicketKind,
    pub status: TicketStatus,
    pub assigned_to: Option<String>,
    pub branch: Option<String>,
    /// Id of the replacement ticket when this entry was reopened after a
    /// rejection. Superseded entries drop out of sprint accounting.
    #[serde(default)]
    pub superseded_by: Option<String>,
    pub dependencies: Vec<String>,
    pub files_changed: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        kind: TicketKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: short_id(),
            title: title.into(),
            description: description.into(),
            kind,
            status: TicketStatus::Draft,
            assigned_to: None,
            branch: None,
            superseded_by: None,
            dependencies: Vec::new(),
            files_changed: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The branch this ticket's work is isolated on, derived from its kind
    /// and id when no branch has been assigned yet.
    pub fn branch_name(&self) -> String {
        match &self.branch {
            Some(b) => b.clone(),
            None => format!("{}/{}", self.kind.branch_prefix(), self.id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Working,
    Done,
    Error,
}

/// A worker slot. The `pane` handle belongs to the visibility
/// collaborator and is never interpreted by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub agent_id: String,
    pub role: String,
    pub state: AgentState,
    pub current_ticket: Option<String>,
    pub provider: String,
    pub pane: Option<String>,
}

impl AgentStatus {
    pub fn idle(
        agent_id: impl Into<String>,
        role: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            role: role.into(),
            state: AgentState::Idle,
            current_ticket: None,
            provider: provider.into(),
            pane: None,
        }
    }
}

/// Recorded by the repository manager when a merge fails; consumed by the
/// review stages to surface to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictInfo {
    pub branch: String,
    pub files: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// One entry in the append-only message log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Planning,
    Development,
    Review,
    Release,
    Complete,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Planning => "planning",
            Phase::Development => "development",
            Phase::Review => "review",
            Phase::Release => "release",
            Phase::Complete => "complete",
        }
    }
}

/// The aggregate project record.
///
/// `tickets` is the append-only backlog; status advances flow through
/// `active_tickets` (keyed by id), whose entry shadows the backlog entry.
/// Use [`ProjectState::effective_status`] to read a ticket's current
/// status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectState {
    pub project_name: String,
    pub project_path: String,
    pub phase: Phase,

    // Planning
    pub requirements: String,
    pub technical_spec: String,
    pub plan_approved: bool,

    // Execution
    pub tickets: Vec<Ticket>,
    pub active_tickets: HashMap<String, Ticket>,
    pub completed_tickets: Vec<Ticket>,

    // Team
    pub agents: HashMap<String, AgentStatus>,

    // Git
    pub branches: Vec<String>,
    pub pending_merges: Vec<String>,
    pub conflicts: Vec<ConflictInfo>,

    // Sprint
    pub sprint_number: u32,

    // Internal messaging
    pub messages: Vec<Message>,
}

impl ProjectState {
    /// Fresh sprint-1 state in the planning phase.
    pub fn new(
        project_name: impl Into<String>,
        project_path: impl Into<String>,
        requirements: impl Into<String>,
    ) -> Self {
        Self {
            project_name: project_name.into(),
            project_path: project_path.into(),
            phase: Phase::Planning,
            requirements: requirements.into(),
            technical_spec: String::new(),
            plan_approved: false,
            tickets: Vec::new(),
            active_tickets: HashMap::new(),
            completed_tickets: Vec::new(),
            agents: HashMap::new(),
            branches: Vec::new(),
            pending_merges: Vec::new(),
            conflicts: Vec::new(),
            sprint_number: 1,
            messages: Vec::new(),
        }
    }

    /// Latest revision of a ticket: the active entry when present,
    /// otherwise the backlog entry.
    pub fn ticket(&self, id: &str) -> Option<&Ticket> {
        self.active_tickets
            .get(id)
            .or_else(|| self.tickets.iter().find(|t| t.id == id))
    }

    /// Current status of a ticket as observed through the reducers.
    pub fn effective_status(&self, id: &str) -> Option<TicketStatus> {
        self.ticket(id).map(|t| t.status)
    }

    /// Whether this backlog entry has been replaced by a reopened copy.
    pub fn is_superseded(&self, id: &str) -> bool {
        self.ticket(id).is_some_and(|t| t.superseded_by.is_some())
    }
}

/// A partial state update returned by a stage node or task executor.
///
/// Every field defaults to "no change". Unknown fields in a serialized
/// delta are ignored on deserialization, so merging never fails.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    pub phase: Option<Phase>,
    pub requirements: Option<String>,
    pub technical_spec: Option<String>,
    pub plan_approved: Option<bool>,
    #[serde(default)]
    pub tickets: Vec<Ticket>,
    #[serde(default)]
    pub active_tickets: HashMap<String, Ticket>,
    #[serde(default)]
    pub completed_tickets: Vec<Ticket>,
    #[serde(default)]
    pub agents: HashMap<String, AgentStatus>,
    pub branches: Option<Vec<String>>,
    pub pending_merges: Option<Vec<String>>,
    pub conflicts: Option<Vec<ConflictInfo>>,
    pub sprint_number: Option<u32>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl StateDelta {
    /// Delta carrying a single message-log entry.
    pub fn message(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::new(role, content)],
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.phase.is_none()
            && self.requirements.is_none()
            && self.technical_spec.is_none()
            && self.plan_approved.is_none()
            && self.tickets.is_empty()
            && self.active_tickets.is_empty()
            && self.completed_tickets.is_empty()
            && self.agents.is_empty()
            && self.branches.is_none()
            && self.pending_merges.is_none()
            && self.conflicts.is_none()
            && self.sprint_number.is_none()
            && self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_are_monotonic() {
        use TicketStatus::*;
        assert!(Draft.can_transition(Approved));
        assert!(Draft.can_transition(Review));
        assert!(InProgress.can_transition(Review));
        assert!(Testing.can_transition(Done));
        assert!(!Review.can_transition(Draft));
        assert!(!Done.can_transition(Testing));
        assert!(!Draft.can_transition(Draft));
    }

    #[test]
    fn rejected_reachable_from_any_non_terminal() {
        use TicketStatus::*;
        for status in [Draft, Approved, InProgress, Review, Testing] {
            assert!(status.can_transition(Rejected), "{status:?}");
        }
        assert!(!Done.can_transition(Rejected));
        assert!(!Rejected.can_transition(Rejected));
        assert!(!Rejected.can_transition(Done));
    }

    #[test]
    fn branch_name_uses_kind_prefix() {
        let ticket = Ticket::new("Fix login", "", TicketKind::Bug);
        assert_eq!(ticket.branch_name(), format!("bugfix/{}", ticket.id));

        let mut assigned = ticket.clone();
        assigned.branch = Some("hotfix/login".to_string());
        assert_eq!(assigned.branch_name(), "hotfix/login");
    }

    #[test]
    fn effective_status_prefers_active_entry() {
        let mut state = ProjectState::new("p", ".", "reqs");
        let ticket = Ticket::new("T", "", TicketKind::Feature);
        let id = ticket.id.clone();
        state.tickets.push(ticket.clone());
        assert_eq!(state.effective_status(&id), Some(TicketStatus::Draft));

        let mut advanced = ticket;
        advanced.status = TicketStatus::Review;
        state.active_tickets.insert(id.clone(), advanced);
        assert_eq!(state.effective_status(&id), Some(TicketStatus::Review));
    }

    #[test]
    fn superseded_entries_are_flagged_through_active_revision() {
        let mut state = ProjectState::new("p", ".", "");
        let ticket = Ticket::new("T", "", TicketKind::Feature);
        let id = ticket.id.clone();
        state.tickets.push(ticket.clone());
        assert!(!state.is_superseded(&id));

        let mut retired = ticket;
        retired.status = TicketStatus::Rejected;
        retired.superseded_by = Some("replacement".to_string());
        state.active_tickets.insert(id.clone(), retired);
        assert!(state.is_superseded(&id));
    }

    #[test]
    fn phase_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Phase::Planning).unwrap(),
            "\"planning\""
        );
        assert_eq!(
            serde_json::to_string(&TicketStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
    }

    #[test]
    fn unknown_delta_fields_are_ignored() {
        let raw = r#"{"phase":"release","not_a_field":123}"#;
        let delta: StateDelta = serde_json::from_str(raw).unwrap();
        assert_eq!(delta.phase, Some(Phase::Release));
    }
}
