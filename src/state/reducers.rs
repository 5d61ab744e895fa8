//! Field-wise merge rules for [`ProjectState`].
//!
//! The reducer contract is the concurrency-safety boundary of the whole
//! engine: task executors only ever emit deltas, the engine merges them
//! in invocation order between join barriers, and so parallel execution
//! is race-free by construction. The rules per field:
//!
//! - append: `tickets`, `completed_tickets`, `messages` (order preserved,
//!   no deduplication — callers must not emit duplicate-id tickets)
//! - key-overwrite: `active_tickets`, `agents`
//! - last-writer-wins: every scalar/wholesale field

use super::{ProjectState, StateDelta};

/// Merge rule applied to one `ProjectState` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Append,
    KeyOverwrite,
    LastWriterWins,
}

/// The explicit (field, reducer) table. Kept as data so hosts and tests
/// can introspect the merge semantics instead of inferring them.
pub fn reducer_table() -> &'static [(&'static str, Reducer)] {
    use Reducer::*;
    &[
        ("phase", LastWriterWins),
        ("requirements", LastWriterWins),
        ("technical_spec", LastWriterWins),
        ("plan_approved", LastWriterWins),
        ("tickets", Append),
        ("active_tickets", KeyOverwrite),
        ("completed_tickets", Append),
        ("agents", KeyOverwrite),
        ("branches", LastWriterWins),
        ("pending_merges", LastWriterWins),
        ("conflicts", LastWriterWins),
        ("sprint_number", LastWriterWins),
        ("messages", Append),
    ]
}

/// Fold a delta into a base state. Pure and total: a delta never makes
/// this fail, absent fields leave the base untouched.
pub fn merge(base: ProjectState, delta: StateDelta) -> ProjectState {
    let mut next = base;

    if let Some(phase) = delta.phase {
        next.phase = phase;
    }
    if let Some(requirements) = delta.requirements {
        next.requirements = requirements;
    }
    if let Some(spec) = delta.technical_spec {
        next.technical_spec = spec;
    }
    if let Some(approved) = delta.plan_approved {
        next.plan_approved = approved;
    }

    next.tickets.extend(delta.tickets);
    next.completed_tickets.extend(delta.completed_tickets);
    next.messages.extend(delta.messages);

    for (id, ticket) in delta.active_tickets {
        next.active_tickets.insert(id, ticket);
    }
    for (id, agent) in delta.agents {
        next.agents.insert(id, agent);
    }

    if let Some(branches) = delta.branches {
        next.branches = branches;
    }
    if let Some(pending) = delta.pending_merges {
        next.pending_merges = pending;
    }
    if let Some(conflicts) = delta.conflicts {
        next.conflicts = conflicts;
    }
    if let Some(sprint) = delta.sprint_number {
        next.sprint_number = sprint;
    }

    next
}

impl StateDelta {
    /// Compose two deltas so that for any state `s`:
    /// `merge(merge(s, self), later) == merge(s, self.absorb(later))`.
    pub fn absorb(mut self, later: StateDelta) -> StateDelta {
        self.phase = later.phase.or(self.phase);
        self.requirements = later.requirements.or(self.requirements);
        self.technical_spec = later.technical_spec.or(self.technical_spec);
        self.plan_approved = later.plan_approved.or(self.plan_approved);

        self.tickets.extend(later.tickets);
        self.completed_tickets.extend(later.completed_tickets);
        self.messages.extend(later.messages);

        for (id, ticket) in later.active_tickets {
            self.active_tickets.insert(id, ticket);
        }
        for (id, agent) in later.agents {
            self.agents.insert(id, agent);
        }

        self.branches = later.branches.or(self.branches);
        self.pending_merges = later.pending_merges.or(self.pending_merges);
        self.conflicts = later.conflicts.or(self.conflicts);
        self.sprint_number = later.sprint_number.or(self.sprint_number);

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{
        AgentState, AgentStatus, Message, Phase, Ticket, TicketKind, TicketStatus,
    };
    use pretty_assertions::assert_eq;

    fn base() -> ProjectState {
        ProjectState::new("demo", ".", "build a login page")
    }

    fn delta_with_ticket(title: &str) -> (StateDelta, Ticket) {
        let ticket = Ticket::new(title, "", TicketKind::Feature);
        let delta = StateDelta {
            tickets: vec![ticket.clone()],
            ..Default::default()
        };
        (delta, ticket)
    }

    #[test]
    fn append_preserves_insertion_order() {
        let (d1, t1) = delta_with_ticket("first");
        let (d2, t2) = delta_with_ticket("second");
        let merged = merge(merge(base(), d1), d2);
        assert_eq!(merged.tickets, vec![t1, t2]);
    }

    #[test]
    fn key_overwrite_replaces_only_present_keys() {
        let mut s = base();
        s.agents.insert(
            "dev-1".into(),
            AgentStatus::idle("dev-1", "backend_developer", "anthropic"),
        );
        s.agents.insert(
            "dev-2".into(),
            AgentStatus::idle("dev-2", "ui_developer", "anthropic"),
        );

        let mut working = AgentStatus::idle("dev-1", "backend_developer", "anthropic");
        working.state = AgentState::Working;
        let delta = StateDelta {
            agents: [("dev-1".to_string(), working.clone())].into(),
            ..Default::default()
        };

        let merged = merge(s, delta);
        assert_eq!(merged.agents["dev-1"], working);
        assert_eq!(merged.agents["dev-2"].state, AgentState::Idle);
    }

    #[test]
    fn scalars_are_last_writer_wins() {
        let d1 = StateDelta {
            phase: Some(Phase::Development),
            sprint_number: Some(2),
            ..Default::default()
        };
        let d2 = StateDelta {
            phase: Some(Phase::Release),
            ..Default::default()
        };
        let merged = merge(merge(base(), d1), d2);
        assert_eq!(merged.phase, Phase::Release);
        assert_eq!(merged.sprint_number, 2);
    }

    #[test]
    fn empty_delta_is_identity() {
        let s = base();
        assert_eq!(merge(s.clone(), StateDelta::default()), s);
    }

    #[test]
    fn absorb_matches_sequential_merge() {
        let mut t1 = Ticket::new("alpha", "", TicketKind::Chore);
        t1.status = TicketStatus::Review;
        let d1 = StateDelta {
            phase: Some(Phase::Development),
            completed_tickets: vec![t1.clone()],
            active_tickets: [(t1.id.clone(), t1.clone())].into(),
            messages: vec![Message::new("dev-1", "done")],
            ..Default::default()
        };
        let mut t2 = t1.clone();
        t2.status = TicketStatus::Testing;
        let d2 = StateDelta {
            phase: Some(Phase::Review),
            active_tickets: [(t2.id.clone(), t2)].into(),
            messages: vec![Message::new("tester", "passed")],
            ..Default::default()
        };

        let sequential = merge(merge(base(), d1.clone()), d2.clone());
        let composed = merge(base(), d1.absorb(d2));
        assert_eq!(sequential, composed);
    }

    #[test]
    fn reducer_table_covers_every_delta_field() {
        // Serialize a fully-populated delta and check each field name
        // appears in the table.
        let ticket = Ticket::new("t", "", TicketKind::Feature);
        let full = StateDelta {
            phase: Some(Phase::Planning),
            requirements: Some("r".into()),
            technical_spec: Some("s".into()),
            plan_approved: Some(true),
            tickets: vec![ticket.clone()],
            active_tickets: [(ticket.id.clone(), ticket.clone())].into(),
            completed_tickets: vec![ticket.clone()],
            agents: [(
                "a".to_string(),
                AgentStatus::idle("a", "role", "provider"),
            )]
            .into(),
            branches: Some(vec![]),
            pending_merges: Some(vec![]),
            conflicts: Some(vec![]),
            sprint_number: Some(1),
            messages: vec![Message::new("r", "c")],
        };
        let value = serde_json::to_value(&full).unwrap();
        let fields: Vec<&str> = value.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        for field in fields {
            assert!(
                reducer_table().iter().any(|(name, _)| *name == field),
                "field '{field}' missing from reducer table"
            );
        }
        assert_eq!(reducer_table().len(), 13);
    }
}
