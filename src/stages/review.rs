//! Review-phase stages: testing, code review, sprint review, release.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tracing::info;

use super::{StageContext, StageNode};
use crate::engine::graph::Stage;
use crate::state::{AgentState, Message, Phase, ProjectState, StateDelta, Ticket, TicketStatus};

fn advance_completed(
    state: &ProjectState,
    from: TicketStatus,
    to: TicketStatus,
) -> HashMap<String, Ticket> {
    let mut advanced = HashMap::new();
    for ticket in &state.completed_tickets {
        if state.effective_status(&ticket.id) != Some(from) {
            continue;
        }
        // Conflicted branches stay put until a human resolves them.
        let conflicted = ticket
            .branch
            .as_ref()
            .is_some_and(|b| state.conflicts.iter().any(|c| &c.branch == b));
        if conflicted {
            continue;
        }
        let mut updated = state.ticket(&ticket.id).cloned().unwrap_or_else(|| ticket.clone());
        updated.status = to;
        updated.updated_at = Utc::now();
        advanced.insert(updated.id.clone(), updated);
    }
    advanced
}

/// Runs the merged work through testing: every cleanly-merged ticket in
/// `review` advances to `testing`.
pub struct TesterNode;

#[async_trait]
impl StageNode for TesterNode {
    fn stage(&self) -> Stage {
        Stage::Tester
    }

    async fn run(&self, _ctx: &StageContext, state: &ProjectState) -> anyhow::Result<StateDelta> {
        let advanced = advance_completed(state, TicketStatus::Review, TicketStatus::Testing);
        info!(tested = advanced.len(), "tester pass complete");

        let mut delta = StateDelta {
            active_tickets: advanced,
            ..Default::default()
        };
        delta.messages.push(Message::new(
            "tester",
            format!(
                "{} ticket(s) passed testing, {} conflict(s) outstanding",
                delta.active_tickets.len(),
                state.conflicts.len()
            ),
        ));
        Ok(delta)
    }
}

/// Code review: tickets in `testing` advance to `done`.
pub struct ReviewerNode;

#[async_trait]
impl StageNode for ReviewerNode {
    fn stage(&self) -> Stage {
        Stage::Reviewer
    }

    async fn run(&self, _ctx: &StageContext, state: &ProjectState) -> anyhow::Result<StateDelta> {
        let advanced = advance_completed(state, TicketStatus::Testing, TicketStatus::Done);
        info!(approved = advanced.len(), "review pass complete");

        let mut delta = StateDelta {
            active_tickets: advanced,
            ..Default::default()
        };
        delta.messages.push(Message::new(
            "reviewer",
            format!("{} ticket(s) approved", delta.active_tickets.len()),
        ));
        Ok(delta)
    }
}

/// Presents sprint results and sets the phase the router acts on:
/// - rejected or still-draft work with sprint budget left → `planning`
///   (loop back for another sprint)
/// - everything done and no conflicts → `release`
/// - anything else (e.g. unresolved conflicts) → `review`, which the
///   router treats as terminal so a human can take over.
///
/// Superseded backlog entries (rejected work the architect already
/// reopened) are excluded from the accounting; only their replacement
/// counts. Worker agents are sent back to idle so the next sprint's
/// dispatch can reuse the roster.
pub struct SprintReviewNode;

#[async_trait]
impl StageNode for SprintReviewNode {
    fn stage(&self) -> Stage {
        Stage::SprintReview
    }

    async fn run(&self, ctx: &StageContext, state: &ProjectState) -> anyhow::Result<StateDelta> {
        let mut draft = 0usize;
        let mut rejected = 0usize;
        let mut done = 0usize;
        let mut live = 0usize;
        for ticket in &state.tickets {
            if state.is_superseded(&ticket.id) {
                continue;
            }
            live += 1;
            match state.effective_status(&ticket.id) {
                Some(TicketStatus::Draft) => draft += 1,
                Some(TicketStatus::Rejected) => rejected += 1,
                Some(TicketStatus::Done) => done += 1,
                _ => {}
            }
        }

        let unfinished = draft + rejected > 0;
        let all_done = live > 0 && done == live;

        let phase = if unfinished && state.sprint_number < ctx.config.max_sprints {
            Phase::Planning
        } else if all_done && state.conflicts.is_empty() {
            Phase::Release
        } else {
            Phase::Review
        };

        info!(
            sprint = state.sprint_number,
            draft,
            rejected,
            done,
            conflicts = state.conflicts.len(),
            next_phase = phase.as_str(),
            "sprint review"
        );

        // The sprint is over; worker slots go back to idle so the next
        // dispatch cycle can reuse the roster.
        let mut agents = HashMap::new();
        for (id, agent) in &state.agents {
            if agent.state != AgentState::Idle {
                let mut reset = agent.clone();
                reset.state = AgentState::Idle;
                reset.current_ticket = None;
                agents.insert(id.clone(), reset);
            }
        }

        Ok(StateDelta {
            phase: Some(phase),
            agents,
            messages: vec![Message::new(
                "sprint_review",
                format!(
                    "sprint {}: {done} done, {rejected} rejected, {draft} open, {} conflict(s); next phase: {}",
                    state.sprint_number,
                    state.conflicts.len(),
                    phase.as_str()
                ),
            )],
            ..Default::default()
        })
    }
}

/// Terminal stage: marks the project complete.
pub struct ReleaseNode;

#[async_trait]
impl StageNode for ReleaseNode {
    fn stage(&self) -> Stage {
        Stage::Release
    }

    async fn run(&self, _ctx: &StageContext, state: &ProjectState) -> anyhow::Result<StateDelta> {
        info!(sprint = state.sprint_number, "releasing");
        Ok(StateDelta {
            phase: Some(Phase::Complete),
            messages: vec![Message::new(
                "release",
                format!(
                    "released after sprint {} with {} completed ticket(s)",
                    state.sprint_number,
                    state.completed_tickets.len()
                ),
            )],
            ..Default::default()
        })
    }
}
