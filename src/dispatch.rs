//! Fan-out dispatcher.
//!
//! A pure function over the project state: it inspects the backlog and
//! yields one [`TaskInvocation`] per dispatchable ticket, in backlog
//! order. That order is the deterministic tie-break the engine uses when
//! merging join results. The dispatcher never mutates ticket status; the
//! engine advances status through executor deltas before the next
//! dispatch cycle can observe a ticket again.

use serde::{Deserialize, Serialize};

use crate::state::{AgentState, AgentStatus, ProjectState, Ticket, TicketStatus};

/// One independent unit of fan-out work: a copy of the ticket plus the
/// roster record of the agent slot assigned to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInvocation {
    pub ticket: Ticket,
    pub agent: AgentStatus,
}

/// Select all dispatchable tickets.
///
/// A ticket is dispatchable iff its effective status is `Draft` (not yet
/// claimed). Idle developer agents from the roster are assigned in
/// stable id order; when the roster runs out, synthetic `dev-N` slots
/// are minted by position so assignment stays deterministic. Roster
/// agents keep their real role and provider label on the invocation.
pub fn select(state: &ProjectState) -> Vec<TaskInvocation> {
    let mut idle: Vec<&AgentStatus> = state
        .agents
        .values()
        .filter(|a| a.state == AgentState::Idle && a.role.ends_with("developer"))
        .collect();
    idle.sort_unstable_by(|a, b| a.agent_id.cmp(&b.agent_id));

    let mut invocations = Vec::new();
    for ticket in &state.tickets {
        if state.effective_status(&ticket.id) != Some(TicketStatus::Draft) {
            continue;
        }
        let agent = match ticket.assigned_to.as_deref() {
            Some(id) => state
                .agents
                .get(id)
                .cloned()
                .unwrap_or_else(|| AgentStatus::idle(id, "developer", "capability")),
            None => idle
                .get(invocations.len())
                .map(|a| (*a).clone())
                .unwrap_or_else(|| {
                    AgentStatus::idle(
                        format!("dev-{}", invocations.len() + 1),
                        "developer",
                        "capability",
                    )
                }),
        };
        invocations.push(TaskInvocation {
            ticket: ticket.clone(),
            agent,
        });
    }
    invocations
}
