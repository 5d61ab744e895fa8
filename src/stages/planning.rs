//! Planning stages: product owner analysis, architecture breakdown,
//! plan approval.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tracing::{info, warn};

use super::{StageContext, StageNode};
use crate::capability::complete_or_fallback;
use crate::engine::graph::Stage;
use crate::state::{
    Message, ProjectState, StateDelta, Ticket, TicketKind, TicketStatus,
};

const PO_ROLE: &str =
    "You are an expert Product Owner. Analyze requirements and break them down into user stories.";
const ARCHITECT_ROLE: &str = "You are a software architect. Produce a sprint ticket breakdown, \
     one ticket per line in the form `kind: title | description` where kind is feature, bug or chore.";

/// Analyzes the requirements through the capability provider and logs
/// the analysis. Provider failures degrade to a placeholder so the
/// stage always yields a valid delta.
pub struct ProductOwnerNode;

#[async_trait]
impl StageNode for ProductOwnerNode {
    fn stage(&self) -> Stage {
        Stage::ProductOwner
    }

    async fn run(&self, ctx: &StageContext, state: &ProjectState) -> anyhow::Result<StateDelta> {
        info!(sprint = state.sprint_number, "product owner analyzing requirements");

        let role = ctx
            .config
            .role_description("product_owner")
            .unwrap_or(PO_ROLE);
        let input = format!("Analyze these requirements:\n{}", state.requirements);
        let sprint = state.sprint_number;
        let content = complete_or_fallback(&*ctx.capability, role, &input, || {
            format!("Requirements noted; proceeding with sprint {sprint} planning.")
        })
        .await;

        Ok(StateDelta::message("product_owner", content))
    }
}

/// Turns the requirements into a draft ticket backlog and a technical
/// spec. On loop-back sprints it reopens rejected tickets instead of
/// inventing new work; remaining draft tickets simply carry over.
pub struct ArchitectNode;

impl ArchitectNode {
    fn parse_ticket_lines(text: &str) -> Vec<Ticket> {
        let mut tickets = Vec::new();
        for line in text.lines() {
            let line = line.trim().trim_start_matches(['-', '*']).trim();
            let Some((kind_raw, rest)) = line.split_once(':') else {
                continue;
            };
            let kind = match kind_raw.trim().to_ascii_lowercase().as_str() {
                "feature" => TicketKind::Feature,
                "bug" => TicketKind::Bug,
                "chore" => TicketKind::Chore,
                _ => continue,
            };
            let (title, description) = match rest.split_once('|') {
                Some((t, d)) => (t.trim(), d.trim()),
                None => (rest.trim(), ""),
            };
            if title.is_empty() {
                continue;
            }
            tickets.push(Ticket::new(title, description, kind));
        }
        tickets
    }

    fn fallback_backlog() -> Vec<Ticket> {
        vec![
            Ticket::new(
                "Set up project structure",
                "Initialize repository and basic structure",
                TicketKind::Chore,
            ),
            Ticket::new(
                "Implement core API",
                "Create the basic service endpoints",
                TicketKind::Feature,
            ),
        ]
    }

    /// Fresh draft tickets for work that was rejected last sprint,
    /// paired with the retired revision of each original entry. New ids:
    /// the backlog is append-only and must never see a duplicate. A
    /// rejected entry is reopened at most once — the retired revision
    /// records its replacement's id and drops the entry out of sprint
    /// accounting and future reopens.
    fn reopened_tickets(state: &ProjectState) -> (Vec<Ticket>, HashMap<String, Ticket>) {
        let mut reopened = Vec::new();
        let mut retired = HashMap::new();
        for ticket in &state.tickets {
            if state.effective_status(&ticket.id) != Some(TicketStatus::Rejected) {
                continue;
            }
            let current = match state.ticket(&ticket.id) {
                Some(t) if t.superseded_by.is_none() => t.clone(),
                _ => continue,
            };

            let mut fresh = Ticket::new(
                ticket.title.clone(),
                format!(
                    "{} (reopened after sprint {})",
                    ticket.description,
                    state.sprint_number - 1
                ),
                ticket.kind,
            );
            fresh.dependencies = ticket.dependencies.clone();

            let mut superseded = current;
            superseded.superseded_by = Some(fresh.id.clone());
            superseded.updated_at = Utc::now();
            retired.insert(superseded.id.clone(), superseded);

            reopened.push(fresh);
        }
        (reopened, retired)
    }
}

#[async_trait]
impl StageNode for ArchitectNode {
    fn stage(&self) -> Stage {
        Stage::Architect
    }

    async fn run(&self, ctx: &StageContext, state: &ProjectState) -> anyhow::Result<StateDelta> {
        info!(sprint = state.sprint_number, "architect designing sprint backlog");

        let mut delta = StateDelta {
            plan_approved: Some(false),
            ..Default::default()
        };

        if state.tickets.is_empty() {
            let role = ctx
                .config
                .role_description("architect")
                .unwrap_or(ARCHITECT_ROLE);
            let input = format!(
                "Break these requirements into sprint tickets:\n{}",
                state.requirements
            );
            let breakdown = match ctx.capability.complete(role, &input).await {
                Ok(text) => {
                    let parsed = Self::parse_ticket_lines(&text);
                    if parsed.is_empty() {
                        warn!("architect breakdown produced no parseable tickets, using fallback backlog");
                        delta.tickets = Self::fallback_backlog();
                    } else {
                        delta.tickets = parsed;
                    }
                    text
                }
                Err(err) => {
                    warn!(%err, "architect capability call failed, using fallback backlog");
                    delta.tickets = Self::fallback_backlog();
                    "Fallback plan: scaffold the project, then build the core API.".to_string()
                }
            };
            delta.technical_spec = Some(breakdown);
        } else {
            let (reopened, retired) = Self::reopened_tickets(state);
            delta.messages.push(Message::new(
                "architect",
                format!(
                    "carrying backlog into sprint {} ({} reopened)",
                    state.sprint_number,
                    reopened.len()
                ),
            ));
            delta.tickets = reopened;
            delta.active_tickets = retired;
        }

        Ok(delta)
    }
}

/// Gate the plan on the injected approval policy.
pub struct UserApprovalNode;

#[async_trait]
impl StageNode for UserApprovalNode {
    fn stage(&self) -> Stage {
        Stage::UserApproval
    }

    async fn run(&self, ctx: &StageContext, state: &ProjectState) -> anyhow::Result<StateDelta> {
        let approved = ctx.approval.approve(state).await?;
        info!(approved, "plan approval decided");
        let mut delta = StateDelta {
            plan_approved: Some(approved),
            ..Default::default()
        };
        if !approved {
            delta
                .messages
                .push(Message::new("user", "plan not approved"));
        }
        Ok(delta)
    }
}
