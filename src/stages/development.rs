//! Development-phase stage: merging completed ticket branches.

use async_trait::async_trait;
use tracing::info;

use super::{StageContext, StageNode};
use crate::engine::graph::Stage;
use crate::git::MergeResult;
use crate::state::{Message, ProjectState, StateDelta, Ticket, TicketStatus};

/// Merges every completed ticket's branch into the base branch.
///
/// Conflicts are recorded and the source branch is left unmerged for
/// human/agent resolution; they are never silently discarded. A merged
/// branch's worktree is removed. Infrastructure failures (a repo that
/// cannot even be inspected) are stage failures and abort the run.
pub struct GitMergeNode;

impl GitMergeNode {
    fn mergeable<'a>(state: &'a ProjectState) -> Vec<&'a Ticket> {
        state
            .completed_tickets
            .iter()
            .filter(|t| {
                t.branch.is_some()
                    && state.effective_status(&t.id) == Some(TicketStatus::Review)
            })
            .collect()
    }
}

#[async_trait]
impl StageNode for GitMergeNode {
    fn stage(&self) -> Stage {
        Stage::GitMerge
    }

    async fn run(&self, ctx: &StageContext, state: &ProjectState) -> anyhow::Result<StateDelta> {
        let tickets = Self::mergeable(state);
        info!(count = tickets.len(), "merging completed ticket branches");

        let mut conflicts = Vec::new();
        let mut merged = Vec::new();
        let mut messages = Vec::new();
        let base = ctx.repo.base_branch().to_string();

        for ticket in tickets {
            let branch = ticket.branch.clone().unwrap_or_default();
            match ctx.repo.merge(&branch, &base).await? {
                MergeResult::Merged => {
                    ctx.repo.remove_worktree(&branch).await;
                    merged.push(branch.clone());
                }
                MergeResult::Conflict(info) => {
                    messages.push(Message::new(
                        "git_agent",
                        format!(
                            "merge of {} into {} conflicted on {} file(s)",
                            info.branch,
                            base,
                            info.files.len()
                        ),
                    ));
                    conflicts.push(info);
                }
            }
        }

        if !merged.is_empty() {
            messages.push(Message::new(
                "git_agent",
                format!("merged {} branch(es) into {}", merged.len(), base),
            ));
        }

        let branches = ctx.repo.list_branches().await?;
        let pending: Vec<String> = conflicts.iter().map(|c| c.branch.clone()).collect();

        Ok(StateDelta {
            branches: Some(branches),
            pending_merges: Some(pending),
            conflicts: Some(conflicts),
            messages,
            ..Default::default()
        })
    }
}
