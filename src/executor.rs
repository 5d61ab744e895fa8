//! Task executor: runs one ticket in isolation.
//!
//! Each invocation acquires its ticket's branch + worktree from the
//! repository manager before any file-affecting work happens; that is
//! the resource-isolation boundary that makes sibling invocations safe
//! to run concurrently. Executors never read shared state — they emit a
//! delta and the engine merges it after the join barrier.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::capability::CapabilityProvider;
use crate::dispatch::TaskInvocation;
use crate::git::RepoManager;
use crate::state::{AgentState, AgentStatus, Message, StateDelta, Ticket, TicketStatus};

#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Execute one unit of work. May run concurrently with any number of
    /// sibling invocations from the same join; must not touch another
    /// invocation's ticket.
    async fn execute(&self, invocation: TaskInvocation) -> anyhow::Result<StateDelta>;
}

/// Delta marking a ticket rejected with a diagnostic. Shared between the
/// executor's local failure handling and the engine's join recovery. The
/// agent record keeps its roster role and provider label.
pub fn rejection_delta(ticket: &Ticket, agent: &AgentStatus, reason: &str) -> StateDelta {
    let mut rejected = ticket.clone();
    rejected.status = TicketStatus::Rejected;
    rejected.assigned_to = Some(agent.agent_id.clone());
    rejected.updated_at = Utc::now();

    let mut errored = agent.clone();
    errored.state = AgentState::Error;
    errored.current_ticket = Some(ticket.id.clone());

    StateDelta {
        active_tickets: [(rejected.id.clone(), rejected.clone())].into(),
        agents: [(errored.agent_id.clone(), errored)].into(),
        messages: vec![Message::new(
            &agent.agent_id,
            format!("ticket {} ({}) rejected: {reason}", rejected.id, rejected.title),
        )],
        ..Default::default()
    }
}

/// The default executor: per-ticket git worktree plus one capability
/// call that performs the actual work.
pub struct WorktreeExecutor {
    repo: Arc<RepoManager>,
    provider: Arc<dyn CapabilityProvider>,
}

impl WorktreeExecutor {
    pub fn new(repo: Arc<RepoManager>, provider: Arc<dyn CapabilityProvider>) -> Self {
        Self { repo, provider }
    }

    async fn run_ticket(&self, ticket: &mut Ticket, agent_id: &str) -> anyhow::Result<String> {
        let branch = ticket.branch_name();
        let worktree = self.repo.create_worktree(&branch).await?;
        ticket.branch = Some(branch.clone());

        info!(
            ticket = %ticket.id,
            branch,
            agent = agent_id,
            "agent working on ticket"
        );

        let prompt = format!(
            "Implement ticket '{}' ({}).\n{}\nWork in the isolated checkout at {} on branch {}.",
            ticket.title,
            ticket.kind.as_str(),
            ticket.description,
            worktree.display(),
            branch,
        );
        self.provider
            .complete(
                "You are a software developer completing a single ticket in an isolated git checkout.",
                &prompt,
            )
            .await
    }
}

#[async_trait]
impl TaskExecutor for WorktreeExecutor {
    async fn execute(&self, invocation: TaskInvocation) -> anyhow::Result<StateDelta> {
        let TaskInvocation { ticket, agent } = invocation;
        let mut updated = ticket.clone();

        match self.run_ticket(&mut updated, &agent.agent_id).await {
            Ok(summary) => {
                updated.status = TicketStatus::Review;
                updated.assigned_to = Some(agent.agent_id.clone());
                updated.updated_at = Utc::now();

                let mut finished = agent.clone();
                finished.state = AgentState::Done;
                finished.current_ticket = Some(updated.id.clone());

                Ok(StateDelta {
                    completed_tickets: vec![updated.clone()],
                    active_tickets: [(updated.id.clone(), updated.clone())].into(),
                    agents: [(agent.agent_id.clone(), finished)].into(),
                    messages: vec![Message::new(
                        &agent.agent_id,
                        format!("completed ticket {} ({}): {summary}", updated.id, updated.title),
                    )],
                    ..Default::default()
                })
            }
            Err(err) => {
                // Task failures are recovered locally: the ticket is
                // rejected, the join continues with the siblings.
                warn!(ticket = %ticket.id, agent = %agent.agent_id, %err, "ticket execution failed");
                Ok(rejection_delta(&ticket, &agent, &err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{FailingProvider, StaticProvider};
    use crate::state::TicketKind;
    use std::path::Path;
    use std::process::Command as StdCommand;
    use tempfile::TempDir;

    fn run_git(dir: &Path, args: &[&str]) {
        let status = StdCommand::new("git")
            .args(args)
            .current_dir(dir)
            .status()
            .expect("failed to run git");
        assert!(status.success());
    }

    fn init_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        run_git(dir.path(), &["init", "--quiet"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["config", "user.name", "Test"]);
        run_git(dir.path(), &["checkout", "-b", "main"]);
        std::fs::write(dir.path().join("README.md"), "hello\n").unwrap();
        run_git(dir.path(), &["add", "."]);
        run_git(dir.path(), &["commit", "--quiet", "-m", "initial"]);
        dir
    }

    #[tokio::test]
    async fn success_advances_ticket_to_review() {
        let dir = init_repo();
        let repo = Arc::new(RepoManager::new(dir.path(), "main"));
        let executor =
            WorktreeExecutor::new(Arc::clone(&repo), Arc::new(StaticProvider::new("done")));

        let ticket = Ticket::new("Add API", "basic endpoints", TicketKind::Feature);
        let id = ticket.id.clone();
        let delta = executor
            .execute(TaskInvocation {
                ticket,
                agent: AgentStatus::idle("dev-1", "backend_developer", "anthropic"),
            })
            .await
            .unwrap();

        assert_eq!(delta.completed_tickets.len(), 1);
        let done = &delta.completed_tickets[0];
        assert_eq!(done.status, TicketStatus::Review);
        assert_eq!(done.branch.as_deref(), Some(format!("feature/{id}").as_str()));
        assert_eq!(delta.active_tickets[&id].status, TicketStatus::Review);
        assert_eq!(delta.agents["dev-1"].state, AgentState::Done);
        // The roster record's role and provider survive the update.
        assert_eq!(delta.agents["dev-1"].role, "backend_developer");
        assert_eq!(delta.agents["dev-1"].provider, "anthropic");
        assert!(repo.worktree_path(&format!("feature/{id}")).exists());
    }

    #[tokio::test]
    async fn failure_rejects_ticket_with_diagnostic() {
        let dir = init_repo();
        let repo = Arc::new(RepoManager::new(dir.path(), "main"));
        let executor = WorktreeExecutor::new(repo, Arc::new(FailingProvider));

        let ticket = Ticket::new("Doomed", "", TicketKind::Bug);
        let id = ticket.id.clone();
        let delta = executor
            .execute(TaskInvocation {
                ticket,
                agent: AgentStatus::idle("dev-1", "ui_developer", "anthropic"),
            })
            .await
            .unwrap();

        assert!(delta.completed_tickets.is_empty());
        assert_eq!(delta.active_tickets[&id].status, TicketStatus::Rejected);
        assert_eq!(delta.agents["dev-1"].state, AgentState::Error);
        assert_eq!(delta.agents["dev-1"].role, "ui_developer");
        assert_eq!(delta.agents["dev-1"].provider, "anthropic");
        assert!(delta.messages[0].content.contains("rejected"));
    }
}
