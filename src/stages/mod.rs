//! Stage node contract and the default sprint stage set.
//!
//! A stage node is a pure function of the current project state: it
//! reads the state, does its work through the context's collaborators,
//! and returns a partial-state delta. Only the engine merges deltas.

use async_trait::async_trait;
use std::sync::Arc;

use crate::capability::CapabilityProvider;
use crate::config::TeamConfig;
use crate::engine::graph::Stage;
use crate::git::RepoManager;
use crate::state::{ProjectState, StateDelta};

mod development;
mod planning;
mod review;

pub use development::GitMergeNode;
pub use planning::{ArchitectNode, ProductOwnerNode, UserApprovalNode};
pub use review::{ReleaseNode, ReviewerNode, SprintReviewNode, TesterNode};

/// Collaborators available to stage nodes, constructed once by the
/// run's composition root and injected into the engine.
pub struct StageContext {
    pub config: TeamConfig,
    pub capability: Arc<dyn CapabilityProvider>,
    pub repo: Arc<RepoManager>,
    pub approval: Arc<dyn ApprovalGate>,
}

#[async_trait]
pub trait StageNode: Send + Sync {
    fn stage(&self) -> Stage;

    /// Produce this stage's delta. An `Err` here is a stage failure:
    /// fatal to the run, recorded by the engine, never retried.
    async fn run(&self, ctx: &StageContext, state: &ProjectState) -> anyhow::Result<StateDelta>;
}

/// Decides whether the plan is approved at the `user_approval` stage.
/// Hosts wanting a human in the loop implement this against their own
/// channel; the default approves unconditionally.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn approve(&self, state: &ProjectState) -> anyhow::Result<bool>;
}

pub struct AutoApprove;

#[async_trait]
impl ApprovalGate for AutoApprove {
    async fn approve(&self, _state: &ProjectState) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// The full sprint stage set, one node per graph stage.
pub fn default_stage_nodes() -> Vec<Arc<dyn StageNode>> {
    vec![
        Arc::new(ProductOwnerNode),
        Arc::new(ArchitectNode),
        Arc::new(UserApprovalNode),
        Arc::new(GitMergeNode),
        Arc::new(TesterNode),
        Arc::new(ReviewerNode),
        Arc::new(SprintReviewNode),
        Arc::new(ReleaseNode),
    ]
}
