//! Sprintflow - orchestration of a multi-phase software-delivery
//! workflow.
//!
//! A sprint advances a shared [`state::ProjectState`] through a fixed
//! stage graph (planning → development → review → release), fanning
//! per-ticket work out to concurrent task executors isolated in git
//! worktrees and merging their partial-state deltas back
//! deterministically. See the module docs on [`engine`], [`state`] and
//! [`git`] for the three load-bearing contracts: the run loop, the
//! reducers, and the repository isolation rules.

// Core infrastructure modules
pub mod core {
    pub mod errors;
}

pub mod capability;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod executor;
pub mod git;
pub mod persist;
pub mod stages;
pub mod state;
pub mod visibility;

// Re-exports for convenience
pub use core::errors::OrchestratorError;

pub use capability::CapabilityProvider;
pub use config::TeamConfig;
pub use dispatch::TaskInvocation;
pub use engine::{BufferingEventSink, EventSink, Stage, StageEvent, WorkflowEngine};
pub use executor::{TaskExecutor, WorktreeExecutor};
pub use git::{MergeResult, RepoManager};
pub use persist::SnapshotStore;
pub use stages::{ApprovalGate, AutoApprove, StageContext, StageNode};
pub use state::{
    merge, AgentState, AgentStatus, ConflictInfo, Message, Phase, ProjectState, StateDelta,
    Ticket, TicketKind, TicketStatus,
};
pub use visibility::{NullSurface, TmuxSurface, ViewSurface};
