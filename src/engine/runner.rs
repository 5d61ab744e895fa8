//! The workflow engine: drives the stage graph, fans work out at the
//! dispatch stage, joins and merges results, routes after sprint review.
//!
//! The engine is single-threaded at the stage level. Within one dispatch
//! cycle it is data-parallel: every invocation runs as its own tokio
//! task, the engine blocks until all of them finish, and deltas merge in
//! invocation order so ties break deterministically. No partial progress
//! is published before the join barrier.

use anyhow::{anyhow, Result};
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::dispatch::{self, TaskInvocation};
use crate::engine::events::{next_sequence, now_ms, EventSink, StageEvent};
use crate::engine::graph::{Stage, StageGraph};
use crate::engine::router::{route_after_sprint_review, Route};
use crate::executor::{rejection_delta, TaskExecutor};
use crate::persist::SnapshotStore;
use crate::stages::{default_stage_nodes, StageContext, StageNode};
use crate::state::{
    merge, short_id, AgentState, Message, ProjectState, StateDelta, TicketStatus,
};
use crate::visibility::{NullSurface, ViewSurface};

pub struct WorkflowEngine {
    graph: StageGraph,
    nodes: HashMap<Stage, Arc<dyn StageNode>>,
    ctx: StageContext,
    executor: Arc<dyn TaskExecutor>,
    snapshots: Option<SnapshotStore>,
    sinks: Vec<Arc<dyn EventSink>>,
    view: Arc<dyn ViewSurface>,
    broadcast: async_broadcast::Sender<StageEvent>,
    subscribers: async_broadcast::InactiveReceiver<StageEvent>,
    run_id: String,
}

impl WorkflowEngine {
    pub fn new(ctx: StageContext, executor: Arc<dyn TaskExecutor>) -> Result<Self> {
        let graph = StageGraph::sprint();
        graph.validate()?;

        let mut nodes: HashMap<Stage, Arc<dyn StageNode>> = HashMap::new();
        for node in default_stage_nodes() {
            nodes.insert(node.stage(), node);
        }

        let (mut tx, rx) = async_broadcast::broadcast(256);
        tx.set_overflow(true);

        Ok(Self {
            graph,
            nodes,
            ctx,
            executor,
            snapshots: None,
            sinks: Vec::new(),
            view: Arc::new(NullSurface),
            broadcast: tx,
            subscribers: rx.deactivate(),
            run_id: short_id(),
        })
    }

    /// Snapshot the state after every merged stage.
    pub fn with_snapshots(mut self, store: SnapshotStore) -> Self {
        self.snapshots = Some(store);
        self
    }

    pub fn with_view(mut self, view: Arc<dyn ViewSurface>) -> Self {
        self.view = view;
        self
    }

    /// Replace the node for one stage. Mostly useful for hosts that
    /// plug in their own strategy behind the same contract.
    pub fn with_node(mut self, node: Arc<dyn StageNode>) -> Self {
        self.nodes.insert(node.stage(), node);
        self
    }

    pub fn add_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    /// Live stream of `(stage, delta)` events, in emission order.
    pub fn subscribe(&self) -> async_broadcast::Receiver<StageEvent> {
        self.subscribers.activate_cloned()
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Restore the last snapshot if one exists, otherwise use `fresh`.
    pub async fn resume_or_start(&self, fresh: ProjectState) -> ProjectState {
        match &self.snapshots {
            Some(store) => store.load().await.unwrap_or(fresh),
            None => fresh,
        }
    }

    /// Drive the workflow from `initial` to a terminal state.
    pub async fn run(&self, initial: ProjectState) -> Result<ProjectState> {
        let mut state = initial;
        info!(
            run_id = %self.run_id,
            project = %state.project_name,
            sprint = state.sprint_number,
            "starting sprint workflow"
        );

        if let Err(err) = self.view.ensure_surfaces(&self.ctx.config.roles()).await {
            warn!(%err, "visibility surfaces unavailable, continuing headless");
        }

        let mut stage = self.graph.entry();
        loop {
            let delta = match stage {
                Stage::Dispatch => self.run_dispatch_cycle(&state).await?,
                _ => {
                    let node = self
                        .nodes
                        .get(&stage)
                        .ok_or_else(|| anyhow!("no node registered for stage '{stage}'"))?;
                    node.run(&self.ctx, &state).await.map_err(|err| {
                        error!(stage = %stage, %err, "stage failed, aborting run");
                        err.context(format!("stage '{stage}' failed"))
                    })?
                }
            };

            state = merge(state, delta.clone());
            self.emit(stage, delta, state.sprint_number);
            self.snapshot(&state).await;

            if stage == Stage::Release {
                break;
            }
            if stage == Stage::SprintReview {
                match route_after_sprint_review(&state) {
                    Route::Release => {
                        stage = Stage::Release;
                        continue;
                    }
                    Route::LoopPlanning => {
                        if state.sprint_number >= self.ctx.config.max_sprints {
                            warn!(
                                sprint = state.sprint_number,
                                "sprint budget exhausted, terminating"
                            );
                            break;
                        }
                        let bump = StateDelta {
                            sprint_number: Some(state.sprint_number + 1),
                            ..Default::default()
                        };
                        state = merge(state, bump);
                        debug!(sprint = state.sprint_number, "looping back to planning");
                        stage = self.graph.entry();
                        continue;
                    }
                    Route::Terminate => break,
                }
            }

            stage = self
                .graph
                .next_after(stage)
                .ok_or_else(|| anyhow!("stage '{stage}' has no successor"))?;
        }

        self.snapshot(&state).await;
        info!(
            run_id = %self.run_id,
            phase = state.phase.as_str(),
            sprint = state.sprint_number,
            "workflow finished"
        );
        Ok(state)
    }

    /// One fan-out cycle: select, claim, execute all invocations
    /// concurrently, join, and fold the results in invocation order.
    ///
    /// A single failed invocation does not abort its siblings: it
    /// degrades to a rejection delta and the join carries on. The claim
    /// portion of the returned delta advances every dispatched ticket to
    /// a non-draft status, so the next dispatch cycle can never select
    /// it again.
    async fn run_dispatch_cycle(&self, state: &ProjectState) -> Result<StateDelta> {
        let invocations = dispatch::select(state);
        info!(
            count = invocations.len(),
            sprint = state.sprint_number,
            "dispatching agents"
        );
        if invocations.is_empty() {
            return Ok(StateDelta::message("dispatch", "no dispatchable tickets"));
        }

        let claim = self.claim_delta(state, &invocations);

        let mut handles = Vec::with_capacity(invocations.len());
        for invocation in &invocations {
            let executor = Arc::clone(&self.executor);
            // Hand the executor the claimed revision so its delta builds
            // on the in-progress ticket.
            let mut task_invocation = invocation.clone();
            if let Some(claimed) = claim.active_tickets.get(&invocation.ticket.id) {
                task_invocation.ticket = claimed.clone();
            }
            handles.push(tokio::spawn(async move {
                executor.execute(task_invocation).await
            }));
        }

        // Join barrier: results come back in invocation order regardless
        // of which task finishes first.
        let results = join_all(handles).await;

        let mut joined = StateDelta::default();
        let mut failures = 0usize;
        for (invocation, result) in invocations.iter().zip(results) {
            let delta = match result {
                Ok(Ok(delta)) => delta,
                Ok(Err(err)) => {
                    failures += 1;
                    warn!(ticket = %invocation.ticket.id, %err, "task invocation failed");
                    rejection_delta(&invocation.ticket, &invocation.agent, &err.to_string())
                }
                Err(join_err) => {
                    failures += 1;
                    error!(ticket = %invocation.ticket.id, %join_err, "task invocation panicked");
                    rejection_delta(
                        &invocation.ticket,
                        &invocation.agent,
                        &format!("task panicked: {join_err}"),
                    )
                }
            };
            joined = joined.absorb(delta);
        }

        if failures > 0 {
            joined.messages.push(Message::new(
                "dispatch",
                format!("{failures} task(s) failed; join continued with partial results"),
            ));
        }

        Ok(claim.absorb(joined))
    }

    /// Mark every selected ticket in-progress and its agent working.
    fn claim_delta(&self, state: &ProjectState, invocations: &[TaskInvocation]) -> StateDelta {
        let mut claim = StateDelta::default();
        for invocation in invocations {
            let mut ticket = invocation.ticket.clone();
            ticket.status = TicketStatus::InProgress;
            ticket.assigned_to = Some(invocation.agent.agent_id.clone());
            ticket.branch = Some(ticket.branch_name());
            ticket.updated_at = Utc::now();

            let mut agent = state
                .agents
                .get(&invocation.agent.agent_id)
                .cloned()
                .unwrap_or_else(|| {
                    // Synthetic slots minted by the dispatcher take the
                    // run's provider label.
                    let mut minted = invocation.agent.clone();
                    minted.provider = self.provider_label().to_string();
                    minted
                });
            agent.state = AgentState::Working;
            agent.current_ticket = Some(ticket.id.clone());

            claim.active_tickets.insert(ticket.id.clone(), ticket);
            claim.agents.insert(invocation.agent.agent_id.clone(), agent);
        }
        claim
    }

    fn provider_label(&self) -> &str {
        self.ctx.capability.name()
    }

    fn emit(&self, stage: Stage, delta: StateDelta, sprint: u32) {
        let event = StageEvent {
            sequence: next_sequence(),
            run_id: self.run_id.clone(),
            sprint,
            stage: stage.as_str().to_string(),
            timestamp: now_ms(),
            delta,
        };
        for sink in &self.sinks {
            sink.emit(&event);
        }
        // Lossy towards slow observers; correctness never depends on the
        // event stream.
        let _ = self.broadcast.try_broadcast(event);
    }

    async fn snapshot(&self, state: &ProjectState) {
        if let Some(store) = &self.snapshots {
            if let Err(err) = store.save(state).await {
                warn!(%err, "snapshot save failed, continuing with in-memory state");
            }
        }
    }
}
