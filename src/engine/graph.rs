//! The fixed sprint stage graph.
//!
//! Stages are nodes in a small directed graph:
//! `product_owner → architect → user_approval → dispatch → git_merge →
//! tester → reviewer → sprint_review → {release | product_owner | end}`.
//! The fan-out to per-ticket agent work happens inside the engine at the
//! `dispatch` node; it is not a graph node of its own. Routed edges out
//! of `sprint_review` are chosen by the router, never followed blindly.

use anyhow::{anyhow, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, EdgeRef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ProductOwner,
    Architect,
    UserApproval,
    Dispatch,
    GitMerge,
    Tester,
    Reviewer,
    SprintReview,
    Release,
}

impl Stage {
    pub const ALL: [Stage; 9] = [
        Stage::ProductOwner,
        Stage::Architect,
        Stage::UserApproval,
        Stage::Dispatch,
        Stage::GitMerge,
        Stage::Tester,
        Stage::Reviewer,
        Stage::SprintReview,
        Stage::Release,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ProductOwner => "product_owner",
            Stage::Architect => "architect",
            Stage::UserApproval => "user_approval",
            Stage::Dispatch => "dispatch",
            Stage::GitMerge => "git_merge",
            Stage::Tester => "tester",
            Stage::Reviewer => "reviewer",
            Stage::SprintReview => "sprint_review",
            Stage::Release => "release",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Edge classification: `Direct` edges are followed unconditionally,
/// `Routed` edges are candidates the router picks between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Direct,
    Routed,
}

pub struct StageGraph {
    graph: DiGraph<Stage, EdgeKind>,
    index: HashMap<Stage, NodeIndex>,
}

impl StageGraph {
    /// The sprint workflow graph.
    pub fn sprint() -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        for stage in Stage::ALL {
            index.insert(stage, graph.add_node(stage));
        }

        let direct = [
            (Stage::ProductOwner, Stage::Architect),
            (Stage::Architect, Stage::UserApproval),
            (Stage::UserApproval, Stage::Dispatch),
            (Stage::Dispatch, Stage::GitMerge),
            (Stage::GitMerge, Stage::Tester),
            (Stage::Tester, Stage::Reviewer),
            (Stage::Reviewer, Stage::SprintReview),
        ];
        for (from, to) in direct {
            graph.add_edge(index[&from], index[&to], EdgeKind::Direct);
        }

        // Loop-back and release edges are router-chosen.
        graph.add_edge(
            index[&Stage::SprintReview],
            index[&Stage::Release],
            EdgeKind::Routed,
        );
        graph.add_edge(
            index[&Stage::SprintReview],
            index[&Stage::ProductOwner],
            EdgeKind::Routed,
        );

        Self { graph, index }
    }

    pub fn entry(&self) -> Stage {
        Stage::ProductOwner
    }

    /// The single unconditional successor of a stage, if any.
    pub fn next_after(&self, stage: Stage) -> Option<Stage> {
        let idx = self.index[&stage];
        self.graph
            .edges(idx)
            .find(|e| *e.weight() == EdgeKind::Direct)
            .map(|e| self.graph[e.target()])
    }

    /// Stages reachable through routed edges out of `stage`.
    pub fn routed_targets(&self, stage: Stage) -> Vec<Stage> {
        let idx = self.index[&stage];
        self.graph
            .edges(idx)
            .filter(|e| *e.weight() == EdgeKind::Routed)
            .map(|e| self.graph[e.target()])
            .collect()
    }

    /// Structural checks: exactly one direct successor per non-terminal
    /// stage, router targets present on `sprint_review`, and every stage
    /// reachable from the entry point.
    pub fn validate(&self) -> Result<()> {
        for stage in Stage::ALL {
            let idx = self.index[&stage];
            let direct = self
                .graph
                .edges(idx)
                .filter(|e| *e.weight() == EdgeKind::Direct)
                .count();
            match stage {
                Stage::SprintReview | Stage::Release => {
                    if direct != 0 {
                        return Err(anyhow!(
                            "stage '{stage}' must not have a direct successor"
                        ));
                    }
                }
                _ => {
                    if direct != 1 {
                        return Err(anyhow!(
                            "stage '{stage}' must have exactly one direct successor, found {direct}"
                        ));
                    }
                }
            }
        }

        let routed = self.routed_targets(Stage::SprintReview);
        if !routed.contains(&Stage::Release) || !routed.contains(&Stage::ProductOwner) {
            return Err(anyhow!(
                "sprint_review must route to both release and product_owner"
            ));
        }

        let mut seen = 0usize;
        let mut bfs = Bfs::new(&self.graph, self.index[&self.entry()]);
        while bfs.next(&self.graph).is_some() {
            seen += 1;
        }
        if seen != Stage::ALL.len() {
            return Err(anyhow!(
                "unreachable stages in workflow graph ({seen} of {} reachable)",
                Stage::ALL.len()
            ));
        }

        Ok(())
    }
}

impl Default for StageGraph {
    fn default() -> Self {
        Self::sprint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sprint_graph_validates() {
        StageGraph::sprint().validate().unwrap();
    }

    #[test]
    fn direct_path_runs_planning_to_sprint_review() {
        let graph = StageGraph::sprint();
        let mut order = vec![graph.entry()];
        while let Some(next) = graph.next_after(*order.last().unwrap()) {
            order.push(next);
        }
        assert_eq!(
            order,
            vec![
                Stage::ProductOwner,
                Stage::Architect,
                Stage::UserApproval,
                Stage::Dispatch,
                Stage::GitMerge,
                Stage::Tester,
                Stage::Reviewer,
                Stage::SprintReview,
            ]
        );
    }

    #[test]
    fn sprint_review_routes_to_release_and_loop() {
        let graph = StageGraph::sprint();
        let mut targets = graph.routed_targets(Stage::SprintReview);
        targets.sort_by_key(|s| s.as_str());
        assert_eq!(targets, vec![Stage::ProductOwner, Stage::Release]);
        assert!(graph.next_after(Stage::Release).is_none());
    }
}
