//! Routing decision applied after the sprint review stage.

use crate::state::{Phase, ProjectState};

/// Where the engine goes after `sprint_review`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Advance to the release stage.
    Release,
    /// Loop back to planning for another sprint.
    LoopPlanning,
    /// Terminate the run.
    Terminate,
}

/// Reads the phase set by the sprint review and picks the outgoing edge.
/// Any phase other than `release` or `planning` terminates the run.
pub fn route_after_sprint_review(state: &ProjectState) -> Route {
    match state.phase {
        Phase::Release => Route::Release,
        Phase::Planning => Route::LoopPlanning,
        _ => Route::Terminate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_phase(phase: Phase) -> ProjectState {
        let mut state = ProjectState::new("p", ".", "");
        state.phase = phase;
        state
    }

    #[test]
    fn release_phase_routes_to_release() {
        assert_eq!(
            route_after_sprint_review(&state_with_phase(Phase::Release)),
            Route::Release
        );
    }

    #[test]
    fn planning_phase_loops_back() {
        assert_eq!(
            route_after_sprint_review(&state_with_phase(Phase::Planning)),
            Route::LoopPlanning
        );
    }

    #[test]
    fn other_phases_terminate() {
        for phase in [Phase::Development, Phase::Review, Phase::Complete] {
            assert_eq!(
                route_after_sprint_review(&state_with_phase(phase)),
                Route::Terminate
            );
        }
    }
}
