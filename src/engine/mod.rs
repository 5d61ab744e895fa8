//! Workflow graph engine: the stage graph, the router, the event
//! stream, and the run loop.

pub mod events;
pub mod graph;
pub mod router;
pub mod runner;

pub use events::{BufferingEventSink, EventSink, LoggingEventSink, StageEvent};
pub use graph::{Stage, StageGraph};
pub use router::{route_after_sprint_review, Route};
pub use runner::WorkflowEngine;
