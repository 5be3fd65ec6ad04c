//! Workflow runs: request types, wire events and the step tracker

pub mod event;
pub mod model;
pub mod tracker;
pub mod types;

pub use event::{parse_event, ParseOutcome, StreamEvent, CONNECTION_FAILED_MESSAGE};
pub use model::{PlanProgress, RunModel, RunResults, SourceRef, StepRecord};
pub use tracker::{plan_template, StepShape, StepTracker, CANCELLED_MESSAGE};
pub use types::{Phase, RunRequest, StepId, Tool, WorkflowKind};
