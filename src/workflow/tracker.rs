//! Step Tracker
//!
//! Deterministic reducer from stream events to a [`RunModel`]. One generic
//! tracker serves every workflow kind; the kind's [`StepShape`] decides how
//! `step_complete` payloads are stored.
//!
//! The reducer is synchronous and never reorders or drops events: callers feed
//! it once per observed event, in arrival order.

use serde_json::Value;
use tracing::{debug, warn};

use super::event::StreamEvent;
use super::model::{value_text, PlanProgress, RunModel, RunResults, StepRecord};
use super::types::{Phase, RunRequest, StepId, WorkflowKind};
use crate::error::{Failure, FailureKind};

/// Message recorded when the user cancels a run
pub const CANCELLED_MESSAGE: &str = "Workflow cancelled by user";

/// Orchestration roster used when no `plan` payload arrives first
const PLAN_TEMPLATE: [&str; 4] = [
    "Plan the research approach",
    "Research the topic",
    "Write the report",
    "Edit and refine the report",
];

/// How a workflow kind lays out its steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepShape {
    /// Fixed stages, each stored under a result field
    Named {
        stages: &'static [&'static str],
        /// (step identifier, result field) pairs; aliases share a field
        fields: &'static [(&'static str, &'static str)],
    },
    /// Numbered steps from a dynamic plan
    Numbered,
}

impl StepShape {
    pub fn for_kind(kind: WorkflowKind) -> Self {
        match kind {
            WorkflowKind::Reflection => StepShape::Named {
                stages: &["draft", "reflection", "revision"],
                fields: &[
                    ("draft", "draft"),
                    ("reflection", "reflection"),
                    ("revised", "revised"),
                    ("revision", "revised"),
                ],
            },
            WorkflowKind::ToolResearch => StepShape::Named {
                stages: &["research"],
                fields: &[("research", "research")],
            },
            WorkflowKind::MultiAgent => StepShape::Numbered,
        }
    }

    /// Progress stages in execution order; empty for numbered plans
    pub fn stages(&self) -> &'static [&'static str] {
        match self {
            StepShape::Named { stages, .. } => stages,
            StepShape::Numbered => &[],
        }
    }

    /// Result field for a named step identifier
    pub fn field_for(&self, step: &str) -> Option<&'static str> {
        match self {
            StepShape::Named { fields, .. } => fields
                .iter()
                .find(|(id, _)| *id == step)
                .map(|(_, field)| *field),
            StepShape::Numbered => None,
        }
    }
}

/// Fixed plan of `max_steps` descriptions
pub fn plan_template(max_steps: u8) -> Vec<String> {
    (0..max_steps as usize)
        .map(|i| match PLAN_TEMPLATE.get(i) {
            Some(step) => step.to_string(),
            None => format!("Additional step {}", i + 1),
        })
        .collect()
}

/// Reducer over stream events
pub struct StepTracker;

impl StepTracker {
    /// Apply one event. Terminal models are returned unchanged.
    pub fn reduce(mut model: RunModel, event: &StreamEvent) -> RunModel {
        if model.phase.is_terminal() {
            debug!(
                "[StepTracker] Ignoring {} after {} phase",
                event.type_name(),
                model.phase.as_str()
            );
            return model;
        }

        match event {
            StreamEvent::Start => {
                if matches!(model.phase, Phase::Running { .. }) {
                    warn!("[StepTracker] Duplicate start event, resetting run model");
                }
                let mut fresh = RunModel::new(model.request);
                fresh.phase = Phase::Running { current_step: None };
                fresh
            }
            StreamEvent::Progress { step, message } => {
                if model.phase == Phase::Idle {
                    warn!(step = %step, "[StepTracker] progress before start ignored");
                    return model;
                }
                let step = normalize_step(model.kind(), step);
                model.phase = Phase::Running {
                    current_step: Some(step),
                };
                model.progress_message = Some(message.clone());
                model
            }
            StreamEvent::StepComplete { step, data } => {
                if model.phase == Phase::Idle {
                    warn!(step = %step, "[StepTracker] step_complete before start ignored");
                    return model;
                }
                apply_step_complete(&mut model, step, data);
                model.progress_message = None;
                model
            }
            StreamEvent::Complete => {
                model.phase = Phase::Completed;
                model.progress_message = None;
                model
            }
            StreamEvent::Error { message, transport } => {
                let kind = if *transport {
                    FailureKind::Connection
                } else {
                    FailureKind::Protocol
                };
                model.phase = Phase::Failed;
                model.progress_message = None;
                model.failure = Some(Failure {
                    kind,
                    message: message.clone(),
                });
                model
            }
            StreamEvent::CacheHit { data } => {
                let mut filled = RunModel::new(model.request);
                populate_from_cache(&mut filled, data);
                filled.cache_hit = true;
                filled.phase = Phase::Completed;
                filled
            }
        }
    }

    /// Local-only user cancellation
    pub fn cancel(mut model: RunModel) -> RunModel {
        if model.phase.is_terminal() {
            return model;
        }
        model.phase = Phase::Cancelled;
        model.progress_message = None;
        model.failure = Some(Failure {
            kind: FailureKind::Cancelled,
            message: CANCELLED_MESSAGE.to_string(),
        });
        model
    }

    /// Fold a whole event log from the initial model
    pub fn replay<'a, I>(request: RunRequest, events: I) -> RunModel
    where
        I: IntoIterator<Item = &'a StreamEvent>,
    {
        events
            .into_iter()
            .fold(RunModel::new(request), |model, event| Self::reduce(model, event))
    }
}

/// Multi-agent steps are numeric; everything else keeps its name
fn normalize_step(kind: WorkflowKind, step: &StepId) -> StepId {
    match (kind, step.index()) {
        (WorkflowKind::MultiAgent, Some(n)) => StepId::Index(n),
        _ => step.clone(),
    }
}

fn apply_step_complete(model: &mut RunModel, step: &StepId, data: &Value) {
    let shape = StepShape::for_kind(model.kind());
    let max_steps = model.request.max_steps;

    match &mut model.results {
        RunResults::Staged { fields } => {
            let field = match step {
                StepId::Named(name) => shape.field_for(name),
                StepId::Index(_) => None,
            };
            match field {
                Some(field) => {
                    fields.insert(field.to_string(), data.clone());
                }
                None => store_unknown(&mut model.extra, step, data),
            }
        }
        RunResults::Planned(progress) => match step.index() {
            Some(index) => record_numbered_step(progress, index, data, max_steps),
            None => match step {
                StepId::Named(name) if name == "plan" => apply_plan_payload(progress, data),
                StepId::Named(name) if name == "final" => apply_final_payload(progress, data),
                _ => store_unknown(&mut model.extra, step, data),
            },
        },
    }
}

fn store_unknown(extra: &mut std::collections::BTreeMap<String, Value>, step: &StepId, data: &Value) {
    warn!(step = %step, "[StepTracker] Unknown step stored under catch-all bucket");
    extra.insert(step.to_string(), data.clone());
}

fn record_numbered_step(progress: &mut PlanProgress, index: u32, data: &Value, max_steps: u8) {
    if progress.plan.is_none() {
        progress.plan = Some(plan_template(max_steps));
    }

    let description = data
        .get("step")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            progress
                .plan
                .as_ref()
                .and_then(|plan| plan.get(index.checked_sub(1)? as usize))
                .cloned()
        });

    let record = StepRecord {
        index,
        description,
        agent: data.get("agent").and_then(Value::as_str).map(str::to_string),
        output: step_output(data),
    };

    match progress.history.iter_mut().find(|r| r.index == index) {
        Some(existing) => {
            warn!(index, "[StepTracker] Step completed twice, keeping latest output");
            *existing = record;
        }
        None => progress.history.push(record),
    }
    progress.completed.insert(index);
}

fn apply_plan_payload(progress: &mut PlanProgress, data: &Value) {
    if progress.plan.is_some() {
        debug!("[StepTracker] Plan already computed, ignoring plan payload");
        return;
    }
    match plan_steps(data) {
        Some(steps) => progress.plan = Some(steps),
        None => warn!("[StepTracker] plan payload is not a list of steps"),
    }
}

fn apply_final_payload(progress: &mut PlanProgress, data: &Value) {
    if progress.plan.is_none() {
        progress.plan = data.get("plan").and_then(plan_steps);
    }
    if progress.history.is_empty() {
        adopt_history(progress, data);
    }
    progress.final_report = data
        .get("final_report")
        .and_then(value_text)
        .or_else(|| data.as_str().map(str::to_string));
}

/// Fill the whole result in one step from a cached payload
fn populate_from_cache(model: &mut RunModel, data: &Value) {
    let kind = model.kind();
    let shape = StepShape::for_kind(kind);
    let Some(object) = data.as_object() else {
        warn!("[StepTracker] cache_hit payload is not an object");
        return;
    };

    match &mut model.results {
        RunResults::Staged { fields } => {
            // tool-research caches the research object itself
            if kind == WorkflowKind::ToolResearch && !object.contains_key("research") {
                fields.insert("research".to_string(), data.clone());
                return;
            }
            for (key, value) in object {
                match shape.field_for(key) {
                    Some(field) => {
                        fields.insert(field.to_string(), value.clone());
                    }
                    None => {
                        model.extra.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        RunResults::Planned(progress) => {
            progress.plan = data.get("plan").and_then(plan_steps);
            adopt_history(progress, data);
            progress.final_report = data.get("final_report").and_then(value_text);
        }
    }
}

/// Take `history` (or `execution_history`) entries from a payload
fn adopt_history(progress: &mut PlanProgress, data: &Value) {
    let Some(entries) = data
        .get("history")
        .or_else(|| data.get("execution_history"))
        .and_then(Value::as_array)
    else {
        return;
    };

    progress.history = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| StepRecord {
            index: i as u32 + 1,
            description: entry.get("step").and_then(Value::as_str).map(str::to_string),
            agent: entry.get("agent").and_then(Value::as_str).map(str::to_string),
            output: step_output(entry),
        })
        .collect();
    progress.completed = progress.history.iter().map(|r| r.index).collect();
}

fn plan_steps(data: &Value) -> Option<Vec<String>> {
    let items = data
        .as_array()
        .or_else(|| data.get("plan").and_then(Value::as_array))?;
    Some(items.iter().filter_map(value_text).collect())
}

/// Output text of a step payload: the string itself, or its `output`/`text` field
fn step_output(data: &Value) -> String {
    if let Some(text) = data.as_str() {
        return text.to_string();
    }
    ["output", "text", "content"]
        .iter()
        .find_map(|key| data.get(*key).and_then(value_text))
        .or_else(|| value_text(data))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn progress(step: StepId, message: &str) -> StreamEvent {
        StreamEvent::Progress {
            step,
            message: message.to_string(),
        }
    }

    fn complete_step(step: StepId, data: Value) -> StreamEvent {
        StreamEvent::StepComplete { step, data }
    }

    fn reflection_request() -> RunRequest {
        RunRequest::new(WorkflowKind::Reflection, "Should social media be regulated?")
    }

    fn multi_agent_request() -> RunRequest {
        RunRequest::new(WorkflowKind::MultiAgent, "Climate change and food security")
    }

    #[test]
    fn test_numbered_steps_fill_history_and_completed_set() {
        let events = vec![
            StreamEvent::Start,
            progress(StepId::Index(1), "a"),
            complete_step(StepId::Index(1), json!({"text": "x"})),
            progress(StepId::Index(2), "b"),
            complete_step(StepId::Index(2), json!({"text": "y"})),
            StreamEvent::Complete,
        ];

        let model = StepTracker::replay(multi_agent_request(), &events);
        let plan = model.plan().unwrap();

        assert_eq!(plan.completed.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
        let outputs: Vec<_> = plan.history.iter().map(|r| r.output.as_str()).collect();
        assert_eq!(outputs, vec!["x", "y"]);
        assert_eq!(model.phase, Phase::Completed);
    }

    #[test]
    fn test_terminal_phase_matches_terminal_event() {
        let prefix = vec![
            StreamEvent::Start,
            progress(StepId::named("draft"), "Generating initial draft..."),
            complete_step(StepId::named("draft"), json!("draft text")),
        ];

        let cases = vec![
            (StreamEvent::Complete, Phase::Completed),
            (StreamEvent::protocol_error("boom"), Phase::Failed),
            (StreamEvent::CacheHit { data: json!({"draft": "d"}) }, Phase::Completed),
        ];

        for (terminal, expected) in cases {
            let mut events = prefix.clone();
            events.push(terminal);
            let model = StepTracker::replay(reflection_request(), &events);
            assert_eq!(model.phase, expected);
        }
    }

    #[test]
    fn test_step_complete_leaves_current_step_alone() {
        let model = StepTracker::replay(
            reflection_request(),
            &[
                StreamEvent::Start,
                progress(StepId::named("draft"), "Generating initial draft..."),
                complete_step(StepId::named("draft"), json!("draft text")),
            ],
        );

        assert_eq!(model.phase.current_step(), Some(&StepId::named("draft")));
        assert_eq!(model.progress_message, None);
        assert_eq!(model.field_text("draft").as_deref(), Some("draft text"));
    }

    #[test]
    fn test_revised_and_revision_alias() {
        let model = StepTracker::replay(
            reflection_request(),
            &[
                StreamEvent::Start,
                progress(StepId::named("revision"), "Revising based on feedback..."),
                complete_step(StepId::named("revision"), json!("better")),
            ],
        );
        assert_eq!(model.field_text("revised").as_deref(), Some("better"));
    }

    #[test]
    fn test_cache_hit_populates_everything_at_once() {
        let model = StepTracker::replay(
            reflection_request(),
            &[
                progress(StepId::named("draft"), "ignored before start"),
                StreamEvent::CacheHit {
                    data: json!({"draft": "d", "reflection": "r", "revised": "v", "execution_time": 1.5}),
                },
            ],
        );

        assert!(model.cache_hit);
        assert_eq!(model.phase, Phase::Completed);
        assert_eq!(model.field_text("draft").as_deref(), Some("d"));
        assert_eq!(model.field_text("reflection").as_deref(), Some("r"));
        assert_eq!(model.field_text("revised").as_deref(), Some("v"));
        assert_eq!(model.extra.get("execution_time"), Some(&json!(1.5)));
    }

    #[test]
    fn test_cache_hit_after_progress_discards_partial_state() {
        let model = StepTracker::replay(
            multi_agent_request(),
            &[
                StreamEvent::Start,
                progress(StepId::named("planning"), "Generating execution plan..."),
                StreamEvent::CacheHit {
                    data: json!({
                        "plan": ["Research", "Write"],
                        "execution_history": [
                            {"step": "Research", "agent": "research_agent", "output": "notes"},
                            {"step": "Write", "agent": "writer_agent", "output": "report"}
                        ],
                        "final_report": "report"
                    }),
                },
            ],
        );

        let plan = model.plan().unwrap();
        assert!(model.cache_hit);
        assert_eq!(plan.plan.as_ref().unwrap().len(), 2);
        assert_eq!(plan.completed.len(), 2);
        assert_eq!(plan.final_report.as_deref(), Some("report"));
        assert_eq!(model.phase.current_step(), None);
    }

    #[test]
    fn test_tool_research_cache_hit_wraps_research_object() {
        let model = StepTracker::replay(
            RunRequest::new(WorkflowKind::ToolResearch, "quantum"),
            &[StreamEvent::CacheHit {
                data: json!({"research_report": "report", "sources": []}),
            }],
        );
        assert_eq!(model.research_text("research_report").as_deref(), Some("report"));
    }

    #[test]
    fn test_error_keeps_partial_results() {
        let model = StepTracker::replay(
            reflection_request(),
            &[
                StreamEvent::Start,
                complete_step(StepId::named("draft"), json!("partial")),
                StreamEvent::connection_failed(),
            ],
        );

        assert_eq!(model.phase, Phase::Failed);
        assert_eq!(model.failure.as_ref().unwrap().kind, FailureKind::Connection);
        assert_eq!(model.field_text("draft").as_deref(), Some("partial"));
    }

    #[test]
    fn test_events_after_terminal_are_ignored() {
        let model = StepTracker::replay(
            reflection_request(),
            &[
                StreamEvent::Start,
                StreamEvent::protocol_error("model overloaded"),
                complete_step(StepId::named("draft"), json!("late")),
                StreamEvent::Complete,
            ],
        );

        assert_eq!(model.phase, Phase::Failed);
        assert_eq!(model.failure.as_ref().unwrap().message, "model overloaded");
        assert_eq!(model.field_text("draft"), None);
    }

    #[test]
    fn test_unknown_step_goes_to_catch_all() {
        let model = StepTracker::replay(
            reflection_request(),
            &[
                StreamEvent::Start,
                complete_step(StepId::named("fact_check"), json!({"ok": true})),
            ],
        );
        assert_eq!(model.extra.get("fact_check"), Some(&json!({"ok": true})));
    }

    #[test]
    fn test_plan_computed_once_from_first_source() {
        // plan payload first
        let from_payload = StepTracker::replay(
            multi_agent_request(),
            &[
                StreamEvent::Start,
                complete_step(StepId::named("plan"), json!(["Gather data", "Summarize"])),
                complete_step(StepId::named("step_1"), json!({"agent": "research_agent", "output": "data"})),
            ],
        );
        let progress = from_payload.plan().unwrap();
        assert_eq!(progress.plan.as_ref().unwrap(), &vec!["Gather data".to_string(), "Summarize".to_string()]);
        assert_eq!(progress.history[0].description.as_deref(), Some("Gather data"));

        // numbered step first: template wins, later plan payload ignored
        let from_template = StepTracker::replay(
            multi_agent_request().with_max_steps(2),
            &[
                StreamEvent::Start,
                complete_step(StepId::Index(1), json!("out")),
                complete_step(StepId::named("plan"), json!(["late plan"])),
            ],
        );
        assert_eq!(
            from_template.plan().unwrap().plan.as_ref().unwrap(),
            &plan_template(2)
        );
    }

    #[test]
    fn test_final_payload_sets_report() {
        let model = StepTracker::replay(
            multi_agent_request(),
            &[
                StreamEvent::Start,
                complete_step(StepId::named("plan"), json!(["Research"])),
                complete_step(StepId::named("step_1"), json!({"step": "Research", "agent": "research_agent", "output": "notes"})),
                complete_step(
                    StepId::named("final"),
                    json!({"plan": ["Research"], "history": [], "final_report": "notes"}),
                ),
                StreamEvent::Complete,
            ],
        );
        let progress = model.plan().unwrap();
        assert_eq!(progress.final_report.as_deref(), Some("notes"));
        assert_eq!(progress.history.len(), 1);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let events = vec![
            StreamEvent::Start,
            progress(StepId::named("step_1"), "Step 1/2"),
            complete_step(StepId::named("step_1"), json!({"agent": "writer_agent", "output": "a"})),
            complete_step(StepId::named("mystery"), json!([1, 2, 3])),
            progress(StepId::named("step_2"), "Step 2/2"),
            StreamEvent::connection_failed(),
        ];
        let first = StepTracker::replay(multi_agent_request(), &events);
        let second = StepTracker::replay(multi_agent_request(), &events);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_cancel_is_terminal_and_distinct() {
        let running = StepTracker::replay(reflection_request(), &[StreamEvent::Start]);
        let cancelled = StepTracker::cancel(running);
        assert_eq!(cancelled.phase, Phase::Cancelled);
        assert_eq!(cancelled.failure.as_ref().unwrap().kind, FailureKind::Cancelled);

        let after = StepTracker::reduce(cancelled.clone(), &StreamEvent::Complete);
        assert_eq!(after, cancelled);

        let completed = StepTracker::replay(reflection_request(), &[StreamEvent::Start, StreamEvent::Complete]);
        assert_eq!(StepTracker::cancel(completed).phase, Phase::Completed);
    }
}
