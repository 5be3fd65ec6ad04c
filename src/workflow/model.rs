//! Run model produced by the step tracker
//!
//! The model is a plain value: cloning it gives the read side an immutable
//! snapshot, and every field uses ordered collections so replaying the same
//! event log always produces an identical model.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use super::types::{Phase, RunRequest, WorkflowKind};
use crate::error::Failure;

/// Result fields accumulated per workflow kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum RunResults {
    /// Pre-named stages, keyed by field name
    Staged { fields: BTreeMap<String, Value> },
    /// Dynamic numbered plan
    Planned(PlanProgress),
}

/// Progress of a numbered-plan workflow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanProgress {
    /// Set once, from a `plan` payload or the kind's template
    pub plan: Option<Vec<String>>,
    /// Completed steps in arrival order
    pub history: Vec<StepRecord>,
    pub completed: BTreeSet<u32>,
    pub final_report: Option<String>,
}

/// Output of one numbered step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub index: u32,
    pub description: Option<String>,
    pub agent: Option<String>,
    pub output: String,
}

/// Bibliography entry attached to research results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub url: String,
}

/// Everything the UI and the exporter read about one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunModel {
    pub request: RunRequest,
    pub phase: Phase,
    /// Cleared by every `step_complete`
    pub progress_message: Option<String>,
    pub results: RunResults,
    /// Payloads for step identifiers the kind does not know
    pub extra: BTreeMap<String, Value>,
    pub cache_hit: bool,
    pub failure: Option<Failure>,
}

impl RunModel {
    /// Empty model in the idle phase
    pub fn new(request: RunRequest) -> Self {
        let results = RunResults::empty_for(request.kind);
        Self {
            request,
            phase: Phase::Idle,
            progress_message: None,
            results,
            extra: BTreeMap::new(),
            cache_hit: false,
            failure: None,
        }
    }

    pub fn kind(&self) -> WorkflowKind {
        self.request.kind
    }

    /// Text of a named stage field
    pub fn field_text(&self, name: &str) -> Option<String> {
        match &self.results {
            RunResults::Staged { fields } => fields.get(name).and_then(value_text),
            RunResults::Planned(_) => None,
        }
    }

    /// Text of a key inside the tool-research `research` object
    pub fn research_text(&self, key: &str) -> Option<String> {
        match &self.results {
            RunResults::Staged { fields } => fields
                .get("research")
                .and_then(|research| research.get(key))
                .and_then(value_text),
            RunResults::Planned(_) => None,
        }
    }

    pub fn plan(&self) -> Option<&PlanProgress> {
        match &self.results {
            RunResults::Planned(progress) => Some(progress),
            RunResults::Staged { .. } => None,
        }
    }

    /// Intermediate artifacts as `(file stem, text)`, skipping empty ones
    pub fn artifacts(&self) -> Vec<(&'static str, String)> {
        let candidates: Vec<(&'static str, Option<String>)> = match self.kind() {
            WorkflowKind::Reflection => vec![
                ("draft", self.field_text("draft")),
                ("reflection", self.field_text("reflection")),
                ("revised", self.field_text("revised")),
            ],
            WorkflowKind::ToolResearch => vec![
                ("research", self.research_text("research_report")),
                ("synthesis", self.research_text("reflection")),
                ("revised", self.research_text("revised_report")),
            ],
            WorkflowKind::MultiAgent => {
                let plan_text = self.plan().and_then(|p| p.plan.as_ref()).map(|steps| {
                    steps
                        .iter()
                        .enumerate()
                        .map(|(i, step)| format!("{}. {}", i + 1, step))
                        .collect::<Vec<_>>()
                        .join("\n")
                });
                vec![("plan", plan_text), ("final_output", self.final_text())]
            }
        };

        candidates
            .into_iter()
            .filter_map(|(name, text)| text.filter(|t| !t.trim().is_empty()).map(|t| (name, t)))
            .collect()
    }

    /// Text laid out as the body of the exported document
    pub fn final_text(&self) -> Option<String> {
        let text = match self.kind() {
            WorkflowKind::Reflection => self
                .field_text("revised")
                .or_else(|| self.field_text("draft")),
            WorkflowKind::ToolResearch => self
                .research_text("revised_report")
                .or_else(|| self.research_text("research_report")),
            WorkflowKind::MultiAgent => self.plan().and_then(|progress| {
                progress
                    .final_report
                    .clone()
                    .or_else(|| progress.history.last().map(|r| r.output.clone()))
            }),
        };
        text.filter(|t| !t.trim().is_empty())
    }

    /// Sources reported by tool-research runs
    pub fn sources(&self) -> Vec<SourceRef> {
        let RunResults::Staged { fields } = &self.results else {
            return Vec::new();
        };
        let Some(items) = fields
            .get("research")
            .and_then(|r| r.get("sources"))
            .and_then(Value::as_array)
        else {
            return Vec::new();
        };

        items
            .iter()
            .filter_map(|item| {
                let url = item.get("url").and_then(Value::as_str)?.trim().to_string();
                if url.is_empty() {
                    return None;
                }
                let title = item
                    .get("title")
                    .and_then(Value::as_str)
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| url.clone());
                Some(SourceRef { title, url })
            })
            .collect()
    }
}

impl RunResults {
    pub fn empty_for(kind: WorkflowKind) -> Self {
        match kind {
            WorkflowKind::Reflection | WorkflowKind::ToolResearch => RunResults::Staged {
                fields: BTreeMap::new(),
            },
            WorkflowKind::MultiAgent => RunResults::Planned(PlanProgress::default()),
        }
    }
}

/// Render a JSON payload as display text. Strings pass through, null is absent.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => serde_json::to_string_pretty(other).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn staged(kind: WorkflowKind, fields: Value) -> RunModel {
        let mut model = RunModel::new(RunRequest::new(kind, "topic"));
        let Value::Object(map) = fields else { unreachable!() };
        model.results = RunResults::Staged {
            fields: map.into_iter().collect(),
        };
        model
    }

    #[test]
    fn test_reflection_artifacts_skip_empty() {
        let model = staged(
            WorkflowKind::Reflection,
            json!({"draft": "first", "reflection": "", "revised": "second"}),
        );
        let names: Vec<_> = model.artifacts().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["draft", "revised"]);
        assert_eq!(model.final_text().as_deref(), Some("second"));
    }

    #[test]
    fn test_tool_research_text_and_sources() {
        let model = staged(
            WorkflowKind::ToolResearch,
            json!({"research": {
                "research_report": "report",
                "reflection": "critique",
                "revised_report": null,
                "sources": [
                    {"title": "Paper", "url": "https://arxiv.org/abs/1"},
                    {"title": "", "url": "https://example.com"},
                    {"title": "No url"}
                ]
            }}),
        );
        assert_eq!(model.final_text().as_deref(), Some("report"));
        assert_eq!(
            model.sources(),
            vec![
                SourceRef { title: "Paper".into(), url: "https://arxiv.org/abs/1".into() },
                SourceRef { title: "https://example.com".into(), url: "https://example.com".into() },
            ]
        );
    }

    #[test]
    fn test_multi_agent_final_text_falls_back_to_history() {
        let mut model = RunModel::new(RunRequest::new(WorkflowKind::MultiAgent, "topic"));
        model.results = RunResults::Planned(PlanProgress {
            plan: Some(vec!["Research".into()]),
            history: vec![StepRecord {
                index: 1,
                description: None,
                agent: Some("research_agent".into()),
                output: "findings".into(),
            }],
            completed: [1].into_iter().collect(),
            final_report: None,
        });
        assert_eq!(model.final_text().as_deref(), Some("findings"));
        assert_eq!(model.artifacts()[0], ("plan", "1. Research".to_string()));
    }
}
