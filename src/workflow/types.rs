//! Shared types for workflow runs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ClientError, Result};

/// Longest topic accepted by the API
pub const MAX_TOPIC_CHARS: usize = 500;

pub const DEFAULT_MAX_STEPS: u8 = 4;
pub const MAX_STEPS_LIMIT: u8 = 10;

/// Pipeline type. Each kind has its own step shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowKind {
    /// draft -> reflection -> revised
    Reflection,
    /// Tool-assisted research across arXiv, Wikipedia and Tavily
    ToolResearch,
    /// Planner-driven numbered steps
    MultiAgent,
}

impl WorkflowKind {
    pub const ALL: [WorkflowKind; 3] = [Self::Reflection, Self::ToolResearch, Self::MultiAgent];

    /// Path segment of the streaming endpoint
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reflection => "reflection",
            Self::ToolResearch => "tool-research",
            Self::MultiAgent => "multi-agent",
        }
    }

    /// Title printed at the top of exported documents
    pub fn title(&self) -> &'static str {
        match self {
            Self::Reflection => "Reflection Workflow Report",
            Self::ToolResearch => "Tool-Enhanced Research Report",
            Self::MultiAgent => "Multi-Agent Research Report",
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "reflection" | "simple-reflection" => Ok(Self::Reflection),
            "tool-research" | "research" => Ok(Self::ToolResearch),
            "multi-agent" | "multiagent" => Ok(Self::MultiAgent),
            other => Err(format!(
                "unknown workflow '{}', expected reflection, tool-research or multi-agent",
                other
            )),
        }
    }
}

/// Research tool available to the tool-research workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Arxiv,
    Wikipedia,
    Tavily,
}

impl Tool {
    pub const ALL: [Tool; 3] = [Self::Arxiv, Self::Wikipedia, Self::Tavily];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Arxiv => "arxiv",
            Self::Wikipedia => "wikipedia",
            Self::Tavily => "tavily",
        }
    }
}

impl FromStr for Tool {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "arxiv" => Ok(Self::Arxiv),
            "wikipedia" => Ok(Self::Wikipedia),
            "tavily" => Ok(Self::Tavily),
            other => Err(format!("unknown tool '{}'", other)),
        }
    }
}

/// Input parameters of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub kind: WorkflowKind,
    pub topic: String,
    /// Step budget for the multi-agent planner
    pub max_steps: u8,
    /// Tool subset for tool-research, in selection order
    pub tools: Vec<Tool>,
}

impl RunRequest {
    pub fn new(kind: WorkflowKind, topic: impl Into<String>) -> Self {
        Self {
            kind,
            topic: topic.into(),
            max_steps: DEFAULT_MAX_STEPS,
            tools: Tool::ALL.to_vec(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u8) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Trim the topic and check every parameter the endpoint would reject
    pub fn validated(mut self) -> Result<Self> {
        self.topic = self.topic.trim().to_string();

        if self.topic.is_empty() {
            return Err(ClientError::Request(
                "Topic cannot be empty or only whitespace".to_string(),
            ));
        }
        if self.topic.chars().count() > MAX_TOPIC_CHARS {
            return Err(ClientError::Request(format!(
                "Topic must be {} characters or less",
                MAX_TOPIC_CHARS
            )));
        }
        if self.kind == WorkflowKind::MultiAgent
            && !(1..=MAX_STEPS_LIMIT).contains(&self.max_steps)
        {
            return Err(ClientError::Request(format!(
                "max_steps must be between 1 and {}",
                MAX_STEPS_LIMIT
            )));
        }
        if self.kind == WorkflowKind::ToolResearch {
            if self.tools.is_empty() {
                return Err(ClientError::Request(
                    "Please select at least one research tool".to_string(),
                ));
            }
            let mut seen = Vec::with_capacity(self.tools.len());
            self.tools.retain(|tool| {
                if seen.contains(tool) {
                    false
                } else {
                    seen.push(*tool);
                    true
                }
            });
        }

        Ok(self)
    }

    /// Query parameters for the streaming endpoint
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("topic", self.topic.clone())];
        match self.kind {
            WorkflowKind::Reflection => {}
            WorkflowKind::ToolResearch => {
                let tools = self
                    .tools
                    .iter()
                    .map(Tool::as_str)
                    .collect::<Vec<_>>()
                    .join(",");
                pairs.push(("tools", tools));
            }
            WorkflowKind::MultiAgent => {
                pairs.push(("max_steps", self.max_steps.to_string()));
            }
        }
        pairs
    }
}

/// Step identifier as sent on the wire: a stage name or a step number
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepId {
    Index(u32),
    Named(String),
}

impl StepId {
    pub fn named(name: &str) -> Self {
        Self::Named(name.to_string())
    }

    /// Numeric index for `N` or `"step_N"`
    pub fn index(&self) -> Option<u32> {
        match self {
            Self::Index(n) => Some(*n),
            Self::Named(name) => name
                .strip_prefix("step_")
                .or_else(|| name.strip_prefix("step-"))
                .and_then(|n| n.parse().ok()),
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(n) => write!(f, "step_{}", n),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// Coarse lifecycle of a run
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Running {
        /// Absent between `start` and the first `progress`
        current_step: Option<StepId>,
    },
    Completed,
    Failed,
    Cancelled,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn current_step(&self) -> Option<&StepId> {
        match self {
            Self::Running { current_step } => current_step.as_ref(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running { .. } => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validated_trims_topic() {
        let request = RunRequest::new(WorkflowKind::Reflection, "  AI safety  ")
            .validated()
            .unwrap();
        assert_eq!(request.topic, "AI safety");
    }

    #[test]
    fn test_validated_rejects_blank_and_long_topics() {
        assert!(RunRequest::new(WorkflowKind::Reflection, "   ").validated().is_err());
        let long = "x".repeat(MAX_TOPIC_CHARS + 1);
        assert!(RunRequest::new(WorkflowKind::Reflection, long).validated().is_err());
    }

    #[test]
    fn test_tool_research_requires_a_tool() {
        let request = RunRequest::new(WorkflowKind::ToolResearch, "quantum").with_tools(vec![]);
        assert!(request.validated().is_err());
    }

    #[test]
    fn test_query_pairs_per_kind() {
        let research = RunRequest::new(WorkflowKind::ToolResearch, "quantum")
            .with_tools(vec![Tool::Wikipedia, Tool::Arxiv, Tool::Wikipedia])
            .validated()
            .unwrap();
        assert_eq!(
            research.query_pairs(),
            vec![("topic", "quantum".to_string()), ("tools", "wikipedia,arxiv".to_string())]
        );

        let multi = RunRequest::new(WorkflowKind::MultiAgent, "food security").with_max_steps(6);
        assert_eq!(multi.query_pairs()[1], ("max_steps", "6".to_string()));

        let out_of_range = RunRequest::new(WorkflowKind::MultiAgent, "x").with_max_steps(11);
        assert!(out_of_range.validated().is_err());
    }

    #[test]
    fn test_step_id_index() {
        assert_eq!(StepId::Index(3).index(), Some(3));
        assert_eq!(StepId::named("step_2").index(), Some(2));
        assert_eq!(StepId::named("draft").index(), None);
        assert_eq!(StepId::Index(4).to_string(), "step_4");
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("multi_agent".parse::<WorkflowKind>().unwrap(), WorkflowKind::MultiAgent);
        assert_eq!("Tool-Research".parse::<WorkflowKind>().unwrap(), WorkflowKind::ToolResearch);
        assert!("summarize".parse::<WorkflowKind>().is_err());
    }
}
