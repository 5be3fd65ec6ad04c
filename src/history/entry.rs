//! Data structures for the run history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::workflow::{Phase, RunModel, WorkflowKind};

/// Schema version for forward compatibility
pub const HISTORY_SCHEMA_VERSION: u32 = 1;

/// Maximum number of runs retained
pub const MAX_HISTORY_ENTRIES: usize = 100;

/// How a recorded run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Completed,
    Failed,
    Cancelled,
}

impl EntryStatus {
    /// `None` for phases that are not terminal
    pub fn from_phase(phase: &Phase) -> Option<Self> {
        match phase {
            Phase::Completed => Some(Self::Completed),
            Phase::Failed => Some(Self::Failed),
            Phase::Cancelled => Some(Self::Cancelled),
            Phase::Idle | Phase::Running { .. } => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

/// One finished run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub workflow_kind: WorkflowKind,
    pub topic: String,
    pub status: EntryStatus,
    pub execution_time_secs: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub cache_hit: bool,
    /// Result payload as it stood when the run ended
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HistoryEntry {
    /// Snapshot a run that reached a terminal phase
    pub fn from_run(model: &RunModel, elapsed: Duration) -> Option<Self> {
        let status = EntryStatus::from_phase(&model.phase)?;

        Some(Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_kind: model.kind(),
            topic: model.request.topic.clone(),
            status,
            execution_time_secs: elapsed.as_secs_f64(),
            timestamp: Utc::now(),
            cache_hit: model.cache_hit,
            result: serde_json::to_value(&model.results).ok(),
            error: model.failure.as_ref().map(|f| f.message.clone()),
        })
    }
}

/// Persisted history file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryFile {
    pub version: u32,
    /// Most recent first
    pub entries: Vec<HistoryEntry>,
    pub last_updated: DateTime<Utc>,
}

impl Default for HistoryFile {
    fn default() -> Self {
        Self {
            version: HISTORY_SCHEMA_VERSION,
            entries: Vec::new(),
            last_updated: Utc::now(),
        }
    }
}

impl HistoryFile {
    /// Add an entry, enforcing the retention limit
    pub fn add_entry(&mut self, entry: HistoryEntry) {
        self.entries.insert(0, entry);
        self.entries.truncate(MAX_HISTORY_ENTRIES);
        self.last_updated = Utc::now();
    }

    /// Returns whether an entry was removed
    pub fn remove_entry(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        let removed = self.entries.len() != before;
        if removed {
            self.last_updated = Utc::now();
        }
        removed
    }
}

/// Narrows a history listing; empty filter matches everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryFilter {
    pub kind: Option<WorkflowKind>,
    pub status: Option<EntryStatus>,
    /// Case-insensitive topic substring
    pub search: Option<String>,
}

impl HistoryFilter {
    pub fn matches(&self, entry: &HistoryEntry) -> bool {
        if self.kind.is_some_and(|kind| kind != entry.workflow_kind) {
            return false;
        }
        if self.status.is_some_and(|status| status != entry.status) {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => entry
                .topic
                .to_lowercase()
                .contains(&term.to_lowercase()),
            _ => true,
        }
    }
}

/// Aggregates over the stored runs
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub total: usize,
    pub by_workflow: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
    pub cache_hits: usize,
    /// Over all entries, 0 when empty
    pub avg_execution_time_secs: f64,
}

impl HistoryStats {
    pub fn from_entries(entries: &[HistoryEntry]) -> Self {
        let mut stats = Self {
            total: entries.len(),
            ..Self::default()
        };

        let mut total_time = 0.0;
        for entry in entries {
            *stats
                .by_workflow
                .entry(entry.workflow_kind.as_str().to_string())
                .or_default() += 1;
            *stats
                .by_status
                .entry(entry.status.as_str().to_string())
                .or_default() += 1;
            if entry.cache_hit {
                stats.cache_hits += 1;
            }
            total_time += entry.execution_time_secs;
        }

        if !entries.is_empty() {
            stats.avg_execution_time_secs = total_time / entries.len() as f64;
        }
        stats
    }
}

/// `workflow-history-YYYY-MM-DD.json`
pub fn export_file_name(now: DateTime<Utc>) -> String {
    format!("workflow-history-{}.json", now.format("%Y-%m-%d"))
}
