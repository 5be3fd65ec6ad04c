//! Workflow session
//!
//! Owns the single run slot of a host: opens the event channel for a run,
//! folds every event through the [`StepTracker`], hands each snapshot to an
//! observer and records the finished run in the history store.
//!
//! Cancellation is cooperative: [`RunCanceller::cancel`] closes the active
//! channel, so no event delivered afterwards reaches the model.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{info, warn};

use crate::error::Result;
use crate::history::{HistoryEntry, HistoryStore};
use crate::stream::{ChannelHandle, EventChannel, EventTransport};
use crate::workflow::{RunModel, RunRequest, StepTracker};

#[derive(Debug, Default)]
struct RunSlot {
    handle: Option<ChannelHandle>,
    cancel_requested: bool,
}

/// Cancels whatever run is active in a session. Cheap to clone and `Send`.
#[derive(Debug, Clone, Default)]
pub struct RunCanceller {
    slot: Arc<Mutex<RunSlot>>,
}

impl RunCanceller {
    /// Returns whether a run was active
    pub fn cancel(&self) -> bool {
        let mut slot = self.lock();
        slot.cancel_requested = true;
        match &slot.handle {
            Some(handle) => {
                handle.close();
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunSlot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct WorkflowSession<T: EventTransport> {
    transport: T,
    history: Option<Arc<dyn HistoryStore>>,
    canceller: RunCanceller,
}

impl<T: EventTransport> WorkflowSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            history: None,
            canceller: RunCanceller::default(),
        }
    }

    /// Record every finished run in `store`
    pub fn with_history(mut self, store: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(store);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn canceller(&self) -> RunCanceller {
        self.canceller.clone()
    }

    /// Run a workflow to its end, calling `observer` after every model update.
    ///
    /// Only an invalid request is an `Err`; connection failures, pipeline
    /// errors and cancellation end the run in a failed or cancelled phase.
    pub async fn run<F>(&mut self, request: RunRequest, mut observer: F) -> Result<RunModel>
    where
        F: FnMut(&RunModel),
    {
        let request = request.validated()?;
        let started = Instant::now();

        // One run per slot: anything still open is closed first
        {
            let mut slot = self.canceller.lock();
            if let Some(previous) = slot.handle.take() {
                previous.close();
            }
            slot.cancel_requested = false;
        }

        info!(kind = %request.kind, topic = %request.topic, "[Session] Starting run");
        let mut channel = EventChannel::open(&self.transport, &request).await;

        {
            let mut slot = self.canceller.lock();
            if slot.cancel_requested {
                channel.close();
            }
            slot.handle = Some(channel.handle());
        }

        let mut model = RunModel::new(request);
        while let Some(event) = channel.next_event().await {
            model = StepTracker::reduce(model, &event);
            observer(&model);
        }

        if !model.phase.is_terminal() {
            // Channel closed under us without a terminal event: a cancellation
            model = StepTracker::cancel(model);
            observer(&model);
        }

        self.canceller.lock().handle = None;

        info!(
            kind = %model.kind(),
            phase = model.phase.as_str(),
            cache_hit = model.cache_hit,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "[Session] Run finished"
        );

        self.record(&model, started);
        Ok(model)
    }

    fn record(&self, model: &RunModel, started: Instant) {
        let Some(store) = &self.history else {
            return;
        };
        let Some(entry) = HistoryEntry::from_run(model, started.elapsed()) else {
            return;
        };
        if let Err(e) = store.append(entry) {
            warn!("[History] Failed to record run: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ClientError, FailureKind};
    use crate::history::{EntryStatus, HistoryFilter, JsonHistoryStore};
    use crate::stream::testing::{Script, ScriptedTransport};
    use crate::workflow::{Phase, StepId, WorkflowKind, CANCELLED_MESSAGE};
    use serde_json::json;
    use tempfile::TempDir;

    fn multi_agent_script() -> Vec<Script> {
        vec![
            Script::events(&[
                json!({"type": "start", "workflow_type": "multi_agent"}),
                json!({"type": "progress", "step": "planning", "message": "Creating plan..."}),
                json!({"type": "step_complete", "step": "plan", "data": ["Research", "Write"]}),
            ]),
            Script::events(&[
                json!({"type": "progress", "step": 1, "message": "a"}),
                json!({"type": "step_complete", "step": 1, "data": {"text": "x"}}),
                json!({"type": "progress", "step": "step_2", "message": "b"}),
                json!({"type": "step_complete", "step": 2, "data": {"text": "y"}}),
                json!({"type": "complete"}),
            ]),
        ]
    }

    #[tokio::test]
    async fn test_completed_run_is_observed_and_recorded() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonHistoryStore::new(dir.path().join("history.json")));
        let mut session = WorkflowSession::new(ScriptedTransport::new(multi_agent_script()))
            .with_history(store.clone());

        let mut snapshots = Vec::new();
        let model = session
            .run(
                RunRequest::new(WorkflowKind::MultiAgent, "  fusion energy ").with_max_steps(2),
                |m| snapshots.push(m.phase.clone()),
            )
            .await
            .unwrap();

        assert_eq!(model.phase, Phase::Completed);
        let plan = model.plan().unwrap();
        assert_eq!(plan.completed.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
        let outputs: Vec<_> = plan.history.iter().map(|r| r.output.as_str()).collect();
        assert_eq!(outputs, vec!["x", "y"]);

        assert_eq!(snapshots.len(), 8);
        assert_eq!(
            snapshots[3],
            Phase::Running {
                current_step: Some(StepId::Index(1))
            }
        );

        let sent = session.transport().last_request().unwrap();
        assert_eq!(sent.topic, "fusion energy");

        let entries = store.list(&HistoryFilter::default()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, EntryStatus::Completed);
        assert_eq!(entries[0].topic, "fusion energy");
    }

    #[tokio::test]
    async fn test_cancel_stops_model_mutation() {
        let mut session = WorkflowSession::new(ScriptedTransport::new(multi_agent_script()));
        let canceller = session.canceller();

        let mut seen = 0;
        let model = session
            .run(RunRequest::new(WorkflowKind::MultiAgent, "topic"), |m| {
                seen += 1;
                if m.progress_message.as_deref() == Some("Creating plan...") {
                    assert!(canceller.cancel());
                }
            })
            .await
            .unwrap();

        // start, progress, then the cancellation itself
        assert_eq!(seen, 3);
        assert_eq!(model.phase, Phase::Cancelled);
        let failure = model.failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::Cancelled);
        assert_eq!(failure.message, CANCELLED_MESSAGE);
        assert!(model.plan().unwrap().plan.is_none());
        assert!(session.transport().stream_dropped());
    }

    #[tokio::test]
    async fn test_cancel_from_another_task() {
        let transport =
            ScriptedTransport::new(vec![Script::chunk("{\"type\":\"start\"}\n")]).held_open();
        let mut session = WorkflowSession::new(transport);
        let canceller = session.canceller();

        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let model = session
            .run(RunRequest::new(WorkflowKind::Reflection, "topic"), |_| {})
            .await
            .unwrap();

        assert_eq!(model.phase, Phase::Cancelled);
        assert!(session.transport().stream_dropped());
        // slot is free again
        assert!(!session.canceller().cancel());
    }

    #[tokio::test]
    async fn test_connection_failure_keeps_partial_results() {
        let transport = ScriptedTransport::new(vec![Script::events(&[
            json!({"type": "start"}),
            json!({"type": "step_complete", "step": "draft", "data": "partial draft"}),
        ])]);
        let mut session = WorkflowSession::new(transport);

        let model = session
            .run(RunRequest::new(WorkflowKind::Reflection, "topic"), |_| {})
            .await
            .unwrap();

        assert_eq!(model.phase, Phase::Failed);
        assert_eq!(model.failure.as_ref().map(|f| f.kind), Some(FailureKind::Connection));
        assert_eq!(model.field_text("draft").as_deref(), Some("partial draft"));
    }

    #[tokio::test]
    async fn test_invalid_request_never_connects() {
        let mut session = WorkflowSession::new(ScriptedTransport::new(Vec::new()));

        let result = session
            .run(RunRequest::new(WorkflowKind::Reflection, "   "), |_| {})
            .await;

        assert!(matches!(result, Err(ClientError::Request(_))));
        assert_eq!(session.transport().connects(), 0);
    }
}
