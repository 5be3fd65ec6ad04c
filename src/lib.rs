//! Streaming client for research workflows
//!
//! Runs reflection, tool-research and multi-agent workflows against the
//! workflow API, tracks their progress from the pushed event stream and
//! exports the results as text files and a paginated PDF report.

pub mod config;
pub mod error;
pub mod export;
pub mod history;
pub mod layout;
pub mod session;
pub mod stream;
pub mod workflow;

pub use config::ClientConfig;
pub use error::{ClientError, Failure, FailureKind, Result};
pub use export::{DirectorySink, Exporter, FileSink, MemorySink};
pub use history::{HistoryEntry, HistoryFilter, HistoryStore, JsonHistoryStore};
pub use layout::DocumentLayoutEngine;
pub use session::{RunCanceller, WorkflowSession};
pub use stream::{EventChannel, EventTransport, HttpTransport};
pub use workflow::{Phase, RunModel, RunRequest, StepTracker, StreamEvent, Tool, WorkflowKind};

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber
///
/// Default: warn for dependencies, info for this crate. Use RUST_LOG=debug for
/// per-event logs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,research_client=info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
