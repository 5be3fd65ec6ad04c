use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use research_client::config::ClientConfig;
use research_client::error::{ClientError, Result};
use research_client::export::{DirectorySink, Exporter, FileSink};
use research_client::history::{EntryStatus, HistoryFilter, HistoryStore, JsonHistoryStore};
use research_client::stream::HttpTransport;
use research_client::workflow::types::DEFAULT_MAX_STEPS;
use research_client::workflow::{Phase, RunModel, RunRequest, Tool, WorkflowKind};
use research_client::{init_tracing, WorkflowSession};

#[derive(Parser, Debug)]
#[command(name = "research-client", version, about = "Run and export research workflows")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stream a workflow run and export its results
    Run(RunArgs),
    /// Inspect or manage the run history
    #[command(subcommand)]
    History(HistoryCommand),
    /// Check that the workflow API is reachable
    Health,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// reflection, tool-research or multi-agent
    kind: WorkflowKind,

    /// Research topic (1-500 characters)
    #[arg(long)]
    topic: String,

    /// Tools for tool-research, comma separated
    #[arg(long, value_delimiter = ',', default_value = "arxiv,wikipedia,tavily")]
    tools: Vec<Tool>,

    /// Step budget for multi-agent (1-10)
    #[arg(long, default_value_t = DEFAULT_MAX_STEPS)]
    max_steps: u8,

    /// Directory for exported files (default: RESEARCH_EXPORT_DIR or the download dir)
    #[arg(long, value_name = "DIR")]
    export_dir: Option<PathBuf>,

    /// Skip the PDF report
    #[arg(long)]
    no_pdf: bool,
}

#[derive(Subcommand, Debug)]
enum HistoryCommand {
    /// List recorded runs, newest first
    List {
        #[arg(long)]
        kind: Option<WorkflowKind>,
        #[arg(long)]
        status: Option<EntryStatus>,
        /// Case-insensitive topic search
        #[arg(long)]
        search: Option<String>,
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },
    /// Totals by workflow and status
    Stats,
    /// Write the whole history as a JSON file
    Export {
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },
    /// Delete every entry
    Clear,
    /// Delete one entry
    Remove { id: String },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = ClientConfig::load()?;

    match cli.command {
        Commands::Run(args) => cmd_run(&config, args).await,
        Commands::History(command) => cmd_history(&config, command),
        Commands::Health => cmd_health(&config).await,
    }
}

async fn cmd_run(config: &ClientConfig, args: RunArgs) -> Result<()> {
    let request = RunRequest::new(args.kind, args.topic)
        .with_tools(args.tools)
        .with_max_steps(args.max_steps);

    let transport = HttpTransport::new(config)?;
    let store: Arc<dyn HistoryStore> = Arc::new(JsonHistoryStore::new(&config.history_path));
    let mut session = WorkflowSession::new(transport).with_history(store);

    let canceller = session.canceller();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling...");
            canceller.cancel();
        }
    });

    let mut printer = ProgressPrinter::default();
    let model = session.run(request, |model| printer.update(model)).await?;

    let export_dir = args.export_dir.unwrap_or_else(|| config.export_dir.clone());
    let sink = DirectorySink::new(&export_dir);
    export(&model, &sink, !args.no_pdf)?;

    match &model.phase {
        Phase::Completed => Ok(()),
        Phase::Cancelled => std::process::exit(130),
        _ => std::process::exit(1),
    }
}

fn export(model: &RunModel, sink: &DirectorySink, with_pdf: bool) -> Result<()> {
    let exporter = Exporter::new();

    let mut written = exporter.export_artifacts(model, sink)?;
    if with_pdf && model.phase == Phase::Completed {
        written.push(exporter.export_document(model, sink)?);
    }

    for file in &written {
        println!("  wrote {} ({} bytes)", sink.dir().join(&file.name).display(), file.size);
    }
    Ok(())
}

/// Prints each new progress message and the final outcome
#[derive(Default)]
struct ProgressPrinter {
    last_message: Option<String>,
}

impl ProgressPrinter {
    fn update(&mut self, model: &RunModel) {
        if let Some(message) = &model.progress_message {
            if self.last_message.as_ref() != Some(message) {
                match model.phase.current_step() {
                    Some(step) => println!("[{}] {}", step, message),
                    None => println!("{}", message),
                }
                self.last_message = Some(message.clone());
            }
        }

        match &model.phase {
            Phase::Completed if model.cache_hit => println!("Completed (served from cache)"),
            Phase::Completed => println!("Completed"),
            Phase::Failed | Phase::Cancelled => {
                let message = model.failure.as_ref().map(|f| f.message.as_str()).unwrap_or("");
                println!("{}: {}", model.phase.as_str(), message);
            }
            Phase::Idle | Phase::Running { .. } => {}
        }
    }
}

fn cmd_history(config: &ClientConfig, command: HistoryCommand) -> Result<()> {
    let store = JsonHistoryStore::new(&config.history_path);

    match command {
        HistoryCommand::List {
            kind,
            status,
            search,
            json,
        } => {
            let entries = store.list(&HistoryFilter {
                kind,
                status,
                search,
            })?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }
            if entries.is_empty() {
                println!("No runs recorded");
            }
            for entry in entries {
                println!(
                    "{}  {}  {:<13} {:<9} {:>7.1}s{}  {}",
                    entry.id,
                    entry.timestamp.format("%Y-%m-%d %H:%M"),
                    entry.workflow_kind.as_str(),
                    entry.status.as_str(),
                    entry.execution_time_secs,
                    if entry.cache_hit { " (cached)" } else { "" },
                    entry.topic
                );
            }
        }
        HistoryCommand::Stats => {
            println!("{}", serde_json::to_string_pretty(&store.stats()?)?);
        }
        HistoryCommand::Export { dir } => {
            let sink = DirectorySink::new(dir.unwrap_or_else(|| config.export_dir.clone()));
            let name = store.export_file_name();
            sink.write_file(&name, "application/json", &store.export()?)?;
            println!("Exported history to {}", sink.dir().join(name).display());
        }
        HistoryCommand::Clear => {
            store.clear()?;
            println!("History cleared");
        }
        HistoryCommand::Remove { id } => {
            if !store.remove(&id)? {
                return Err(ClientError::History(format!("No entry with id {}", id)));
            }
            println!("Removed {}", id);
        }
    }
    Ok(())
}

async fn cmd_health(config: &ClientConfig) -> Result<()> {
    let transport = HttpTransport::new(config)?;
    let health = transport.health().await?;

    println!("{} (version {})", health.status, health.version);
    for (tool, available) in &health.tools_available {
        println!("  tool  {:<10} {}", tool, if *available { "available" } else { "unavailable" });
    }
    for (role, model) in &health.models_configured {
        println!("  model {:<10} {}", role, model);
    }

    if health.is_healthy() {
        Ok(())
    } else {
        Err(ClientError::Connection(format!("API reports status '{}'", health.status)))
    }
}
