//! Umwelt CLI — thin front-end over the RPC node surface.
//!
//! Translates commands into `Core` calls and renders a human-oriented
//! summary on stdout. Exit codes follow the core's error taxonomy: 0
//! success, 2 invariant violation, 3 denied by the trust gate, 4 busy,
//! 5 not found, 6 corruption.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use umwelt::{bootstrap, CoreConfig, CoreError, ErrorKind, Umwelt};

#[derive(Parser)]
#[command(name = "umwelt", version, about = "Observability and autonomy substrate")]
struct Cli {
    /// Path to a YAML config file; falls back to platform defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a thought with no external effect.
    Capture { thought: String },
    /// Record an action and its result.
    Action { action: String },
    /// Ingest a file into the sovereign store.
    Ingest {
        path: String,
        file: PathBuf,
        #[arg(long, default_value = "cli")]
        source: String,
    },
    /// Query a sovereign entity by path.
    Query { path: String },
    /// List known neighbors of a path in the edge graph.
    Neighbors { path: String },
    /// Evaluate the trust gate against a proposed action, without executing it.
    Decide { action: String },
    /// Report whether the trust gate is eligible to escalate.
    Escalate,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => match CoreConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("error: {err}");
                return ExitCode::from(2);
            }
        },
        None => CoreConfig::default(),
    };

    let core = match bootstrap(&config) {
        Ok(core) => core,
        Err(err) => return render_failure(&err),
    };

    let umwelt = Umwelt::new("cli");
    let result: Result<(), CoreError> = match cli.command {
        Commands::Capture { thought } => core.witness_capture(&thought, umwelt).map(|id| {
            println!("captured: {id}");
        }),
        Commands::Action { action } => core
            .witness_action(&action, serde_json::Value::Null, umwelt)
            .map(|id| {
                println!("recorded: {id}");
            }),
        Commands::Ingest { path, file, source } => {
            std::fs::read(&file)
                .map_err(|e| CoreError::InvariantViolation(e.to_string()))
                .and_then(|bytes| core.sovereign_ingest(&path, bytes, &source))
                .map(|entity| {
                    println!(
                        "ingested {} (version {})",
                        path, entity.entity.current_version
                    );
                })
        }
        Commands::Query { path } => core.sovereign_query(&path).map(|found| match found {
            Some(entity) => println!(
                "{} at version {}",
                entity.path, entity.current_version
            ),
            None => println!("{path}: not found"),
        }),
        Commands::Neighbors { path } => {
            let neighbors = tokio_runtime().block_on(core.graph_neighbors(&path));
            println!(
                "{} incoming, {} outgoing",
                neighbors.incoming.len(),
                neighbors.outgoing.len()
            );
            Ok(())
        }
        Commands::Decide { action } => match core.trust_decide(&action, umwelt) {
            Ok(decision) => {
                println!("{}", decision.label());
                Ok(())
            }
            Err(err) => Err(err),
        },
        Commands::Escalate => core.witness_escalate(umwelt).map(|report| {
            println!("eligible={} reason={}", report.eligible, report.reason);
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => render_failure(&err),
    }
}

fn render_failure(err: &CoreError) -> ExitCode {
    eprintln!("error: {err}");
    ExitCode::from(match err.kind() {
        ErrorKind::InvariantViolation | ErrorKind::Unstable => 2,
        ErrorKind::Denied | ErrorKind::ConfirmRequired => 3,
        ErrorKind::Busy => 4,
        ErrorKind::NotFound => 5,
        ErrorKind::Corruption => 6,
        ErrorKind::Timeout => 4,
        ErrorKind::ProviderUnavailable => 2,
    })
}

fn tokio_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to start tokio runtime")
}
