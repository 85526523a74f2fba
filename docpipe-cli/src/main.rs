//! # docpipe
//!
//! | Invocation | Description |
//! |------------|-------------|
//! | `docpipe --request_file_path <path>` | Execute one controller request (subprocess executor) |
//! | `docpipe run --config <path>` | Run a pipeline config end to end and print the results |
//! | `docpipe serve --bind <addr>` | Serve `POST /execute` as a remote executor |
//!
//! Paths given to `--request_file_path` and `--config` are logical paths
//! below the storage root. Logs go to stderr; stdout carries only the
//! status lines or the run results.

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use docpipe::controller::{self, CliController, Executor};
use docpipe::{
    load_pipeline_config, LocalFileSystem, LogHandle, Orchestrator, ProcessorRegistry,
    RunContext,
};

#[derive(Parser)]
#[command(name = "docpipe", version, about = "Document processing pipeline engine")]
struct Cli {
    /// Controller request to execute. Cannot be combined with a sub-command.
    #[arg(long = "request_file_path")]
    request_file_path: Option<String>,

    /// Storage root that logical paths resolve against.
    #[arg(long, env = "DOCPIPE_STORAGE_ROOT", default_value = "/", global = true)]
    storage_root: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Raise the default log level (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every enabled stage of a pipeline config.
    Run {
        #[arg(long)]
        config: String,
    },

    /// Serve the HTTP executor endpoint.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.request_file_path.is_some() && cli.command.is_some() {
        Cli::command()
            .error(
                ErrorKind::ArgumentConflict,
                "--request_file_path cannot be used with a sub-command",
            )
            .exit();
    }
    init_tracing(cli.log_format, cli.verbose);

    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(format: LogFormat, verbose: u8) {
    let default_directive = match verbose {
        0 => "docpipe=info",
        1 => "docpipe=debug",
        _ => "docpipe=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let root = cli
        .storage_root
        .strip_prefix("file://")
        .unwrap_or(&cli.storage_root)
        .to_string();
    let run = RunContext::new(Arc::new(LocalFileSystem::new(&root)), LogHandle::new());
    let registry = ProcessorRegistry::with_builtins();

    match (cli.command, cli.request_file_path) {
        (Some(_), Some(_)) => anyhow::bail!("--request_file_path cannot be used with a sub-command"),
        (Some(Commands::Run { config }), None) => run_pipeline(&config, &registry, run),
        (Some(Commands::Serve { bind }), None) => {
            let executor = Executor::new(registry, run);
            let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
            runtime.block_on(controller::serve(&bind, executor))?;
            Ok(())
        }
        (None, Some(request_file_path)) => {
            let controller = CliController::new(Executor::new(registry, run), request_file_path);
            let stdout = io::stdout();
            controller.run(&mut stdout.lock())?;
            Ok(())
        }
        (None, None) => anyhow::bail!("nothing to do: pass --request_file_path or a sub-command"),
    }
}

fn run_pipeline(config_path: &str, registry: &ProcessorRegistry, run: RunContext) -> anyhow::Result<()> {
    let config = load_pipeline_config(run.storage(), config_path)
        .with_context(|| format!("failed to load {}", config_path))?;
    let mut orchestrator = Orchestrator::new(config, registry, run)?;
    let results = orchestrator.run_batch(None, None)?;

    if let Some(summary) = orchestrator.get_run_batch_summary() {
        info!(
            run_id = %summary.run_id,
            documents = summary.document_count,
            halted = summary.halted_count,
            "Pipeline finished"
        );
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, &results)?;
    writeln!(out)?;
    Ok(())
}
