//! CLI entry point for the imgbulk tool.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use imgbulk_core::runner::keywords_from_lines;
use imgbulk_core::{BingSearch, HttpClient, RunSummary, run_keywords};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

mod cli;
mod config;

use cli::Args;
use config::{Settings, load_file_config};

/// Process exit outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessExit {
    /// Every keyword ran to completion.
    Success,
    /// The run could not start or aborted on an error.
    Failure,
    /// The run was stopped by Ctrl-C.
    Interrupted,
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        match exit {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Failure => ExitCode::from(1),
            ProcessExit::Interrupted => ExitCode::from(130),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    init_tracing(args.log_level());
    debug!(?args, "CLI arguments parsed");

    match run(&args).await {
        Ok(exit) => exit.into(),
        Err(e) => {
            error!("{e:#}");
            ProcessExit::Failure.into()
        }
    }
}

/// Installs the stderr subscriber. `RUST_LOG` wins over the CLI level.
fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init();
}

async fn run(args: &Args) -> Result<ProcessExit> {
    let file_config = load_file_config(args.config.as_deref())?;
    let settings = Settings::resolve(args, file_config.as_ref());

    let search = args.search.join(" ");
    let keywords = if args.search_file {
        read_keyword_file(Path::new(&search))?
    } else {
        let keyword = search.trim();
        if keyword.is_empty() {
            bail!("Search keyword is empty");
        }
        vec![keyword.to_string()]
    };
    if keywords.is_empty() {
        info!("No keywords to search");
        return Ok(ProcessExit::Success);
    }

    let client = HttpClient::with_options(&settings.client).context("Failed to build HTTP client")?;
    let source = Arc::new(BingSearch::new(client.clone()));

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    info!(
        keywords = keywords.len(),
        output = %settings.run.output_root.display(),
        workers = settings.run.workers,
        "imgbulk starting"
    );
    let summary = run_keywords(source, client, &keywords, &settings.run, cancel).await?;
    Ok(determine_exit_outcome(&summary))
}

fn read_keyword_file(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Couldn't open keyword file '{}'", path.display()))?;
    Ok(keywords_from_lines(&contents))
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, saving download history");
            cancel.cancel();
        }
    });
}

fn determine_exit_outcome(summary: &RunSummary) -> ProcessExit {
    if summary.interrupted {
        ProcessExit::Interrupted
    } else {
        ProcessExit::Success
    }
}
