use clap::Parser;
use std::path::PathBuf;

mod backend;
mod config;
mod data;
mod extract;
mod judge;
mod logging;
mod models;
mod output;
mod planner;
mod runner;
mod scheduler;
mod template;

use crate::config::Config;
use crate::output::OutputFormat;
use crate::runner::Runner;

/// Arena judge CLI - Judge model answers pairwise against a baseline with an LLM judge
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML run configuration file
    run_file: PathBuf,

    /// Summary format: plain or json
    #[arg(short, long, default_value = "plain")]
    output: OutputFormat,

    /// Verbose logging - show progress for each judge request
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Override the number of tasks submitted per batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Override the number of concurrent judge requests
    #[arg(long)]
    parallel: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init_tracing(args.verbose, args.log_json)?;

    let mut config = Config::from_file(&args.run_file)?;
    if let Some(batch_size) = args.batch_size {
        config.run.batch_size = batch_size;
    }
    if let Some(parallel) = args.parallel {
        config.endpoint.parallel = parallel;
    }

    let runner = Runner::new(config)?;
    let summary = runner.run().await?;

    output::print_summary(&summary, args.output);

    Ok(())
}
