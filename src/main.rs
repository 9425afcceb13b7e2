#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

mod cli;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "redirect-engine", about = "Evaluate redirect and rewrite rules offline")]
struct Cli {
    /// Path to engine config file (.toml or .json)
    #[arg(short, long, default_value = "redirect-engine.toml")]
    config: PathBuf,

    /// Print Prometheus metrics after the command output
    #[arg(long)]
    print_metrics: bool,

    #[command(subcommand)]
    command: cli::Command,
}

fn main() -> Result<()> {
    let args = Cli::parse();

    let config = cli::load_config(&args.config)?;
    let _guard = cli::init_tracing(&config.log);

    cli::run(config, args.command, args.print_metrics)
}
