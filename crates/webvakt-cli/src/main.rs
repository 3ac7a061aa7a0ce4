//! `webvakt`: run change-detection checks from the command line.

mod cli;

use clap::{Parser, Subcommand};
use cli::check_cmd::CheckArgs;
use cli::output::{self, OutputMode};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "webvakt",
    version,
    about = "Check web pages for changes to watched elements"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Only print results, no progress or summaries.
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Debug-level logging.
    #[arg(long, short, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Render a page and report monitors whose value changed.
    Check(CheckArgs),
    /// Show which browser and settings a check would use.
    Doctor,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    let mode = OutputMode {
        quiet: cli.quiet,
        verbose: cli.verbose,
    };

    let result = match cli.command {
        Command::Check(args) => cli::check_cmd::run(args, mode).await,
        Command::Doctor => cli::doctor::run(mode),
    };

    if let Err(e) = result {
        output::print_json(&serde_json::json!({ "message": format!("{e:#}") }));
        std::process::exit(1);
    }
}

fn init_tracing(cli: &Cli) {
    let default_directive = if cli.verbose {
        "webvakt=debug"
    } else if cli.quiet {
        "webvakt=warn"
    } else {
        "webvakt=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}
