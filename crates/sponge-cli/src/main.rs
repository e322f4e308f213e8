/// Sponge command-line tool: fetch resources through a persistent block
/// cache, and inspect or validate the cache file.
///
/// # Command overview
///
/// ```text
/// sponge <COMMAND> [OPTIONS]
///
/// Commands:
///   fetch      Serve a resource through the cache, falling back to the source directory
///   inspect    Print the download state of one cached resource
///   validate   Check every download state and its blocks in the cache file
///   help       Print help information
///
/// Global options:
///   -c, --config <FILE>       JSON configuration file
///       --cache-file <FILE>   Override the cache snapshot path
///       --source-dir <DIR>    Override the source directory
///   -v, --verbose             Log cache and orchestration decisions to stderr
///   -h, --help                Print help
///   -V, --version             Print version
/// ```
///
/// # Exit codes
///
/// | Code | Meaning                                      |
/// |------|----------------------------------------------|
/// | 0    | Success                                      |
/// | 1    | Error (I/O failure, corrupt cache, not found) |
///
/// Logs and error details go to stderr so stdout can be piped cleanly.
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cmd_fetch;
mod cmd_inspect;
mod cmd_validate;
mod config;
mod source_dir;

use config::SpongeConfig;

// ── CLI root ──────────────────────────────────────────────────────────────────

/// The Sponge block-cache command-line tool.
#[derive(Parser)]
#[command(name = "sponge", version, about = "Block cache and source fallback CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file (see `SpongeConfig`).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Cache snapshot file, overriding the configuration.
    #[arg(long, global = true)]
    cache_file: Option<PathBuf>,

    /// Directory resources are fetched from, overriding the configuration.
    #[arg(long, global = true)]
    source_dir: Option<PathBuf>,

    /// Log at debug level (otherwise `RUST_LOG`, default `warn`).
    #[arg(short, long, global = true)]
    verbose: bool,
}

// ── Sub-commands ──────────────────────────────────────────────────────────────

#[derive(Subcommand)]
enum Commands {
    /// Serve a resource through the cache, falling back to the source directory.
    Fetch(FetchArgs),
    /// Print the download state of one cached resource.
    Inspect(InspectArgs),
    /// Check every download state and its blocks in the cache file.
    Validate,
}

// ── Argument structs ──────────────────────────────────────────────────────────

/// Arguments for `sponge fetch`.
///
/// The key is a path relative to the source directory. The first fetch
/// reads the file from the source directory and fills the cache; later
/// fetches are served from the cache file alone.
#[derive(clap::Args)]
pub struct FetchArgs {
    /// Resource key (path relative to the source directory).
    pub key: String,

    /// Write the content to this file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for `sponge inspect`.
///
/// ```text
/// ┌────────────┬─────────────────────────────────────────────┐
/// │ Flag       │ Effect                                      │
/// ├────────────┼─────────────────────────────────────────────┤
/// │ --missing  │ List the ranges of block ids not yet cached │
/// └────────────┴─────────────────────────────────────────────┘
/// ```
#[derive(clap::Args)]
pub struct InspectArgs {
    /// Resource key to look up.
    pub key: String,

    /// List missing block id ranges.
    #[arg(long)]
    pub missing: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<()> {
    let mut config = SpongeConfig::load(cli.config.as_deref())?;
    config.apply_overrides(cli.cache_file, cli.source_dir);

    let runtime = tokio::runtime::Runtime::new().context("failed to start the async runtime")?;
    runtime.block_on(async {
        match cli.command {
            Commands::Fetch(args) => cmd_fetch::run(&args, &config).await,
            Commands::Inspect(args) => cmd_inspect::run(&args, &config).await,
            Commands::Validate => cmd_validate::run(&config),
        }
    })
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}
