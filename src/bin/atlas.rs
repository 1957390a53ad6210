//! atlas CLI - map the packages and modules of a Go workspace
//!
//! Thin interface over the library: clap parses the scope and flags, the
//! library builds the model, and a summary is printed.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use atlas::core::{CompleteModuleInfo, Module, ProgressCallback};
use atlas::{AtlasConfig, CodeAnalyzer, GoListOracle, ParseOptions, RepositoryResolver, SubTask};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "ATLAS_LOG";

#[derive(Parser, Debug)]
#[command(name = "atlas")]
#[command(version = atlas::VERSION)]
#[command(about = "Discover the packages, import graph and modules of a Go workspace.")]
#[command(after_help = "Examples:
  # The module in the current directory
  atlas

  # The whole standard library
  atlas std

  # The Go toolchain sources alongside the standard library
  atlas std toolchain
")]
struct Cli {
    /// Package patterns, `std` or `toolchain`. Defaults to the current directory.
    #[arg(value_name = "SCOPE")]
    scope: Vec<String>,

    /// Log every resolved module and raise the default log level to debug.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Path to a JSON configuration file. Defaults to ./.atlas_config.json
    #[arg(short = 'c', long = "config", value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Go installation root. Overrides the configuration and $GOROOT.
    #[arg(long = "goroot", value_name = "DIR")]
    goroot: Option<PathBuf>,

    /// Summary format.
    #[arg(long = "format", value_enum, default_value = "text")]
    format: SummaryFormat,

    /// Skip repository URL completion for external modules.
    #[arg(long = "no-provenance")]
    no_provenance: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SummaryFormat {
    Text,
    Json,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("reading the current directory")?;
    let mut config = AtlasConfig::load(cli.config.as_deref(), &cwd)?;
    if cli.goroot.is_some() {
        config.goroot = cli.goroot.clone();
    }
    let verbose = cli.verbose || config.verbose;
    let goroot = config.resolve_goroot()?;
    info!(goroot = %goroot.display(), go = %config.go_command, "starting");

    let oracle = GoListOracle::new(config.go_command.clone(), goroot.clone());
    let resolver = RepositoryResolver::new(&config);
    let complete = |m: &mut Module| resolver.complete(m);
    let progress = |task: SubTask, elapsed: Duration, args: &[u32]| {
        info!(?task, elapsed_ms = elapsed.as_millis() as u64, ?args, "progress");
    };
    let options = ParseOptions {
        progress: Some(&progress as &ProgressCallback<'_>),
        verbose,
        complete_module_info: if cli.no_provenance { None } else { Some(&complete as &CompleteModuleInfo<'_>) },
    };

    let mut analyzer = CodeAnalyzer::new(goroot).with_list_timeout(config.list_timeout());
    analyzer.parse_packages(&oracle, &options, &cli.scope)?;

    let summary = analyzer.summary();
    match cli.format {
        SummaryFormat::Text => print!("{}", summary),
        SummaryFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
