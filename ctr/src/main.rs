use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod context;
mod format;

use commands::images::ImagesCommand;
use context::{AppContext, CliOverrides, VerbosityLevel};

/// ctr - manage images in a local container image store
#[derive(Parser, Debug)]
#[command(name = "ctr")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Root directory of the image store
    #[arg(long, global = true, env = "CTR_ROOT")]
    root: Option<PathBuf>,

    /// Namespace to use
    #[arg(short, long, global = true, env = "CONTAINERD_NAMESPACE")]
    namespace: Option<String>,

    /// Total timeout for the command in seconds, 0 for none
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Control colored output: auto, always, never
    #[arg(long, global = true)]
    color: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Display version information
    Version,
    /// Manage images
    #[command(visible_aliases = ["image", "i"])]
    Images {
        #[command(subcommand)]
        command: ImagesCommand,
    },
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            root: self.root.clone(),
            namespace: self.namespace.clone().filter(|n| !n.is_empty()),
            timeout: self.timeout,
            color: self.color.as_deref().map(format::ColorChoice::from),
        }
    }
}

fn init_tracing(verbosity: VerbosityLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(ctx: &AppContext, command: &ImagesCommand) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();
    let fut = commands::images::handle(ctx, command, &mut stdout);
    match ctx.timeout() {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| anyhow::anyhow!("timed out after {}s", limit.as_secs()))?,
        None => fut.await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let verbosity = VerbosityLevel::from_count(cli.verbose);
    init_tracing(verbosity);

    // Build context with precedence: defaults > config file > env vars > CLI flags
    let ctx = AppContext::build(cli.overrides(), verbosity);

    match &cli.command {
        Commands::Version => commands::version::print_version(),
        Commands::Images { command } => {
            if let Err(e) = run(&ctx, command).await {
                format::error(&ctx, &format!("{:#}", e));
                std::process::exit(1);
            }
        }
    }
}
