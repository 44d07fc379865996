//! Stepweave CLI — the main entry point.
//!
//! Commands:
//! - `run`     — Run a workflow and print the final memory
//! - `stream`  — Run a workflow, printing events as JSON lines
//! - `serve`   — Start the HTTP API server
//! - `config`  — Print, show, validate, or locate the configuration

use clap::{Parser, Subcommand};

mod commands;

use commands::RunArgs;

#[derive(Parser)]
#[command(
    name = "stepweave",
    about = "Stepweave — templated LLM workflows with a tool-using agent",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow and print the final memory as JSON
    Run(RunArgs),

    /// Run a workflow and print each event as a JSON line (Ctrl-C cancels)
    Stream(RunArgs),

    /// Start the HTTP API server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Model backend to serve with
        #[arg(short, long)]
        backend: Option<String>,
    },

    /// Configuration commands (default: print a config file with all defaults)
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print a config file with all defaults
    Default,
    /// Print the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
    /// Print the configuration file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable.
    let filter = match (&cli.command, cli.verbose) {
        (_, true) => "debug",
        (Commands::Serve { .. }, false) => "info",
        _ => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => commands::run::run(args).await?,
        Commands::Stream(args) => commands::stream::run(args).await?,
        Commands::Serve { port, backend } => commands::serve::run(port, backend).await?,
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Default) {
            ConfigAction::Default => commands::config_cmd::print_default().await?,
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
        },
    }

    Ok(())
}
