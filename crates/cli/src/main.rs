//! scour CLI — the main entry point.
//!
//! Commands:
//! - `research` — run one research session and print the answer
//! - `gateway`  — start the HTTP chat-completions server

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "scour",
    about = "scour — an iterative, citation-backed research agent",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Research a question and print the answer with references
    Research {
        /// The question to research
        question: String,

        /// Token budget override
        #[arg(short, long)]
        budget: Option<u64>,

        /// Step limit override
        #[arg(long)]
        max_steps: Option<u32>,

        /// Forbid a direct answer at step 1
        #[arg(long)]
        no_direct_answer: bool,

        /// Print the full result as JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP gateway server
    Gateway {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = scour_config::ScourConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Research { question, budget, max_steps, no_direct_answer, json } => {
            commands::research::run(config, question, budget, max_steps, no_direct_answer, json)
                .await?
        }
        Commands::Gateway { port } => commands::gateway::run(config, port).await?,
    }

    Ok(())
}
