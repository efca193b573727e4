mod cli;
mod config;
mod embedding;
mod index;
mod log;
mod retrieval;
mod server;
mod tools;
mod understand;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "testimony",
    version,
    about = "Chatlog evidence-retrieval MCP server"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server (stdio transport)
    Serve {
        /// Serve over Streamable HTTP instead of stdio
        #[arg(long)]
        http: bool,
    },
    /// Build the metadata index from the chatlog
    Index,
    /// Build the semantic index (embedding matrix + manifest)
    Embed,
    /// One-shot question: plan, retrieve, and analyze evidence
    Query {
        /// The question to collect evidence for
        question: String,
        /// Person the question is about
        #[arg(long)]
        target: Option<String>,
    },
    /// List topic labels with message counts
    Topics {
        /// Substring filter on topic labels
        #[arg(long)]
        pattern: Option<String>,
        /// Maximum topics to show
        #[arg(long, default_value_t = 30)]
        limit: usize,
    },
    /// Show chatlog statistics
    Stats,
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to ~/.testimony/models/
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = config::TestimonyConfig::load()?;

    // Initialize tracing with the configured log level.
    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { http } => {
            if http {
                server::serve_http(config).await?;
            } else {
                server::serve_stdio(config).await?;
            }
        }
        Command::Index => cli::index::index(&config)?,
        Command::Embed => cli::embed::embed(&config).await?,
        Command::Query { question, target } => {
            cli::query::query(&config, &question, target.as_deref()).await?;
        }
        Command::Topics { pattern, limit } => {
            cli::topics::topics(&config, pattern.as_deref(), limit)?;
        }
        Command::Stats => cli::stats::stats(&config)?,
        Command::Model { action } => match action {
            ModelAction::Download => {
                cli::model_download(&config.embedding).await?;
            }
        },
    }

    Ok(())
}
