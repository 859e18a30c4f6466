//! `lore`: chunk a wiki, index it, and ask questions answered from its pages.

mod commands;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use lore_rag::RagConfig;

#[derive(Parser, Debug)]
#[command(name = "lore", version)]
#[command(about = "Answer questions about a wiki from its own pages")]
struct Cli {
    /// Configuration file (TOML). Defaults to `<config dir>/lore/config.toml`
    /// when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split cleaned pages into chunk records.
    Chunk {
        /// JSON array of `{url, title, content}` pages.
        pages: PathBuf,

        /// Directory receiving `text_chunks.json` and `chunking_summary.json`.
        out_dir: PathBuf,
    },

    /// Embed chunk records and load them into the index.
    Index {
        /// Chunk records written by `lore chunk`.
        chunks: PathBuf,
    },

    /// Answer a single question.
    Ask {
        /// The question.
        question: String,
    },

    /// Start an interactive conversation.
    Chat,

    /// Show index statistics.
    Stats,

    /// Create the Pinecone index if missing and check the connection.
    Setup,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; the process environment still applies.
    let dotenv = dotenvy::dotenv();
    init_logging();
    if let Ok(path) = dotenv {
        debug!("Loaded environment from {}", path.display());
    }

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).await?;

    match cli.command {
        Command::Chunk { pages, out_dir } => commands::chunk(&config, &pages, &out_dir).await,
        Command::Index { chunks } => commands::index(&config, &chunks).await,
        Command::Ask { question } => commands::ask(&config, &question).await,
        Command::Chat => commands::chat(&config).await,
        Command::Stats => commands::stats(&config).await,
        Command::Setup => commands::setup(&config).await,
    }
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn load_config(path: Option<&Path>) -> Result<RagConfig> {
    if let Some(path) = path {
        return RagConfig::from_file(path)
            .await
            .with_context(|| format!("failed to load configuration from {}", path.display()));
    }

    match default_config_path() {
        Some(path) if path.exists() => RagConfig::from_file(&path)
            .await
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        _ => {
            debug!("No configuration file, using defaults");
            Ok(RagConfig::default())
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("lore").join("config.toml"))
}
