use clap::{Parser, Subcommand};
use plan_grounding::Result;
use plan_grounding::commands::{ingest, query, show_config, status};
use plan_grounding::config::{Config, get_config_dir};
use plan_grounding::retriever::DEFAULT_TOP_K;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "plan-grounding")]
#[command(about = "Retrieval grounding engine for AI-assisted traffic control plans")]
#[command(version)]
struct Cli {
    /// Override the configuration directory
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest the corpus directories into a fresh searchable index
    Ingest,
    /// Search the index and report grounding coverage
    Query {
        /// Query text
        query: String,
        /// Number of results per document class
        #[arg(short, long, default_value_t = DEFAULT_TOP_K)]
        k: usize,
        /// Required topic label; may be given multiple times
        #[arg(long = "topic")]
        topics: Vec<String>,
    },
    /// Show index readiness statistics
    Status,
    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir().map_err(|e| anyhow::anyhow!(e))?,
    };
    let config = Config::load(&config_dir)?;

    match cli.command {
        Commands::Ingest => {
            ingest(&config)?;
        }
        Commands::Query { query: text, k, topics } => {
            query(&config, &text, k, &topics)?;
        }
        Commands::Status => {
            status(&config)?;
        }
        Commands::Config { show } => {
            if show {
                show_config(&config)?;
            } else {
                config.save()?;
                println!(
                    "Wrote configuration to {}",
                    config.base_dir.join("config.toml").display()
                );
            }
        }
    }

    Ok(())
}
