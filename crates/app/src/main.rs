use std::path::{Path, PathBuf};

use anyhow::Context;
use budgetwise_engine::{EngineConfig, SuggestionEngine};
use budgetwise_storage::SqliteStore;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::Command;

/// Learns categories from your history and suggests them for new transactions.
#[derive(Debug, Parser)]
#[command(name = "budgetwise", version)]
struct Cli {
    /// Directory holding budget.db and config.toml
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override the configured confidence threshold (0-100)
    #[arg(long, global = true)]
    threshold: Option<f64>,

    #[command(subcommand)]
    command: Command,
}

fn default_data_dir() -> anyhow::Result<PathBuf> {
    let project_dirs = directories::ProjectDirs::from("com", "budgetwise", "Budgetwise")
        .context("Failed to get app directory")?;
    Ok(project_dirs.data_dir().to_path_buf())
}

fn load_config(path: &Path) -> anyhow::Result<EngineConfig> {
    if !path.exists() {
        return Ok(EngineConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config = EngineConfig::from_toml(&content)?;
    tracing::debug!("Loaded config from {}", path.display());
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

    let config = load_config(&data_dir.join("config.toml"))?;

    let db_path = data_dir.join("budget.db");
    let store = SqliteStore::open(&db_path)
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    let mut engine = SuggestionEngine::load(store, config).await?;
    if let Some(threshold) = cli.threshold {
        engine.set_confidence_threshold(threshold);
    }

    commands::run(cli.command, &mut engine).await
}
