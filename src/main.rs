mod annotator;
mod catalog;
mod config;
mod error;
mod metadata;
mod ollama;
mod repositories;
mod repository;
mod sniffer;
mod tags;
mod web_server;

use crate::annotator::Annotator;
use crate::config::AppConfig;
use crate::repositories::sqlite::SqliteRepository;
use crate::repository::MetadataRepository;
use anyhow::Result;
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

/// Serves an image folder and annotates its pictures with a local vision model.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Directory holding the optional `default`, `<RUN_MODE>` and `local` config files.
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::new(&cli.config_dir)?;

    // Initialize env_logger based on config.log_level
    env_logger::Builder::new()
        .filter_level(config.log_level.parse().unwrap_or(log::LevelFilter::Info))
        .init();

    info!("Starting ai-gallery");
    info!("Catalog root: {:?}", config.catalog_root);
    info!("Vision model: {} at {}", config.image_model, config.ollama_url);

    let repository: Arc<dyn MetadataRepository> =
        Arc::new(SqliteRepository::open(&config.database_file)?);
    repository.ensure_schema().await?;

    let annotator = Arc::new(Annotator::new(&config, repository.clone())?);

    web_server::start_web_server(Arc::new(config), repository, annotator)
        .await
        .map_err(|e| {
            log::error!("Web server error: {}", e);
            e
        })?;

    info!("ai-gallery finished");

    Ok(())
}
