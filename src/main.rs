use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use yidvid::backends::{BackendClient, MemoryBackend, RestClient};
use yidvid::models::{ChannelFilter, RelatedVideosParams, VideoFilter};
use yidvid::services::preferences::{Preferences, SqlitePreferenceStore};
use yidvid::{CatalogService, Config};

#[derive(Parser)]
#[command(name = "yidvid")]
#[command(about = "Query the YidVid catalog", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file to use instead of the one in the user config directory
    #[arg(short, long, env = "YIDVID_CONFIG")]
    config: Option<PathBuf>,

    /// Skip the network and serve from an empty in-memory backend
    #[arg(long)]
    offline: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List videos, newest first
    Videos {
        /// Remembered for later runs; pass an empty value to forget it
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        channel: Option<String>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List channels
    Channels {
        #[arg(long)]
        search: Option<String>,
    },
    /// Videos related to one video
    Related {
        video_id: String,
        #[arg(long)]
        channel: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print the effective configuration
    Config,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn connect(config: Config, offline: bool) -> Result<CatalogService> {
    let backend: Arc<dyn BackendClient> = if offline {
        info!("Offline mode, no backend requests will be made");
        Arc::new(MemoryBackend::new())
    } else {
        Arc::new(
            RestClient::new(&config.backend, config.network.request_timeout())
                .context("Failed to create backend client")?,
        )
    };
    debug!("Using backend {:?}", backend);
    Ok(CatalogService::new(backend, config))
}

/// Preferences live next to the other user data; offline runs keep them in memory
async fn open_preferences(offline: bool) -> Result<Preferences> {
    if offline {
        return Ok(Preferences::in_memory());
    }
    let store = SqlitePreferenceStore::open_default()
        .await
        .context("Failed to open preferences")?;
    Ok(Preferences::new(Arc::new(store)))
}

fn log_cache_stats(catalog: &CatalogService) {
    let stats = catalog.cache().stats();
    debug!(
        "Cache: {} hits, {} misses, {} fetches",
        stats.hits, stats.misses, stats.fetches
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries the JSON output, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("yidvid=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Videos {
            category,
            channel,
            search,
            limit,
        } => {
            let preferences = open_preferences(cli.offline).await?;
            let mut filter = VideoFilter::new();
            if let Some(category) = preferences.category_for_listing(category).await? {
                debug!("Listing category {}", category);
                filter = filter.with_category(category);
            }
            if let Some(channel) = channel {
                filter = filter.with_channel(channel);
            }
            if let Some(search) = search {
                preferences.remember_search(&search).await?;
                filter = filter.with_search(search);
            }
            if let Some(limit) = limit {
                filter = filter.with_limit(limit);
            }
            let catalog = connect(config, cli.offline)?;
            print_json(&catalog.videos(&filter).await?)?;
            log_cache_stats(&catalog);
        }
        Commands::Channels { search } => {
            let mut filter = ChannelFilter::new();
            if let Some(search) = search {
                filter = filter.with_search(search);
            }
            let catalog = connect(config, cli.offline)?;
            print_json(&catalog.channels(&filter).await?)?;
            log_cache_stats(&catalog);
        }
        Commands::Related {
            video_id,
            channel,
            limit,
        } => {
            let limit = limit.unwrap_or(config.catalog.related_limit);
            let mut params = RelatedVideosParams::new(video_id, limit);
            if let Some(channel) = channel {
                params = params.in_channel(channel);
            }
            let catalog = connect(config, cli.offline)?;
            print_json(&catalog.related_videos(&params).await?)?;
            log_cache_stats(&catalog);
        }
    }

    Ok(())
}
