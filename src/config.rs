use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::constants;

pub const BACKEND_URL_ENV: &str = "YIDVID_BACKEND_URL";
pub const ANON_KEY_ENV: &str = "YIDVID_ANON_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub url: String,

    /// Public (anon) key of the hosted project. Never a service-role key.
    #[serde(default)]
    pub anon_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Channels and categories
    #[serde(default = "default_catalog_ttl")]
    pub catalog_ttl_secs: u64,

    #[serde(default = "default_video_ttl")]
    pub video_ttl_secs: u64,

    /// View counts
    #[serde(default = "default_counts_ttl")]
    pub counts_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_placeholder_count")]
    pub placeholder_count: usize,

    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_related_limit")]
    pub related_limit: usize,
}

impl Config {
    /// Load from the user config directory, falling back to defaults
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let mut config = if config_path.exists() {
            debug!("Loading config from {:?}", config_path);
            let contents =
                fs::read_to_string(config_path).context("Failed to read config file")?;
            let config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            info!("Config loaded successfully");
            config
        } else {
            info!("No config file found at {:?}, using defaults", config_path);
            Config::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(config_path, contents).context("Failed to write config file")?;

        debug!("Config saved to {:?}", config_path);
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
            debug!("Backend url overridden from {}", BACKEND_URL_ENV);
            self.backend.url = url;
        }
        if let Ok(key) = std::env::var(ANON_KEY_ENV) {
            self.backend.anon_key = key;
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;
        Ok(config_dir.join("yidvid").join("config.toml"))
    }

    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir().context("Failed to get data directory")?;
        Ok(data_dir.join("yidvid"))
    }
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl CacheConfig {
    pub fn catalog_ttl(&self) -> Duration {
        Duration::from_secs(self.catalog_ttl_secs)
    }

    pub fn video_ttl(&self) -> Duration {
        Duration::from_secs(self.video_ttl_secs)
    }

    pub fn counts_ttl(&self) -> Duration {
        Duration::from_secs(self.counts_ttl_secs)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            anon_key: String::new(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_timeout(),
            max_retries: default_retries(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            catalog_ttl_secs: default_catalog_ttl(),
            video_ttl_secs: default_video_ttl(),
            counts_ttl_secs: default_counts_ttl(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            placeholder_count: default_placeholder_count(),
            page_size: default_page_size(),
            related_limit: default_related_limit(),
        }
    }
}

// Default value functions
fn default_backend_url() -> String { "http://localhost:54321".to_string() }
fn default_timeout() -> u64 { 8 }
fn default_retries() -> u32 { 2 }
fn default_base_delay() -> u64 { 200 }
fn default_max_delay() -> u64 { 2_000 }
fn default_capacity() -> usize { constants::CACHE_CAPACITY }
fn default_catalog_ttl() -> u64 { constants::CATALOG_TTL.as_secs() }
fn default_video_ttl() -> u64 { constants::VIDEO_LIST_TTL.as_secs() }
fn default_counts_ttl() -> u64 { constants::COUNTS_TTL.as_secs() }
fn default_placeholder_count() -> usize { constants::PLACEHOLDER_COUNT }
fn default_page_size() -> usize { constants::DEFAULT_PAGE_SIZE }
fn default_related_limit() -> usize { constants::RELATED_VIDEOS_LIMIT }
