#![allow(dead_code)]

pub mod fixtures;
pub mod mocks;

use std::sync::Arc;
use yidvid::backends::{BackendClient, MemoryBackend};
use yidvid::models::UserId;
use yidvid::{CatalogService, Config};

/// Defaults tuned so failing sources give up quickly
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.network.max_retries = 0;
    config.network.base_delay_ms = 1;
    config.network.max_delay_ms = 5;
    config.network.request_timeout_secs = 2;
    config
}

pub struct TestCatalog {
    pub backend: MemoryBackend,
    pub catalog: CatalogService,
}

impl TestCatalog {
    pub fn new() -> Self {
        Self::with_backend(MemoryBackend::new())
    }

    pub fn with_backend(backend: MemoryBackend) -> Self {
        let client: Arc<dyn BackendClient> = Arc::new(backend.clone());
        let catalog = CatalogService::new(client, fast_config());
        Self { backend, catalog }
    }

    /// Catalog seeded with the standard channels and videos
    pub fn seeded() -> Self {
        let test = Self::new();
        fixtures::seed_catalog(&test.backend);
        test
    }

    pub async fn sign_in(&self, user: &str) {
        self.catalog
            .session()
            .sign_in(UserId::new(user), format!("jwt-{}", user))
            .await;
    }

    /// Sign in as a user the admin check accepts
    pub async fn sign_in_admin(&self, user: &str) {
        mocks::install_admins(&self.backend, &[user]);
        self.sign_in(user).await;
    }
}
