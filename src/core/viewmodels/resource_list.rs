use futures::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::property::{Property, PropertySubscriber};
use crate::models::CatalogRecord;
use crate::services::cache::FetchMode;
use crate::utils::errors::AppError;

/// Produces a list's records. Runs through the result cache, so it is
/// cheap to call and never fails because of a single broken source.
pub type Loader<T> = Arc<dyn Fn(FetchMode) -> BoxFuture<'static, Result<Vec<T>, AppError>> + Send + Sync>;

/// What a UI binds to
#[derive(Debug, Clone)]
pub struct ResourceState<T> {
    pub data: Vec<T>,
    pub is_loading: bool,
    pub error: Option<AppError>,
    /// `data` is sample content standing in for an unreachable backend
    pub is_placeholder: bool,
}

impl<T> Default for ResourceState<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            is_loading: false,
            error: None,
            is_placeholder: false,
        }
    }
}

/// A live, observable list of catalog records.
///
/// Loads run as their own tasks: a caller that stops awaiting `refetch`
/// does not leave the list stuck in the loading state. When loads overlap
/// only the most recently started one is applied.
pub struct ResourceList<T: CatalogRecord> {
    state: Property<ResourceState<T>>,
    loader: Loader<T>,
    generation: Arc<AtomicU64>,
}

impl<T: CatalogRecord> Clone for ResourceList<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            loader: self.loader.clone(),
            generation: self.generation.clone(),
        }
    }
}

impl<T: CatalogRecord> std::fmt::Debug for ResourceList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceList")
            .field("name", &self.state.name())
            .finish_non_exhaustive()
    }
}

impl<T: CatalogRecord> ResourceList<T> {
    pub fn new(name: impl Into<String>, loader: Loader<T>) -> Self {
        Self {
            state: Property::new(ResourceState::default(), name),
            loader,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn name(&self) -> &str {
        self.state.name()
    }

    pub fn state(&self) -> ResourceState<T> {
        self.state.get()
    }

    pub fn data(&self) -> Vec<T> {
        self.state.get().data
    }

    pub fn subscribe(&self) -> PropertySubscriber<ResourceState<T>> {
        self.state.subscribe()
    }

    /// Wait until no load is running and return that state
    pub async fn settled(&self) -> ResourceState<T> {
        self.state.wait_for(|state| !state.is_loading).await
    }

    /// Begin loading without waiting for it
    pub fn start(&self) {
        self.spawn_load(FetchMode::Cached);
    }

    /// Load through the cache. Sources being down is not an error here:
    /// the list shows placeholders instead.
    pub async fn refetch(&self) -> ResourceState<T> {
        self.run(FetchMode::Cached).await
    }

    /// Skip the cache. If every source is exhausted the placeholders stay
    /// and `error` becomes `ContentUnavailable`, since the user asked for
    /// fresh content explicitly.
    pub async fn force_refetch(&self) -> ResourceState<T> {
        self.run(FetchMode::Force).await
    }

    async fn run(&self, mode: FetchMode) -> ResourceState<T> {
        let handle = self.spawn_load(mode);
        if let Err(e) = handle.await {
            warn!("{}: load task ended abnormally: {}", self.name(), e);
        }
        self.state()
    }

    fn spawn_load(&self, mode: FetchMode) -> tokio::task::JoinHandle<()> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.update(|state| state.is_loading = true);

        let state = self.state.clone();
        let loader = self.loader.clone();
        let latest = self.generation.clone();

        tokio::spawn(async move {
            let result = loader(mode).await;

            if latest.load(Ordering::SeqCst) != generation {
                debug!("{}: dropping superseded load", state.name());
                return;
            }

            state.update(|current| {
                current.is_loading = false;
                match result {
                    Ok(records) => {
                        let is_placeholder =
                            !records.is_empty() && records.iter().all(|r| r.is_placeholder());
                        current.error = if is_placeholder && mode == FetchMode::Force {
                            Some(AppError::ContentUnavailable)
                        } else {
                            None
                        };
                        current.is_placeholder = is_placeholder;
                        current.data = records;
                    }
                    Err(e) => {
                        warn!("{}: load failed: {}", state.name(), e);
                        current.error = Some(e);
                    }
                }
            });
        })
    }
}
