//! Read side of the catalog: one cascade per resource, results memoized in
//! the shared cache, and observable lists built on top.

use futures::FutureExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::backends::adapters::{category_adapters, channel_adapters, related_adapters, video_adapters};
use crate::backends::{BackendClient, Query, RetryPolicy};
use crate::config::Config;
use crate::constants::tables;
use crate::core::viewmodels::resource_list::Loader;
use crate::core::ResourceList;
use crate::events::EventBus;
use crate::models::{
    CatalogRecord, Category, ChannelFilter, ChannelId, ChannelRecord, RelatedVideosParams,
    VideoFilter, VideoId, VideoRecord,
};
use crate::services::cache::{FetchMode, ResultCache};
use crate::services::cache_keys::CacheKey;
use crate::services::cascade::CascadeOrchestrator;
use crate::services::commands::MutationContext;
use crate::services::placeholder::{sample_channels, sample_videos};
use crate::services::session::Session;
use crate::services::transforms;
use crate::utils::errors::AppError;

type Orchestrator<P, T> = Arc<CascadeOrchestrator<P, T>>;

fn no_placeholders<T>(_count: usize) -> Vec<T> {
    Vec::new()
}

/// Placeholder results are kept with a zero TTL: served once more while the
/// next read retries the real sources.
fn ttl_for<T: CatalogRecord>(records: &[T], ttl: Duration) -> Duration {
    if !records.is_empty() && records.iter().all(|r| r.is_placeholder()) {
        Duration::ZERO
    } else {
        ttl
    }
}

#[derive(Clone)]
pub struct CatalogService {
    backend: Arc<dyn BackendClient>,
    cache: ResultCache,
    events: Arc<EventBus>,
    session: Arc<Session>,
    config: Arc<Config>,
    videos: Orchestrator<VideoFilter, VideoRecord>,
    channels: Orchestrator<ChannelFilter, ChannelRecord>,
    related: Orchestrator<RelatedVideosParams, VideoRecord>,
    categories: Orchestrator<(), Category>,
}

impl std::fmt::Debug for CatalogService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogService")
            .field("backend", &self.backend)
            .field("identity", &self.session.identity())
            .finish_non_exhaustive()
    }
}

impl CatalogService {
    pub fn new(backend: Arc<dyn BackendClient>, config: Config) -> Self {
        let cache = ResultCache::new(config.cache.capacity);
        let events = Arc::new(EventBus::default());
        Self::with_parts(backend, cache, events, config)
    }

    /// Build on an existing cache and event bus
    pub fn with_parts(
        backend: Arc<dyn BackendClient>,
        cache: ResultCache,
        events: Arc<EventBus>,
        config: Config,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config.network);
        let count = config.catalog.placeholder_count;

        let videos = CascadeOrchestrator::new(
            "videos",
            video_adapters(&backend, config.catalog.page_size),
            sample_videos,
            count,
        )
        .with_retry_policy(retry.clone())
        .with_usable_check(transforms::is_presentable)
        .with_events(events.clone());

        let channels =
            CascadeOrchestrator::new("channels", channel_adapters(&backend), sample_channels, count)
                .with_retry_policy(retry.clone())
                .with_usable_check(transforms::is_presentable)
                .with_events(events.clone());

        let related = CascadeOrchestrator::new(
            "related_videos",
            related_adapters(&backend),
            sample_videos,
            count,
        )
        .with_retry_policy(retry.clone())
        .with_usable_check(transforms::is_presentable)
        .with_events(events.clone());

        // An empty category bar beats made-up categories
        let categories = CascadeOrchestrator::new(
            "categories",
            category_adapters(&backend),
            no_placeholders,
            0,
        )
        .with_retry_policy(retry);

        let session = Arc::new(Session::new(backend.clone(), cache.clone(), events.clone()));

        Self {
            backend,
            cache,
            events,
            session,
            config: Arc::new(config),
            videos: Arc::new(videos),
            channels: Arc::new(channels),
            related: Arc::new(related),
            categories: Arc::new(categories),
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared state for the write commands
    pub fn mutation_context(&self) -> MutationContext {
        let read_policy = RetryPolicy::from_config(&self.config.network);
        let write_policy = RetryPolicy::once(self.config.network.request_timeout());
        let mut ctx = MutationContext::new(
            self.backend.clone(),
            self.cache.clone(),
            self.events.clone(),
            self.session.clone(),
        )
        .with_policies(read_policy, write_policy);
        ctx.admin_ttl = self.config.cache.catalog_ttl();
        ctx
    }

    pub async fn videos(&self, filter: &VideoFilter) -> Result<Vec<VideoRecord>, AppError> {
        self.fetch_videos(filter.clone(), FetchMode::Cached).await
    }

    pub async fn channel_videos(&self, channel: &ChannelId) -> Result<Vec<VideoRecord>, AppError> {
        self.videos(&VideoFilter::new().with_channel(channel.clone()))
            .await
    }

    pub async fn channels(&self, filter: &ChannelFilter) -> Result<Vec<ChannelRecord>, AppError> {
        self.fetch_channels(filter.clone(), FetchMode::Cached).await
    }

    pub async fn related_videos(
        &self,
        params: &RelatedVideosParams,
    ) -> Result<Vec<VideoRecord>, AppError> {
        self.fetch_related(params.clone(), FetchMode::Cached).await
    }

    pub async fn categories(&self) -> Result<Vec<Category>, AppError> {
        self.fetch_categories(FetchMode::Cached).await
    }

    /// Current view count, `None` when it cannot be read right now
    pub async fn view_count(&self, video: &VideoId) -> Result<Option<i64>, AppError> {
        let backend = self.backend.clone();
        let retry = RetryPolicy::from_config(&self.config.network);
        let ttl = self.config.cache.counts_ttl();
        let query = Query::new()
            .eq("video_id", video)
            .columns(&["views"])
            .limit(1);

        self.cache
            .get_or_fetch_with_ttl(CacheKey::ViewCount(video.clone()), FetchMode::Cached, move || {
                async move {
                    let rows = retry
                        .execute("view_count", || backend.select(tables::VIDEOS, &query))
                        .await;
                    match rows {
                        Ok(rows) => {
                            let views = rows.first().and_then(|row| row.get("views")).and_then(Value::as_i64);
                            (views, ttl)
                        }
                        Err(e) => {
                            warn!("Could not read view count: {}", e);
                            (None, Duration::ZERO)
                        }
                    }
                }
                .boxed()
            })
            .await
    }

    pub fn video_list(&self, filter: VideoFilter) -> ResourceList<VideoRecord> {
        let service = self.clone();
        let loader: Loader<VideoRecord> = Arc::new(move |mode| {
            let service = service.clone();
            let filter = filter.clone();
            async move { service.fetch_videos(filter, mode).await }.boxed()
        });
        ResourceList::new("videos", loader)
    }

    pub fn channel_video_list(&self, channel: ChannelId) -> ResourceList<VideoRecord> {
        self.video_list(VideoFilter::new().with_channel(channel))
    }

    pub fn channel_list(&self, filter: ChannelFilter) -> ResourceList<ChannelRecord> {
        let service = self.clone();
        let loader: Loader<ChannelRecord> = Arc::new(move |mode| {
            let service = service.clone();
            let filter = filter.clone();
            async move { service.fetch_channels(filter, mode).await }.boxed()
        });
        ResourceList::new("channels", loader)
    }

    pub fn related_video_list(&self, params: RelatedVideosParams) -> ResourceList<VideoRecord> {
        let service = self.clone();
        let loader: Loader<VideoRecord> = Arc::new(move |mode| {
            let service = service.clone();
            let params = params.clone();
            async move { service.fetch_related(params, mode).await }.boxed()
        });
        ResourceList::new("related_videos", loader)
    }

    pub fn category_list(&self) -> ResourceList<Category> {
        let service = self.clone();
        let loader: Loader<Category> = Arc::new(move |mode| {
            let service = service.clone();
            async move { service.fetch_categories(mode).await }.boxed()
        });
        ResourceList::new("categories", loader)
    }

    /// Channels already in the cache for the default channel list, used to
    /// fill in display fields of videos. Never triggers a fetch.
    async fn known_channels(cache: &ResultCache, session: &Session) -> Vec<ChannelRecord> {
        let key = CacheKey::Channels {
            filter: ChannelFilter::new(),
            identity: session.identity(),
        };
        cache
            .get::<Vec<ChannelRecord>>(&key)
            .await
            .map(|cached| cached.value)
            .unwrap_or_default()
    }

    async fn fetch_videos(
        &self,
        filter: VideoFilter,
        mode: FetchMode,
    ) -> Result<Vec<VideoRecord>, AppError> {
        let key = CacheKey::Videos {
            filter: filter.clone(),
            identity: self.session.identity(),
        };
        let orchestrator = self.videos.clone();
        let cache = self.cache.clone();
        let session = self.session.clone();
        let ttl = self.config.cache.video_ttl();

        debug!("Loading {}", key);
        self.cache
            .get_or_fetch_with_ttl(key, mode, move || {
                async move {
                    let records = orchestrator.resolve(&filter).await;
                    let channels = Self::known_channels(&cache, &session).await;
                    let mut videos = transforms::prepare_videos(records, &channels);
                    if let Some(limit) = filter.limit {
                        videos.truncate(limit);
                    }
                    let ttl = ttl_for(&videos, ttl);
                    (videos, ttl)
                }
                .boxed()
            })
            .await
    }

    async fn fetch_channels(
        &self,
        filter: ChannelFilter,
        mode: FetchMode,
    ) -> Result<Vec<ChannelRecord>, AppError> {
        let key = CacheKey::Channels {
            filter: filter.clone(),
            identity: self.session.identity(),
        };
        let orchestrator = self.channels.clone();
        let ttl = self.config.cache.catalog_ttl();

        self.cache
            .get_or_fetch_with_ttl(key, mode, move || {
                async move {
                    let channels = transforms::prepare_channels(orchestrator.resolve(&filter).await);
                    let ttl = ttl_for(&channels, ttl);
                    (channels, ttl)
                }
                .boxed()
            })
            .await
    }

    async fn fetch_related(
        &self,
        params: RelatedVideosParams,
        mode: FetchMode,
    ) -> Result<Vec<VideoRecord>, AppError> {
        let orchestrator = self.related.clone();
        let cache = self.cache.clone();
        let session = self.session.clone();
        let ttl = self.config.cache.video_ttl();

        self.cache
            .get_or_fetch_with_ttl(CacheKey::RelatedVideos(params.clone()), mode, move || {
                async move {
                    let records = orchestrator.resolve(&params).await;
                    let channels = Self::known_channels(&cache, &session).await;
                    // Relevance order from the source is kept
                    let videos: Vec<VideoRecord> = transforms::visible(records)
                        .into_iter()
                        .filter(|video| video.video_id != params.video_id)
                        .take(params.limit)
                        .collect();
                    let videos = transforms::attach_channels(videos, &channels);
                    let ttl = ttl_for(&videos, ttl);
                    (videos, ttl)
                }
                .boxed()
            })
            .await
    }

    async fn fetch_categories(&self, mode: FetchMode) -> Result<Vec<Category>, AppError> {
        let orchestrator = self.categories.clone();
        let ttl = self.config.cache.catalog_ttl();

        self.cache
            .get_or_fetch_with_ttl(CacheKey::Categories, mode, move || {
                async move {
                    let categories = transforms::visible(orchestrator.resolve(&()).await);
                    // Nothing to show is not worth keeping around
                    let ttl = if categories.is_empty() { Duration::ZERO } else { ttl };
                    (categories, ttl)
                }
                .boxed()
            })
            .await
    }
}
