mod common;

use common::mocks::{ScriptedAdapter, install_public_videos};
use common::{TestCatalog, fixtures};
use futures::FutureExt;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use yidvid::backends::{BackendError, BackendSurface, MemoryBackend, RetryPolicy, SourceAdapter};
use yidvid::constants::{rpc, tables};
use yidvid::models::{CatalogRecord, ChannelFilter, VideoFilter, VideoRecord};
use yidvid::services::cache::{FetchMode, ResultCache};
use yidvid::services::cache_keys::CacheKey;
use yidvid::services::cascade::{CascadeOrchestrator, ResolvedFrom};
use yidvid::services::placeholder::sample_videos;
use yidvid::AppError;

fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 0,
        base_delay_ms: 1,
        max_delay_ms: 1,
        attempt_timeout: Duration::from_millis(200),
        total_timeout: Duration::from_secs(1),
    }
}

fn record(video_id: &str) -> VideoRecord {
    serde_json::from_value(fixtures::video_row(
        video_id,
        "Shiur",
        "UC-torah",
        "2025-03-01T00:00:00Z",
    ))
    .unwrap()
}

fn records(prefix: &str, count: usize) -> Vec<VideoRecord> {
    (1..=count).map(|i| record(&format!("{}{}", prefix, i))).collect()
}

#[tokio::test]
async fn test_cascade_stops_at_first_non_empty_source() {
    let a = Arc::new(ScriptedAdapter::<VideoRecord>::empty("a"));
    let b = Arc::new(ScriptedAdapter::returning("b", records("b", 3)));
    let c = Arc::new(ScriptedAdapter::returning("c", records("c", 5)));
    let adapters: Vec<Arc<dyn SourceAdapter<VideoFilter, VideoRecord>>> =
        vec![a.clone(), b.clone(), c.clone()];

    let orchestrator = CascadeOrchestrator::new("videos", adapters, sample_videos, 8)
        .with_retry_policy(quick_retry());
    let resolution = orchestrator.resolve_detailed(&VideoFilter::new()).await;

    assert_eq!(resolution.records, records("b", 3));
    assert!(matches!(resolution.source, ResolvedFrom::Adapter { ref name, .. } if name == "b"));
    assert_eq!(a.calls(), 1);
    assert_eq!(b.calls(), 1);
    assert_eq!(c.calls(), 0);
}

#[tokio::test]
async fn test_exhausted_cascade_serves_stable_placeholders() {
    let failing = Arc::new(ScriptedAdapter::<VideoRecord>::failing(
        "table",
        BackendError::Network("connection reset".to_string()),
    ));
    let empty = Arc::new(ScriptedAdapter::<VideoRecord>::empty("rpc"));
    let adapters: Vec<Arc<dyn SourceAdapter<VideoFilter, VideoRecord>>> = vec![failing, empty];
    let orchestrator = CascadeOrchestrator::new("videos", adapters, sample_videos, 6)
        .with_retry_policy(quick_retry());

    let first = orchestrator.resolve(&VideoFilter::new()).await;
    let second = orchestrator.resolve(&VideoFilter::new()).await;

    assert_eq!(first.len(), 6);
    assert!(first.iter().all(|v| v.is_placeholder()));
    let ids: HashSet<_> = first.iter().map(|v| v.id.clone()).collect();
    assert_eq!(ids.len(), 6);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_concurrent_misses_share_one_fetch() {
    let cache = ResultCache::new(16);
    let calls = Arc::new(AtomicUsize::new(0));
    let key = CacheKey::Videos {
        filter: VideoFilter::new().with_category("music"),
        identity: Default::default(),
    };

    let fetch = |calls: Arc<AtomicUsize>| {
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                vec!["v1".to_string()]
            }
            .boxed()
        }
    };

    let (first, second) = tokio::join!(
        cache.get_or_fetch(
            key.clone(),
            Duration::from_secs(60),
            FetchMode::Cached,
            fetch(calls.clone())
        ),
        cache.get_or_fetch(
            key.clone(),
            Duration::from_secs(60),
            FetchMode::Cached,
            fetch(calls.clone())
        ),
    );

    assert_eq!(first.unwrap(), vec!["v1".to_string()]);
    assert_eq!(second.unwrap(), vec!["v1".to_string()]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_lists_never_show_deleted_or_unavailable_videos() {
    let test = TestCatalog::seeded();
    let list = test.catalog.video_list(VideoFilter::new());

    let state = list.refetch().await;

    assert!(state.error.is_none());
    assert!(!state.data.is_empty());
    assert!(state.data.iter().all(|v| v.deleted_at.is_none()));
    assert!(state.data.iter().all(|v| v.is_available()));
    let ids: Vec<_> = state.data.iter().map(|v| v.video_id.as_str()).collect();
    assert_eq!(ids, vec!["v-kiddush", "v-daf", "v-parsha"]);
}

#[tokio::test]
async fn test_deleted_rows_from_a_fallback_source_are_dropped() {
    let backend = MemoryBackend::new();
    backend.fail_target(
        tables::VIDEOS,
        BackendError::Permission {
            status: 401,
            message: "42501".to_string(),
        },
    );
    install_public_videos(
        &backend,
        vec![
            fixtures::video_row("v1", "Kept", "UC-torah", "2025-03-01T00:00:00Z"),
            fixtures::deleted_video_row("v2", "UC-torah"),
        ],
    );
    let test = TestCatalog::with_backend(backend);

    let videos = test.catalog.videos(&VideoFilter::new()).await.unwrap();

    let ids: Vec<_> = videos.iter().map(|v| v.video_id.as_str()).collect();
    assert_eq!(ids, vec!["v1"]);
}

#[tokio::test]
async fn test_fresh_read_skips_fetch_and_stale_read_revalidates_once() {
    let cache = ResultCache::new(16);
    let key = CacheKey::Categories;
    let calls = Arc::new(AtomicUsize::new(0));

    let counted = |calls: Arc<AtomicUsize>, value: &'static str| {
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                value.to_string()
            }
            .boxed()
        }
    };
    let ttl = Duration::from_millis(100);

    let value: String = cache
        .get_or_fetch(key.clone(), ttl, FetchMode::Cached, counted(calls.clone(), "old"))
        .await
        .unwrap();
    assert_eq!(value, "old");

    // Fresh: no fetch
    let value: String = cache
        .get_or_fetch(key.clone(), ttl, FetchMode::Cached, counted(calls.clone(), "new"))
        .await
        .unwrap();
    assert_eq!(value, "old");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(150)).await;

    // Stale: old value right away, a single refetch behind it
    let (a, b): (Result<String, AppError>, Result<String, AppError>) = tokio::join!(
        cache.get_or_fetch(key.clone(), ttl, FetchMode::Cached, counted(calls.clone(), "new")),
        cache.get_or_fetch(key.clone(), ttl, FetchMode::Cached, counted(calls.clone(), "new")),
    );
    assert_eq!(a.unwrap(), "old");
    assert_eq!(b.unwrap(), "old");

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let refreshed = cache.get::<String>(&key).await.unwrap();
    assert_eq!(refreshed.value, "new");
    assert!(!refreshed.is_stale);
}

#[tokio::test]
async fn test_permission_error_falls_through_to_rpc() {
    let backend = MemoryBackend::new();
    backend.fail_target(
        tables::VIDEOS,
        BackendError::Permission {
            status: 403,
            message: "permission denied for table youtube_videos".to_string(),
        },
    );
    install_public_videos(&backend, vec![json!({"id": "v1", "title": "Shabbat Shalom"})]);
    let test = TestCatalog::with_backend(backend);

    let list = test
        .catalog
        .video_list(VideoFilter::new().with_category("music"));
    list.start();
    assert!(list.state().is_loading);

    let state = list.settled().await;

    assert!(state.error.is_none());
    assert!(!state.is_placeholder);
    assert_eq!(state.data.len(), 1);
    assert_eq!(state.data[0].id.as_str(), "v1");
    assert_eq!(state.data[0].title, "Shabbat Shalom");
    assert_eq!(test.backend.call_count(BackendSurface::Rpc, rpc::PUBLIC_VIDEOS), 1);
}

#[tokio::test]
async fn test_force_refetch_with_every_source_empty_keeps_placeholders() {
    let test = TestCatalog::new();
    let list = test.catalog.video_list(VideoFilter::new());

    let first = list.refetch().await;
    assert!(first.is_placeholder);
    assert!(first.error.is_none());

    let forced = list.force_refetch().await;

    assert!(forced.is_placeholder);
    assert_eq!(forced.data, first.data);
    assert!(matches!(forced.error, Some(AppError::ContentUnavailable)));
}

#[tokio::test]
async fn test_channel_list_is_sorted_by_title() {
    let test = TestCatalog::seeded();

    let channels = test.catalog.channels(&ChannelFilter::new()).await.unwrap();

    let titles: Vec<_> = channels.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["Niggun Nights", "Torah Talks"]);
}

#[tokio::test]
async fn test_source_with_only_hidden_rows_falls_through() {
    let backend = MemoryBackend::new();
    backend.seed(
        tables::VIDEOS,
        vec![fixtures::video_row("v-private", "Private video", "UC-torah", "2025-03-04T10:00:00Z")],
    );
    install_public_videos(
        &backend,
        vec![fixtures::video_row("v1", "Shabbat Shalom", "UC-torah", "2025-03-01T00:00:00Z")],
    );
    let test = TestCatalog::with_backend(backend);

    let state = test.catalog.video_list(VideoFilter::new()).refetch().await;

    assert!(state.error.is_none());
    assert!(!state.is_placeholder);
    let ids: Vec<_> = state.data.iter().map(|v| v.video_id.as_str()).collect();
    assert_eq!(ids, vec!["v1"]);
    assert_eq!(test.backend.call_count(BackendSurface::Rpc, rpc::PUBLIC_VIDEOS), 1);
}
