#![cfg(test)]

/// Common test utilities
pub mod common {
    use std::future::Future;
    use std::time::Duration;
    use tokio::time::sleep;

    /// Wait for an async condition to become true
    pub async fn wait_for_async<F, Fut>(mut condition: F, max_wait: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let start = std::time::Instant::now();

        while start.elapsed() < max_wait {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }

        false
    }
}

/// Scripted source adapters
pub mod mock_adapters {
    use crate::backends::{BackendError, BackendSurface, SourceAdapter};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Adapter that answers every call the same way and counts calls
    pub struct StaticAdapter<T> {
        name: String,
        response: Mutex<Result<Vec<T>, BackendError>>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl<T> StaticAdapter<T> {
        pub fn records(name: &str, records: Vec<T>) -> Self {
            Self {
                name: name.to_string(),
                response: Mutex::new(Ok(records)),
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn empty(name: &str) -> Self {
            Self::records(name, Vec::new())
        }

        pub fn failing(name: &str, error: BackendError) -> Self {
            let adapter = Self::empty(name);
            *adapter.response.lock().unwrap() = Err(error);
            adapter
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl<P, T> SourceAdapter<P, T> for StaticAdapter<T>
    where
        P: Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
    {
        fn name(&self) -> &str {
            &self.name
        }

        fn surface(&self) -> BackendSurface {
            BackendSurface::Table
        }

        async fn fetch(&self, _params: &P) -> Result<Vec<T>, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.response.lock().unwrap().clone()
        }
    }
}

pub mod fixtures {
    use crate::models::{ChannelId, ChannelRecord, RecordId, VideoId, VideoRecord};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn day(offset: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap() + Duration::days(offset)
    }

    pub fn video(video_id: &str, title: &str) -> VideoRecord {
        VideoRecord {
            id: RecordId::new(format!("row-{}", video_id)),
            video_id: VideoId::new(video_id),
            title: title.to_string(),
            thumbnail: format!("https://img.example/{}.jpg", video_id),
            channel_name: "Test Channel".to_string(),
            channel_id: ChannelId::new("UC1"),
            channel_thumbnail: None,
            description: None,
            category_id: None,
            views: 0,
            uploaded_at: day(0),
            updated_at: None,
            deleted_at: None,
            is_placeholder: false,
        }
    }

    pub fn video_uploaded(video_id: &str, days_after: i64) -> VideoRecord {
        VideoRecord {
            uploaded_at: day(days_after),
            ..video(video_id, &format!("Video {}", video_id))
        }
    }

    pub fn deleted_video(video_id: &str) -> VideoRecord {
        VideoRecord {
            deleted_at: Some(day(1)),
            ..video(video_id, "Removed")
        }
    }

    pub fn channel(channel_id: &str, title: &str) -> ChannelRecord {
        ChannelRecord {
            id: RecordId::new(format!("row-{}", channel_id)),
            channel_id: ChannelId::new(channel_id),
            title: title.to_string(),
            description: None,
            thumbnail_url: Some(format!("https://img.example/{}.png", channel_id)),
            default_category: None,
            deleted_at: None,
            is_placeholder: false,
        }
    }
}
