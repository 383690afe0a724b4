// Names and defaults shared across the catalog client.
// Tuning values (TTLs, retries) live in config.rs and are only defaulted here.

use std::time::Duration;

// === Display fallbacks ===

/// Shown when a video references a channel we could not resolve
pub const DEFAULT_CHANNEL_NAME: &str = "YidVid Channel";
pub const DEFAULT_CHANNEL_THUMBNAIL: &str = "/placeholder.svg";

/// Titles the video platform substitutes for content that is gone
pub const UNAVAILABLE_VIDEO_TITLES: &[&str] = &["Private video", "Deleted video"];

// === Cache TTL defaults ===

/// Channel list and categories change rarely
pub const CATALOG_TTL: Duration = Duration::from_secs(5 * 60);
pub const VIDEO_LIST_TTL: Duration = Duration::from_secs(60);
/// View counts and other aggregates
pub const COUNTS_TTL: Duration = Duration::from_secs(30);
pub const CACHE_CAPACITY: usize = 512;

// === Catalog defaults ===

pub const PLACEHOLDER_COUNT: usize = 8;
pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const RELATED_VIDEOS_LIMIT: usize = 12;
/// Narrow query used when the full query keeps failing
pub const SIMPLIFIED_QUERY_LIMIT: usize = 20;

pub mod tables {
    pub const VIDEOS: &str = "youtube_videos";
    pub const CHANNELS: &str = "youtube_channels";
    pub const CATEGORIES: &str = "custom_categories";
    pub const SUBSCRIPTIONS: &str = "channel_subscriptions";
    pub const MODERATION: &str = "moderation_queue";
    pub const VIDEO_NOTIFICATIONS: &str = "video_notifications";
}

pub mod rpc {
    pub const PUBLIC_VIDEOS: &str = "get_public_videos";
    pub const VISIBLE_CHANNELS: &str = "get_visible_channels";
    pub const RELATED_VIDEOS: &str = "get_related_videos";
    pub const INCREMENT_VIEWS: &str = "increment_video_views";
    pub const TOGGLE_SUBSCRIPTION: &str = "toggle_channel_subscription";
    pub const CHECK_ADMIN: &str = "check_admin_status";
}

pub mod functions {
    pub const PUBLIC_VIDEOS: &str = "get-public-videos";
    pub const PUBLIC_CHANNELS: &str = "get-public-channels";
}
