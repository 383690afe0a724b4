//! Synthetic records served when every source for a resource is exhausted.
//!
//! Output is a pure function of the requested count: ids are UUIDv5 values
//! derived from a fixed namespace, so repeated calls yield identical records
//! and the UI can key on them without flicker.

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use crate::constants::{DEFAULT_CHANNEL_NAME, DEFAULT_CHANNEL_THUMBNAIL};
use crate::models::{ChannelId, ChannelRecord, RecordId, VideoId, VideoRecord};

/// External ids of placeholder records all start with this
pub const PLACEHOLDER_ID_PREFIX: &str = "sample-";

const PLACEHOLDER_NAMESPACE: Uuid = Uuid::from_u128(0x6a1f_52c4_0b7e_4d59_9c3e_51d2_a7f0_0e11);

fn placeholder_id(kind: &str, index: usize) -> String {
    Uuid::new_v5(&PLACEHOLDER_NAMESPACE, format!("{}:{}", kind, index).as_bytes()).to_string()
}

fn base_timestamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Whether an external video or channel id belongs to a placeholder record
pub fn is_placeholder_id(id: &str) -> bool {
    id.starts_with(PLACEHOLDER_ID_PREFIX)
}

pub fn sample_videos(count: usize) -> Vec<VideoRecord> {
    let base = base_timestamp();
    (0..count)
        .map(|index| {
            let id = placeholder_id("video", index);
            VideoRecord {
                id: RecordId::new(id.clone()),
                video_id: VideoId::new(format!("{}{}", PLACEHOLDER_ID_PREFIX, index + 1)),
                title: format!("Sample video {}", index + 1),
                thumbnail: DEFAULT_CHANNEL_THUMBNAIL.to_string(),
                channel_name: DEFAULT_CHANNEL_NAME.to_string(),
                channel_id: ChannelId::new(format!("{}channel-{}", PLACEHOLDER_ID_PREFIX, index % 3 + 1)),
                channel_thumbnail: Some(DEFAULT_CHANNEL_THUMBNAIL.to_string()),
                description: None,
                category_id: None,
                views: 0,
                // Newest first, matching the order real lists are sorted in
                uploaded_at: base - Duration::days(index as i64),
                updated_at: None,
                deleted_at: None,
                is_placeholder: true,
            }
        })
        .collect()
}

pub fn sample_channels(count: usize) -> Vec<ChannelRecord> {
    (0..count)
        .map(|index| ChannelRecord {
            id: RecordId::new(placeholder_id("channel", index)),
            channel_id: ChannelId::new(format!("{}channel-{}", PLACEHOLDER_ID_PREFIX, index + 1)),
            title: format!("{} {}", DEFAULT_CHANNEL_NAME, index + 1),
            description: None,
            thumbnail_url: Some(DEFAULT_CHANNEL_THUMBNAIL.to_string()),
            default_category: None,
            deleted_at: None,
            is_placeholder: true,
        })
        .collect()
}
