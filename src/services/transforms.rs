//! Post-fetch shaping shared by every consumer list.

use std::collections::{HashMap, HashSet};

use crate::models::{CatalogRecord, ChannelId, ChannelRecord, VideoRecord};

/// Neither tombstoned nor gone upstream
pub fn is_presentable<T: CatalogRecord>(record: &T) -> bool {
    !record.is_deleted() && record.is_available()
}

/// Drop tombstoned and unavailable records, then duplicates.
/// The first occurrence of an identity key wins.
pub fn visible<T: CatalogRecord>(records: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| is_presentable(record))
        .filter(|record| seen.insert(record.identity_key().to_string()))
        .collect()
}

/// Newest upload first. Stable, so equal timestamps keep source order.
pub fn sort_by_upload_date(videos: &mut [VideoRecord]) {
    videos.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
}

/// Fill channel display fields from the known channels; videos pointing at a
/// channel we do not have get the default channel name and thumbnail.
pub fn attach_channels(videos: Vec<VideoRecord>, channels: &[ChannelRecord]) -> Vec<VideoRecord> {
    let by_id: HashMap<&ChannelId, &ChannelRecord> = channels
        .iter()
        .filter(|channel| !channel.is_deleted())
        .map(|channel| (&channel.channel_id, channel))
        .collect();

    videos
        .into_iter()
        .map(|video| {
            let channel = by_id.get(&video.channel_id).copied();
            video.with_channel_fallback(channel)
        })
        .collect()
}

/// The standard shaping for video lists
pub fn prepare_videos(videos: Vec<VideoRecord>, channels: &[ChannelRecord]) -> Vec<VideoRecord> {
    let mut videos = visible(videos);
    sort_by_upload_date(&mut videos);
    attach_channels(videos, channels)
}

pub fn prepare_channels(channels: Vec<ChannelRecord>) -> Vec<ChannelRecord> {
    let mut channels = visible(channels);
    channels.sort_by(|a, b| a.title.to_lowercase().cmp(&b.title.to_lowercase()));
    channels
}
