use serde::{Deserialize, Serialize};

use super::{CategoryId, ChannelId, VideoId};

/// Filters accepted by the video list. Every field participates in the
/// cache key, so two filters that differ in any way never share an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoFilter {
    pub category: Option<CategoryId>,
    pub channel: Option<ChannelId>,
    pub search: Option<String>,
    pub limit: Option<usize>,
    /// Admin views only
    pub include_deleted: bool,
}

impl VideoFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: impl Into<CategoryId>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_channel(mut self, channel: impl Into<ChannelId>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        let search = search.into();
        let trimmed = search.trim();
        self.search = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn including_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    /// Stable textual form used inside cache keys
    pub fn cache_fragment(&self) -> String {
        format!(
            "cat={};ch={};q={};n={};del={}",
            self.category.as_ref().map(|c| c.as_str()).unwrap_or("*"),
            self.channel.as_ref().map(|c| c.as_str()).unwrap_or("*"),
            self.search.as_deref().unwrap_or(""),
            self.limit.map(|n| n.to_string()).unwrap_or_default(),
            self.include_deleted
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelFilter {
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub include_deleted: bool,
}

impl ChannelFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        let search = search.into();
        let trimmed = search.trim();
        self.search = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn including_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    pub fn cache_fragment(&self) -> String {
        format!(
            "q={};n={};del={}",
            self.search.as_deref().unwrap_or(""),
            self.limit.map(|n| n.to_string()).unwrap_or_default(),
            self.include_deleted
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelatedVideosParams {
    pub video_id: VideoId,
    pub channel_id: Option<ChannelId>,
    pub limit: usize,
}

impl RelatedVideosParams {
    pub fn new(video_id: impl Into<VideoId>, limit: usize) -> Self {
        Self {
            video_id: video_id.into(),
            channel_id: None,
            limit,
        }
    }

    pub fn in_channel(mut self, channel_id: impl Into<ChannelId>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }
}
