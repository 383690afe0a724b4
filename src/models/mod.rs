pub mod filters;
mod identifiers;
pub mod moderation;

pub use filters::{ChannelFilter, RelatedVideosParams, VideoFilter};
pub use identifiers::{CategoryId, ChannelId, RecordId, UserId, VideoId};
pub use moderation::{ModerationDecision, ModerationItem, ModerationKind, ModerationStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::constants::{DEFAULT_CHANNEL_NAME, DEFAULT_CHANNEL_THUMBNAIL, UNAVAILABLE_VIDEO_TITLES};

/// Common surface of everything a consumer list can hold.
///
/// The post-fetch transforms only rely on this trait, so the same
/// soft-delete filtering and deduplication applies to every resource.
pub trait CatalogRecord:
    Clone + std::fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// Key used to deduplicate records coming back from a backend
    fn identity_key(&self) -> &str;

    fn is_deleted(&self) -> bool {
        false
    }

    fn is_placeholder(&self) -> bool {
        false
    }

    /// Content the upstream platform no longer serves
    fn is_available(&self) -> bool {
        true
    }
}

fn unix_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub id: RecordId,
    #[serde(default = "VideoId::default_blank")]
    pub video_id: VideoId,
    pub title: String,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub channel_name: String,
    #[serde(default = "ChannelId::default_blank")]
    pub channel_id: ChannelId,
    #[serde(default)]
    pub channel_thumbnail: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub views: i64,
    #[serde(default = "unix_epoch")]
    pub uploaded_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_placeholder: bool,
}

impl VideoRecord {
    /// Fill in channel display fields when the referenced channel is unknown
    pub fn with_channel_fallback(mut self, channel: Option<&ChannelRecord>) -> Self {
        match channel {
            Some(channel) => {
                if self.channel_name.trim().is_empty() {
                    self.channel_name = channel.title.clone();
                }
                if self.channel_thumbnail.is_none() {
                    self.channel_thumbnail = channel.thumbnail_url.clone();
                }
            }
            None => {
                if self.channel_name.trim().is_empty() {
                    self.channel_name = DEFAULT_CHANNEL_NAME.to_string();
                }
                if self.channel_thumbnail.is_none() {
                    self.channel_thumbnail = Some(DEFAULT_CHANNEL_THUMBNAIL.to_string());
                }
            }
        }
        self
    }
}

impl CatalogRecord for VideoRecord {
    fn identity_key(&self) -> &str {
        if self.video_id.is_blank() {
            self.id.as_str()
        } else {
            self.video_id.as_str()
        }
    }

    fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    fn is_placeholder(&self) -> bool {
        self.is_placeholder
    }

    fn is_available(&self) -> bool {
        let title = self.title.trim();
        !UNAVAILABLE_VIDEO_TITLES
            .iter()
            .any(|unavailable| title.eq_ignore_ascii_case(unavailable))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub id: RecordId,
    #[serde(default = "ChannelId::default_blank")]
    pub channel_id: ChannelId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub default_category: Option<CategoryId>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_placeholder: bool,
}

impl CatalogRecord for ChannelRecord {
    fn identity_key(&self) -> &str {
        if self.channel_id.is_blank() {
            self.id.as_str()
        } else {
            self.channel_id.as_str()
        }
    }

    fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    fn is_placeholder(&self) -> bool {
        self.is_placeholder
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
}

impl CatalogRecord for Category {
    fn identity_key(&self) -> &str {
        self.id.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSubscription {
    #[serde(default)]
    pub id: Option<RecordId>,
    pub user_id: UserId,
    pub channel_id: ChannelId,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl VideoId {
    fn default_blank() -> Self {
        Self::new("")
    }
}

impl ChannelId {
    fn default_blank() -> Self {
        Self::new("")
    }
}
