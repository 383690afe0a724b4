use std::fmt;

use crate::models::{ChannelFilter, ChannelId, RelatedVideosParams, UserId, VideoFilter, VideoId};
use crate::services::session::Identity;

/// Which logical resource a key belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Videos,
    Channels,
    RelatedVideos,
    Categories,
    Subscriptions,
    ViewCount,
    AdminStatus,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Videos => "videos",
            ResourceKind::Channels => "channels",
            ResourceKind::RelatedVideos => "related",
            ResourceKind::Categories => "categories",
            ResourceKind::Subscriptions => "subscriptions",
            ResourceKind::ViewCount => "views",
            ResourceKind::AdminStatus => "admin",
        }
    }
}

/// Type-safe cache key.
///
/// Keys carry every parameter that changes the shape of a result. Lists whose
/// contents depend on row-level security also carry the identity they were
/// fetched under, so one user's view is never served to another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Videos {
        filter: VideoFilter,
        identity: Identity,
    },

    Channels {
        filter: ChannelFilter,
        identity: Identity,
    },

    RelatedVideos(RelatedVideosParams),

    Categories,

    /// Channels a user follows
    Subscriptions(UserId),

    SubscriptionStatus(UserId, ChannelId),

    ViewCount(VideoId),

    AdminStatus(UserId),
}

impl CacheKey {
    pub fn resource(&self) -> ResourceKind {
        match self {
            CacheKey::Videos { .. } => ResourceKind::Videos,
            CacheKey::Channels { .. } => ResourceKind::Channels,
            CacheKey::RelatedVideos(_) => ResourceKind::RelatedVideos,
            CacheKey::Categories => ResourceKind::Categories,
            CacheKey::Subscriptions(_) | CacheKey::SubscriptionStatus(_, _) => {
                ResourceKind::Subscriptions
            }
            CacheKey::ViewCount(_) => ResourceKind::ViewCount,
            CacheKey::AdminStatus(_) => ResourceKind::AdminStatus,
        }
    }

    /// The signed-in user this entry is scoped to, if any
    pub fn scoped_user(&self) -> Option<&UserId> {
        match self {
            CacheKey::Videos { identity, .. } | CacheKey::Channels { identity, .. } => {
                identity.user_id()
            }
            CacheKey::Subscriptions(user)
            | CacheKey::SubscriptionStatus(user, _)
            | CacheKey::AdminStatus(user) => Some(user),
            CacheKey::RelatedVideos(_) | CacheKey::Categories | CacheKey::ViewCount(_) => None,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = self.resource().as_str();
        match self {
            CacheKey::Videos { filter, identity } => {
                write!(f, "{}:{}:{}", prefix, identity, filter.cache_fragment())
            }
            CacheKey::Channels { filter, identity } => {
                write!(f, "{}:{}:{}", prefix, identity, filter.cache_fragment())
            }
            CacheKey::RelatedVideos(params) => write!(
                f,
                "{}:{}:{}:{}",
                prefix,
                params.video_id,
                params.channel_id.as_ref().map(|c| c.as_str()).unwrap_or("*"),
                params.limit
            ),
            CacheKey::Categories => f.write_str(prefix),
            CacheKey::Subscriptions(user) => write!(f, "{}:{}", prefix, user),
            CacheKey::SubscriptionStatus(user, channel) => {
                write!(f, "{}:{}:{}", prefix, user, channel)
            }
            CacheKey::ViewCount(video) => write!(f, "{}:{}", prefix, video),
            CacheKey::AdminStatus(user) => write!(f, "{}:{}", prefix, user),
        }
    }
}

/// Selects the entries an invalidation removes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern {
    All,
    Exact(CacheKey),
    Resource(ResourceKind),
    /// Everything scoped to one user
    User(UserId),
    /// Video lists that could contain videos of this channel
    ChannelContent(ChannelId),
}

impl KeyPattern {
    pub fn matches(&self, key: &CacheKey) -> bool {
        match self {
            KeyPattern::All => true,
            KeyPattern::Exact(exact) => exact == key,
            KeyPattern::Resource(kind) => key.resource() == *kind,
            KeyPattern::User(user) => key.scoped_user() == Some(user),
            KeyPattern::ChannelContent(channel) => match key {
                CacheKey::Videos { filter, .. } => {
                    filter.channel.is_none() || filter.channel.as_ref() == Some(channel)
                }
                CacheKey::RelatedVideos(_) => true,
                CacheKey::Channels { .. } => true,
                _ => false,
            },
        }
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPattern::All => f.write_str("*"),
            KeyPattern::Exact(key) => write!(f, "{}", key),
            KeyPattern::Resource(kind) => write!(f, "{}:*", kind.as_str()),
            KeyPattern::User(user) => write!(f, "*:{}:*", user),
            KeyPattern::ChannelContent(channel) => write!(f, "videos:*:ch={}", channel),
        }
    }
}
