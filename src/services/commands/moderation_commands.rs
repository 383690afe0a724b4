use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{Command, MutationContext, StepRunner, ensure_real_target};
use crate::backends::Query;
use crate::constants::tables;
use crate::models::{
    ChannelId, ModerationDecision, ModerationItem, ModerationKind, ModerationStatus, RecordId,
    UserId, VideoId,
};
use crate::services::cache_keys::{CacheKey, KeyPattern, ResourceKind};
use crate::utils::errors::AppError;

fn deleted_at_patch(deleted: bool) -> Value {
    if deleted {
        json!({ "deleted_at": Utc::now() })
    } else {
        json!({ "deleted_at": Value::Null })
    }
}

fn channel_invalidations(channel: &ChannelId) -> Vec<KeyPattern> {
    vec![
        KeyPattern::Resource(ResourceKind::Channels),
        KeyPattern::ChannelContent(channel.clone()),
    ]
}

fn video_invalidations() -> Vec<KeyPattern> {
    vec![
        KeyPattern::Resource(ResourceKind::Videos),
        KeyPattern::Resource(ResourceKind::RelatedVideos),
    ]
}

/// Approve or reject a queued channel or video.
///
/// `pending -> approved` restores the target, `pending -> rejected`
/// soft-deletes it. Repeating a decision is a no-op; reversing one is refused.
pub struct ModerateCommand {
    pub ctx: MutationContext,
    pub item_id: RecordId,
    pub decision: ModerationDecision,
}

impl ModerateCommand {
    async fn load_item(&self) -> Result<ModerationItem, AppError> {
        let query = Query::new().eq("id", &self.item_id).limit(1);
        let rows = self
            .ctx
            .read_policy
            .execute("load_moderation_item", || {
                self.ctx.backend.select(tables::MODERATION, &query)
            })
            .await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("moderation item {}", self.item_id)))?;
        Ok(serde_json::from_value(row)?)
    }

    async fn run(&self) -> Result<(ModerationStatus, Vec<KeyPattern>), AppError> {
        let admin = self.ctx.require_admin().await?;
        let item = self.load_item().await?;
        ensure_real_target(&item.target_id)?;

        let next = item.status.transition(self.decision)?;
        if next == item.status {
            debug!("Moderation item {} is already {:?}", item.id, next);
            return Ok((next, Vec::new()));
        }

        let invalidations = match item.kind {
            ModerationKind::Channel => channel_invalidations(&ChannelId::new(&item.target_id)),
            ModerationKind::Video => video_invalidations(),
        };
        match self.apply(&item, next, &admin).await {
            Ok(()) => Ok((next, invalidations)),
            Err(e) => Err(self
                .ctx
                .failed_partway(
                    self.decision.operation_name(),
                    &self.item_id.to_string(),
                    e,
                    &invalidations,
                )
                .await),
        }
    }

    async fn apply(
        &self,
        item: &ModerationItem,
        next: ModerationStatus,
        admin: &UserId,
    ) -> Result<(), AppError> {
        let operation = self.decision.operation_name();
        let mut steps = StepRunner::new(operation);

        let target_query = Query::new().eq(item.kind.target_column(), &item.target_id);
        steps
            .step(
                "update_target",
                self.ctx.update_rows(
                    item.kind.target_table(),
                    &target_query,
                    deleted_at_patch(self.decision.soft_deletes_target()),
                ),
            )
            .await?;

        let queue_query = Query::new().eq("id", &item.id);
        steps
            .step(
                "update_queue_status",
                self.ctx.update_rows(
                    tables::MODERATION,
                    &queue_query,
                    json!({
                        "status": next,
                        "reviewed_by": admin,
                        "reviewed_at": Utc::now(),
                    }),
                ),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Command<ModerationStatus> for ModerateCommand {
    async fn execute(&self) -> Result<ModerationStatus, AppError> {
        let operation = self.decision.operation_name();
        let target = self.item_id.to_string();

        match self.run().await {
            Ok((status, invalidations)) => {
                self.ctx.succeeded(operation, &target, &invalidations).await;
                Ok(status)
            }
            // Already announced by `failed_partway`
            Err(AppError::Mutation(mutation)) => Err(AppError::Mutation(mutation)),
            Err(e) => Err(self.ctx.failed(operation, &target, e)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelRemoval {
    pub videos_hidden: usize,
    pub subscriptions_removed: usize,
}

/// Hide a channel, its videos and its followers' subscriptions.
/// Stops at the first failing step and reports the steps already applied.
pub struct SoftDeleteChannelCommand {
    pub ctx: MutationContext,
    pub channel_id: ChannelId,
}

impl SoftDeleteChannelCommand {
    const OPERATION: &'static str = "soft delete channel";

    async fn run(&self) -> Result<ChannelRemoval, AppError> {
        self.ctx.require_admin().await?;
        ensure_real_target(self.channel_id.as_str())?;

        let by_channel = Query::new().eq("channel_id", &self.channel_id);
        let mut steps = StepRunner::new(Self::OPERATION);

        let channels = steps
            .step(
                "mark_channel_deleted",
                self.ctx
                    .update_rows(tables::CHANNELS, &by_channel, deleted_at_patch(true)),
            )
            .await?;
        if channels.is_empty() {
            return Err(AppError::NotFound(format!("channel {}", self.channel_id)));
        }

        let videos = steps
            .step(
                "hide_channel_videos",
                self.ctx.update_rows(
                    tables::VIDEOS,
                    &by_channel.clone().is_null("deleted_at"),
                    deleted_at_patch(true),
                ),
            )
            .await?;

        let subscriptions = steps
            .step(
                "remove_subscriptions",
                self.ctx.delete_rows(tables::SUBSCRIPTIONS, &by_channel),
            )
            .await?;

        info!(
            "Channel {} removed: {} videos hidden, {} subscriptions dropped",
            self.channel_id,
            videos.len(),
            subscriptions.len()
        );
        Ok(ChannelRemoval {
            videos_hidden: videos.len(),
            subscriptions_removed: subscriptions.len(),
        })
    }
}

#[async_trait]
impl Command<ChannelRemoval> for SoftDeleteChannelCommand {
    async fn execute(&self) -> Result<ChannelRemoval, AppError> {
        let target = self.channel_id.to_string();
        match self.run().await {
            Ok(removal) => {
                let mut invalidations = channel_invalidations(&self.channel_id);
                invalidations.push(KeyPattern::Resource(ResourceKind::Subscriptions));
                self.ctx
                    .succeeded(Self::OPERATION, &target, &invalidations)
                    .await;
                Ok(removal)
            }
            Err(e) => {
                let mut invalidations = channel_invalidations(&self.channel_id);
                invalidations.push(KeyPattern::Resource(ResourceKind::Subscriptions));
                Err(self
                    .ctx
                    .failed_partway(Self::OPERATION, &target, e, &invalidations)
                    .await)
            }
        }
    }
}

/// Undo a channel soft delete. Returns the number of videos restored.
/// Subscriptions dropped by the delete are not recreated.
pub struct RestoreChannelCommand {
    pub ctx: MutationContext,
    pub channel_id: ChannelId,
}

impl RestoreChannelCommand {
    const OPERATION: &'static str = "restore channel";

    async fn run(&self) -> Result<usize, AppError> {
        self.ctx.require_admin().await?;
        ensure_real_target(self.channel_id.as_str())?;

        let by_channel = Query::new().eq("channel_id", &self.channel_id);
        let mut steps = StepRunner::new(Self::OPERATION);

        let channels = steps
            .step(
                "restore_channel",
                self.ctx
                    .update_rows(tables::CHANNELS, &by_channel, deleted_at_patch(false)),
            )
            .await?;
        if channels.is_empty() {
            return Err(AppError::NotFound(format!("channel {}", self.channel_id)));
        }

        let videos = steps
            .step(
                "restore_channel_videos",
                self.ctx.update_rows(
                    tables::VIDEOS,
                    &by_channel.clone().not_null("deleted_at"),
                    deleted_at_patch(false),
                ),
            )
            .await?;
        Ok(videos.len())
    }
}

#[async_trait]
impl Command<usize> for RestoreChannelCommand {
    async fn execute(&self) -> Result<usize, AppError> {
        let target = self.channel_id.to_string();
        match self.run().await {
            Ok(restored) => {
                self.ctx
                    .succeeded(Self::OPERATION, &target, &channel_invalidations(&self.channel_id))
                    .await;
                Ok(restored)
            }
            Err(e) => Err(self
                .ctx
                .failed_partway(
                    Self::OPERATION,
                    &target,
                    e,
                    &channel_invalidations(&self.channel_id),
                )
                .await),
        }
    }
}

/// Admin hard delete of one video and its pending notifications
pub struct PurgeVideoCommand {
    pub ctx: MutationContext,
    pub video_id: VideoId,
}

impl PurgeVideoCommand {
    const OPERATION: &'static str = "purge video";

    async fn run(&self) -> Result<(), AppError> {
        self.ctx.require_admin().await?;
        ensure_real_target(self.video_id.as_str())?;

        let by_video = Query::new().eq("video_id", &self.video_id);
        let mut steps = StepRunner::new(Self::OPERATION);

        steps
            .step(
                "delete_notifications",
                self.ctx.delete_rows(tables::VIDEO_NOTIFICATIONS, &by_video),
            )
            .await?;
        let deleted = steps
            .step("delete_video", self.ctx.delete_rows(tables::VIDEOS, &by_video))
            .await?;

        if deleted.is_empty() {
            return Err(AppError::NotFound(format!("video {}", self.video_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl Command<()> for PurgeVideoCommand {
    async fn execute(&self) -> Result<(), AppError> {
        let target = self.video_id.to_string();
        let mut invalidations = video_invalidations();
        invalidations.push(KeyPattern::Exact(CacheKey::ViewCount(self.video_id.clone())));
        match self.run().await {
            Ok(()) => {
                self.ctx
                    .succeeded(Self::OPERATION, &target, &invalidations)
                    .await;
                Ok(())
            }
            Err(e) => Err(self
                .ctx
                .failed_partway(Self::OPERATION, &target, e, &invalidations)
                .await),
        }
    }
}
