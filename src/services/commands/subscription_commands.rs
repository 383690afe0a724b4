use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};

use super::{Command, MutationContext, ensure_real_target};
use crate::backends::{BackendError, Query};
use crate::constants::{rpc, tables};
use crate::models::{ChannelId, UserId};
use crate::services::cache_keys::{CacheKey, KeyPattern};
use crate::utils::errors::AppError;

/// Columns of the unique (user, channel) constraint
const SUBSCRIPTION_KEY: &[&str] = &["user_id", "channel_id"];

fn subscription_query(user: &UserId, channel: &ChannelId) -> Query {
    Query::new()
        .eq("user_id", user)
        .eq("channel_id", channel)
}

async fn is_subscribed(
    ctx: &MutationContext,
    user: &UserId,
    channel: &ChannelId,
) -> Result<bool, AppError> {
    let query = subscription_query(user, channel).columns(&["id"]).limit(1);
    let rows = ctx
        .read_policy
        .execute("is_subscribed", || ctx.backend.select(tables::SUBSCRIPTIONS, &query))
        .await?;
    Ok(!rows.is_empty())
}

fn invalidations(user: &UserId, channel: &ChannelId) -> Vec<KeyPattern> {
    vec![
        KeyPattern::Exact(CacheKey::SubscriptionStatus(user.clone(), channel.clone())),
        KeyPattern::Exact(CacheKey::Subscriptions(user.clone())),
    ]
}

/// The toggle procedure runs with elevated rights; it is the way around
/// row-level security refusing a direct write.
async fn toggle_via_rpc(
    ctx: &MutationContext,
    user: &UserId,
    channel: &ChannelId,
) -> Result<(), AppError> {
    let body = json!({ "p_user_id": user, "p_channel_id": channel });
    ctx.write_policy
        .execute("toggle_subscription", || {
            ctx.backend.rpc(rpc::TOGGLE_SUBSCRIPTION, body.clone())
        })
        .await?;
    Ok(())
}

/// Whether the signed-in user follows a channel. Anonymous users follow
/// nothing.
pub struct IsSubscribedCommand {
    pub ctx: MutationContext,
    pub channel_id: ChannelId,
}

#[async_trait]
impl Command<bool> for IsSubscribedCommand {
    async fn execute(&self) -> Result<bool, AppError> {
        let Some(user) = self.ctx.session.current_user() else {
            return Ok(false);
        };

        let key = CacheKey::SubscriptionStatus(user.clone(), self.channel_id.clone());
        if let Some(cached) = self.ctx.cache.get::<bool>(&key).await
            && !cached.is_stale
        {
            return Ok(cached.value);
        }

        let subscribed = is_subscribed(&self.ctx, &user, &self.channel_id).await?;
        self.ctx
            .cache
            .set(key, &subscribed, self.ctx.admin_ttl)
            .await?;
        Ok(subscribed)
    }
}

/// Follow a channel. Returns whether anything changed; subscribing twice
/// succeeds both times and leaves one row, even when the two race.
pub struct SubscribeCommand {
    pub ctx: MutationContext,
    pub channel_id: ChannelId,
}

impl SubscribeCommand {
    async fn run(&self, user: &UserId) -> Result<bool, AppError> {
        if is_subscribed(&self.ctx, user, &self.channel_id).await? {
            debug!("{} already follows {}", user, self.channel_id);
            return Ok(false);
        }

        let row = json!({
            "user_id": user,
            "channel_id": self.channel_id,
            "created_at": Utc::now(),
        });
        let inserted = self
            .ctx
            .write_policy
            .execute("subscribe", || {
                self.ctx.backend.insert_ignoring_conflicts(
                    tables::SUBSCRIPTIONS,
                    vec![row.clone()],
                    SUBSCRIPTION_KEY,
                )
            })
            .await;

        match inserted {
            Ok(rows) => Ok(!rows.is_empty()),
            Err(BackendError::Permission { message, .. }) => {
                info!("Direct subscribe refused ({}), using toggle procedure", message);
                toggle_via_rpc(&self.ctx, user, &self.channel_id).await?;
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Command<bool> for SubscribeCommand {
    async fn execute(&self) -> Result<bool, AppError> {
        let target = self.channel_id.to_string();
        ensure_real_target(&target).map_err(|e| self.ctx.failed("subscribe", &target, e))?;
        let user = self
            .ctx
            .session
            .require_user()
            .map_err(|e| self.ctx.failed("subscribe", &target, e))?;

        match self.run(&user).await {
            Ok(changed) => {
                self.ctx
                    .succeeded("subscribe", &target, &invalidations(&user, &self.channel_id))
                    .await;
                Ok(changed)
            }
            Err(e) => Err(self.ctx.failed("subscribe", &target, e)),
        }
    }
}

/// Stop following a channel. Not following it already is a no-op success.
pub struct UnsubscribeCommand {
    pub ctx: MutationContext,
    pub channel_id: ChannelId,
}

impl UnsubscribeCommand {
    async fn run(&self, user: &UserId) -> Result<bool, AppError> {
        if !is_subscribed(&self.ctx, user, &self.channel_id).await? {
            debug!("{} does not follow {}", user, self.channel_id);
            return Ok(false);
        }

        let query = subscription_query(user, &self.channel_id);
        let deleted = self
            .ctx
            .write_policy
            .execute("unsubscribe", || {
                self.ctx.backend.delete(tables::SUBSCRIPTIONS, &query)
            })
            .await;

        match deleted {
            Ok(_) => Ok(true),
            Err(BackendError::Permission { message, .. }) => {
                info!("Direct unsubscribe refused ({}), using toggle procedure", message);
                toggle_via_rpc(&self.ctx, user, &self.channel_id).await?;
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Command<bool> for UnsubscribeCommand {
    async fn execute(&self) -> Result<bool, AppError> {
        let target = self.channel_id.to_string();
        ensure_real_target(&target).map_err(|e| self.ctx.failed("unsubscribe", &target, e))?;
        let user = self
            .ctx
            .session
            .require_user()
            .map_err(|e| self.ctx.failed("unsubscribe", &target, e))?;

        match self.run(&user).await {
            Ok(changed) => {
                self.ctx
                    .succeeded("unsubscribe", &target, &invalidations(&user, &self.channel_id))
                    .await;
                Ok(changed)
            }
            Err(e) => Err(self.ctx.failed("unsubscribe", &target, e)),
        }
    }
}
