use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{Command, MutationContext, ensure_real_target};
use crate::backends::Query;
use crate::constants::{rpc, tables};
use crate::models::{Category, CategoryId, VideoId};
use crate::services::cache_keys::{CacheKey, KeyPattern, ResourceKind};
use crate::utils::errors::AppError;

/// Admin rename of a category. Video lists filter by category, so they are
/// invalidated alongside the category list.
pub struct UpdateCategoryCommand {
    pub ctx: MutationContext,
    pub category_id: CategoryId,
    pub name: String,
    pub icon: Option<String>,
}

impl UpdateCategoryCommand {
    const OPERATION: &'static str = "update category";

    async fn run(&self) -> Result<Category, AppError> {
        self.ctx.require_admin().await?;

        let name = self.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation(
                "category name cannot be empty".to_string(),
            ));
        }

        let query = Query::new().eq("id", &self.category_id);
        let rows = self
            .ctx
            .update_rows(
                tables::CATEGORIES,
                &query,
                json!({ "name": name, "icon": self.icon }),
            )
            .await?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("category {}", self.category_id)))?;
        Ok(serde_json::from_value(row)?)
    }
}

#[async_trait]
impl Command<Category> for UpdateCategoryCommand {
    async fn execute(&self) -> Result<Category, AppError> {
        let target = self.category_id.to_string();
        match self.run().await {
            Ok(category) => {
                self.ctx
                    .succeeded(
                        Self::OPERATION,
                        &target,
                        &[
                            KeyPattern::Resource(ResourceKind::Categories),
                            KeyPattern::Resource(ResourceKind::Videos),
                        ],
                    )
                    .await;
                Ok(category)
            }
            Err(e) => Err(self.ctx.failed(Self::OPERATION, &target, e)),
        }
    }
}

fn view_count(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::Object(object) => object.get("views").and_then(Value::as_i64),
        Value::Array(rows) => rows.first().and_then(view_count),
        _ => None,
    }
}

/// Count one view. Tries the increment procedure, then a read-modify-write on
/// the row. Each surface is attempted at most once so a view is never
/// counted twice. Returns the new count when the backend reports it.
pub struct IncrementViewsCommand {
    pub ctx: MutationContext,
    pub video_id: VideoId,
}

impl IncrementViewsCommand {
    const OPERATION: &'static str = "increment views";

    async fn direct_update(&self) -> Result<Option<i64>, AppError> {
        let query = Query::new().eq("video_id", &self.video_id);
        let read = query.clone().columns(&["views"]).limit(1);
        let rows = self
            .ctx
            .write_policy
            .execute("read_views", || self.ctx.backend.select(tables::VIDEOS, &read))
            .await?;
        let current = rows
            .first()
            .map(|row| view_count(row).unwrap_or(0))
            .ok_or_else(|| AppError::NotFound(format!("video {}", self.video_id)))?;

        let updated = self
            .ctx
            .update_rows(tables::VIDEOS, &query, json!({ "views": current + 1 }))
            .await?;
        Ok(updated.first().and_then(view_count).or(Some(current + 1)))
    }

    async fn run(&self) -> Result<Option<i64>, AppError> {
        ensure_real_target(self.video_id.as_str())?;

        let body = json!({ "video_id": self.video_id });
        let via_rpc = self
            .ctx
            .write_policy
            .execute("increment_views", || {
                self.ctx.backend.rpc(rpc::INCREMENT_VIEWS, body.clone())
            })
            .await;

        match via_rpc {
            Ok(response) => {
                debug!("Counted view for {} via procedure", self.video_id);
                Ok(view_count(&response))
            }
            Err(e) => {
                warn!(
                    "Increment procedure failed for {}: {}, updating row directly",
                    self.video_id, e
                );
                self.direct_update().await
            }
        }
    }
}

#[async_trait]
impl Command<Option<i64>> for IncrementViewsCommand {
    async fn execute(&self) -> Result<Option<i64>, AppError> {
        let target = self.video_id.to_string();
        match self.run().await {
            Ok(views) => {
                self.ctx
                    .succeeded(
                        Self::OPERATION,
                        &target,
                        &[KeyPattern::Exact(CacheKey::ViewCount(self.video_id.clone()))],
                    )
                    .await;
                Ok(views)
            }
            Err(e) => Err(self.ctx.failed(Self::OPERATION, &target, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{BackendClient, BackendError, BackendSurface, MemoryBackend};
    use crate::events::EventBus;
    use crate::models::UserId;
    use crate::services::cache::ResultCache;
    use crate::services::session::Session;
    use std::sync::Arc;
    use std::time::Duration;

    fn context(backend: &MemoryBackend) -> MutationContext {
        let cache = ResultCache::new(32);
        let events = Arc::new(EventBus::default());
        let client: Arc<dyn BackendClient> = Arc::new(backend.clone());
        let session = Arc::new(Session::new(client.clone(), cache.clone(), events.clone()));
        MutationContext::new(client, cache, events, session)
    }

    fn seed_video(backend: &MemoryBackend, views: i64) {
        backend.seed(
            tables::VIDEOS,
            vec![json!({"id": "row-1", "video_id": "v1", "title": "Niggun", "views": views})],
        );
    }

    fn increment(ctx: &MutationContext, video: &str) -> IncrementViewsCommand {
        IncrementViewsCommand {
            ctx: ctx.clone(),
            video_id: VideoId::new(video),
        }
    }

    #[tokio::test]
    async fn test_increment_via_procedure() {
        let backend = MemoryBackend::new();
        seed_video(&backend, 41);
        backend.on_rpc(rpc::INCREMENT_VIEWS, |body, db| {
            let row = db
                .get_mut(tables::VIDEOS)
                .and_then(|rows| rows.iter_mut().find(|row| row["video_id"] == body["video_id"]));
            match row {
                Some(row) => {
                    let views = row["views"].as_i64().unwrap_or(0) + 1;
                    row["views"] = json!(views);
                    Ok(json!(views))
                }
                None => Ok(Value::Null),
            }
        });
        let ctx = context(&backend);

        let views = increment(&ctx, "v1").execute().await.unwrap();

        assert_eq!(views, Some(42));
        assert_eq!(backend.rows(tables::VIDEOS)[0]["views"], 42);
    }

    #[tokio::test]
    async fn test_failed_procedure_falls_back_to_row_update() {
        let backend = MemoryBackend::new();
        seed_video(&backend, 7);
        backend.fail_target(
            rpc::INCREMENT_VIEWS,
            BackendError::ServerError {
                status: 500,
                message: "function error".to_string(),
            },
        );
        let ctx = context(&backend);
        ctx.cache
            .set(CacheKey::ViewCount(VideoId::new("v1")), &7_i64, Duration::from_secs(30))
            .await
            .unwrap();

        let views = increment(&ctx, "v1").execute().await.unwrap();

        assert_eq!(views, Some(8));
        assert_eq!(backend.rows(tables::VIDEOS)[0]["views"], 8);
        // Writes are attempted once even for transient errors
        assert_eq!(backend.call_count(BackendSurface::Rpc, rpc::INCREMENT_VIEWS), 1);
        assert!(!ctx.cache.contains(&CacheKey::ViewCount(VideoId::new("v1"))).await);
    }

    #[tokio::test]
    async fn test_sample_video_is_not_counted() {
        let backend = MemoryBackend::new();
        let ctx = context(&backend);

        let result = increment(&ctx, "sample-1").execute().await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(backend.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_update_category_requires_admin() {
        let backend = MemoryBackend::new();
        backend.seed(
            tables::CATEGORIES,
            vec![json!({"id": "music", "name": "Music", "icon": "🎵"})],
        );
        backend.on_rpc(rpc::CHECK_ADMIN, |body, _| Ok(json!(body["user_id"] == "admin")));
        let ctx = context(&backend);

        let update = UpdateCategoryCommand {
            ctx: ctx.clone(),
            category_id: CategoryId::new("music"),
            name: "  Niggunim ".to_string(),
            icon: None,
        };

        ctx.session
            .sign_in(UserId::new("viewer"), "token".to_string())
            .await;
        assert!(matches!(
            update.execute().await,
            Err(AppError::Permission(_))
        ));

        ctx.session
            .sign_in(UserId::new("admin"), "token".to_string())
            .await;
        let category = update.execute().await.unwrap();
        assert_eq!(category.name, "Niggunim");
        assert_eq!(category.icon, None);
    }
}
