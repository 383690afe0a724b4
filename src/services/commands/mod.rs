pub mod catalog_commands;
pub mod moderation_commands;
pub mod subscription_commands;

pub use catalog_commands::{IncrementViewsCommand, UpdateCategoryCommand};
pub use moderation_commands::{
    ModerateCommand, PurgeVideoCommand, RestoreChannelCommand, SoftDeleteChannelCommand,
};
pub use subscription_commands::{IsSubscribedCommand, SubscribeCommand, UnsubscribeCommand};

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::backends::{BackendClient, Query, RetryPolicy};
use crate::constants::rpc;
use crate::events::{CatalogEvent, EventBus};
use crate::models::UserId;
use crate::services::cache::ResultCache;
use crate::services::cache_keys::{CacheKey, KeyPattern};
use crate::services::placeholder::is_placeholder_id;
use crate::services::session::Session;
use crate::utils::errors::{AppError, MutationError};

/// Base trait for all commands
#[async_trait]
pub trait Command<T>: Send + Sync {
    /// Execute the command and return the result
    async fn execute(&self) -> Result<T, AppError>;
}

/// Result wrapper for command execution
#[derive(Debug)]
pub struct CommandResult<T> {
    pub data: T,
    pub execution_time_ms: u64,
}

impl<T> CommandResult<T> {
    pub fn new(data: T, execution_time_ms: u64) -> Self {
        Self {
            data,
            execution_time_ms,
        }
    }
}

/// Command executor with timing
pub struct CommandExecutor;

impl CommandExecutor {
    pub async fn execute<T>(command: &dyn Command<T>) -> Result<CommandResult<T>, AppError> {
        let start = std::time::Instant::now();
        let result = command.execute().await?;
        let execution_time_ms = start.elapsed().as_millis() as u64;

        Ok(CommandResult::new(result, execution_time_ms))
    }
}

/// Everything a write needs: the backend, the cache it must keep honest,
/// the event bus and the acting user.
#[derive(Clone)]
pub struct MutationContext {
    pub backend: Arc<dyn BackendClient>,
    pub cache: ResultCache,
    pub events: Arc<EventBus>,
    pub session: Arc<Session>,
    /// For reads done while verifying state
    pub read_policy: RetryPolicy,
    /// Writes are never repeated
    pub write_policy: RetryPolicy,
    pub admin_ttl: Duration,
}

impl MutationContext {
    pub fn new(
        backend: Arc<dyn BackendClient>,
        cache: ResultCache,
        events: Arc<EventBus>,
        session: Arc<Session>,
    ) -> Self {
        let read_policy = RetryPolicy::default();
        let write_policy = RetryPolicy::once(read_policy.attempt_timeout);
        Self {
            backend,
            cache,
            events,
            session,
            read_policy,
            write_policy,
            admin_ttl: crate::constants::CATALOG_TTL,
        }
    }

    pub fn with_policies(mut self, read_policy: RetryPolicy, write_policy: RetryPolicy) -> Self {
        self.read_policy = read_policy;
        self.write_policy = write_policy;
        self
    }

    /// The signed-in user, verified as an admin by the backend
    pub async fn require_admin(&self) -> Result<UserId, AppError> {
        let user = self.session.require_user()?;
        let key = CacheKey::AdminStatus(user.clone());

        let is_admin = match self.cache.get::<bool>(&key).await {
            Some(cached) if !cached.is_stale => cached.value,
            _ => {
                let body = json!({ "user_id": user });
                let response = self
                    .read_policy
                    .execute("check_admin", || self.backend.rpc(rpc::CHECK_ADMIN, body.clone()))
                    .await?;
                let is_admin = admin_flag(&response);
                self.cache.set(key, &is_admin, self.admin_ttl).await?;
                is_admin
            }
        };

        if is_admin {
            Ok(user)
        } else {
            Err(AppError::Permission(format!("{} is not an admin", user)))
        }
    }

    pub async fn update_rows(
        &self,
        table: &str,
        query: &Query,
        patch: Value,
    ) -> Result<Vec<Value>, AppError> {
        let operation = format!("update {}", table);
        Ok(self
            .write_policy
            .execute(&operation, || self.backend.update(table, query, patch.clone()))
            .await?)
    }

    pub async fn delete_rows(&self, table: &str, query: &Query) -> Result<Vec<Value>, AppError> {
        let operation = format!("delete {}", table);
        Ok(self
            .write_policy
            .execute(&operation, || self.backend.delete(table, query))
            .await?)
    }

    pub async fn invalidate(&self, patterns: &[KeyPattern]) {
        for pattern in patterns {
            let removed = self.cache.invalidate(pattern).await;
            self.events
                .publish(CatalogEvent::cache_invalidated(pattern.to_string(), removed));
        }
    }

    /// Invalidate, then announce success. Runs before the command returns so
    /// the next read after a successful write never sees the old value.
    pub async fn succeeded(&self, operation: &str, target: &str, patterns: &[KeyPattern]) {
        self.invalidate(patterns).await;
        info!("{} succeeded for {}", operation, target);
        self.events
            .publish(CatalogEvent::mutation_succeeded(operation, target));
    }

    /// Like `failed`, but a multi-step write that stopped after some steps
    /// went through has still changed rows: `patterns` are invalidated first.
    pub async fn failed_partway(
        &self,
        operation: &str,
        target: &str,
        err: AppError,
        patterns: &[KeyPattern],
    ) -> AppError {
        if let AppError::Mutation(mutation) = &err
            && mutation.is_partial()
        {
            warn!(
                "{} left {} partially applied, invalidating affected entries",
                operation, target
            );
            self.invalidate(patterns).await;
        }
        self.failed(operation, target, err)
    }

    /// Announce a failure and hand the error back for `?`/`return Err`
    pub fn failed(&self, operation: &str, target: &str, err: AppError) -> AppError {
        let completed = match &err {
            AppError::Mutation(mutation) => mutation.completed_steps.clone(),
            _ => Vec::new(),
        };
        self.events.publish(CatalogEvent::mutation_failed(
            operation,
            target,
            completed,
            err.to_string(),
        ));
        err
    }
}

/// Refuse to write against sample content
pub fn ensure_real_target(id: &str) -> Result<(), AppError> {
    if is_placeholder_id(id) {
        return Err(AppError::Validation(format!(
            "{} is sample content and cannot be changed",
            id
        )));
    }
    Ok(())
}

fn admin_flag(response: &Value) -> bool {
    match response {
        Value::Bool(flag) => *flag,
        Value::Object(object) => object
            .get("is_admin")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        Value::Array(rows) => rows.first().is_some_and(admin_flag),
        _ => false,
    }
}

/// Runs the named steps of a multi-step write in order and stops at the
/// first failure, reporting what already went through.
pub(crate) struct StepRunner<'a> {
    operation: &'a str,
    completed: Vec<String>,
}

impl<'a> StepRunner<'a> {
    pub(crate) fn new(operation: &'a str) -> Self {
        Self {
            operation,
            completed: Vec::new(),
        }
    }

    pub(crate) async fn step<T, Fut>(&mut self, name: &str, step: Fut) -> Result<T, AppError>
    where
        Fut: std::future::Future<Output = Result<T, AppError>>,
    {
        match step.await {
            Ok(value) => {
                debug!("{}: step '{}' done", self.operation, name);
                self.completed.push(name.to_string());
                Ok(value)
            }
            Err(err) => {
                let mutation = MutationError::new(self.operation, name, &err)
                    .with_completed(self.completed.clone());
                if mutation.is_partial() {
                    error!(
                        "{} failed at '{}' after completing {:?}: {}",
                        self.operation, name, self.completed, err
                    );
                }
                Err(AppError::Mutation(mutation))
            }
        }
    }
}
