use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::info;

use super::cache::ResultCache;
use super::cache_keys::KeyPattern;
use crate::backends::BackendClient;
use crate::events::{CatalogEvent, EventBus};
use crate::models::UserId;
use crate::utils::errors::AppError;

/// Who the backend sees us as. Row-level security makes some results
/// depend on it, so it is part of those cache keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identity {
    #[default]
    Anonymous,
    User {
        id: UserId,
    },
}

impl Identity {
    pub fn user(id: impl Into<UserId>) -> Self {
        Identity::User { id: id.into() }
    }

    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Identity::Anonymous => None,
            Identity::User { id } => Some(id),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Anonymous => f.write_str("anon"),
            Identity::User { id } => write!(f, "{}", id),
        }
    }
}

/// The current actor. Authentication itself happens elsewhere; the session
/// only receives the resulting user id and access token.
pub struct Session {
    backend: Arc<dyn BackendClient>,
    cache: ResultCache,
    events: Arc<EventBus>,
    identity: RwLock<Identity>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(backend: Arc<dyn BackendClient>, cache: ResultCache, events: Arc<EventBus>) -> Self {
        Self {
            backend,
            cache,
            events,
            identity: RwLock::new(Identity::Anonymous),
        }
    }

    pub fn identity(&self) -> Identity {
        self.identity
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn current_user(&self) -> Option<UserId> {
        self.identity().user_id().cloned()
    }

    /// The signed-in user, or a permission error for anonymous callers
    pub fn require_user(&self) -> Result<UserId, AppError> {
        self.current_user()
            .ok_or_else(|| AppError::Permission("sign in required".to_string()))
    }

    /// Switch to `user_id`. Returns the number of cache entries dropped.
    ///
    /// Refreshing the token of the user already signed in keeps the cache.
    pub async fn sign_in(&self, user_id: UserId, access_token: String) -> usize {
        self.backend.set_access_token(Some(access_token)).await;
        let previous = self.replace_identity(Identity::User { id: user_id });
        self.after_identity_change(previous).await
    }

    pub async fn sign_out(&self) -> usize {
        self.backend.set_access_token(None).await;
        let previous = self.replace_identity(Identity::Anonymous);
        self.after_identity_change(previous).await
    }

    fn replace_identity(&self, next: Identity) -> Identity {
        let mut identity = self.identity.write().unwrap_or_else(|p| p.into_inner());
        std::mem::replace(&mut *identity, next)
    }

    async fn after_identity_change(&self, previous: Identity) -> usize {
        let current = self.identity();
        if previous == current {
            return 0;
        }

        info!("Identity changed from {} to {}", previous, current);
        self.events
            .publish(CatalogEvent::identity_changed(
                current.user_id().map(|id| id.to_string()),
            ));

        let Some(previous_user) = previous.user_id() else {
            return 0;
        };
        let pattern = KeyPattern::User(previous_user.clone());
        let removed = self.cache.invalidate(&pattern).await;
        self.events
            .publish(CatalogEvent::cache_invalidated(pattern.to_string(), removed));
        removed
    }
}
