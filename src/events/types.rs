use serde::{Deserialize, Serialize};

/// Something observable happened inside the catalog core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEvent {
    pub id: String,
    pub event_type: EventType,
    pub payload: EventPayload,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl CatalogEvent {
    pub fn new(event_type: EventType, payload: EventPayload) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            payload,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn mutation_succeeded(operation: &str, target: &str) -> Self {
        Self::new(
            EventType::MutationSucceeded,
            EventPayload::Mutation {
                operation: operation.to_string(),
                target: target.to_string(),
                completed_steps: Vec::new(),
                error: None,
            },
        )
    }

    pub fn mutation_failed(
        operation: &str,
        target: &str,
        completed_steps: Vec<String>,
        error: String,
    ) -> Self {
        Self::new(
            EventType::MutationFailed,
            EventPayload::Mutation {
                operation: operation.to_string(),
                target: target.to_string(),
                completed_steps,
                error: Some(error),
            },
        )
    }

    pub fn cache_invalidated(pattern: String, removed: usize) -> Self {
        Self::new(
            EventType::CacheInvalidated,
            EventPayload::Cache { pattern, removed },
        )
    }

    pub fn placeholders_served(resource: &str, count: usize) -> Self {
        Self::new(
            EventType::PlaceholdersServed,
            EventPayload::Placeholders {
                resource: resource.to_string(),
                count,
            },
        )
    }

    pub fn identity_changed(user_id: Option<String>) -> Self {
        Self::new(
            EventType::IdentityChanged,
            EventPayload::Identity { user_id },
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventType {
    MutationSucceeded,
    MutationFailed,
    CacheInvalidated,
    /// Every source for a resource came back empty or failed
    PlaceholdersServed,
    IdentityChanged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Mutation {
        operation: String,
        target: String,
        completed_steps: Vec<String>,
        error: Option<String>,
    },
    Cache {
        pattern: String,
        removed: usize,
    },
    Placeholders {
        resource: String,
        count: usize,
    },
    Identity {
        user_id: Option<String>,
    },
}

impl EventType {
    /// Get a string representation for filtering/routing
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::MutationSucceeded => "mutation.succeeded",
            EventType::MutationFailed => "mutation.failed",
            EventType::CacheInvalidated => "cache.invalidated",
            EventType::PlaceholdersServed => "catalog.placeholders_served",
            EventType::IdentityChanged => "session.identity_changed",
        }
    }
}
