//! Small client-side key/value store for UI preferences.
//!
//! Every value is wrapped in an envelope carrying a schema version and an
//! optional expiry. Reads of expired, outdated or unreadable entries behave
//! as if the key were absent and clean the entry up.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sqlx::{Row, sqlite::SqlitePool};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<String>>;

    async fn set_raw(&self, key: &str, value: String) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryPreferenceStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set_raw(&self, key: &str, value: String) -> Result<()> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.values.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.values.write().await.clear();
        Ok(())
    }
}

/// Preferences persisted in a local SQLite file
pub struct SqlitePreferenceStore {
    db: Arc<SqlitePool>,
}

impl SqlitePreferenceStore {
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create preferences directory")?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
        let db = SqlitePool::connect(&db_url)
            .await
            .context("Failed to connect to preferences database")?;

        Self::initialize_schema(&db).await?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Default location under the user data directory
    pub async fn open_default() -> Result<Self> {
        let path = crate::config::Config::data_dir()?.join("preferences.db");
        Self::open(&path).await
    }

    async fn initialize_schema(db: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS preferences (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER DEFAULT (unixepoch())
            )
            "#,
        )
        .execute(db)
        .await
        .context("Failed to create preferences table")?;
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for SqlitePreferenceStore {
    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM preferences WHERE key = ?")
            .bind(key)
            .fetch_optional(self.db.as_ref())
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }

    async fn set_raw(&self, key: &str, value: String) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO preferences (key, value)
            VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = unixepoch()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM preferences WHERE key = ?")
            .bind(key)
            .execute(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM preferences")
            .execute(self.db.as_ref())
            .await?;
        Ok(())
    }
}

/// A typed preference: name, schema version, and how long a value lives
pub struct PreferenceKey<T> {
    name: &'static str,
    version: u32,
    ttl: Option<Duration>,
    _value: PhantomData<fn() -> T>,
}

impl<T> PreferenceKey<T> {
    pub const fn new(name: &'static str, version: u32) -> Self {
        Self {
            name,
            version,
            ttl: None,
            _value: PhantomData,
        }
    }

    pub const fn expiring(name: &'static str, version: u32, ttl: Duration) -> Self {
        Self {
            name,
            version,
            ttl: Some(ttl),
            _value: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

pub mod keys {
    use super::PreferenceKey;
    use std::time::Duration;

    pub const LAST_CATEGORY: PreferenceKey<String> = PreferenceKey::new("last_category", 1);

    pub const RECENT_SEARCHES: PreferenceKey<Vec<String>> = PreferenceKey::expiring(
        "recent_searches",
        1,
        Duration::from_secs(30 * 24 * 60 * 60),
    );

    /// Notification ids the user already dismissed
    pub const DISMISSED_NOTIFICATIONS: PreferenceKey<Vec<String>> = PreferenceKey::expiring(
        "dismissed_notifications",
        1,
        Duration::from_secs(7 * 24 * 60 * 60),
    );
}

const MAX_RECENT_SEARCHES: usize = 10;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    value: serde_json::Value,
}

/// Typed access on top of any `PreferenceStore`
#[derive(Clone)]
pub struct Preferences {
    store: Arc<dyn PreferenceStore>,
}

impl Preferences {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryPreferenceStore::new()))
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &PreferenceKey<T>) -> Result<Option<T>> {
        let Some(raw) = self.store.get_raw(key.name).await? else {
            return Ok(None);
        };

        let envelope: Envelope = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Discarding unreadable preference {}: {}", key.name, e);
                self.store.remove(key.name).await?;
                return Ok(None);
            }
        };

        if envelope.version != key.version {
            debug!(
                "Preference {} has version {}, expected {}",
                key.name, envelope.version, key.version
            );
            self.store.remove(key.name).await?;
            return Ok(None);
        }

        if envelope.expires_at.is_some_and(|at| at <= Utc::now()) {
            debug!("Preference {} expired", key.name);
            self.store.remove(key.name).await?;
            return Ok(None);
        }

        match serde_json::from_value(envelope.value) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("Discarding mistyped preference {}: {}", key.name, e);
                self.store.remove(key.name).await?;
                Ok(None)
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &PreferenceKey<T>, value: &T) -> Result<()> {
        let expires_at = match key.ttl {
            Some(ttl) => Some(Utc::now() + chrono::Duration::from_std(ttl)?),
            None => None,
        };
        let envelope = Envelope {
            version: key.version,
            expires_at,
            value: serde_json::to_value(value)?,
        };
        self.store
            .set_raw(key.name, serde_json::to_string(&envelope)?)
            .await
    }

    /// Category for a video listing. An explicit choice is remembered for
    /// next time; without one the remembered category applies.
    pub async fn category_for_listing(&self, explicit: Option<String>) -> Result<Option<String>> {
        match explicit {
            Some(category) if category.trim().is_empty() => {
                self.remove(&keys::LAST_CATEGORY).await?;
                Ok(None)
            }
            Some(category) => {
                self.set(&keys::LAST_CATEGORY, &category).await?;
                Ok(Some(category))
            }
            None => self.get(&keys::LAST_CATEGORY).await,
        }
    }

    /// Put `query` at the front of the recent searches, without duplicates
    pub async fn remember_search(&self, query: &str) -> Result<Vec<String>> {
        let query = query.trim();
        let mut searches = self.get(&keys::RECENT_SEARCHES).await?.unwrap_or_default();
        if query.is_empty() {
            return Ok(searches);
        }

        searches.retain(|s| !s.eq_ignore_ascii_case(query));
        searches.insert(0, query.to_string());
        searches.truncate(MAX_RECENT_SEARCHES);
        self.set(&keys::RECENT_SEARCHES, &searches).await?;
        Ok(searches)
    }

    pub async fn remove<T>(&self, key: &PreferenceKey<T>) -> Result<()> {
        self.store.remove(key.name).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const VOLUME: PreferenceKey<u8> = PreferenceKey::new("volume", 2);

    #[tokio::test]
    async fn test_roundtrip_through_memory_store() {
        let prefs = Preferences::in_memory();
        prefs
            .set(&keys::RECENT_SEARCHES, &vec!["shiur".to_string()])
            .await
            .unwrap();

        let searches = prefs.get(&keys::RECENT_SEARCHES).await.unwrap();
        assert_eq!(searches, Some(vec!["shiur".to_string()]));
    }

    #[tokio::test]
    async fn test_listing_category_is_remembered() {
        let prefs = Preferences::in_memory();

        assert_eq!(prefs.category_for_listing(None).await.unwrap(), None);
        assert_eq!(
            prefs
                .category_for_listing(Some("music".to_string()))
                .await
                .unwrap()
                .as_deref(),
            Some("music")
        );
        assert_eq!(
            prefs.category_for_listing(None).await.unwrap().as_deref(),
            Some("music")
        );

        // An empty choice clears it
        assert_eq!(
            prefs.category_for_listing(Some(" ".to_string())).await.unwrap(),
            None
        );
        assert_eq!(prefs.category_for_listing(None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_recent_searches_move_to_front() {
        let prefs = Preferences::in_memory();
        prefs.remember_search("niggun").await.unwrap();
        prefs.remember_search("daf yomi").await.unwrap();

        let searches = prefs.remember_search("Niggun ").await.unwrap();

        assert_eq!(searches, vec!["Niggun".to_string(), "daf yomi".to_string()]);
        for i in 0..15 {
            prefs.remember_search(&format!("q{}", i)).await.unwrap();
        }
        let searches = prefs.get(&keys::RECENT_SEARCHES).await.unwrap().unwrap();
        assert_eq!(searches.len(), MAX_RECENT_SEARCHES);
        assert_eq!(searches[0], "q14");
    }

    #[tokio::test]
    async fn test_version_mismatch_reads_as_absent() {
        let store = Arc::new(MemoryPreferenceStore::new());
        let prefs = Preferences::new(store.clone());
        store
            .set_raw("volume", r#"{"version":1,"value":80}"#.to_string())
            .await
            .unwrap();

        assert_eq!(prefs.get(&VOLUME).await.unwrap(), None);
        assert!(store.get_raw("volume").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_removed() {
        let store = Arc::new(MemoryPreferenceStore::new());
        let prefs = Preferences::new(store.clone());
        store
            .set_raw(
                "recent_searches",
                r#"{"version":1,"expires_at":"2020-01-01T00:00:00Z","value":["old"]}"#.to_string(),
            )
            .await
            .unwrap();

        assert_eq!(prefs.get(&keys::RECENT_SEARCHES).await.unwrap(), None);
        assert!(store.get_raw("recent_searches").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_garbage_is_discarded() {
        let store = Arc::new(MemoryPreferenceStore::new());
        let prefs = Preferences::new(store.clone());
        store.set_raw("volume", "not json".to_string()).await.unwrap();

        assert_eq!(prefs.get(&VOLUME).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sqlite_store_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prefs").join("preferences.db");

        {
            let prefs = Preferences::new(Arc::new(SqlitePreferenceStore::open(&path).await.unwrap()));
            prefs.set(&keys::LAST_CATEGORY, &"music".to_string()).await.unwrap();
            prefs.set(&VOLUME, &40).await.unwrap();
            prefs.set(&VOLUME, &60).await.unwrap();
        }

        let prefs = Preferences::new(Arc::new(SqlitePreferenceStore::open(&path).await.unwrap()));
        assert_eq!(
            prefs.get(&keys::LAST_CATEGORY).await.unwrap().as_deref(),
            Some("music")
        );
        assert_eq!(prefs.get(&VOLUME).await.unwrap(), Some(60));

        prefs.clear().await.unwrap();
        assert_eq!(prefs.get(&VOLUME).await.unwrap(), None);
    }
}
