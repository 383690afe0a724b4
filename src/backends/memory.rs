use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::trace;

use super::errors::BackendError;
use super::query::Query;
use super::traits::{BackendClient, BackendSurface};

pub type Tables = HashMap<String, Vec<Value>>;
type Handler = Arc<dyn Fn(&Value, &mut Tables) -> Result<Value, BackendError> + Send + Sync>;

#[derive(Default)]
struct State {
    tables: Tables,
    rpc_handlers: HashMap<String, Handler>,
    function_handlers: HashMap<String, Handler>,
    surface_failures: HashMap<BackendSurface, BackendError>,
    named_failures: HashMap<String, BackendError>,
    write_failures: HashMap<String, BackendError>,
    calls: Vec<(BackendSurface, String)>,
    access_token: Option<String>,
}

/// In-process backend holding tables as JSON rows.
///
/// Used for offline runs and tests: failures can be injected per surface or
/// per table/procedure name, and every call is recorded.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
    latency: Option<Duration>,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend").finish_non_exhaustive()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call, so concurrent callers overlap
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not wedge every other caller
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        self.lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.lock().tables.get(table).cloned().unwrap_or_default()
    }

    pub fn on_rpc<F>(&self, name: &str, handler: F)
    where
        F: Fn(&Value, &mut Tables) -> Result<Value, BackendError> + Send + Sync + 'static,
    {
        self.lock()
            .rpc_handlers
            .insert(name.to_string(), Arc::new(handler));
    }

    pub fn on_function<F>(&self, name: &str, handler: F)
    where
        F: Fn(&Value, &mut Tables) -> Result<Value, BackendError> + Send + Sync + 'static,
    {
        self.lock()
            .function_handlers
            .insert(name.to_string(), Arc::new(handler));
    }

    /// Every call on `surface` fails with `error`
    pub fn fail_surface(&self, surface: BackendSurface, error: BackendError) {
        self.lock().surface_failures.insert(surface, error);
    }

    /// Calls naming `target` (a table, procedure or function) fail with `error`
    pub fn fail_target(&self, target: &str, error: BackendError) {
        self.lock().named_failures.insert(target.to_string(), error);
    }

    /// Inserts, updates and deletes on `table` fail; selects still work.
    /// Mirrors row-level security that allows reading but not writing.
    pub fn fail_writes(&self, table: &str, error: BackendError) {
        self.lock().write_failures.insert(table.to_string(), error);
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.surface_failures.clear();
        state.named_failures.clear();
        state.write_failures.clear();
    }

    pub fn call_count(&self, surface: BackendSurface, target: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|(s, t)| *s == surface && t == target)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.len()
    }

    pub fn access_token(&self) -> Option<String> {
        self.lock().access_token.clone()
    }

    async fn enter(&self, surface: BackendSurface, target: &str) -> Result<(), BackendError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        trace!("memory backend {} {}", surface, target);
        state.calls.push((surface, target.to_string()));

        if let Some(err) = state.surface_failures.get(&surface) {
            return Err(err.clone());
        }
        if let Some(err) = state.named_failures.get(target) {
            return Err(err.clone());
        }
        Ok(())
    }

    async fn enter_write(&self, table: &str) -> Result<(), BackendError> {
        self.enter(BackendSurface::Table, table).await?;
        match self.lock().write_failures.get(table) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Give every row an `id`, as the database default would
fn with_ids(rows: Vec<Value>) -> Result<Vec<Value>, BackendError> {
    rows.into_iter()
        .map(|mut row| {
            let object = row
                .as_object_mut()
                .ok_or_else(|| BackendError::ClientError {
                    status: 400,
                    message: "rows must be JSON objects".to_string(),
                })?;
            object
                .entry("id")
                .or_insert_with(|| json!(uuid::Uuid::new_v4().to_string()));
            Ok(row)
        })
        .collect()
}

#[async_trait]
impl BackendClient for MemoryBackend {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, BackendError> {
        self.enter(BackendSurface::Table, table).await?;
        let state = self.lock();
        Ok(state
            .tables
            .get(table)
            .map(|rows| query.apply(rows))
            .unwrap_or_default())
    }

    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, BackendError> {
        self.enter_write(table).await?;
        let inserted = with_ids(rows)?;

        self.lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(inserted.iter().cloned());
        Ok(inserted)
    }

    async fn insert_ignoring_conflicts(
        &self,
        table: &str,
        rows: Vec<Value>,
        on_conflict: &[&str],
    ) -> Result<Vec<Value>, BackendError> {
        self.enter_write(table).await?;
        let rows = with_ids(rows)?;

        // Check and insert under one lock, like a unique index would
        let mut state = self.lock();
        let existing = state.tables.entry(table.to_string()).or_default();
        let mut inserted = Vec::new();
        for row in rows {
            let collides = existing
                .iter()
                .any(|other| on_conflict.iter().all(|column| other[*column] == row[*column]));
            if collides {
                trace!("memory backend {} skipping duplicate row", table);
                continue;
            }
            existing.push(row.clone());
            inserted.push(row);
        }
        Ok(inserted)
    }

    async fn update(
        &self,
        table: &str,
        query: &Query,
        patch: Value,
    ) -> Result<Vec<Value>, BackendError> {
        self.enter_write(table).await?;
        let patch = patch.as_object().cloned().unwrap_or_default();

        let mut state = self.lock();
        let mut updated = Vec::new();
        if let Some(rows) = state.tables.get_mut(table) {
            for row in rows.iter_mut().filter(|row| query.matches(row)) {
                if let Some(object) = row.as_object_mut() {
                    for (key, value) in &patch {
                        object.insert(key.clone(), value.clone());
                    }
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, query: &Query) -> Result<Vec<Value>, BackendError> {
        self.enter_write(table).await?;
        let mut state = self.lock();
        let mut removed = Vec::new();
        if let Some(rows) = state.tables.get_mut(table) {
            let (gone, kept): (Vec<Value>, Vec<Value>) =
                rows.drain(..).partition(|row| query.matches(row));
            *rows = kept;
            removed = gone;
        }
        Ok(removed)
    }

    async fn rpc(&self, name: &str, body: Value) -> Result<Value, BackendError> {
        self.enter(BackendSurface::Rpc, name).await?;
        let mut state = self.lock();
        let handler = state
            .rpc_handlers
            .get(name)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("rpc {}", name)))?;
        handler(&body, &mut state.tables)
    }

    async fn invoke(&self, function: &str, body: Value) -> Result<Value, BackendError> {
        self.enter(BackendSurface::Function, function).await?;
        let mut state = self.lock();
        let handler = state
            .function_handlers
            .get(function)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("function {}", function)))?;
        handler(&body, &mut state.tables)
    }

    async fn set_access_token(&self, token: Option<String>) {
        self.lock().access_token = token;
    }
}
