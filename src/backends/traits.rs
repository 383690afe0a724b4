use async_trait::async_trait;
use serde_json::Value;

use super::errors::BackendError;
use super::query::Query;

/// The three ways the client can reach the hosted backend.
///
/// They differ in permissions and availability: direct table access is
/// subject to row-level security, RPCs run with elevated rights, and
/// functions are out-of-process HTTP endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendSurface {
    Table,
    Rpc,
    Function,
}

impl std::fmt::Display for BackendSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendSurface::Table => write!(f, "table"),
            BackendSurface::Rpc => write!(f, "rpc"),
            BackendSurface::Function => write!(f, "function"),
        }
    }
}

/// Opaque collaborator for every read and write the catalog performs
#[async_trait]
pub trait BackendClient: Send + Sync + std::fmt::Debug {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, BackendError>;

    /// Returns the inserted rows
    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, BackendError>;

    /// Insert, silently skipping rows that collide with an existing row on
    /// the `on_conflict` columns. Returns only the rows actually inserted.
    async fn insert_ignoring_conflicts(
        &self,
        table: &str,
        rows: Vec<Value>,
        on_conflict: &[&str],
    ) -> Result<Vec<Value>, BackendError>;

    /// Applies `patch` to every row matching `query`, returns the updated rows
    async fn update(
        &self,
        table: &str,
        query: &Query,
        patch: Value,
    ) -> Result<Vec<Value>, BackendError>;

    /// Returns the deleted rows
    async fn delete(&self, table: &str, query: &Query) -> Result<Vec<Value>, BackendError>;

    /// Named server-side procedure
    async fn rpc(&self, name: &str, body: Value) -> Result<Value, BackendError>;

    /// Out-of-process function endpoint
    async fn invoke(&self, function: &str, body: Value) -> Result<Value, BackendError>;

    /// Act as a signed-in user from now on, or anonymously with `None`
    async fn set_access_token(&self, _token: Option<String>) {}
}

/// One way of fetching one logical resource from one backend surface.
///
/// Adapters never fall back on their own; ordering and fallback belong to
/// the cascade that holds them.
#[async_trait]
pub trait SourceAdapter<P, T>: Send + Sync
where
    P: Send + Sync,
    T: Send,
{
    /// Short name used in logs and resolution reports
    fn name(&self) -> &str;

    fn surface(&self) -> BackendSurface;

    async fn fetch(&self, params: &P) -> Result<Vec<T>, BackendError>;
}
