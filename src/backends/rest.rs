use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::errors::BackendError;
use super::query::Query;
use super::traits::BackendClient;
use crate::config::BackendConfig;

/// HTTP client for the hosted backend (PostgREST tables and RPCs plus
/// function endpoints).
///
/// Requests carry the project's public anon key as `apikey`; the bearer token
/// is the signed-in user's access token when there is one, the anon key
/// otherwise.
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
    access_token: RwLock<Option<String>>,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RestClient {
    pub fn new(config: &BackendConfig, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(BackendError::from_reqwest)?;

        let base_url = url::Url::parse(&config.url)
            .map_err(|e| BackendError::Other(format!("invalid backend url {}: {}", config.url, e)))?;

        Ok(Self {
            client,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            access_token: RwLock::new(None),
        })
    }

    pub async fn has_access_token(&self) -> bool {
        self.access_token.read().await.is_some()
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    async fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let bearer = self
            .access_token
            .read()
            .await
            .clone()
            .unwrap_or_else(|| self.anon_key.clone());

        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, BackendError> {
        let response = request.send().await.map_err(BackendError::from_reqwest)?;
        let status = response.status();

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            debug!("Backend returned {}: {}", status, body);
            return Err(BackendError::from_status(status.as_u16(), body, retry_after));
        }

        let body = response.text().await.map_err(BackendError::from_reqwest)?;
        trace!("Backend response: {} bytes", body.len());
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_rows(&self, request: RequestBuilder) -> Result<Vec<Value>, BackendError> {
        match self.send(request).await? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            other => Ok(vec![other]),
        }
    }
}

#[async_trait]
impl BackendClient for RestClient {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, BackendError> {
        debug!("select {} {:?}", table, query.filters());
        let request = self
            .request(Method::GET, &self.table_url(table))
            .await
            .query(&query.to_params());
        self.send_rows(request).await
    }

    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, BackendError> {
        debug!("insert {} ({} rows)", table, rows.len());
        let request = self
            .request(Method::POST, &self.table_url(table))
            .await
            .header("Prefer", "return=representation")
            .json(&rows);
        self.send_rows(request).await
    }

    async fn insert_ignoring_conflicts(
        &self,
        table: &str,
        rows: Vec<Value>,
        on_conflict: &[&str],
    ) -> Result<Vec<Value>, BackendError> {
        debug!("upsert {} ({} rows) on {:?}", table, rows.len(), on_conflict);
        let request = self
            .request(Method::POST, &self.table_url(table))
            .await
            .query(&[("on_conflict", on_conflict.join(","))])
            .header("Prefer", "resolution=ignore-duplicates,return=representation")
            .json(&rows);
        self.send_rows(request).await
    }

    async fn update(
        &self,
        table: &str,
        query: &Query,
        patch: Value,
    ) -> Result<Vec<Value>, BackendError> {
        debug!("update {} {:?}", table, query.filters());
        let request = self
            .request(Method::PATCH, &self.table_url(table))
            .await
            .query(&query.to_params())
            .header("Prefer", "return=representation")
            .json(&patch);
        self.send_rows(request).await
    }

    async fn delete(&self, table: &str, query: &Query) -> Result<Vec<Value>, BackendError> {
        debug!("delete {} {:?}", table, query.filters());
        let request = self
            .request(Method::DELETE, &self.table_url(table))
            .await
            .query(&query.to_params())
            .header("Prefer", "return=representation");
        self.send_rows(request).await
    }

    async fn rpc(&self, name: &str, body: Value) -> Result<Value, BackendError> {
        debug!("rpc {}", name);
        let url = format!("{}/rest/v1/rpc/{}", self.base_url, name);
        let request = self.request(Method::POST, &url).await.json(&body);
        self.send(request).await
    }

    async fn invoke(&self, function: &str, body: Value) -> Result<Value, BackendError> {
        debug!("invoke function {}", function);
        let url = format!("{}/functions/v1/{}", self.base_url, function);
        let request = self.request(Method::POST, &url).await.json(&body);
        self.send(request).await
    }

    async fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write().await = token;
    }
}
