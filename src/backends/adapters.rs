//! Concrete source adapters, one per (resource, backend surface) pair, and
//! the priority order each resource's cascade uses.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

use super::errors::BackendError;
use super::query::Query;
use super::traits::{BackendClient, BackendSurface, SourceAdapter};
use crate::constants::{SIMPLIFIED_QUERY_LIMIT, functions, rpc, tables};
use crate::models::{
    Category, ChannelFilter, ChannelRecord, RelatedVideosParams, VideoFilter, VideoRecord,
};

pub type VideoAdapter = Arc<dyn SourceAdapter<VideoFilter, VideoRecord>>;
pub type ChannelAdapter = Arc<dyn SourceAdapter<ChannelFilter, ChannelRecord>>;
pub type RelatedAdapter = Arc<dyn SourceAdapter<RelatedVideosParams, VideoRecord>>;
pub type CategoryAdapter = Arc<dyn SourceAdapter<(), Category>>;

const VIDEO_LIST_COLUMNS: &[&str] = &[
    "id",
    "video_id",
    "title",
    "thumbnail",
    "channel_name",
    "channel_id",
    "views",
    "uploaded_at",
    "deleted_at",
];

const CHANNEL_MINIMAL_COLUMNS: &[&str] = &["id", "channel_id", "title", "thumbnail_url"];

/// Decode backend rows, skipping individual malformed rows.
/// A response where every row is malformed is a parse failure.
fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>, source: &str) -> Result<Vec<T>, BackendError> {
    let total = rows.len();
    let mut decoded = Vec::with_capacity(total);
    let mut last_error = None;

    for row in rows {
        match serde_json::from_value(row) {
            Ok(record) => decoded.push(record),
            Err(e) => {
                warn!("{}: skipping malformed row: {}", source, e);
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) if decoded.is_empty() && total > 0 => Err(BackendError::Parse(e.to_string())),
        _ => Ok(decoded),
    }
}

/// RPCs and functions answer either with a bare array or with an object
/// wrapping one under a well-known key.
fn rows_from_payload(payload: Value) -> Result<Vec<Value>, BackendError> {
    match payload {
        Value::Array(rows) => Ok(rows),
        Value::Null => Ok(Vec::new()),
        Value::Object(mut object) => {
            for key in ["data", "videos", "channels", "items"] {
                if let Some(Value::Array(rows)) = object.remove(key) {
                    return Ok(rows);
                }
            }
            if let Some(Value::String(message)) = object.get("error") {
                return Err(BackendError::Other(message.clone()));
            }
            Err(BackendError::Parse(
                "response object carries no row array".to_string(),
            ))
        }
        other => Err(BackendError::Parse(format!(
            "unexpected response shape: {}",
            other
        ))),
    }
}

fn video_body(filter: &VideoFilter) -> Value {
    json!({
        "category_id": filter.category,
        "channel_id": filter.channel,
        "search": filter.search,
        "limit": filter.limit,
    })
}

fn channel_body(filter: &ChannelFilter) -> Value {
    json!({
        "search": filter.search,
        "limit": filter.limit,
    })
}

fn related_body(params: &RelatedVideosParams) -> Value {
    json!({
        "video_id": params.video_id,
        "channel_id": params.channel_id,
        "limit": params.limit,
    })
}

/// Reads through an RPC or a function endpoint. Both are treated the same
/// way by the cascade; only the transport differs.
pub struct RemoteAdapter<P, T> {
    name: String,
    backend: Arc<dyn BackendClient>,
    surface: BackendSurface,
    target: &'static str,
    body: fn(&P) -> Value,
    _records: PhantomData<fn() -> T>,
}

impl<P, T> RemoteAdapter<P, T> {
    pub fn rpc(backend: Arc<dyn BackendClient>, procedure: &'static str, body: fn(&P) -> Value) -> Self {
        Self {
            name: format!("rpc:{}", procedure),
            backend,
            surface: BackendSurface::Rpc,
            target: procedure,
            body,
            _records: PhantomData,
        }
    }

    pub fn function(
        backend: Arc<dyn BackendClient>,
        function: &'static str,
        body: fn(&P) -> Value,
    ) -> Self {
        Self {
            name: format!("function:{}", function),
            backend,
            surface: BackendSurface::Function,
            target: function,
            body,
            _records: PhantomData,
        }
    }
}

#[async_trait]
impl<P, T> SourceAdapter<P, T> for RemoteAdapter<P, T>
where
    P: Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn surface(&self) -> BackendSurface {
        self.surface
    }

    async fn fetch(&self, params: &P) -> Result<Vec<T>, BackendError> {
        let body = (self.body)(params);
        let payload = match self.surface {
            BackendSurface::Function => self.backend.invoke(self.target, body).await?,
            _ => self.backend.rpc(self.target, body).await?,
        };
        decode_rows(rows_from_payload(payload)?, &self.name)
    }
}

/// Full video query with every filter pushed down
pub struct VideosTableAdapter {
    backend: Arc<dyn BackendClient>,
    default_limit: usize,
}

impl VideosTableAdapter {
    pub fn new(backend: Arc<dyn BackendClient>, default_limit: usize) -> Self {
        Self {
            backend,
            default_limit,
        }
    }
}

fn video_query(filter: &VideoFilter, limit: usize) -> Query {
    let mut query = Query::new();
    if !filter.include_deleted {
        query = query.is_null("deleted_at");
    }
    if let Some(category) = &filter.category {
        query = query.eq("category_id", category);
    }
    if let Some(channel) = &filter.channel {
        query = query.eq("channel_id", channel);
    }
    if let Some(search) = &filter.search {
        query = query.ilike("title", search);
    }
    query.order_by("uploaded_at", false).limit(limit)
}

#[async_trait]
impl SourceAdapter<VideoFilter, VideoRecord> for VideosTableAdapter {
    fn name(&self) -> &str {
        "table:videos"
    }

    fn surface(&self) -> BackendSurface {
        BackendSurface::Table
    }

    async fn fetch(&self, filter: &VideoFilter) -> Result<Vec<VideoRecord>, BackendError> {
        let query = video_query(filter, filter.limit.unwrap_or(self.default_limit));
        let rows = self.backend.select(tables::VIDEOS, &query).await?;
        decode_rows(rows, self.name())
    }
}

/// Narrow projection and a small page, for when the full query is too slow
/// or trips over a column the caller may not read
pub struct VideosSimplifiedAdapter {
    backend: Arc<dyn BackendClient>,
}

impl VideosSimplifiedAdapter {
    pub fn new(backend: Arc<dyn BackendClient>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl SourceAdapter<VideoFilter, VideoRecord> for VideosSimplifiedAdapter {
    fn name(&self) -> &str {
        "table:videos-simplified"
    }

    fn surface(&self) -> BackendSurface {
        BackendSurface::Table
    }

    async fn fetch(&self, filter: &VideoFilter) -> Result<Vec<VideoRecord>, BackendError> {
        let limit = filter
            .limit
            .unwrap_or(SIMPLIFIED_QUERY_LIMIT)
            .min(SIMPLIFIED_QUERY_LIMIT);
        let query = video_query(filter, limit).columns(VIDEO_LIST_COLUMNS);
        let rows = self.backend.select(tables::VIDEOS, &query).await?;
        decode_rows(rows, self.name())
    }
}

pub struct ChannelsTableAdapter {
    backend: Arc<dyn BackendClient>,
    minimal: bool,
}

impl ChannelsTableAdapter {
    pub fn new(backend: Arc<dyn BackendClient>) -> Self {
        Self {
            backend,
            minimal: false,
        }
    }

    /// Identity and display columns only
    pub fn minimal(backend: Arc<dyn BackendClient>) -> Self {
        Self {
            backend,
            minimal: true,
        }
    }
}

#[async_trait]
impl SourceAdapter<ChannelFilter, ChannelRecord> for ChannelsTableAdapter {
    fn name(&self) -> &str {
        if self.minimal {
            "table:channels-minimal"
        } else {
            "table:channels"
        }
    }

    fn surface(&self) -> BackendSurface {
        BackendSurface::Table
    }

    async fn fetch(&self, filter: &ChannelFilter) -> Result<Vec<ChannelRecord>, BackendError> {
        let mut query = Query::new();
        if self.minimal {
            // The minimal projection cannot see deleted_at, so filter server-side only
            query = query.columns(CHANNEL_MINIMAL_COLUMNS).is_null("deleted_at");
        } else if !filter.include_deleted {
            query = query.is_null("deleted_at");
        }
        if let Some(search) = &filter.search {
            query = query.ilike("title", search);
        }
        query = query.order_by("title", true);
        if let Some(limit) = filter.limit {
            query = query.limit(limit);
        }

        let rows = self.backend.select(tables::CHANNELS, &query).await?;
        decode_rows(rows, self.name())
    }
}

/// Other uploads from the same channel, excluding the video being watched
pub struct RelatedVideosTableAdapter {
    backend: Arc<dyn BackendClient>,
}

impl RelatedVideosTableAdapter {
    pub fn new(backend: Arc<dyn BackendClient>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl SourceAdapter<RelatedVideosParams, VideoRecord> for RelatedVideosTableAdapter {
    fn name(&self) -> &str {
        "table:related-videos"
    }

    fn surface(&self) -> BackendSurface {
        BackendSurface::Table
    }

    async fn fetch(&self, params: &RelatedVideosParams) -> Result<Vec<VideoRecord>, BackendError> {
        let channel_id = match &params.channel_id {
            Some(channel_id) => channel_id.to_string(),
            None => {
                let current = self
                    .backend
                    .select(
                        tables::VIDEOS,
                        &Query::new()
                            .columns(&["channel_id"])
                            .eq("video_id", &params.video_id)
                            .limit(1),
                    )
                    .await?;
                match current.first().and_then(|row| row["channel_id"].as_str()) {
                    Some(channel_id) => channel_id.to_string(),
                    None => return Ok(Vec::new()),
                }
            }
        };

        let query = Query::new()
            .eq("channel_id", channel_id)
            .neq("video_id", &params.video_id)
            .is_null("deleted_at")
            .order_by("uploaded_at", false)
            .limit(params.limit);
        let rows = self.backend.select(tables::VIDEOS, &query).await?;
        decode_rows(rows, self.name())
    }
}

/// Latest uploads from anywhere in the catalog
pub struct LatestVideosAdapter {
    backend: Arc<dyn BackendClient>,
}

impl LatestVideosAdapter {
    pub fn new(backend: Arc<dyn BackendClient>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl SourceAdapter<RelatedVideosParams, VideoRecord> for LatestVideosAdapter {
    fn name(&self) -> &str {
        "table:latest-videos"
    }

    fn surface(&self) -> BackendSurface {
        BackendSurface::Table
    }

    async fn fetch(&self, params: &RelatedVideosParams) -> Result<Vec<VideoRecord>, BackendError> {
        let query = Query::new()
            .neq("video_id", &params.video_id)
            .is_null("deleted_at")
            .order_by("uploaded_at", false)
            .limit(params.limit);
        let rows = self.backend.select(tables::VIDEOS, &query).await?;
        decode_rows(rows, self.name())
    }
}

pub struct CategoriesTableAdapter {
    backend: Arc<dyn BackendClient>,
}

impl CategoriesTableAdapter {
    pub fn new(backend: Arc<dyn BackendClient>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl SourceAdapter<(), Category> for CategoriesTableAdapter {
    fn name(&self) -> &str {
        "table:categories"
    }

    fn surface(&self) -> BackendSurface {
        BackendSurface::Table
    }

    async fn fetch(&self, _params: &()) -> Result<Vec<Category>, BackendError> {
        let rows = self
            .backend
            .select(tables::CATEGORIES, &Query::new().order_by("name", true))
            .await?;
        decode_rows(rows, self.name())
    }
}

/// Direct query, narrowed query, privileged RPC, function endpoint
pub fn video_adapters(backend: &Arc<dyn BackendClient>, default_limit: usize) -> Vec<VideoAdapter> {
    vec![
        Arc::new(VideosTableAdapter::new(backend.clone(), default_limit)),
        Arc::new(VideosSimplifiedAdapter::new(backend.clone())),
        Arc::new(RemoteAdapter::rpc(
            backend.clone(),
            rpc::PUBLIC_VIDEOS,
            video_body,
        )),
        Arc::new(RemoteAdapter::function(
            backend.clone(),
            functions::PUBLIC_VIDEOS,
            video_body,
        )),
    ]
}

/// Direct query, privileged RPC, function endpoint, minimal query
pub fn channel_adapters(backend: &Arc<dyn BackendClient>) -> Vec<ChannelAdapter> {
    vec![
        Arc::new(ChannelsTableAdapter::new(backend.clone())),
        Arc::new(RemoteAdapter::rpc(
            backend.clone(),
            rpc::VISIBLE_CHANNELS,
            channel_body,
        )),
        Arc::new(RemoteAdapter::function(
            backend.clone(),
            functions::PUBLIC_CHANNELS,
            channel_body,
        )),
        Arc::new(ChannelsTableAdapter::minimal(backend.clone())),
    ]
}

pub fn related_adapters(backend: &Arc<dyn BackendClient>) -> Vec<RelatedAdapter> {
    vec![
        Arc::new(RelatedVideosTableAdapter::new(backend.clone())),
        Arc::new(RemoteAdapter::rpc(
            backend.clone(),
            rpc::RELATED_VIDEOS,
            related_body,
        )),
        Arc::new(LatestVideosAdapter::new(backend.clone())),
    ]
}

pub fn category_adapters(backend: &Arc<dyn BackendClient>) -> Vec<CategoryAdapter> {
    vec![Arc::new(CategoriesTableAdapter::new(backend.clone()))]
}
