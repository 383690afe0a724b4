use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use yidvid::backends::{BackendError, BackendSurface, MemoryBackend, SourceAdapter};
use yidvid::constants::{rpc, tables};

/// Source adapter with a fixed answer that counts how often it is asked
pub struct ScriptedAdapter<T> {
    name: String,
    response: Mutex<Result<Vec<T>, BackendError>>,
    calls: AtomicUsize,
}

impl<T> ScriptedAdapter<T> {
    pub fn returning(name: &str, records: Vec<T>) -> Self {
        Self {
            name: name.to_string(),
            response: Mutex::new(Ok(records)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty(name: &str) -> Self {
        Self::returning(name, Vec::new())
    }

    pub fn failing(name: &str, error: BackendError) -> Self {
        Self {
            name: name.to_string(),
            response: Mutex::new(Err(error)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<P, T> SourceAdapter<P, T> for ScriptedAdapter<T>
where
    P: Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn surface(&self) -> BackendSurface {
        BackendSurface::Table
    }

    async fn fetch(&self, _params: &P) -> Result<Vec<T>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.lock().unwrap().clone()
    }
}

/// `check_admin_status` answers true for the listed users only
pub fn install_admins(backend: &MemoryBackend, admins: &[&str]) {
    let admins: Vec<String> = admins.iter().map(|a| a.to_string()).collect();
    backend.on_rpc(rpc::CHECK_ADMIN, move |body, _| {
        let user = body["user_id"].as_str().unwrap_or_default();
        Ok(json!(admins.iter().any(|admin| admin == user)))
    });
}

/// `get_public_videos` returns `rows` whatever the filter
pub fn install_public_videos(backend: &MemoryBackend, rows: Vec<Value>) {
    backend.on_rpc(rpc::PUBLIC_VIDEOS, move |_, _| Ok(Value::Array(rows.clone())));
}

/// `toggle_channel_subscription` flips the caller's row, like the
/// security-definer procedure does
pub fn install_toggle_subscription(backend: &MemoryBackend) {
    backend.on_rpc(rpc::TOGGLE_SUBSCRIPTION, |body, db| {
        let rows = db.entry(tables::SUBSCRIPTIONS.to_string()).or_default();
        let matches = |row: &Value| {
            row["user_id"] == body["p_user_id"] && row["channel_id"] == body["p_channel_id"]
        };

        if rows.iter().any(matches) {
            rows.retain(|row| !matches(row));
            Ok(json!(false))
        } else {
            rows.push(json!({
                "id": format!("sub-{}", rows.len() + 1),
                "user_id": body["p_user_id"],
                "channel_id": body["p_channel_id"],
            }));
            Ok(json!(true))
        }
    });
}
