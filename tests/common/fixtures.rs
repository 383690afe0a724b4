use serde_json::{Value, json};
use yidvid::backends::MemoryBackend;
use yidvid::constants::tables;

pub fn video_row(video_id: &str, title: &str, channel_id: &str, uploaded_at: &str) -> Value {
    json!({
        "id": format!("row-{}", video_id),
        "video_id": video_id,
        "title": title,
        "thumbnail": format!("https://i.ytimg.com/vi/{}/hqdefault.jpg", video_id),
        "channel_id": channel_id,
        "views": 0,
        "uploaded_at": uploaded_at,
    })
}

pub fn deleted_video_row(video_id: &str, channel_id: &str) -> Value {
    let mut row = video_row(video_id, "Removed shiur", channel_id, "2025-04-01T00:00:00Z");
    row["deleted_at"] = json!("2025-04-02T00:00:00Z");
    row
}

pub fn channel_row(channel_id: &str, title: &str) -> Value {
    json!({
        "id": format!("row-{}", channel_id),
        "channel_id": channel_id,
        "title": title,
        "thumbnail_url": format!("https://yt3.ggpht.com/{}.jpg", channel_id),
    })
}

pub fn channel_rows() -> Vec<Value> {
    vec![
        channel_row("UC-torah", "Torah Talks"),
        channel_row("UC-niggun", "Niggun Nights"),
    ]
}

pub fn video_rows() -> Vec<Value> {
    vec![
        video_row("v-parsha", "Parsha in Five", "UC-torah", "2025-03-01T10:00:00Z"),
        video_row("v-kiddush", "Kiddush Melody", "UC-niggun", "2025-03-03T10:00:00Z"),
        video_row("v-daf", "Daf Yomi", "UC-torah", "2025-03-02T10:00:00Z"),
        video_row("v-private", "Private video", "UC-torah", "2025-03-04T10:00:00Z"),
        deleted_video_row("v-gone", "UC-niggun"),
    ]
}

pub fn seed_catalog(backend: &MemoryBackend) {
    backend.seed(tables::CHANNELS, channel_rows());
    backend.seed(tables::VIDEOS, video_rows());
    backend.seed(
        tables::CATEGORIES,
        vec![
            json!({"id": "music", "name": "Music", "icon": "music"}),
            json!({"id": "torah", "name": "Torah", "icon": "book"}),
        ],
    );
}
