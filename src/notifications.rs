//! Polling announcement feed with client-side read tracking.
//!
//! The feed asks the backend for the newest announcements on a fixed
//! interval. A failed poll keeps whatever list was already loaded. Read
//! state lives in [`ReadState`] and is never sent to the server.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::api::{AnnouncementSource, ANNOUNCEMENT_LIMIT};
use crate::models::{Notification, NotificationKind};
use crate::preferences::ReadState;
use crate::storage::KeyValueStore;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

pub struct NotificationFeed {
    source: Arc<dyn AnnouncementSource>,
    read_state: ReadState,
    notifications: RwLock<Vec<Notification>>,
    // Bumped after every successful fetch.
    generation: watch::Sender<u64>,
}

impl NotificationFeed {
    pub async fn new(source: Arc<dyn AnnouncementSource>, store: Arc<dyn KeyValueStore>) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            source,
            read_state: ReadState::load(store).await,
            notifications: RwLock::new(Vec::new()),
            generation,
        }
    }

    /// Refreshes the list. Returns `false`, leaving the current list in
    /// place, when the backend could not be read.
    pub async fn fetch(&self) -> bool {
        match self.source.fetch_announcements(ANNOUNCEMENT_LIMIT).await {
            Ok(body) => {
                let mapped = map_rows(&body);
                tracing::debug!(count = mapped.len(), "Fetched notifications");
                *self.notifications.write().await = mapped;
                self.generation.send_modify(|generation| *generation += 1);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Notifications fetch failed, keeping existing list");
                false
            }
        }
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.notifications.read().await.clone()
    }

    pub async fn unread_count(&self) -> usize {
        let read = self.read_state.snapshot().await;
        self.notifications
            .read()
            .await
            .iter()
            .filter(|notification| !read.contains(&notification.id))
            .count()
    }

    pub async fn is_read(&self, id: &str) -> bool {
        self.read_state.is_read(id).await
    }

    pub async fn mark_as_read(&self, id: &str) {
        self.read_state.mark_read(id).await;
    }

    /// Marks every currently loaded notification as read.
    pub async fn mark_all_as_read(&self) {
        let ids: Vec<String> = self
            .notifications
            .read()
            .await
            .iter()
            .map(|notification| notification.id.clone())
            .collect();
        self.read_state.mark_all_read(ids).await;
    }

    /// Receiver that changes after each successful fetch.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    /// Fetches immediately, then every `interval`, until the handle is
    /// dropped.
    pub fn spawn_polling(self: &Arc<Self>, interval: Duration) -> PollHandle {
        let feed = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                feed.fetch().await;
            }
        });
        PollHandle { task }
    }
}

/// Owns the polling task; dropping it cancels the timer. A request already
/// in flight is abandoned with the task.
pub struct PollHandle {
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Maps backend announcement rows onto [`Notification`], tolerating missing
/// fields. A body that is not an array yields no notifications.
pub fn map_rows(body: &Value) -> Vec<Notification> {
    let Some(rows) = body.as_array() else {
        return Vec::new();
    };

    rows.iter().map(map_row).collect()
}

fn map_row(row: &Value) -> Notification {
    let field = |name: &str| row.get(name).and_then(text);

    Notification {
        id: field("id").unwrap_or_default(),
        title: field("title").unwrap_or_else(|| "Announcement".to_string()),
        message: field("message")
            .or_else(|| field("content"))
            .or_else(|| field("description"))
            .unwrap_or_default(),
        kind: NotificationKind::parse_lenient(row.get("type").and_then(Value::as_str)),
        created_at: field("created_at").unwrap_or_else(|| Utc::now().to_rfc3339()),
        course_id: row.get("course_id").filter(|v| truthy(v)).and_then(text),
        exam_id: row.get("exam_id").filter(|v| truthy(v)).and_then(text),
    }
}

/// Stringifies a JSON scalar. `null` counts as missing.
fn text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}
