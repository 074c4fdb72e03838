//! Per-profile UI preferences that never leave the client.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::storage::{load_json, save_json, KeyValueStore, READ_NOTIFICATIONS_KEY};

/// Ids of notifications this profile has read, persisted under
/// `aotms_read_notifications`. Not synchronized with the server, so another
/// device may show the same items as unread.
pub struct ReadState {
    store: Arc<dyn KeyValueStore>,
    ids: Mutex<BTreeSet<String>>,
}

impl ReadState {
    pub async fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let ids: Vec<String> = load_json(store.as_ref(), READ_NOTIFICATIONS_KEY).await;
        Self {
            store,
            ids: Mutex::new(ids.into_iter().collect()),
        }
    }

    pub async fn is_read(&self, id: &str) -> bool {
        self.ids.lock().await.contains(id)
    }

    pub async fn snapshot(&self) -> BTreeSet<String> {
        self.ids.lock().await.clone()
    }

    pub async fn mark_read(&self, id: &str) {
        let mut ids = self.ids.lock().await;
        if ids.insert(id.to_string()) {
            self.persist(&ids).await;
        }
    }

    pub async fn mark_all_read<I>(&self, new_ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut ids = self.ids.lock().await;
        let before = ids.len();
        ids.extend(new_ids);
        if ids.len() != before {
            self.persist(&ids).await;
        }
    }

    async fn persist(&self, ids: &BTreeSet<String>) {
        if let Err(e) = save_json(self.store.as_ref(), READ_NOTIFICATIONS_KEY, ids).await {
            tracing::warn!(error = %e, "Failed to persist read notifications");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn read_ids_survive_reload() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let state = ReadState::load(store.clone()).await;
        state.mark_read("n1").await;
        state
            .mark_all_read(vec!["n2".to_string(), "n1".to_string()])
            .await;

        let reloaded = ReadState::load(store).await;
        assert!(reloaded.is_read("n1").await);
        assert!(reloaded.is_read("n2").await);
        assert!(!reloaded.is_read("n3").await);
        assert_eq!(reloaded.snapshot().await.len(), 2);
    }

    #[tokio::test]
    async fn corrupt_preferences_start_empty() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store.set(READ_NOTIFICATIONS_KEY, "[1,").await.unwrap();
        let state = ReadState::load(store).await;
        assert!(state.snapshot().await.is_empty());
    }
}
