//! Preference resolution.
//!
//! Read-through cache over the preference store. First access for a user
//! lazily persists an all-default matrix; the upsert-by-key contract on the
//! store keeps concurrent first access from creating duplicates.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StoreError;
use crate::store::{NotificationPreferences, PreferenceStore, PreferenceUpdate};

pub struct PreferenceResolver {
    store: Arc<dyn PreferenceStore>,
    cache: RwLock<HashMap<String, NotificationPreferences>>,
}

impl PreferenceResolver {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a user's preference matrix, creating defaults on first
    /// access.
    pub async fn resolve(&self, user_id: &str) -> Result<NotificationPreferences, StoreError> {
        if let Some(prefs) = self.cache.read().await.get(user_id) {
            return Ok(prefs.clone());
        }
        let prefs = self.store.get_or_create_preferences(user_id).await?;
        debug!(user_id, "preference matrix loaded");
        self.cache
            .write()
            .await
            .insert(user_id.to_string(), prefs.clone());
        Ok(prefs)
    }

    /// Apply a partial update and refresh the cached entry.
    pub async fn update(
        &self,
        user_id: &str,
        update: &PreferenceUpdate,
    ) -> Result<NotificationPreferences, StoreError> {
        let prefs = self.store.update_preferences(user_id, update).await?;
        self.cache
            .write()
            .await
            .insert(user_id.to_string(), prefs.clone());
        Ok(prefs)
    }

    /// Drop a cached entry; the next resolve re-reads the store.
    pub async fn invalidate(&self, user_id: &str) {
        self.cache.write().await.remove(user_id);
    }
}
