//! Object URLs for uploaded documents
//!
//! Uploads never touch disk. Each upload is kept in memory and addressed by a
//! unique `blob:` URL until the viewer revokes it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::source::OBJECT_URL_PREFIX;

/// In-memory registry of uploaded documents
#[derive(Clone, Default)]
pub struct ObjectUrlStore {
    objects: Arc<RwLock<HashMap<String, Arc<Vec<u8>>>>>,
}

impl ObjectUrlStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register bytes and mint a fresh object URL for them
    pub fn create(&self, data: Vec<u8>) -> String {
        let url = format!("{}flipbook/{}", OBJECT_URL_PREFIX, Uuid::new_v4());
        tracing::debug!("Created object URL {} ({} bytes)", url, data.len());
        self.objects.write().insert(url.clone(), Arc::new(data));
        url
    }

    pub fn get(&self, url: &str) -> Option<Arc<Vec<u8>>> {
        self.objects.read().get(url).cloned()
    }

    /// Release the bytes behind `url`. Returns false if it was not registered.
    pub fn revoke(&self, url: &str) -> bool {
        let removed = self.objects.write().remove(url).is_some();
        if removed {
            tracing::debug!("Revoked object URL {}", url);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}
