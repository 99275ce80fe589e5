//! The external collection capability consumed by the pairing client.
//!
//! Persistence is somebody else's problem — the core only needs an
//! identity-key membership test and an insert.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use scanlink_core::{ScanlinkError, ScannedItem};
use tokio::sync::Mutex;

/// Identity-key membership test and insert over the user's collection.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Whether an item with this identity key is already stored.
    async fn contains(&self, identity_key: &str) -> Result<bool, ScanlinkError>;

    /// Store a newly scanned item.
    async fn insert(&self, item: ScannedItem) -> Result<(), ScanlinkError>;
}

#[async_trait]
impl<C: CollectionStore + ?Sized> CollectionStore for Arc<C> {
    async fn contains(&self, identity_key: &str) -> Result<bool, ScanlinkError> {
        (**self).contains(identity_key).await
    }

    async fn insert(&self, item: ScannedItem) -> Result<(), ScanlinkError> {
        (**self).insert(item).await
    }
}

// ── MemoryCollection ─────────────────────────────────────────────

/// In-memory collection, keyed by identity key. Used by tests and by
/// small deployments that sync elsewhere.
#[derive(Debug, Default)]
pub struct MemoryCollection {
    items: Mutex<HashMap<String, ScannedItem>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored items.
    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}

#[async_trait]
impl CollectionStore for MemoryCollection {
    async fn contains(&self, identity_key: &str) -> Result<bool, ScanlinkError> {
        Ok(self.items.lock().await.contains_key(identity_key))
    }

    async fn insert(&self, item: ScannedItem) -> Result<(), ScanlinkError> {
        self.items
            .lock()
            .await
            .insert(item.identity_key.clone(), item);
        Ok(())
    }
}
