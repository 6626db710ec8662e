use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, RwLock};

use super::{publish, ChangeEvent, ChangeKind, Document, DocumentStore, CHANGE_FEED_CAPACITY};
use crate::errors::Result;

/// Process-local store. Nothing survives a restart.
pub struct MemoryDocumentStore {
    // Collection name → documents in insertion order.
    collections: RwLock<HashMap<String, Vec<Document>>>,
    feed: broadcast::Sender<ChangeEvent>,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        let (feed, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            collections: RwLock::new(HashMap::new()),
            feed,
        }
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let guard = self.collections.read().await;
        Ok(guard
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id))
            .cloned())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>> {
        let guard = self.collections.read().await;
        Ok(guard.get(collection).cloned().unwrap_or_default())
    }

    async fn put(&self, collection: &str, id: &str, data: Map<String, Value>) -> Result<()> {
        {
            let mut guard = self.collections.write().await;
            let docs = guard.entry(collection.to_string()).or_default();
            match docs.iter_mut().find(|d| d.id == id) {
                Some(existing) => existing.data = data,
                None => docs.push(Document {
                    id: id.to_string(),
                    data,
                }),
            }
        }
        publish(&self.feed, collection, id, ChangeKind::Put);
        Ok(())
    }

    async fn patch(&self, collection: &str, id: &str, fields: Map<String, Value>) -> Result<bool> {
        {
            let mut guard = self.collections.write().await;
            let Some(doc) = guard
                .get_mut(collection)
                .and_then(|docs| docs.iter_mut().find(|d| d.id == id))
            else {
                return Ok(false);
            };
            doc.data.extend(fields);
        }
        publish(&self.feed, collection, id, ChangeKind::Patch);
        Ok(true)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let removed = {
            let mut guard = self.collections.write().await;
            match guard.get_mut(collection) {
                Some(docs) => {
                    let before = docs.len();
                    docs.retain(|d| d.id != id);
                    docs.len() != before
                }
                None => false,
            }
        };
        if removed {
            publish(&self.feed, collection, id, ChangeKind::Delete);
        }
        Ok(removed)
    }

    fn watch(&self) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe()
    }
}
