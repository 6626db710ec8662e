//! Document store: the narrow repository interface every backend implements.
//!
//! Documents are JSON objects grouped into named collections and addressed
//! by a string identifier. Backends also publish a change feed so that the
//! persistence layer can offer push-based subscriptions.

mod memory;
mod query;
mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::errors::Result;

pub use memory::MemoryDocumentStore;
pub use query::{apply_constraints, Direction, FilterOp, QueryConstraint};
pub use sqlite::SqliteDocumentStore;

/// Capacity of each backend's change feed before slow listeners lag.
pub const CHANGE_FEED_CAPACITY: usize = 256;

/// A stored JSON object and its identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Map<String, Value>,
}

impl Document {
    /// The document body with its identifier merged in as `id`.
    pub fn into_value(self) -> Value {
        let mut data = self.data;
        data.insert("id".to_string(), Value::String(self.id));
        Value::Object(data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Put,
    Patch,
    Delete,
}

/// Published on the change feed after every successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub collection: String,
    pub id: String,
    pub kind: ChangeKind,
}

#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Every document of a collection, in insertion order.
    async fn list(&self, collection: &str) -> Result<Vec<Document>>;

    /// Insert or replace a whole document.
    async fn put(&self, collection: &str, id: &str, data: Map<String, Value>) -> Result<()>;

    /// Merge top-level fields into an existing document.
    /// Returns `false` when no such document exists.
    async fn patch(&self, collection: &str, id: &str, fields: Map<String, Value>) -> Result<bool>;

    /// Returns `false` when there was nothing to delete.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool>;

    fn watch(&self) -> broadcast::Receiver<ChangeEvent>;

    async fn query(&self, collection: &str, constraints: &[QueryConstraint]) -> Result<Vec<Document>> {
        let docs = self.list(collection).await?;
        Ok(apply_constraints(docs, constraints))
    }
}

pub(crate) fn publish(feed: &broadcast::Sender<ChangeEvent>, collection: &str, id: &str, kind: ChangeKind) {
    // No receivers is the normal state when nobody is subscribed.
    let _ = feed.send(ChangeEvent {
        collection: collection.to_string(),
        id: id.to_string(),
        kind,
    });
}

#[cfg(test)]
mod test_stores;
