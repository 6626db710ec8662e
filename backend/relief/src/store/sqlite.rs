use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::SqlitePool;
use tokio::sync::broadcast;

use super::{publish, ChangeEvent, ChangeKind, Document, DocumentStore, CHANGE_FEED_CAPACITY};
use crate::errors::{ReliefError, Result};

/// Documents persisted in the `documents` table as serialized JSON.
pub struct SqliteDocumentStore {
    pool: SqlitePool,
    feed: broadcast::Sender<ChangeEvent>,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        let (feed, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { pool, feed }
    }
}

fn decode(id: String, body: &str) -> Result<Document> {
    match serde_json::from_str::<Value>(body)? {
        Value::Object(data) => Ok(Document { id, data }),
        other => Err(ReliefError::Storage(format!(
            "document {id} is not a JSON object: {other}"
        ))),
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT body FROM documents WHERE collection = ?1 AND id = ?2")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(body,)| decode(id.to_string(), &body)).transpose()
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT id, body
            FROM   documents
            WHERE  collection = ?1
            ORDER  BY seq ASC
            "#,
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|(id, body)| decode(id, &body)).collect()
    }

    async fn put(&self, collection: &str, id: &str, data: Map<String, Value>) -> Result<()> {
        let body = serde_json::to_string(&data)?;
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, body)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (collection, id) DO UPDATE SET body = excluded.body
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(&body)
        .execute(&self.pool)
        .await?;
        publish(&self.feed, collection, id, ChangeKind::Put);
        Ok(())
    }

    async fn patch(&self, collection: &str, id: &str, fields: Map<String, Value>) -> Result<bool> {
        // The first statement writes, so the transaction holds the write lock
        // before it reads. A read lock can't be upgraded under contention.
        let mut tx = self.pool.begin().await?;
        let locked = sqlx::query("UPDATE documents SET body = body WHERE collection = ?1 AND id = ?2")
            .bind(collection)
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if locked == 0 {
            return Ok(false);
        }
        let row: Option<(String,)> =
            sqlx::query_as("SELECT body FROM documents WHERE collection = ?1 AND id = ?2")
                .bind(collection)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((body,)) = row else {
            return Ok(false);
        };

        let mut doc = decode(id.to_string(), &body)?;
        doc.data.extend(fields);
        sqlx::query("UPDATE documents SET body = ?3 WHERE collection = ?1 AND id = ?2")
            .bind(collection)
            .bind(id)
            .bind(serde_json::to_string(&doc.data)?)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        publish(&self.feed, collection, id, ChangeKind::Patch);
        Ok(true)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let rows_affected = sqlx::query("DELETE FROM documents WHERE collection = ?1 AND id = ?2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if rows_affected > 0 {
            publish(&self.feed, collection, id, ChangeKind::Delete);
        }
        Ok(rows_affected > 0)
    }

    fn watch(&self) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe()
    }
}
