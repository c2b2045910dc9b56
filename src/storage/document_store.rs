//! Document stores: per-record status documents updated by merge.
//!
//! A merge-update writes the given fields and leaves every other field of the
//! existing document untouched. `null` values are written as `null`; they do
//! not delete the field.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::db::Database;

/// Field map of one document.
pub type DocumentFields = Map<String, Value>;

/// Errors raised by a document store write.
#[derive(Debug, Error)]
pub enum DocumentStoreError {
    /// The backing database failed.
    #[error("document store database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored document could not be decoded.
    #[error("stored document for {id} is not a JSON object: {source}")]
    Corrupt {
        /// Document id.
        id: String,
        /// Decode error.
        #[source]
        source: serde_json::Error,
    },

    /// The store refused the write.
    #[error("document store unavailable: {0}")]
    Unavailable(String),
}

/// Per-record document persistence.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Merges `fields` into the document `id`, creating it if absent.
    async fn merge_update(&self, id: &str, fields: &DocumentFields) -> Result<(), DocumentStoreError>;
}

/// Merges `update` into `existing`, overwriting only the keys present in `update`.
pub fn merge_fields(existing: &mut DocumentFields, update: &DocumentFields) {
    for (key, value) in update {
        existing.insert(key.clone(), value.clone());
    }
}

/// In-process document store.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<HashMap<String, DocumentFields>>,
}

impl MemoryDocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the document `id`.
    pub async fn get(&self, id: &str) -> Option<DocumentFields> {
        self.documents.lock().await.get(id).cloned()
    }

    /// Returns the number of stored documents.
    pub async fn len(&self) -> usize {
        self.documents.lock().await.len()
    }

    /// Returns true if nothing has been written.
    pub async fn is_empty(&self) -> bool {
        self.documents.lock().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn merge_update(&self, id: &str, fields: &DocumentFields) -> Result<(), DocumentStoreError> {
        let mut documents = self.documents.lock().await;
        merge_fields(documents.entry(id.to_string()).or_default(), fields);
        Ok(())
    }
}

/// Document store backed by the `papers` table.
#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    db: Database,
}

impl SqliteDocumentStore {
    /// Creates a store over an opened database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns the document `id`, if present.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError`] when the query fails or the row is corrupt.
    pub async fn get(&self, id: &str) -> Result<Option<DocumentFields>, DocumentStoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT fields FROM papers WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        row.map(|(fields,)| decode(id, &fields)).transpose()
    }
}

fn decode(id: &str, raw: &str) -> Result<DocumentFields, DocumentStoreError> {
    serde_json::from_str(raw).map_err(|source| DocumentStoreError::Corrupt {
        id: id.to_string(),
        source,
    })
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    #[instrument(skip(self, id, fields), fields(id = %id, keys = fields.len()))]
    async fn merge_update(&self, id: &str, fields: &DocumentFields) -> Result<(), DocumentStoreError> {
        let mut tx = self.db.pool().begin().await?;

        // Write first so the transaction holds the write lock before it reads.
        sqlx::query("INSERT INTO papers (id) VALUES (?) ON CONFLICT(id) DO NOTHING")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let row: Option<(String,)> = sqlx::query_as("SELECT fields FROM papers WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let mut document = match row {
            Some((raw,)) => decode(id, &raw)?,
            None => DocumentFields::new(),
        };
        merge_fields(&mut document, fields);

        let encoded = Value::Object(document).to_string();
        sqlx::query("UPDATE papers SET fields = ?, updated_at = datetime('now') WHERE id = ?")
            .bind(encoded)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!("document merged");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    fn fields(value: Value) -> DocumentFields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_merge_fields_keeps_unrelated_and_writes_null() {
        let mut existing = fields(json!({"citations": 12, "pdfPublicLink": "old"}));
        merge_fields(&mut existing, &fields(json!({"pdfPublicLink": null, "openAccessStatus": "Open"})));
        assert_eq!(
            Value::Object(existing),
            json!({"citations": 12, "pdfPublicLink": null, "openAccessStatus": "Open"})
        );
    }

    #[tokio::test]
    async fn test_memory_store_merge_creates_then_merges() {
        let store = MemoryDocumentStore::new();
        store.merge_update("10.1/a", &fields(json!({"x": 1}))).await.unwrap();
        store.merge_update("10.1/a", &fields(json!({"y": 2}))).await.unwrap();
        assert_eq!(
            Value::Object(store.get("10.1/a").await.unwrap()),
            json!({"x": 1, "y": 2})
        );
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_sqlite_store_merge_preserves_existing_fields() {
        let db = Database::new_in_memory().await.unwrap();
        sqlx::query("INSERT INTO papers (id, fields) VALUES ('10.1/a', '{\"title\":\"kept\"}')")
            .execute(db.pool())
            .await
            .unwrap();

        let store = SqliteDocumentStore::new(db);
        let update = fields(json!({"openAccessStatus": "Closed", "pdfSource": null}));
        store.merge_update("10.1/a", &update).await.unwrap();
        store.merge_update("10.1/a", &update).await.unwrap();

        assert_eq!(
            Value::Object(store.get("10.1/a").await.unwrap().unwrap()),
            json!({"title": "kept", "openAccessStatus": "Closed", "pdfSource": null})
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sqlite_store_concurrent_merges_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(&dir.path().join("papers.db")).await.unwrap();
        let store = Arc::new(SqliteDocumentStore::new(db));

        let mut handles = Vec::new();
        for i in 0..40 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                // Half the writers share one id; the rest get their own.
                let id = if i % 2 == 0 { "10.1/shared".to_string() } else { format!("10.1/{i}") };
                let mut update = DocumentFields::new();
                update.insert(format!("k{i}"), json!(i));
                store.merge_update(&id, &update).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let shared = store.get("10.1/shared").await.unwrap().unwrap();
        assert_eq!(shared.len(), 20);
        for i in (0..40).step_by(2) {
            assert_eq!(shared[&format!("k{i}")], json!(i));
        }
        assert_eq!(
            Value::Object(store.get("10.1/7").await.unwrap().unwrap()),
            json!({"k7": 7})
        );
    }

    #[tokio::test]
    async fn test_sqlite_store_get_absent() {
        let store = SqliteDocumentStore::new(Database::new_in_memory().await.unwrap());
        assert!(store.get("missing").await.unwrap().is_none());
    }
}
