//! Document-store adapter.
//!
//! The sync layer talks to persistence only through [`DocumentStore`]: a
//! hierarchical collection/document model with snapshot subscriptions,
//! field-level array operations, and atomic write batches.

pub mod memory;

pub use memory::MemoryStore;

use crate::error::{ForgeError, Result};
use crate::paths::CollectionPath;
use crate::types::Direction;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tokio::sync::watch;

// ---------------------------------------------------------------------------
// Field values
// ---------------------------------------------------------------------------

/// A value written to one document field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Set(Value),
    /// Resolved by the store to its own clock at write time.
    ServerTimestamp,
    /// Append each value not already present in the array field.
    ArrayUnion(Vec<Value>),
    /// Remove every occurrence of each value from the array field.
    ArrayRemove(Vec<Value>),
}

impl FieldValue {
    pub fn set(value: impl Serialize) -> Result<Self> {
        Ok(FieldValue::Set(serde_json::to_value(value)?))
    }

    pub fn strings_union(values: &[String]) -> Self {
        FieldValue::ArrayUnion(values.iter().cloned().map(Value::String).collect())
    }

    pub fn strings_remove(values: &[String]) -> Self {
        FieldValue::ArrayRemove(values.iter().cloned().map(Value::String).collect())
    }
}

pub type FieldMap = BTreeMap<String, FieldValue>;

// ---------------------------------------------------------------------------
// OrderBy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub data: Map<String, Value>,
}

impl Document {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// Deserialize the document fields plus its `id` into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let mut data = self.data.clone();
        data.insert("id".to_string(), Value::String(self.id.clone()));
        serde_json::from_value(Value::Object(data)).map_err(|e| ForgeError::MalformedDocument {
            id: self.id.clone(),
            reason: e.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// WriteBatch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum BatchOp {
    Update {
        path: CollectionPath,
        id: String,
        fields: FieldMap,
    },
    Delete {
        path: CollectionPath,
        id: String,
    },
}

/// Multi-document write applied all-or-nothing by [`DocumentStore::commit`].
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, path: &CollectionPath, id: impl Into<String>, fields: FieldMap) {
        self.ops.push(BatchOp::Update {
            path: path.clone(),
            id: id.into(),
            fields,
        });
    }

    pub fn delete(&mut self, path: &CollectionPath, id: impl Into<String>) {
        self.ops.push(BatchOp::Delete {
            path: path.clone(),
            id: id.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Live view of one ordered collection query. Dropping it unsubscribes.
pub struct Subscription {
    rx: watch::Receiver<Vec<Document>>,
}

impl Subscription {
    pub fn new(rx: watch::Receiver<Vec<Document>>) -> Self {
        Self { rx }
    }

    /// The latest snapshot, marking it as seen.
    pub fn current(&mut self) -> Vec<Document> {
        self.rx.borrow_and_update().clone()
    }

    /// Wait for the next snapshot. Returns `None` once the store side is gone.
    pub async fn changed(&mut self) -> Option<Vec<Document>> {
        self.rx.changed().await.ok()?;
        Some(self.current())
    }
}

// ---------------------------------------------------------------------------
// DocumentStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Subscribe to the full ordered contents of `path`.
    async fn subscribe(&self, path: &CollectionPath, order: OrderBy) -> Result<Subscription>;

    async fn get_all(&self, path: &CollectionPath, order: OrderBy) -> Result<Vec<Document>>;

    /// Create a document with a store-assigned id and return the id.
    async fn create(&self, path: &CollectionPath, fields: FieldMap) -> Result<String>;

    /// Merge `fields` into an existing document.
    async fn update(&self, path: &CollectionPath, id: &str, fields: FieldMap) -> Result<()>;

    /// Delete a document. Sub-collections underneath it are left untouched.
    async fn delete(&self, path: &CollectionPath, id: &str) -> Result<()>;

    async fn commit(&self, batch: WriteBatch) -> Result<()>;
}
