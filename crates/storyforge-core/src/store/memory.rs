use super::{
    BatchOp, Document, DocumentStore, FieldMap, FieldValue, OrderBy, Subscription, WriteBatch,
};
use crate::error::{ForgeError, Result};
use crate::paths::CollectionPath;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

type Fields = Map<String, Value>;
type Collection = BTreeMap<String, Fields>;

/// On-disk form of the whole store.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    collections: BTreeMap<CollectionPath, Collection>,
}

struct Query {
    order: OrderBy,
    tx: watch::Sender<Vec<Document>>,
}

#[derive(Default)]
struct Inner {
    collections: BTreeMap<CollectionPath, Collection>,
    queries: HashMap<CollectionPath, Vec<Query>>,
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process [`DocumentStore`] with snapshot listeners and optional YAML
/// persistence. Every applied write re-delivers the affected collections to
/// their subscribers and, when a data file is configured, rewrites it.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    data_file: Option<PathBuf>,
    fail_writes: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            data_file: None,
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Open a store persisted at `path`, loading existing contents if present.
    pub fn open(path: &Path) -> Result<Self> {
        let snapshot = if path.exists() {
            let data = std::fs::read_to_string(path)?;
            if data.trim().is_empty() {
                Snapshot::default()
            } else {
                serde_yaml::from_str(&data)?
            }
        } else {
            Snapshot::default()
        };
        tracing::debug!(path = %path.display(), collections = snapshot.collections.len(), "opened store");
        Ok(Self {
            inner: Mutex::new(Inner {
                collections: snapshot.collections,
                queries: HashMap::new(),
            }),
            data_file: Some(path.to_path_buf()),
            fail_writes: AtomicBool::new(false),
        })
    }

    /// Make every subsequent write fail with [`ForgeError::StoreUnavailable`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, AtomicOrdering::SeqCst);
    }

    /// Number of live subscriptions on `path`.
    pub fn subscriber_count(&self, path: &CollectionPath) -> usize {
        let inner = self.lock();
        inner
            .queries
            .get(path)
            .map(|qs| qs.iter().map(|q| q.tx.receiver_count()).sum())
            .unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(AtomicOrdering::SeqCst) {
            return Err(ForgeError::StoreUnavailable("writes are disabled".to_string()));
        }
        Ok(())
    }

    /// Copy of the collection at `path` for a write to work on.
    fn stage(inner: &Inner, path: &CollectionPath) -> Collection {
        inner.collections.get(path).cloned().unwrap_or_default()
    }

    /// Persist `staged` over the current state, then commit it and deliver
    /// fresh snapshots. Nothing changes in memory if the file write fails.
    /// Queries nobody listens to any more are dropped here.
    fn settle(&self, inner: &mut Inner, staged: BTreeMap<CollectionPath, Collection>) -> Result<()> {
        if let Some(file) = &self.data_file {
            let mut collections: BTreeMap<&CollectionPath, &Collection> =
                inner.collections.iter().collect();
            collections.extend(staged.iter());
            let data = serde_yaml::to_string(&SnapshotRef { collections })?;
            crate::io::atomic_write(file, data.as_bytes())?;
        }

        let paths: Vec<CollectionPath> = staged.keys().cloned().collect();
        inner.collections.extend(staged);
        for path in &paths {
            let Some(queries) = inner.queries.get_mut(path) else {
                continue;
            };
            queries.retain(|q| q.tx.receiver_count() > 0);
            let collection = inner.collections.get(path);
            for q in queries.iter() {
                q.tx.send_replace(run_query(collection, &q.order));
            }
        }
        inner.queries.retain(|_, qs| !qs.is_empty());
        Ok(())
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    collections: BTreeMap<&'a CollectionPath, &'a Collection>,
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn subscribe(&self, path: &CollectionPath, order: OrderBy) -> Result<Subscription> {
        let mut inner = self.lock();
        let initial = run_query(inner.collections.get(path), &order);
        let queries = inner.queries.entry(path.clone()).or_default();
        queries.retain(|q| q.tx.receiver_count() > 0);
        let rx = match queries.iter().find(|q| q.order == order) {
            Some(q) => q.tx.subscribe(),
            None => {
                let (tx, rx) = watch::channel(initial);
                queries.push(Query { order, tx });
                rx
            }
        };
        Ok(Subscription::new(rx))
    }

    async fn get_all(&self, path: &CollectionPath, order: OrderBy) -> Result<Vec<Document>> {
        let inner = self.lock();
        Ok(run_query(inner.collections.get(path), &order))
    }

    async fn create(&self, path: &CollectionPath, fields: FieldMap) -> Result<String> {
        self.check_writable()?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        let mut data = Fields::new();
        apply_fields(&mut data, fields, &server_now());

        let mut inner = self.lock();
        let mut collection = Self::stage(&inner, path);
        collection.insert(id.clone(), data);
        self.settle(&mut inner, BTreeMap::from([(path.clone(), collection)]))?;
        Ok(id)
    }

    async fn update(&self, path: &CollectionPath, id: &str, fields: FieldMap) -> Result<()> {
        self.check_writable()?;
        let mut inner = self.lock();
        let mut collection = Self::stage(&inner, path);
        let doc = collection
            .get_mut(id)
            .ok_or_else(|| not_found(path, id))?;
        apply_fields(doc, fields, &server_now());
        self.settle(&mut inner, BTreeMap::from([(path.clone(), collection)]))
    }

    async fn delete(&self, path: &CollectionPath, id: &str) -> Result<()> {
        self.check_writable()?;
        let mut inner = self.lock();
        let mut collection = Self::stage(&inner, path);
        if collection.remove(id).is_none() {
            return Ok(());
        }
        self.settle(&mut inner, BTreeMap::from([(path.clone(), collection)]))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.check_writable()?;
        let ops = batch.into_ops();
        let mut inner = self.lock();

        // Validate everything first so the batch applies all-or-nothing.
        for op in &ops {
            if let BatchOp::Update { path, id, .. } = op {
                let exists = inner
                    .collections
                    .get(path)
                    .map(|c| c.contains_key(id))
                    .unwrap_or(false);
                if !exists {
                    return Err(not_found(path, id));
                }
            }
        }

        let now = server_now();
        let mut staged: BTreeMap<CollectionPath, Collection> = BTreeMap::new();
        for op in ops {
            match op {
                BatchOp::Update { path, id, fields } => {
                    let collection = staged
                        .entry(path)
                        .or_insert_with_key(|p| Self::stage(&inner, p));
                    if let Some(doc) = collection.get_mut(&id) {
                        apply_fields(doc, fields, &now);
                    }
                }
                BatchOp::Delete { path, id } => {
                    let collection = staged
                        .entry(path)
                        .or_insert_with_key(|p| Self::stage(&inner, p));
                    collection.remove(&id);
                }
            }
        }
        self.settle(&mut inner, staged)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn not_found(path: &CollectionPath, id: &str) -> ForgeError {
    ForgeError::DocumentNotFound {
        path: path.to_string(),
        id: id.to_string(),
    }
}

/// Fixed-width RFC 3339 so lexical order is chronological.
fn server_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn apply_fields(doc: &mut Fields, fields: FieldMap, now: &str) {
    for (name, value) in fields {
        match value {
            FieldValue::Set(v) => {
                doc.insert(name, v);
            }
            FieldValue::ServerTimestamp => {
                doc.insert(name, Value::String(now.to_string()));
            }
            FieldValue::ArrayUnion(values) => {
                let mut items = take_array(doc, &name);
                for v in values {
                    if !items.contains(&v) {
                        items.push(v);
                    }
                }
                doc.insert(name, Value::Array(items));
            }
            FieldValue::ArrayRemove(values) => {
                let mut items = take_array(doc, &name);
                items.retain(|v| !values.contains(v));
                doc.insert(name, Value::Array(items));
            }
        }
    }
}

fn take_array(doc: &mut Fields, name: &str) -> Vec<Value> {
    match doc.remove(name) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

fn run_query(collection: Option<&Collection>, order: &OrderBy) -> Vec<Document> {
    let Some(collection) = collection else {
        return Vec::new();
    };
    let mut docs: Vec<Document> = collection
        .iter()
        .map(|(id, data)| Document {
            id: id.clone(),
            data: data.clone(),
        })
        .collect();
    docs.sort_by(|a, b| {
        order
            .direction
            .apply(compare_values(a.get(&order.field), b.get(&order.field)))
            .then_with(|| a.id.cmp(&b.id))
    });
    docs
}

fn type_rank(v: Option<&Value>) -> u8 {
    match v {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Missing and null values sort before everything else.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn path() -> CollectionPath {
        CollectionPath::new("users/u1/projects")
    }

    fn fields(pairs: &[(&str, Value)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), FieldValue::Set(v.clone())))
            .collect()
    }

    #[tokio::test]
    async fn get_all_orders_by_field_then_id() {
        let store = MemoryStore::new();
        store.create(&path(), fields(&[("order", json!(2))])).await.unwrap();
        store.create(&path(), fields(&[("order", json!(1))])).await.unwrap();
        store.create(&path(), fields(&[("title", json!("no order"))])).await.unwrap();

        let asc = store.get_all(&path(), OrderBy::asc("order")).await.unwrap();
        let orders: Vec<_> = asc.iter().map(|d| d.get("order").cloned()).collect();
        assert_eq!(orders, vec![None, Some(json!(1)), Some(json!(2))]);

        let desc = store.get_all(&path(), OrderBy::desc("order")).await.unwrap();
        assert_eq!(desc[0].get("order"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn server_timestamp_is_resolved() {
        let store = MemoryStore::new();
        let mut f = FieldMap::new();
        f.insert("createdAt".into(), FieldValue::ServerTimestamp);
        let id = store.create(&path(), f).await.unwrap();
        let docs = store.get_all(&path(), OrderBy::asc("createdAt")).await.unwrap();
        assert_eq!(docs[0].id, id);
        let ts = docs[0].get("createdAt").and_then(Value::as_str).unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[tokio::test]
    async fn array_union_and_remove() {
        let store = MemoryStore::new();
        let id = store
            .create(&path(), fields(&[("tags", json!(["a", "b"]))]))
            .await
            .unwrap();

        let mut f = FieldMap::new();
        f.insert("tags".into(), FieldValue::strings_union(&["b".into(), "c".into()]));
        store.update(&path(), &id, f).await.unwrap();

        let mut f = FieldMap::new();
        f.insert("tags".into(), FieldValue::strings_remove(&["a".into()]));
        store.update(&path(), &id, f).await.unwrap();

        let docs = store.get_all(&path(), OrderBy::asc("tags")).await.unwrap();
        assert_eq!(docs[0].get("tags"), Some(&json!(["b", "c"])));
    }

    #[tokio::test]
    async fn update_missing_document_fails() {
        let store = MemoryStore::new();
        let err = store.update(&path(), "nope", FieldMap::new()).await.unwrap_err();
        assert!(matches!(err, ForgeError::DocumentNotFound { .. }));
    }

    #[tokio::test]
    async fn commit_is_all_or_nothing() {
        let store = MemoryStore::new();
        let id = store.create(&path(), fields(&[("order", json!(5))])).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.update(&path(), &id, fields(&[("order", json!(0))]));
        batch.update(&path(), "missing", fields(&[("order", json!(1))]));
        assert!(store.commit(batch).await.is_err());

        let docs = store.get_all(&path(), OrderBy::asc("order")).await.unwrap();
        assert_eq!(docs[0].get("order"), Some(&json!(5)));
    }

    #[tokio::test]
    async fn subscription_receives_changes_and_unsubscribes_on_drop() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe(&path(), OrderBy::asc("order")).await.unwrap();
        assert!(sub.current().is_empty());
        assert_eq!(store.subscriber_count(&path()), 1);

        store.create(&path(), fields(&[("order", json!(1))])).await.unwrap();
        let docs = sub.changed().await.unwrap();
        assert_eq!(docs.len(), 1);

        drop(sub);
        assert_eq!(store.subscriber_count(&path()), 0);
    }

    #[tokio::test]
    async fn delete_leaves_subcollections() {
        let store = MemoryStore::new();
        let pid = store.create(&path(), fields(&[("order", json!(1))])).await.unwrap();
        let stories = path().child(&pid, "stories");
        store.create(&stories, fields(&[("description", json!("x"))])).await.unwrap();

        store.delete(&path(), &pid).await.unwrap();
        assert!(store.get_all(&path(), OrderBy::asc("order")).await.unwrap().is_empty());
        assert_eq!(
            store.get_all(&stories, OrderBy::asc("createdAt")).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn failing_writes_leave_data_untouched() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let err = store.create(&path(), FieldMap::new()).await.unwrap_err();
        assert!(matches!(err, ForgeError::StoreUnavailable(_)));
        store.set_fail_writes(false);
        assert!(store.get_all(&path(), OrderBy::asc("order")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unwritable_data_file_leaves_state_and_subscribers_untouched() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();
        let store = MemoryStore::open(&blocker.join("data.yaml")).unwrap();
        let mut sub = store.subscribe(&path(), OrderBy::asc("order")).await.unwrap();

        assert!(store.create(&path(), fields(&[("order", json!(1))])).await.is_err());
        assert!(store.get_all(&path(), OrderBy::asc("order")).await.unwrap().is_empty());
        assert!(sub.current().is_empty());
    }

    #[tokio::test]
    async fn persists_and_reopens() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join(".storyforge/data.yaml");
        {
            let store = MemoryStore::open(&file).unwrap();
            store
                .create(&path(), fields(&[("title", json!("Alpha")), ("order", json!(1))]))
                .await
                .unwrap();
        }
        let reopened = MemoryStore::open(&file).unwrap();
        let docs = reopened.get_all(&path(), OrderBy::asc("order")).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get("title"), Some(&json!("Alpha")));
    }
}
