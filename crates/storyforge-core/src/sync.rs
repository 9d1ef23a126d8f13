//! Project synchronization layer.
//!
//! [`ProjectSync`] presents one always-current list of a user's projects, each
//! carrying its stories, and turns mutations into document-store writes.
//!
//! Two state layers are kept:
//!
//! - the **confirmed mirror**: project records and per-project story lists as
//!   last delivered by the store's snapshot listeners;
//! - the **pending overlay**: optimistic values (currently project `order`)
//!   applied locally before the store acknowledges them.
//!
//! The published list is always `mirror + overlay`. An overlay entry is
//! dropped once a snapshot shows the same value, and inverted if the write
//! that would have confirmed it fails.

use crate::error::{ForgeError, Result};
use crate::paths::{self, CollectionPath};
use crate::project::{Project, ProjectUpdate};
use crate::store::{Document, DocumentStore, FieldMap, FieldValue, OrderBy, Subscription, WriteBatch};
use crate::story::{self, GeneratedStory, NewStory, UserStory};
use crate::types::TagAction;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

pub const DEFAULT_BASELINE_TAG: &str = "generated";

// ---------------------------------------------------------------------------
// Notice
// ---------------------------------------------------------------------------

/// User-facing notification published when a mutation fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub message: String,
}

impl Notice {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// BulkReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkFailure {
    /// Story id, or the item index for creates.
    pub target: String,
    pub error: String,
}

/// Per-item outcome of a fanned-out bulk operation. Items succeed or fail
/// independently; nothing is rolled back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<BulkFailure>,
}

impl BulkReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, target: String, outcome: Result<String>) {
        match outcome {
            Ok(id) => self.succeeded.push(id),
            Err(e) => self.failed.push(BulkFailure {
                target,
                error: e.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SyncState {
    projects_loaded: bool,
    /// Confirmed project records, without stories.
    records: Vec<Project>,
    stories: HashMap<String, Vec<UserStory>>,
    stories_loading: HashSet<String>,
    listeners: HashMap<String, JoinHandle<()>>,
    /// Optimistic `order` per project id.
    pending_order: HashMap<String, i64>,
}

struct Shared {
    state: Mutex<SyncState>,
    projects_tx: watch::Sender<Vec<Project>>,
    notices: broadcast::Sender<Notice>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, notice: Notice) {
        // No receivers is fine; notices are best-effort.
        let _ = self.notices.send(notice);
    }

    /// Recompute the merged list and hand it to every reader.
    fn publish(&self, state: &SyncState) {
        let mut merged: Vec<Project> = state
            .records
            .iter()
            .map(|record| {
                let mut project = record.clone();
                if let Some(order) = state.pending_order.get(&project.id) {
                    project.order = *order;
                }
                project.stories = state.stories.get(&project.id).cloned().unwrap_or_default();
                project
            })
            .collect();
        merged.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        self.projects_tx.send_replace(merged);
    }

    fn apply_projects(
        self: &Arc<Self>,
        store: &Arc<dyn DocumentStore>,
        user_id: &str,
        docs: Vec<Document>,
    ) {
        let records = decode_all::<Project>(&docs, "project");
        let live: HashSet<String> = records.iter().map(|p| p.id.clone()).collect();

        let mut state = self.lock();
        state.projects_loaded = true;

        // Confirmed or vanished overlay entries are no longer pending.
        state.pending_order.retain(|id, order| {
            records
                .iter()
                .find(|p| &p.id == id)
                .map(|p| p.order != *order)
                .unwrap_or(false)
        });

        state.listeners.retain(|id, handle| {
            let keep = live.contains(id);
            if !keep {
                tracing::debug!(project = %id, "dropping story listener");
                handle.abort();
            }
            keep
        });
        state.stories.retain(|id, _| live.contains(id));
        state.stories_loading.retain(|id| live.contains(id));

        for project in &records {
            if state.listeners.contains_key(&project.id) {
                continue;
            }
            state.stories_loading.insert(project.id.clone());
            let handle = tokio::spawn(watch_stories(
                Arc::clone(store),
                Arc::clone(self),
                paths::stories_collection(user_id, &project.id),
                project.id.clone(),
            ));
            state.listeners.insert(project.id.clone(), handle);
        }

        state.records = records;
        self.publish(&state);
    }

    fn apply_stories(&self, project_id: &str, docs: Vec<Document>) {
        let stories = decode_all::<UserStory>(&docs, "story");
        let mut state = self.lock();
        if !state.records.iter().any(|p| p.id == project_id) {
            return;
        }
        state.stories_loading.remove(project_id);
        state.stories.insert(project_id.to_string(), stories);
        self.publish(&state);
    }

    fn stories_failed(&self, project_id: &str) {
        let mut state = self.lock();
        state.stories_loading.remove(project_id);
        self.publish(&state);
    }
}

fn decode_all<T: serde::de::DeserializeOwned>(docs: &[Document], kind: &str) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| match doc.decode::<T>() {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(id = %doc.id, error = %e, "skipping malformed {kind}");
                None
            }
        })
        .collect()
}

async fn watch_projects(
    store: Arc<dyn DocumentStore>,
    shared: Arc<Shared>,
    user_id: String,
    mut sub: Subscription,
) {
    while let Some(docs) = sub.changed().await {
        shared.apply_projects(&store, &user_id, docs);
    }
    tracing::debug!(user = %user_id, "project listener closed");
}

async fn watch_stories(
    store: Arc<dyn DocumentStore>,
    shared: Arc<Shared>,
    path: CollectionPath,
    project_id: String,
) {
    let mut sub = match store.subscribe(&path, OrderBy::desc("createdAt")).await {
        Ok(sub) => sub,
        Err(e) => {
            tracing::error!(project = %project_id, error = %e, "failed to subscribe to stories");
            shared.notify(Notice::error("Failed to load stories."));
            shared.stories_failed(&project_id);
            return;
        }
    };
    shared.apply_stories(&project_id, sub.current());
    while let Some(docs) = sub.changed().await {
        shared.apply_stories(&project_id, docs);
    }
}

// ---------------------------------------------------------------------------
// ProjectSync
// ---------------------------------------------------------------------------

/// Per-user synchronization session. Construct once and share; dropping it
/// stops every listener it started.
pub struct ProjectSync {
    store: Arc<dyn DocumentStore>,
    user_id: String,
    baseline_tag: String,
    shared: Arc<Shared>,
    projects_task: JoinHandle<()>,
}

impl ProjectSync {
    /// Subscribe to `user_id`'s projects and start merging. The initial
    /// snapshot is applied before this returns; story lists follow as their
    /// listeners deliver (see [`ProjectSync::ready`]).
    pub async fn start(store: Arc<dyn DocumentStore>, user_id: impl Into<String>) -> Result<Self> {
        let user_id = user_id.into();
        paths::validate_id(&user_id)?;

        let mut sub = store
            .subscribe(&paths::projects_collection(&user_id), OrderBy::asc("order"))
            .await?;

        let (projects_tx, _) = watch::channel(Vec::new());
        let (notices, _) = broadcast::channel(64);
        let shared = Arc::new(Shared {
            state: Mutex::new(SyncState::default()),
            projects_tx,
            notices,
        });

        shared.apply_projects(&store, &user_id, sub.current());
        let projects_task = tokio::spawn(watch_projects(
            Arc::clone(&store),
            Arc::clone(&shared),
            user_id.clone(),
            sub,
        ));

        tracing::info!(user = %user_id, "project sync started");
        Ok(Self {
            store,
            user_id,
            baseline_tag: DEFAULT_BASELINE_TAG.to_string(),
            shared,
            projects_task,
        })
    }

    /// Tag applied to every story created by [`ProjectSync::add_bulk_stories`].
    pub fn with_baseline_tag(mut self, tag: impl Into<String>) -> Self {
        self.baseline_tag = tag.into();
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Live merged project list, ordered by `order` ascending.
    pub fn list_projects(&self) -> watch::Receiver<Vec<Project>> {
        self.shared.projects_tx.subscribe()
    }

    pub fn projects(&self) -> Vec<Project> {
        self.shared.projects_tx.borrow().clone()
    }

    pub fn project(&self, id: &str) -> Option<Project> {
        self.shared
            .projects_tx
            .borrow()
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    /// Distinct tags used in one project, for tag pickers.
    pub fn all_tags(&self, project_id: &str) -> Vec<String> {
        self.shared
            .projects_tx
            .borrow()
            .iter()
            .find(|p| p.id == project_id)
            .map(|p| crate::view::all_tags(&p.stories))
            .unwrap_or_default()
    }

    pub fn is_loading(&self) -> bool {
        let state = self.shared.lock();
        !state.projects_loaded || !state.stories_loading.is_empty()
    }

    /// Wait until the project list and every project's stories have loaded.
    pub async fn ready(&self) {
        let mut rx = self.list_projects();
        while self.is_loading() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Failure notifications for this session.
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.shared.notices.subscribe()
    }

    /// Confirm with the store that `project_id` exists. The published list
    /// may trail a create that has just been acknowledged.
    pub async fn ensure_project(&self, project_id: &str) -> Result<()> {
        paths::validate_id(project_id)?;
        let docs = self
            .store
            .get_all(&self.projects_path(), OrderBy::asc("order"))
            .await?;
        if docs.iter().any(|d| d.id == project_id) {
            Ok(())
        } else {
            Err(ForgeError::ProjectNotFound(project_id.to_string()))
        }
    }

    // -----------------------------------------------------------------------
    // Project mutations
    // -----------------------------------------------------------------------

    /// Create a project ordered after every existing one.
    ///
    /// The maximum is read and then written without coordination, so two
    /// concurrent creates can land on the same `order`. A later reorder
    /// restores distinct values.
    pub async fn add_project(&self, title: &str, description: &str) -> Result<String> {
        let path = self.projects_path();
        let existing = self
            .store
            .get_all(&path, OrderBy::desc("order"))
            .await
            .map_err(|e| self.fail("create project", e))?;
        let max_order = existing
            .first()
            .and_then(|d| d.get("order"))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let order = max_order + 1;

        let fields = Project::create_fields(title, description, &self.user_id, order)?;
        let id = self
            .store
            .create(&path, fields)
            .await
            .map_err(|e| self.fail("create project", e))?;
        tracing::info!(project = %id, order, "project created");
        Ok(id)
    }

    pub async fn update_project(&self, project_id: &str, update: &ProjectUpdate) -> Result<()> {
        paths::validate_id(project_id)?;
        let fields = update.to_fields()?;
        self.store
            .update(&self.projects_path(), project_id, fields)
            .await
            .map_err(|e| self.fail("update project", e))
    }

    /// Delete every story of the project, then the project itself.
    ///
    /// The two steps are not atomic: if the second fails the stories are
    /// already gone and the error is returned.
    pub async fn delete_project(&self, project_id: &str) -> Result<()> {
        paths::validate_id(project_id)?;
        let stories_path = self.stories_path(project_id);
        let stories = self
            .store
            .get_all(&stories_path, OrderBy::asc("createdAt"))
            .await
            .map_err(|e| self.fail("delete project", e))?;

        let mut batch = WriteBatch::new();
        for doc in &stories {
            batch.delete(&stories_path, doc.id.clone());
        }
        if !batch.is_empty() {
            self.store
                .commit(batch)
                .await
                .map_err(|e| self.fail("delete project", e))?;
        }

        self.store
            .delete(&self.projects_path(), project_id)
            .await
            .map_err(|e| self.fail("delete project", e))?;
        tracing::info!(project = %project_id, stories = stories.len(), "project deleted");
        Ok(())
    }

    /// Give each listed project `order = index`. `ordered_ids` must name
    /// every current project exactly once.
    ///
    /// The new order is visible to readers immediately. If the batch write
    /// fails the optimistic values are withdrawn and the list reverts.
    pub async fn set_projects_order(&self, ordered_ids: &[String]) -> Result<()> {
        let mut seen = HashSet::new();
        for id in ordered_ids {
            paths::validate_id(id)?;
            if !seen.insert(id.as_str()) {
                return Err(ForgeError::InvalidProjectOrder(format!(
                    "duplicate id in order list: '{id}'"
                )));
            }
        }

        let path = self.projects_path();
        let current = self
            .store
            .get_all(&path, OrderBy::asc("order"))
            .await
            .map_err(|e| self.fail("update project order", e))?;
        if let Some(missing) = current.iter().find(|d| !seen.contains(d.id.as_str())) {
            return Err(ForgeError::InvalidProjectOrder(format!(
                "order list is missing project '{}'",
                missing.id
            )));
        }
        if ordered_ids.len() != current.len() {
            return Err(ForgeError::InvalidProjectOrder(format!(
                "order list names {} projects, user has {}",
                ordered_ids.len(),
                current.len()
            )));
        }

        let mut batch = WriteBatch::new();
        {
            let mut state = self.shared.lock();
            for (index, id) in ordered_ids.iter().enumerate() {
                let order = index as i64;
                state.pending_order.insert(id.clone(), order);
                let mut fields = FieldMap::new();
                fields.insert("order".into(), FieldValue::Set(Value::from(order)));
                batch.update(&path, id.clone(), fields);
            }
            self.shared.publish(&state);
        }

        if let Err(e) = self.store.commit(batch).await {
            let mut state = self.shared.lock();
            for (index, id) in ordered_ids.iter().enumerate() {
                if state.pending_order.get(id) == Some(&(index as i64)) {
                    state.pending_order.remove(id);
                }
            }
            self.shared.publish(&state);
            drop(state);
            return Err(self.fail("update project order", e));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Story mutations
    // -----------------------------------------------------------------------

    pub async fn add_story(&self, project_id: &str, story: &NewStory) -> Result<String> {
        paths::validate_id(project_id)?;
        let fields = story.create_fields(project_id)?;
        let id = self
            .store
            .create(&self.stories_path(project_id), fields)
            .await
            .map_err(|e| self.fail("add story", e))?;
        tracing::debug!(project = %project_id, story = %id, "story created");
        Ok(id)
    }

    pub async fn update_story(&self, project_id: &str, story: &UserStory) -> Result<()> {
        paths::validate_id(project_id)?;
        paths::validate_id(&story.id)?;
        let fields = story.update_fields(project_id)?;
        self.store
            .update(&self.stories_path(project_id), &story.id, fields)
            .await
            .map_err(|e| self.fail("update story", e))
    }

    pub async fn delete_story(&self, project_id: &str, story_id: &str) -> Result<()> {
        paths::validate_id(project_id)?;
        paths::validate_id(story_id)?;
        self.store
            .delete(&self.stories_path(project_id), story_id)
            .await
            .map_err(|e| self.fail("delete story", e))
    }

    /// Create one story per generated item, each tagged with the baseline
    /// tag plus `extra_tags`.
    pub async fn add_bulk_stories(
        &self,
        project_id: &str,
        generated: &[GeneratedStory],
        extra_tags: &[String],
    ) -> Result<BulkReport> {
        paths::validate_id(project_id)?;
        let tags = story::generated_tags(&self.baseline_tag, extra_tags);
        let mut report = BulkReport::default();
        for (index, item) in generated.iter().enumerate() {
            let new_story = item.clone().into_new_story(&tags);
            let outcome = self.add_story(project_id, &new_story).await;
            report.record(index.to_string(), outcome);
        }
        tracing::info!(
            project = %project_id,
            created = report.succeeded.len(),
            failed = report.failed.len(),
            "bulk stories added"
        );
        Ok(report)
    }

    pub async fn bulk_delete_stories(
        &self,
        project_id: &str,
        story_ids: &[String],
    ) -> Result<BulkReport> {
        paths::validate_id(project_id)?;
        let mut report = BulkReport::default();
        for id in story_ids {
            let outcome = self.delete_story(project_id, id).await.map(|_| id.clone());
            report.record(id.clone(), outcome);
        }
        Ok(report)
    }

    /// Union `tags` into (or subtract them from) each story's tag set.
    pub async fn bulk_update_tags(
        &self,
        project_id: &str,
        story_ids: &[String],
        tags: &[String],
        action: TagAction,
    ) -> Result<BulkReport> {
        paths::validate_id(project_id)?;
        let tags = story::dedup_tags(tags);
        if tags.is_empty() {
            return Err(ForgeError::Validation("no tags given".to_string()));
        }

        let path = self.stories_path(project_id);
        let mut report = BulkReport::default();
        for id in story_ids {
            let outcome = match paths::validate_id(id) {
                Ok(()) => {
                    let op = match action {
                        TagAction::Add => FieldValue::strings_union(&tags),
                        TagAction::Remove => FieldValue::strings_remove(&tags),
                    };
                    let mut fields = FieldMap::new();
                    fields.insert("tags".into(), op);
                    self.store
                        .update(&path, id, fields)
                        .await
                        .map(|_| id.clone())
                        .map_err(|e| self.fail("update tags", e))
                }
                Err(e) => Err(e),
            };
            report.record(id.clone(), outcome);
        }
        tracing::debug!(project = %project_id, %action, updated = report.succeeded.len(), "bulk tag update");
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn projects_path(&self) -> CollectionPath {
        paths::projects_collection(&self.user_id)
    }

    fn stories_path(&self, project_id: &str) -> CollectionPath {
        paths::stories_collection(&self.user_id, project_id)
    }

    /// Log an adapter failure, publish a notice, and hand the error back.
    fn fail(&self, action: &str, err: ForgeError) -> ForgeError {
        tracing::error!(user = %self.user_id, error = %err, "failed to {action}");
        self.shared.notify(Notice::error(format!("Failed to {action}.")));
        err
    }
}

impl Drop for ProjectSync {
    fn drop(&mut self) {
        self.projects_task.abort();
        let mut state = self.shared.lock();
        for (_, handle) in state.listeners.drain() {
            handle.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
