use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use story_llm::LlmBackend;
use storyforge_core::config::Config;
use storyforge_core::store::{DocumentStore, MemoryStore};
use storyforge_core::sync::ProjectSync;
use tokio::sync::OnceCell;

type SessionCell = Arc<OnceCell<Arc<ProjectSync>>>;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub llm: Arc<dyn LlmBackend>,
    pub config: Arc<Config>,
    /// One live sync session per user, started on first use.
    sessions: Arc<Mutex<HashMap<String, SessionCell>>>,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, llm: Arc<dyn LlmBackend>, config: Config) -> Self {
        Self {
            store,
            llm,
            config: Arc::new(config),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// State backed by the project's persisted store and configured backend.
    pub fn open(root: &Path, config: Config, llm: Arc<dyn LlmBackend>) -> anyhow::Result<Self> {
        let data_file = config.store.resolve(root);
        if let Some(parent) = data_file.parent() {
            storyforge_core::io::ensure_dir(parent)?;
        }
        let store = MemoryStore::open(&data_file)?;
        tracing::info!(path = %data_file.display(), "store opened");
        Ok(Self::new(Arc::new(store), llm, config))
    }

    /// The sync session for `user`, fully loaded.
    ///
    /// Concurrent first calls for the same user share one start; other users
    /// are not held up by it.
    pub async fn sync_for(&self, user: &str) -> storyforge_core::Result<Arc<ProjectSync>> {
        let cell = Arc::clone(self.sessions().entry(user.to_string()).or_default());
        let sync = cell
            .get_or_try_init(|| async {
                let sync = ProjectSync::start(Arc::clone(&self.store), user)
                    .await?
                    .with_baseline_tag(self.config.generation.baseline_tag.clone());
                sync.ready().await;
                tracing::debug!(user, "sync session created");
                Ok::<_, storyforge_core::ForgeError>(Arc::new(sync))
            })
            .await;
        match sync {
            Ok(sync) => Ok(Arc::clone(sync)),
            Err(e) => {
                let mut sessions = self.sessions();
                if sessions.get(user).is_some_and(|c| Arc::ptr_eq(c, &cell)) {
                    sessions.remove(user);
                }
                Err(e)
            }
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions().values().filter(|c| c.initialized()).count()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, SessionCell>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
