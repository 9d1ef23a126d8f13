//! Shared setup for commands that read or write the document store.

use anyhow::Context;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storyforge_core::config::Config;
use storyforge_core::error::ForgeError;
use storyforge_core::project::Project;
use storyforge_core::store::MemoryStore;
use storyforge_core::story::UserStory;
use storyforge_core::sync::ProjectSync;

/// Run `fut` to completion on a fresh runtime.
pub fn block_on<F: Future>(fut: F) -> anyhow::Result<F::Output> {
    let rt = tokio::runtime::Runtime::new()?;
    Ok(rt.block_on(fut))
}

/// The loaded config plus the user the command acts for.
pub struct Session {
    pub config: Config,
    pub user: String,
    data_file: PathBuf,
}

impl Session {
    pub fn load(root: &Path, user: Option<&str>) -> anyhow::Result<Self> {
        let config = Config::load(root).context("failed to load config")?;
        let user = user.unwrap_or(&config.default_user).to_string();
        let data_file = config.store.resolve(root);
        Ok(Self {
            config,
            user,
            data_file,
        })
    }

    /// Start a sync session and wait for the initial load.
    ///
    /// Must be called inside a runtime; listeners are spawned on it.
    pub async fn sync(&self) -> anyhow::Result<ProjectSync> {
        if let Some(parent) = self.data_file.parent() {
            storyforge_core::io::ensure_dir(parent)?;
        }
        let store = MemoryStore::open(&self.data_file)
            .with_context(|| format!("failed to open {}", self.data_file.display()))?;
        let sync = ProjectSync::start(Arc::new(store), self.user.as_str())
            .await?
            .with_baseline_tag(self.config.generation.baseline_tag.clone());
        sync.ready().await;
        Ok(sync)
    }
}

/// Find a project by id, falling back to an exact case-insensitive title.
pub fn find_project(sync: &ProjectSync, reference: &str) -> anyhow::Result<Project> {
    if let Some(project) = sync.project(reference) {
        return Ok(project);
    }
    let mut matches: Vec<Project> = sync
        .projects()
        .into_iter()
        .filter(|p| p.title.eq_ignore_ascii_case(reference))
        .collect();
    match matches.len() {
        0 => Err(ForgeError::ProjectNotFound(reference.to_string()).into()),
        1 => Ok(matches.remove(0)),
        n => anyhow::bail!("{n} projects are titled '{reference}'; use the project id"),
    }
}

pub fn find_story(project: &Project, story_id: &str) -> anyhow::Result<UserStory> {
    project
        .story(story_id)
        .cloned()
        .ok_or_else(|| ForgeError::StoryNotFound(story_id.to_string()).into())
}
