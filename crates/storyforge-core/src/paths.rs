use crate::error::{ForgeError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const FORGE_DIR: &str = ".storyforge";
pub const CONFIG_FILE: &str = ".storyforge/config.yaml";
pub const DATA_FILE: &str = ".storyforge/data.yaml";

pub fn forge_dir(root: &Path) -> PathBuf {
    root.join(FORGE_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn data_path(root: &Path) -> PathBuf {
    root.join(DATA_FILE)
}

// ---------------------------------------------------------------------------
// Collection paths
// ---------------------------------------------------------------------------

/// Slash-separated path of a document collection, e.g.
/// `users/u1/projects/p1/stories`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path of a sub-collection under document `id` of this collection.
    pub fn child(&self, id: &str, collection: &str) -> Self {
        Self(format!("{}/{}/{}", self.0, id, collection))
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn projects_collection(user_id: &str) -> CollectionPath {
    CollectionPath(format!("users/{user_id}/projects"))
}

pub fn stories_collection(user_id: &str, project_id: &str) -> CollectionPath {
    projects_collection(user_id).child(project_id, "stories")
}

// ---------------------------------------------------------------------------
// Id validation
// ---------------------------------------------------------------------------

static ID_RE: OnceLock<Regex> = OnceLock::new();

fn id_re() -> &'static Regex {
    ID_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_\-]*$").unwrap())
}

/// Ids become path segments, so anything that could alter the path is rejected.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > 128 || !id_re().is_match(id) {
        return Err(ForgeError::InvalidId(id.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_ids() {
        for id in ["u1", "3f2a-77c1", "user_42", "A"] {
            validate_id(id).unwrap_or_else(|_| panic!("expected valid: {id}"));
        }
    }

    #[test]
    fn invalid_ids() {
        for id in ["", "-lead", "a/b", "has space", "..", "x.y"] {
            assert!(validate_id(id).is_err(), "expected invalid: {id}");
        }
    }

    #[test]
    fn collection_helpers() {
        assert_eq!(projects_collection("u1").as_str(), "users/u1/projects");
        let stories = stories_collection("u1", "p9");
        assert_eq!(stories.as_str(), "users/u1/projects/p9/stories");
        assert_eq!(
            projects_collection("u1").child("p9", "stories"),
            stories
        );
    }

    #[test]
    fn path_helpers() {
        let root = Path::new("/tmp/proj");
        assert_eq!(
            config_path(root),
            PathBuf::from("/tmp/proj/.storyforge/config.yaml")
        );
        assert_eq!(data_path(root), PathBuf::from("/tmp/proj/.storyforge/data.yaml"));
    }
}
