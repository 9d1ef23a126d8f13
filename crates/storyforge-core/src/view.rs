//! Story view pipeline: filter then sort a project's stories for display.
//! Pure functions; nothing here touches the store.

use crate::error::ForgeError;
use crate::story::UserStory;
use crate::types::Direction;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

// ---------------------------------------------------------------------------
// SortKey / SortState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    Description,
    Priority,
    Tags,
    CreatedAt,
}

impl SortKey {
    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Description => "description",
            SortKey::Priority => "priority",
            SortKey::Tags => "tags",
            SortKey::CreatedAt => "createdAt",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SortKey {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "description" => Ok(SortKey::Description),
            "priority" => Ok(SortKey::Priority),
            "tags" => Ok(SortKey::Tags),
            "createdAt" | "created_at" | "created" => Ok(SortKey::CreatedAt),
            other => Err(ForgeError::InvalidSortKey(other.to_string())),
        }
    }
}

/// The single active `(key, direction)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortState {
    pub key: SortKey,
    pub direction: Direction,
}

impl Default for SortState {
    fn default() -> Self {
        Self {
            key: SortKey::CreatedAt,
            direction: Direction::Desc,
        }
    }
}

impl SortState {
    pub fn new(key: SortKey, direction: Direction) -> Self {
        Self { key, direction }
    }

    /// Column-header click: another column starts descending, descending
    /// flips to ascending, ascending falls back to the default.
    pub fn toggle(self, key: SortKey) -> Self {
        if self.key != key {
            return Self::new(key, Direction::Desc);
        }
        match self.direction {
            Direction::Desc => Self::new(key, Direction::Asc),
            Direction::Asc => Self::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// StoryFilter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryFilter {
    /// A story passes only if it carries every one of these.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Case-insensitive substring of the description.
    #[serde(default)]
    pub text: String,
}

impl StoryFilter {
    pub fn matches(&self, story: &UserStory) -> bool {
        if !story.has_all_tags(&self.tags) {
            return false;
        }
        self.text.is_empty()
            || story
                .description
                .to_lowercase()
                .contains(&self.text.to_lowercase())
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

fn compare(a: &UserStory, b: &UserStory, key: SortKey) -> Ordering {
    match key {
        SortKey::Description => a.description.cmp(&b.description),
        SortKey::Priority => a.priority.rank().cmp(&b.priority.rank()),
        SortKey::Tags => a.tags.join(",").cmp(&b.tags.join(",")),
        // `None` orders before any timestamp.
        SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
    }
}

/// Filter `stories` and sort the survivors. Equal keys keep input order.
pub fn apply(stories: &[UserStory], filter: &StoryFilter, sort: SortState) -> Vec<UserStory> {
    let mut out: Vec<UserStory> = stories.iter().filter(|s| filter.matches(s)).cloned().collect();
    out.sort_by(|a, b| sort.direction.apply(compare(a, b, sort.key)));
    out
}

/// Distinct tags across `stories`, in first-seen order.
pub fn all_tags(stories: &[UserStory]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    stories
        .iter()
        .flat_map(|s| s.tags.iter())
        .filter(|t| seen.insert(*t))
        .cloned()
        .collect()
}
