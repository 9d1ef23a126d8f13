use crate::error::{ForgeError, Result};
use crate::store::{FieldMap, FieldValue};
use crate::types::Priority;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// UserStory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStory {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Records written before priorities existed read back as `Medium`.
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub project_id: String,
    /// `None` until the store has resolved the server timestamp.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl UserStory {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// True if every tag in `required` is on this story.
    pub fn has_all_tags(&self, required: &[String]) -> bool {
        required.iter().all(|t| self.has_tag(t))
    }

    /// Fields sent when an edited story is written back.
    pub fn update_fields(&self, project_id: &str) -> Result<FieldMap> {
        validate_description(&self.description)?;
        let mut fields = FieldMap::new();
        fields.insert("description".into(), FieldValue::set(&self.description)?);
        fields.insert("tags".into(), FieldValue::set(dedup_tags(&self.tags))?);
        fields.insert("priority".into(), FieldValue::set(self.priority)?);
        fields.insert("projectId".into(), FieldValue::set(project_id)?);
        Ok(fields)
    }
}

// ---------------------------------------------------------------------------
// NewStory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStory {
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub priority: Priority,
}

impl NewStory {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn with_tags(mut self, tags: &[String]) -> Self {
        self.tags = tags.to_vec();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Fields for a create under `project_id`; `createdAt` is stamped by the store.
    pub fn create_fields(&self, project_id: &str) -> Result<FieldMap> {
        validate_description(&self.description)?;
        let mut fields = FieldMap::new();
        fields.insert("description".into(), FieldValue::set(&self.description)?);
        fields.insert("tags".into(), FieldValue::set(dedup_tags(&self.tags))?);
        fields.insert("priority".into(), FieldValue::set(self.priority)?);
        fields.insert("projectId".into(), FieldValue::set(project_id)?);
        fields.insert("createdAt".into(), FieldValue::ServerTimestamp);
        Ok(fields)
    }
}

// ---------------------------------------------------------------------------
// GeneratedStory
// ---------------------------------------------------------------------------

/// One story produced by the text-generation backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedStory {
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
}

impl GeneratedStory {
    pub fn new(description: impl Into<String>, priority: Priority) -> Self {
        Self {
            description: description.into(),
            priority,
        }
    }

    pub fn into_new_story(self, tags: &[String]) -> NewStory {
        NewStory {
            description: self.description,
            tags: tags.to_vec(),
            priority: self.priority,
        }
    }
}

// ---------------------------------------------------------------------------
// Tag helpers
// ---------------------------------------------------------------------------

/// Trim, drop empties, and collapse duplicates keeping first occurrence.
pub fn dedup_tags<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// Parse a comma-separated tag list as typed into a form field.
pub fn parse_tag_list(input: &str) -> Vec<String> {
    let parts: Vec<&str> = input.split(',').collect();
    dedup_tags(&parts)
}

/// Tags for a batch of generated stories: the baseline tag plus any extras.
pub fn generated_tags(baseline: &str, extra: &[String]) -> Vec<String> {
    let mut all = Vec::with_capacity(extra.len() + 1);
    all.push(baseline.to_string());
    all.extend(extra.iter().cloned());
    dedup_tags(&all)
}

fn validate_description(description: &str) -> Result<()> {
    if description.trim().is_empty() {
        return Err(ForgeError::Validation(
            "story description must not be empty".to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dedup_keeps_first_occurrence() {
        let tags = dedup_tags(&["ui", " api", "ui", "", "api "]);
        assert_eq!(tags, vec!["ui", "api"]);
    }

    #[test]
    fn parse_tag_list_splits_on_commas() {
        assert_eq!(parse_tag_list("auth, login,,auth"), vec!["auth", "login"]);
        assert!(parse_tag_list("").is_empty());
    }

    #[test]
    fn generated_tags_include_baseline_once() {
        let tags = generated_tags("generated", &["x".into(), "generated".into()]);
        assert_eq!(tags, vec!["generated", "x"]);
    }

    #[test]
    fn legacy_record_defaults_priority() {
        let story: UserStory = serde_json::from_value(json!({
            "id": "s1",
            "description": "As a user I want to log in.",
            "tags": ["auth"],
            "projectId": "p1",
            "createdAt": "2026-01-02T03:04:05.000000Z"
        }))
        .unwrap();
        assert_eq!(story.priority, Priority::Medium);
        assert!(story.created_at.is_some());
    }

    #[test]
    fn pending_timestamp_reads_as_none() {
        let story: UserStory = serde_json::from_value(json!({
            "id": "s1",
            "description": "x",
            "createdAt": null
        }))
        .unwrap();
        assert!(story.created_at.is_none());
        assert!(story.tags.is_empty());
    }

    #[test]
    fn create_fields_stamp_server_time() {
        let fields = NewStory::new("Do the thing.")
            .with_tags(&["a".into(), "a".into()])
            .with_priority(Priority::High)
            .create_fields("p1")
            .unwrap();
        assert_eq!(fields["createdAt"], FieldValue::ServerTimestamp);
        assert_eq!(fields["tags"], FieldValue::Set(json!(["a"])));
        assert_eq!(fields["priority"], FieldValue::Set(json!("High")));
        assert_eq!(fields["projectId"], FieldValue::Set(json!("p1")));
    }

    #[test]
    fn empty_description_rejected() {
        assert!(NewStory::new("   ").create_fields("p1").is_err());
    }

    #[test]
    fn has_all_tags_is_superset_check() {
        let story = UserStory {
            id: "s".into(),
            description: "d".into(),
            tags: vec!["a".into(), "b".into()],
            priority: Priority::Low,
            project_id: "p".into(),
            created_at: None,
        };
        assert!(story.has_all_tags(&[]));
        assert!(story.has_all_tags(&["a".into()]));
        assert!(!story.has_all_tags(&["a".into(), "c".into()]));
    }
}
