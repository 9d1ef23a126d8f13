use crate::error::{ForgeError, Result};
use crate::store::{FieldMap, FieldValue};
use crate::story::UserStory;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

/// A named, user-ordered container of stories.
///
/// `stories` is never persisted with the project record; the sync layer fills
/// it from the project's `stories` sub-collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub stories: Vec<UserStory>,
}

impl Project {
    pub fn story(&self, story_id: &str) -> Option<&UserStory> {
        self.stories.iter().find(|s| s.id == story_id)
    }

    pub(crate) fn create_fields(
        title: &str,
        description: &str,
        user_id: &str,
        order: i64,
    ) -> Result<FieldMap> {
        validate_title(title)?;
        let mut fields = FieldMap::new();
        fields.insert("title".into(), FieldValue::set(title)?);
        fields.insert("description".into(), FieldValue::set(description)?);
        fields.insert("userId".into(), FieldValue::set(user_id)?);
        fields.insert("order".into(), FieldValue::set(order)?);
        Ok(fields)
    }
}

// ---------------------------------------------------------------------------
// ProjectUpdate
// ---------------------------------------------------------------------------

/// Partial edit of a project's free-text fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ProjectUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none()
    }

    pub fn to_fields(&self) -> Result<FieldMap> {
        if self.is_empty() {
            return Err(ForgeError::Validation("nothing to update".to_string()));
        }
        let mut fields = FieldMap::new();
        if let Some(title) = &self.title {
            validate_title(title)?;
            fields.insert("title".into(), FieldValue::set(title)?);
        }
        if let Some(description) = &self.description {
            fields.insert("description".into(), FieldValue::set(description)?);
        }
        Ok(fields)
    }
}

fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(ForgeError::Validation(
            "project title must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_without_stories_deserializes() {
        let p: Project = serde_json::from_value(json!({
            "id": "p1",
            "title": "Checkout",
            "order": 3,
            "userId": "u1"
        }))
        .unwrap();
        assert_eq!(p.order, 3);
        assert!(p.stories.is_empty());
        assert_eq!(p.description, "");
    }

    #[test]
    fn update_only_includes_given_fields() {
        let update = ProjectUpdate {
            title: None,
            description: Some("new".into()),
        };
        let fields = update.to_fields().unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["description"], FieldValue::Set(json!("new")));
    }

    #[test]
    fn empty_update_and_blank_title_rejected() {
        assert!(ProjectUpdate::default().to_fields().is_err());
        let blank = ProjectUpdate {
            title: Some("  ".into()),
            description: None,
        };
        assert!(blank.to_fields().is_err());
    }
}
