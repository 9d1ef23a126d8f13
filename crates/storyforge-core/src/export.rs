//! JIRA-import CSV export.

use crate::story::UserStory;
use chrono::SecondsFormat;
use regex::Regex;
use std::sync::OnceLock;

pub const CSV_HEADER: &str = "Summary,Description,Labels,Issue Type,Created Date";

/// Render `stories` as one CSV document: header plus one row per story,
/// joined with `\n`.
pub fn jira_csv(stories: &[UserStory]) -> String {
    let mut lines = Vec::with_capacity(stories.len() + 1);
    lines.push(CSV_HEADER.to_string());
    lines.extend(stories.iter().map(row));
    lines.join("\n")
}

fn row(story: &UserStory) -> String {
    let created = story
        .created_at
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default();
    [
        quote(summary(&story.description)),
        quote(&story.description),
        quote(&story.tags.join(" ")),
        "Story".to_string(),
        quote(&created),
    ]
    .join(",")
}

/// First sentence of `text`, terminator included. Text without a terminator
/// is returned whole.
pub fn summary(text: &str) -> &str {
    match text.find(['.', '!', '?']) {
        Some(i) => &text[..=i],
        None => text,
    }
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Download name for a project's export, e.g. `My_Project_stories.csv`.
pub fn export_filename(title: &str) -> String {
    static WS: OnceLock<Regex> = OnceLock::new();
    let re = WS.get_or_init(|| Regex::new(r"\s+").expect("valid regex"));
    format!("{}_stories.csv", re.replace_all(title, "_"))
}
