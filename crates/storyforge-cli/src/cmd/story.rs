use crate::output::{print_json, print_table, truncate};
use crate::session::{block_on, find_project, find_story, Session};
use clap::Subcommand;
use storyforge_core::project::Project;
use storyforge_core::story::{NewStory, UserStory};
use storyforge_core::sync::{BulkReport, ProjectSync};
use storyforge_core::types::{Direction, Priority, TagAction};
use storyforge_core::view::{self, SortKey, SortState, StoryFilter};
use std::path::Path;

#[derive(Subcommand)]
pub enum StorySubcommand {
    /// List a project's stories, filtered and sorted
    List {
        /// Project id or title
        project: String,
        /// Only stories carrying every one of these tags
        #[arg(long = "tag", short = 't', value_delimiter = ',')]
        tags: Vec<String>,
        /// Case-insensitive text the description must contain
        #[arg(long, short = 'q', default_value = "")]
        query: String,
        /// description, priority, tags or createdAt
        #[arg(long, default_value = "createdAt")]
        sort: SortKey,
        /// asc or desc
        #[arg(long, default_value = "desc")]
        dir: Direction,
    },
    /// Add a story to a project
    Add {
        /// Project id or title
        project: String,
        description: String,
        #[arg(long = "tag", short = 't', value_delimiter = ',')]
        tags: Vec<String>,
        /// Highest, High, Medium, Low or Lowest
        #[arg(long, short = 'p', default_value = "Medium")]
        priority: Priority,
    },
    /// Change a story's description, tags or priority
    Edit {
        /// Project id or title
        project: String,
        story: String,
        #[arg(long, short = 'd')]
        description: Option<String>,
        /// Replace the tag set
        #[arg(long = "tag", short = 't', value_delimiter = ',')]
        tags: Option<Vec<String>>,
        #[arg(long, short = 'p')]
        priority: Option<Priority>,
    },
    /// Delete stories
    Rm {
        /// Project id or title
        project: String,
        #[arg(required = true)]
        stories: Vec<String>,
    },
    /// Add tags to stories
    Tag {
        /// Project id or title
        project: String,
        #[arg(long = "tag", short = 't', value_delimiter = ',', required = true)]
        tags: Vec<String>,
        #[arg(required = true)]
        stories: Vec<String>,
    },
    /// Remove tags from stories
    Untag {
        /// Project id or title
        project: String,
        #[arg(long = "tag", short = 't', value_delimiter = ',', required = true)]
        tags: Vec<String>,
        #[arg(required = true)]
        stories: Vec<String>,
    },
}

pub fn run(
    root: &Path,
    user: Option<&str>,
    subcmd: StorySubcommand,
    json: bool,
) -> anyhow::Result<()> {
    let session = Session::load(root, user)?;
    block_on(dispatch(&session, subcmd, json))?
}

async fn dispatch(session: &Session, subcmd: StorySubcommand, json: bool) -> anyhow::Result<()> {
    let sync = session.sync().await?;
    match subcmd {
        StorySubcommand::List {
            project,
            tags,
            query,
            sort,
            dir,
        } => {
            let project = find_project(&sync, &project)?;
            let filter = StoryFilter { tags, text: query };
            list(&project, &filter, SortState::new(sort, dir), json)
        }
        StorySubcommand::Add {
            project,
            description,
            tags,
            priority,
        } => {
            let project = find_project(&sync, &project)?;
            let story = NewStory::new(description)
                .with_tags(&tags)
                .with_priority(priority);
            let id = sync.add_story(&project.id, &story).await?;
            if json {
                print_json(&serde_json::json!({ "id": id }))?;
            } else {
                println!("Added story {id} to '{}'", project.title);
            }
            Ok(())
        }
        StorySubcommand::Edit {
            project,
            story,
            description,
            tags,
            priority,
        } => {
            let project = find_project(&sync, &project)?;
            let mut edited = find_story(&project, &story)?;
            if description.is_none() && tags.is_none() && priority.is_none() {
                anyhow::bail!("nothing to change: pass --description, --tag or --priority");
            }
            if let Some(d) = description {
                edited.description = d;
            }
            if let Some(t) = tags {
                edited.tags = t;
            }
            if let Some(p) = priority {
                edited.priority = p;
            }
            sync.update_story(&project.id, &edited).await?;
            if !json {
                println!("Updated story {}", edited.id);
            }
            Ok(())
        }
        StorySubcommand::Rm { project, stories } => {
            let project = find_project(&sync, &project)?;
            let report = sync.bulk_delete_stories(&project.id, &stories).await?;
            report_bulk(&report, "Deleted", json)
        }
        StorySubcommand::Tag {
            project,
            tags,
            stories,
        } => retag(&sync, &project, &stories, &tags, TagAction::Add, json).await,
        StorySubcommand::Untag {
            project,
            tags,
            stories,
        } => retag(&sync, &project, &stories, &tags, TagAction::Remove, json).await,
    }
}

async fn retag(
    sync: &ProjectSync,
    project: &str,
    stories: &[String],
    tags: &[String],
    action: TagAction,
    json: bool,
) -> anyhow::Result<()> {
    let project = find_project(sync, project)?;
    let report = sync
        .bulk_update_tags(&project.id, stories, tags, action)
        .await?;
    let verb = match action {
        TagAction::Add => "Tagged",
        TagAction::Remove => "Untagged",
    };
    report_bulk(&report, verb, json)
}

fn list(project: &Project, filter: &StoryFilter, sort: SortState, json: bool) -> anyhow::Result<()> {
    let stories = view::apply(&project.stories, filter, sort);
    if json {
        return print_json(&serde_json::json!({
            "stories": stories,
            "allTags": view::all_tags(&project.stories),
            "sort": sort,
        }));
    }
    if stories.is_empty() {
        println!("No stories.");
        return Ok(());
    }
    let rows = stories.iter().map(row).collect();
    print_table(&["ID", "PRIORITY", "TAGS", "CREATED", "DESCRIPTION"], rows);
    Ok(())
}

fn row(story: &UserStory) -> Vec<String> {
    vec![
        story.id.clone(),
        story.priority.to_string(),
        story.tags.join(", "),
        story
            .created_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string()),
        truncate(&story.description, 60),
    ]
}

/// Print a bulk outcome; any per-item failure makes the command fail.
fn report_bulk(report: &BulkReport, verb: &str, json: bool) -> anyhow::Result<()> {
    if json {
        print_json(report)?;
    } else {
        println!("{verb} {} stories", report.succeeded.len());
        for failure in &report.failed {
            println!("  [failed] {}: {}", failure.target, failure.error);
        }
    }
    if !report.is_complete() {
        anyhow::bail!("{} of the stories failed", report.failed.len());
    }
    Ok(())
}
