use crate::output::{print_json, print_table, truncate};
use crate::session::{block_on, find_project, Session};
use clap::Subcommand;
use storyforge_core::project::ProjectUpdate;
use storyforge_core::sync::ProjectSync;
use std::path::Path;

#[derive(Subcommand)]
pub enum ProjectSubcommand {
    /// List projects in display order
    List,
    /// Create a project at the end of the list
    Add {
        title: String,
        #[arg(long, short = 'd', default_value = "")]
        description: String,
    },
    /// Change a project's title or description
    Edit {
        /// Project id or title
        project: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, short = 'd')]
        description: Option<String>,
    },
    /// Delete a project and all of its stories
    Rm {
        /// Project id or title
        project: String,
    },
    /// Give the named projects orders 0, 1, 2, ... in the given sequence
    Reorder {
        /// Project ids or titles, first to last
        #[arg(required = true)]
        projects: Vec<String>,
    },
}

pub fn run(
    root: &Path,
    user: Option<&str>,
    subcmd: ProjectSubcommand,
    json: bool,
) -> anyhow::Result<()> {
    let session = Session::load(root, user)?;
    block_on(dispatch(&session, subcmd, json))?
}

async fn dispatch(session: &Session, subcmd: ProjectSubcommand, json: bool) -> anyhow::Result<()> {
    let sync = session.sync().await?;
    match subcmd {
        ProjectSubcommand::List => list(&sync, json),
        ProjectSubcommand::Add { title, description } => {
            let id = sync.add_project(&title, &description).await?;
            if json {
                print_json(&serde_json::json!({ "id": id }))?;
            } else {
                println!("Created project '{title}' ({id})");
            }
            Ok(())
        }
        ProjectSubcommand::Edit {
            project,
            title,
            description,
        } => {
            let project = find_project(&sync, &project)?;
            let update = ProjectUpdate { title, description };
            if update.is_empty() {
                anyhow::bail!("nothing to change: pass --title and/or --description");
            }
            sync.update_project(&project.id, &update).await?;
            if !json {
                println!("Updated project {}", project.id);
            }
            Ok(())
        }
        ProjectSubcommand::Rm { project } => {
            let project = find_project(&sync, &project)?;
            sync.delete_project(&project.id).await?;
            if json {
                print_json(&serde_json::json!({
                    "id": project.id,
                    "stories": project.stories.len(),
                }))?;
            } else {
                println!(
                    "Deleted project '{}' and {} stories",
                    project.title,
                    project.stories.len()
                );
            }
            Ok(())
        }
        ProjectSubcommand::Reorder { projects } => {
            let ids = projects
                .iter()
                .map(|r| find_project(&sync, r).map(|p| p.id))
                .collect::<anyhow::Result<Vec<_>>>()?;
            sync.set_projects_order(&ids).await?;
            if !json {
                println!("Reordered {} projects", ids.len());
            }
            Ok(())
        }
    }
}

fn list(sync: &ProjectSync, json: bool) -> anyhow::Result<()> {
    let projects = sync.projects();
    if json {
        return print_json(&projects);
    }
    if projects.is_empty() {
        println!("No projects.");
        return Ok(());
    }
    let rows = projects
        .iter()
        .map(|p| {
            vec![
                p.id.clone(),
                p.order.to_string(),
                truncate(&p.title, 40),
                p.stories.len().to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "ORDER", "TITLE", "STORIES"], rows);
    Ok(())
}
