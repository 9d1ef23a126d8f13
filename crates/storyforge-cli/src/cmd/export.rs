use crate::session::{block_on, find_project, Session};
use anyhow::Context;
use storyforge_core::project::Project;
use storyforge_core::{export, io};
use std::path::Path;

/// Write `project`'s stories as JIRA CSV to stdout, to a file, or into a
/// directory under the project's export filename.
pub fn run(
    root: &Path,
    user: Option<&str>,
    project: &str,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let session = Session::load(root, user)?;
    let project = block_on(load_project(&session, project))??;
    let csv = export::jira_csv(&project.stories);

    let Some(output) = output else {
        println!("{csv}");
        return Ok(());
    };
    let path = if output.is_dir() {
        output.join(export::export_filename(&project.title))
    } else {
        output.to_path_buf()
    };
    io::atomic_write(&path, csv.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    eprintln!(
        "Exported {} stories to {}",
        project.stories.len(),
        path.display()
    );
    Ok(())
}

async fn load_project(session: &Session, reference: &str) -> anyhow::Result<Project> {
    let sync = session.sync().await?;
    find_project(&sync, reference)
}
