use crate::output::{print_json, print_table};
use crate::session::{block_on, find_project, find_story, Session};
use anyhow::Context;
use clap::Subcommand;
use std::path::Path;
use std::sync::Arc;
use story_llm::{
    FromProjectRequest, FromStoryRequest, FromTagsRequest, GeneratedStories, GenerationRequest,
    LlmBackend, MockBackend, RefineRequest, StoryGenerator,
};
use storyforge_core::project::Project;
use storyforge_core::sync::ProjectSync;

#[derive(Subcommand)]
pub enum GenerateSubcommand {
    /// Rewrite one story for clarity and completeness
    Refine {
        /// Project id or title
        project: String,
        story: String,
        /// Replace the story's description with the refined text
        #[arg(long)]
        save: bool,
    },
    /// New stories related to an existing one
    FromStory {
        /// Project id or title
        project: String,
        story: String,
        #[arg(long, short = 'n', default_value_t = 3)]
        count: u32,
        /// Add the generated stories to the project
        #[arg(long)]
        save: bool,
    },
    /// New stories from the project description
    FromProject {
        /// Project id or title
        project: String,
        #[arg(long, short = 'n', default_value_t = 3)]
        count: u32,
        /// Use this description instead of the stored one
        #[arg(long, short = 'd')]
        description: Option<String>,
        #[arg(long)]
        save: bool,
    },
    /// New stories from the project description, focused on tags
    FromTags {
        /// Project id or title
        project: String,
        #[arg(long = "tag", short = 't', value_delimiter = ',', required = true)]
        tags: Vec<String>,
        #[arg(long, short = 'n', default_value_t = 3)]
        count: u32,
        #[arg(long, short = 'd')]
        description: Option<String>,
        /// Add the generated stories, tagged with the focus tags
        #[arg(long)]
        save: bool,
    },
}

pub fn run(
    root: &Path,
    user: Option<&str>,
    subcmd: GenerateSubcommand,
    mock_llm: bool,
    json: bool,
) -> anyhow::Result<()> {
    let session = Session::load(root, user)?;
    let llm: Arc<dyn LlmBackend> = if mock_llm {
        Arc::new(MockBackend::offline())
    } else {
        story_llm::backend_from_config(&session.config.llm)
            .context("failed to set up the LLM backend")?
    };
    block_on(dispatch(&session, llm.as_ref(), subcmd, json))?
}

async fn dispatch(
    session: &Session,
    llm: &dyn LlmBackend,
    subcmd: GenerateSubcommand,
    json: bool,
) -> anyhow::Result<()> {
    let sync = session.sync().await?;
    let generator = StoryGenerator::new(llm)
        .with_schema(session.config.llm.output_schema)
        .with_temperature(session.config.llm.temperature);

    match subcmd {
        GenerateSubcommand::Refine {
            project,
            story,
            save,
        } => {
            let project = find_project(&sync, &project)?;
            let mut story = find_story(&project, &story)?;
            let out = generator
                .refine(&RefineRequest {
                    user_story: story.description.clone(),
                })
                .await
                .context("Failed to refine user story.")?;
            if save {
                story.description = out.refined_user_story.clone();
                sync.update_story(&project.id, &story).await?;
            }
            if json {
                print_json(&out)?;
            } else {
                println!("{}", out.refined_user_story);
                if save {
                    println!("\nSaved to story {}", story.id);
                }
            }
            Ok(())
        }
        GenerateSubcommand::FromStory {
            project,
            story,
            count,
            save,
        } => {
            let project = find_project(&sync, &project)?;
            let story = find_story(&project, &story)?;
            let request = GenerationRequest::FromStory(FromStoryRequest {
                existing_story: story.description,
                number_of_stories: count,
            });
            let out = generate(session, &generator, &request, "Failed to generate stories.").await?;
            let ctx = Generated {
                sync: &sync,
                project: &project,
                extra_tags: &[],
                save,
                json,
            };
            ctx.finish(out).await
        }
        GenerateSubcommand::FromProject {
            project,
            count,
            description,
            save,
        } => {
            let project = find_project(&sync, &project)?;
            let request = GenerationRequest::FromProject(FromProjectRequest {
                project_description: description.unwrap_or_else(|| project.description.clone()),
                number_of_stories: count,
            });
            let out = generate(
                session,
                &generator,
                &request,
                "Failed to generate stories from project.",
            )
            .await?;
            let ctx = Generated {
                sync: &sync,
                project: &project,
                extra_tags: &[],
                save,
                json,
            };
            ctx.finish(out).await
        }
        GenerateSubcommand::FromTags {
            project,
            tags,
            count,
            description,
            save,
        } => {
            let project = find_project(&sync, &project)?;
            let request = GenerationRequest::FromTags(FromTagsRequest {
                project_description: description.unwrap_or_else(|| project.description.clone()),
                tags: tags.clone(),
                number_of_stories: count,
            });
            let out = generate(
                session,
                &generator,
                &request,
                "Failed to generate stories from tags.",
            )
            .await?;
            let ctx = Generated {
                sync: &sync,
                project: &project,
                extra_tags: &tags,
                save,
                json,
            };
            ctx.finish(out).await
        }
    }
}

async fn generate(
    session: &Session,
    generator: &StoryGenerator<'_>,
    request: &GenerationRequest,
    failure: &'static str,
) -> anyhow::Result<GeneratedStories> {
    let max = session.config.generation.max_stories;
    if request.number_of_stories() > max {
        anyhow::bail!("numberOfStories must be at most {max}");
    }
    generator.generate(request).await.context(failure)
}

/// Where a batch of generated stories goes once it is back.
struct Generated<'a> {
    sync: &'a ProjectSync,
    project: &'a Project,
    extra_tags: &'a [String],
    save: bool,
    json: bool,
}

impl Generated<'_> {
    async fn finish(&self, out: GeneratedStories) -> anyhow::Result<()> {
        let report = if self.save {
            Some(
                self.sync
                    .add_bulk_stories(&self.project.id, &out.new_stories, self.extra_tags)
                    .await?,
            )
        } else {
            None
        };

        if self.json {
            print_json(&serde_json::json!({
                "newStories": out.new_stories,
                "saved": report,
            }))?;
        } else {
            let rows = out
                .new_stories
                .iter()
                .map(|s| vec![s.priority.to_string(), s.description.clone()])
                .collect();
            print_table(&["PRIORITY", "DESCRIPTION"], rows);
            if let Some(report) = &report {
                println!(
                    "\nSaved {} stories to '{}'",
                    report.succeeded.len(),
                    self.project.title
                );
                for failure in &report.failed {
                    println!("  [failed] item {}: {}", failure.target, failure.error);
                }
            }
        }

        match report {
            Some(r) if !r.is_complete() => {
                anyhow::bail!("{} generated stories could not be saved", r.failed.len())
            }
            _ => Ok(()),
        }
    }
}
