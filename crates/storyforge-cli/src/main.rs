mod cmd;
mod output;
mod root;
mod session;

use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand, generate::GenerateSubcommand, project::ProjectSubcommand,
    story::StorySubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "storyforge",
    about = "Organize user stories into projects and generate new ones with an LLM",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .storyforge/ or .git/)
    #[arg(long, global = true, env = "STORYFORGE_ROOT")]
    root: Option<PathBuf>,

    /// User whose projects to operate on (default: config default_user)
    #[arg(long, global = true, env = "STORYFORGE_USER")]
    user: Option<String>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize storyforge in the current directory
    Init,

    /// Run the HTTP API
    Serve {
        /// Port to listen on (default: server.port from config, 0 = OS-assigned)
        #[arg(long)]
        port: Option<u16>,

        /// Don't open a browser on start
        #[arg(long)]
        no_open: bool,

        /// Answer generation requests with canned stories
        #[arg(long)]
        mock_llm: bool,
    },

    /// Manage projects
    Project {
        #[command(subcommand)]
        subcommand: ProjectSubcommand,
    },

    /// Manage the stories of a project
    Story {
        #[command(subcommand)]
        subcommand: StorySubcommand,
    },

    /// Export a project's stories as a JIRA-import CSV
    Export {
        /// Project id or title
        project: String,

        /// Write to this file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Generate or refine stories with the configured LLM
    Generate {
        #[command(subcommand)]
        subcommand: GenerateSubcommand,

        /// Answer with canned stories instead of calling the LLM
        #[arg(long, global = true)]
        mock_llm: bool,
    },

    /// Inspect and validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let user = cli.user.as_deref();

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Serve {
            port,
            no_open,
            mock_llm,
        } => cmd::serve::run(&root, port, no_open, mock_llm),
        Commands::Project { subcommand } => cmd::project::run(&root, user, subcommand, cli.json),
        Commands::Story { subcommand } => cmd::story::run(&root, user, subcommand, cli.json),
        Commands::Export { project, output } => {
            cmd::export::run(&root, user, &project, output.as_deref())
        }
        Commands::Generate {
            subcommand,
            mock_llm,
        } => cmd::generate::run(&root, user, subcommand, mock_llm, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
