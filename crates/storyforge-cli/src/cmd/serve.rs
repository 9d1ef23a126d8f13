use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use story_llm::{LlmBackend, MockBackend};
use storyforge_core::config::Config;
use storyforge_server::AppState;

pub fn run(root: &Path, port: Option<u16>, no_open: bool, mock_llm: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let port = port.unwrap_or(config.server.port);

    let llm: Arc<dyn LlmBackend> = if mock_llm {
        Arc::new(MockBackend::offline())
    } else {
        story_llm::backend_from_config(&config.llm)
            .context("failed to set up the LLM backend (pass --mock-llm to run without one)")?
    };
    let model = llm.id().to_string();
    let app_state = AppState::open(root, config, llm)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
        let actual_port = listener.local_addr()?.port();
        let pid = std::process::id();

        println!("storyforge API → http://localhost:{actual_port}  (model {model}, PID {pid})");

        tokio::select! {
            res = storyforge_server::serve_on(app_state, listener, !no_open) => res,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                Ok(())
            }
        }
    })
}
