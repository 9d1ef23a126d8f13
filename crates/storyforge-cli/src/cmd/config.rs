use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use storyforge_core::config::{Config, WarnLevel};
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show the effective configuration
    Show,

    /// Validate the config for common mistakes
    Validate,
}

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(root, json),
        ConfigSubcommand::Validate => validate(root, json),
    }
}

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    if json {
        return print_json(&config);
    }

    let llm = &config.llm;
    let rows = vec![
        vec!["default_user".into(), config.default_user.clone()],
        vec!["llm.provider".into(), llm.provider.to_string()],
        vec!["llm.base_url".into(), llm.base_url.clone()],
        vec!["llm.model".into(), llm.model.clone()],
        vec!["llm.api_key_env".into(), llm.api_key_env.clone()],
        vec![
            "llm.temperature".into(),
            llm.temperature
                .map(|t| t.to_string())
                .unwrap_or_else(|| "(model default)".into()),
        ],
        vec![
            "generation.baseline_tag".into(),
            config.generation.baseline_tag.clone(),
        ],
        vec![
            "generation.max_stories".into(),
            config.generation.max_stories.to_string(),
        ],
        vec![
            "store.data_file".into(),
            config.store.resolve(root).display().to_string(),
        ],
        vec!["server.port".into(), config.server.port.to_string()],
    ];
    print_table(&["KEY", "VALUE"], rows);
    Ok(())
}

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let warnings = config.validate();

    if json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    let has_errors = warnings.iter().any(|w| w.level == WarnLevel::Error);
    if has_errors {
        anyhow::bail!("config validation found errors");
    }

    Ok(())
}
