use anyhow::Context;
use storyforge_core::{config::Config, io, paths};
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing storyforge in: {}", root.display());

    let dir = paths::forge_dir(root);
    io::ensure_dir(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    if paths::config_path(root).exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
    } else {
        Config::default()
            .save(root)
            .context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    }

    let created = io::write_if_missing(&paths::data_path(root), b"")
        .context("failed to write data.yaml")?;
    if created {
        println!("  created: {}", paths::DATA_FILE);
    } else {
        println!("  exists:  {}", paths::DATA_FILE);
    }

    println!("\nNext: storyforge project add \"My project\"");
    Ok(())
}
