use crate::error::Result;
use std::io::Write;
use std::path::Path;

/// Replace `path` with `data` via a synced sibling tempfile, so readers see
/// either the old file or the new one. Missing parent directories are created.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    ensure_dir(dir)?;
    let mut tmp = tempfile::Builder::new().prefix(".storyforge-").tempfile_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Seed `path` with `data` unless it already exists. Returns whether it wrote.
pub fn write_if_missing(path: &Path, data: &[u8]) -> Result<bool> {
    if path.try_exists()? {
        return Ok(false);
    }
    atomic_write(path, data)?;
    Ok(true)
}
