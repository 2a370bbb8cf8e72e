//! Port discovery file read by the launcher that spawned us.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Contents announcing `port`: a colon and the decimal port, no newline.
pub fn discovery_line(port: u16) -> String {
    format!(":{port}")
}

/// Writes the discovery file, creating its parent directory if needed.
///
/// The content goes to a sibling temp file first and is renamed into
/// place, so a reader never observes a partial write.
pub async fn write_discovery_file(path: &Path, port: u16) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let staging = staging_path(path);
    tokio::fs::write(&staging, discovery_line(port))
        .await
        .with_context(|| format!("failed to write {}", staging.display()))?;
    tokio::fs::rename(&staging, path)
        .await
        .with_context(|| format!("failed to move discovery file into {}", path.display()))?;
    tracing::debug!(path = %path.display(), port, "discovery file written");
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
