//! Discovery of volume series on disk.

use crate::data::VolumeLoader;
use anyhow::{Context, Result};
use glob::{glob_with, MatchOptions, Pattern};
use std::path::{Path, PathBuf};
use tracing::debug;

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

/// Non-hidden immediate subdirectories of `root` that hold a volume, sorted by name.
///
/// The first entry is the registration target of the series.
pub fn find_series_volumes(root: &Path, loader: &VolumeLoader) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(root)
        .with_context(|| format!("Failed to list series directory {}", root.display()))?;

    let mut volumes = Vec::new();
    for entry in entries {
        let path = entry.with_context(|| "Failed to read directory entry")?.path();
        if path.is_dir() && !is_hidden(&path) && loader.is_volume_directory(&path) {
            volumes.push(path);
        }
    }
    volumes.sort();

    debug!(root = %root.display(), volumes = volumes.len(), "Series volumes found");
    Ok(volumes)
}

/// `root` and every non-hidden directory below it that holds at least one volume.
pub fn find_series_roots(root: &Path, loader: &VolumeLoader) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/**/*", Pattern::escape(&root.to_string_lossy()));
    let options = MatchOptions {
        require_literal_leading_dot: true,
        ..MatchOptions::new()
    };

    let mut candidates = vec![root.to_path_buf()];
    for entry in glob_with(&pattern, options).with_context(|| format!("Invalid glob pattern: {pattern}"))? {
        let path = entry.with_context(|| "Failed to read glob entry")?;
        if path.is_dir() {
            candidates.push(path);
        }
    }

    let mut roots = Vec::new();
    for dir in candidates {
        if !find_series_volumes(&dir, loader)?.is_empty() {
            roots.push(dir);
        }
    }
    roots.sort();
    Ok(roots)
}
