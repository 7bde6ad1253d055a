//! Build context staging.
//!
//! The image is built from a copy of the source directory that leaves out
//! the excluded paths, so the container runtime never sees them.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use walkdir::WalkDir;

use crate::error::{CliError, Result};

const DOCKERFILE: &str = "Dockerfile";

/// Pure function: Whether a path relative to the context root is excluded.
///
/// An entry with a separator matches that path and everything below it. A
/// bare name matches a path component at any depth.
pub fn is_excluded(relative: &Path, exclude: &[String]) -> bool {
    exclude.iter().any(|entry| {
        let entry = entry.trim_end_matches('/');
        if entry.contains('/') {
            relative.starts_with(entry)
        } else {
            relative
                .components()
                .any(|component| component.as_os_str() == entry)
        }
    })
}

/// Copies `source` into a temporary directory, skipping excluded paths.
pub fn stage_build_context(source: &Path, exclude: &[String]) -> Result<TempDir> {
    if !source.is_dir() {
        return Err(CliError::ImagePublish(format!(
            "build context '{}' is not a directory",
            source.display()
        )));
    }
    if !source.join(DOCKERFILE).is_file() {
        return Err(CliError::ImagePublish(format!(
            "build context '{}' has no {}",
            source.display(),
            DOCKERFILE
        )));
    }

    let staging = tempfile::Builder::new().prefix("agentstack-context-").tempdir()?;
    let mut copied = 0usize;

    let walker = WalkDir::new(source)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| {
            entry
                .path()
                .strip_prefix(source)
                .map(|relative| !is_excluded(relative, exclude))
                .unwrap_or(true)
        });

    for entry in walker {
        let entry = entry.map_err(|e| CliError::ImagePublish(e.to_string()))?;
        let relative = relative_path(source, entry.path())?;
        let target = staging.path().join(&relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
            copied += 1;
        } else {
            tracing::debug!(path = %relative.display(), "skipping special file in build context");
        }
    }

    if !staging.path().join(DOCKERFILE).is_file() {
        return Err(CliError::ImagePublish(format!(
            "the exclusion list removes {} from build context '{}'",
            DOCKERFILE,
            source.display()
        )));
    }

    tracing::debug!(
        source = %source.display(),
        staging = %staging.path().display(),
        files = copied,
        "staged build context"
    );
    Ok(staging)
}

fn relative_path(root: &Path, path: &Path) -> Result<PathBuf> {
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .map_err(|e| CliError::ImagePublish(e.to_string()))
}
