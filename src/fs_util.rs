use std::fs;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;

use crate::error::SyncError;

/// Unpacks a gzip-compressed tar archive into `target_dir`, returning the number of files written.
pub fn extract_tgz(archive_path: &Path, target_dir: &Path) -> Result<usize, SyncError> {
    let file = fs::File::open(archive_path).map_err(|err| {
        SyncError::Extraction(format!("open archive {}: {err}", archive_path.display()))
    })?;
    let mut archive = Archive::new(GzDecoder::new(file));
    fs::create_dir_all(target_dir).map_err(|err| SyncError::Filesystem(err.to_string()))?;

    let mut written = 0usize;
    let entries = archive
        .entries()
        .map_err(|err| SyncError::Extraction(err.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|err| SyncError::Extraction(err.to_string()))?;
        let entry_path = entry
            .path()
            .map_err(|err| SyncError::Extraction(err.to_string()))?
            .into_owned();
        if !is_enclosed(&entry_path) {
            return Err(SyncError::Extraction(format!(
                "tar entry path traversal detected: {}",
                entry_path.display()
            )));
        }
        let is_file = entry.header().entry_type().is_file();
        let unpacked = entry
            .unpack_in(target_dir)
            .map_err(|err| SyncError::Extraction(err.to_string()))?;
        if unpacked && is_file {
            written += 1;
        }
    }
    Ok(written)
}

fn is_enclosed(path: &Path) -> bool {
    path.components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

/// Every regular file below `root`, sorted for a stable processing order. Symlinks
/// are never followed.
pub fn walk_files(root: &Path) -> Result<Vec<PathBuf>, SyncError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries = fs::read_dir(&path).map_err(|err| SyncError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| SyncError::Filesystem(err.to_string()))?;
            let file_type = entry
                .file_type()
                .map_err(|err| SyncError::Filesystem(err.to_string()))?;
            if file_type.is_dir() {
                stack.push(entry.path());
            } else if file_type.is_file() {
                items.push(entry.path());
            }
        }
    }
    items.sort();
    Ok(items)
}
