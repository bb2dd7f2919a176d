//! Storage operations
//!
//! Directory listings produced for LIST and NLST. The lines are computed
//! before the transfer starts and written as a list-like transfer.

use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

use log::{error, info};

use crate::error::StorageError;
use crate::storage::validation::resolve_path;

/// Lists a directory as `name|size|timestamp` lines, directories suffixed
/// with `/` and sorted by name.
pub fn list_directory(server_root: &Path, virtual_path: &str) -> Result<Vec<String>, StorageError> {
    let real_path = resolve_path(server_root, virtual_path)?;
    let mut lines = Vec::new();
    for entry in read_entries(&real_path, virtual_path)? {
        let name = entry.file_name().to_string_lossy().to_string();
        let line = match entry.metadata() {
            Ok(metadata) => {
                let size = if metadata.is_dir() { 0 } else { metadata.len() };
                let timestamp = metadata
                    .modified()
                    .ok()
                    .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
                    .map(|dur| dur.as_secs())
                    .unwrap_or(0);
                let name = if metadata.is_dir() {
                    format!("{name}/")
                } else {
                    name
                };
                format!("{name}|{size}|{timestamp}")
            }
            Err(_) => format!("{name}|0|0"),
        };
        lines.push(line);
    }

    info!(
        "Listed directory {} (real: {}) - {} entries",
        virtual_path,
        real_path.display(),
        lines.len()
    );
    Ok(lines)
}

/// Lists only the entry names of a directory, sorted.
pub fn list_names(server_root: &Path, virtual_path: &str) -> Result<Vec<String>, StorageError> {
    let real_path = resolve_path(server_root, virtual_path)?;
    Ok(read_entries(&real_path, virtual_path)?
        .into_iter()
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect())
}

fn read_entries(real_path: &Path, virtual_path: &str) -> Result<Vec<fs::DirEntry>, StorageError> {
    if !real_path.is_dir() {
        return Err(StorageError::NotADirectory(virtual_path.to_string()));
    }
    let mut entries: Vec<_> = fs::read_dir(real_path)
        .map_err(|e| {
            error!(
                "Failed to list directory {} (real: {}): {}",
                virtual_path,
                real_path.display(),
                e
            );
            StorageError::from(e)
        })?
        .flatten()
        .collect();
    entries.sort_by_key(|entry| entry.file_name());
    Ok(entries)
}
