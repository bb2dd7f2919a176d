//! Path validation
//!
//! Maps virtual paths sent by the peer onto real paths under the server
//! root. `/` is the server root; `..` components are refused outright.

use std::path::{Component, Path, PathBuf};

use crate::error::StorageError;

/// Deepest virtual path accepted.
pub const MAX_DIRECTORY_DEPTH: usize = 32;

/// Resolves `virtual_path` under `server_root`.
pub fn resolve_path(server_root: &Path, virtual_path: &str) -> Result<PathBuf, StorageError> {
    let mut resolved = server_root.to_path_buf();
    let mut depth = 0;
    for component in Path::new(virtual_path.trim()).components() {
        match component {
            Component::RootDir | Component::CurDir => {}
            Component::Normal(part) => {
                depth += 1;
                if depth > MAX_DIRECTORY_DEPTH {
                    return Err(StorageError::PathTraversal(virtual_path.to_string()));
                }
                resolved.push(part);
            }
            Component::ParentDir | Component::Prefix(_) => {
                return Err(StorageError::PathTraversal(virtual_path.to_string()));
            }
        }
    }
    Ok(resolved)
}
