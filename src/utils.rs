// src/utils.rs
// Path and hashing helpers shared by the backup store and manager

use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};

/// Resolve `path` against `base` and collapse `.` and `..` lexically.
///
/// The target may not exist yet, so this never touches the filesystem.
pub fn normalize_path(path: &Path, base: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Segment that keeps backups of paths outside the working directory apart
pub const OUTSIDE_BASE_DIR: &str = "_abs";

/// Path of `path` relative to `base`, suitable for joining under a backup directory.
///
/// Paths outside `base` keep their full shape minus the root/prefix under
/// `OUTSIDE_BASE_DIR`, so they never collide with a path inside `base`.
pub fn relative_backup_path(path: &Path, base: &Path) -> PathBuf {
    let normal = |p: &Path| -> PathBuf {
        p.components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect()
    };

    match path.strip_prefix(base) {
        Ok(rel) => normal(rel),
        Err(_) => Path::new(OUTSIDE_BASE_DIR).join(normal(path)),
    }
}

/// SHA-256 hex digest of file content
pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Check that an operation id can name a single directory under the backup root.
pub fn validate_operation_id(operation_id: &str) -> Result<(), String> {
    if operation_id.trim().is_empty() {
        return Err("operation id is empty".to_string());
    }
    if operation_id == "." || operation_id == ".." {
        return Err(format!("operation id '{}' is not a valid name", operation_id));
    }
    if operation_id.contains(['/', '\\']) {
        return Err(format!(
            "operation id '{}' contains a path separator",
            operation_id
        ));
    }
    Ok(())
}
