use std::path::{Path, PathBuf};

/// # Join Path Prefix
///
/// Resolves `path` against an optional `prefix` directory.
///
/// Relative paths are appended to the prefix; absolute paths, and any path
/// when no prefix is given, are returned unchanged.
///
/// # Arguments
/// * `path` - The path to resolve.
/// * `prefix` - Base directory relative paths are joined onto.
pub fn join_path_prefix(path: &Path, prefix: Option<&Path>) -> PathBuf {
    match prefix {
        Some(prefix) if !path.is_absolute() => prefix.join(path),
        _ => path.to_path_buf(),
    }
}
