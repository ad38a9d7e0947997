//! Recording file lookup.

use std::path::{Path, PathBuf};

/// Resolve a requested recording strictly inside `dir`.
///
/// Only the last path segment of `requested` is used, so `../../etc/passwd`
/// looks up `passwd` in `dir`. Returns `None` when no such file exists.
pub fn resolve_recording(dir: &Path, requested: &str) -> Option<PathBuf> {
    let name = base_name(requested)?;
    let path = dir.join(name);
    if path.is_file() {
        Some(path)
    } else {
        None
    }
}

/// Last path segment of `requested`, splitting on both separators.
pub fn base_name(requested: &str) -> Option<&str> {
    let name = requested.rsplit(['/', '\\']).next()?;
    match name {
        "" | "." | ".." => None,
        name => Some(name),
    }
}

/// `video/mp4` for `.mp4` files, `video/webm` otherwise.
pub fn content_type_for(path: &Path) -> &'static str {
    let is_mp4 = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("mp4"));
    if is_mp4 {
        "video/mp4"
    } else {
        "video/webm"
    }
}
