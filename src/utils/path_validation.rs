//! Path validation for request-derived paths.
//!
//! Request URLs are joined onto the source and destination roots, so anything that could
//! climb out of a root is rejected before the filesystem is touched.

use std::path::{Component, Path, PathBuf};

/// Checks that a `/`-separated request path stays inside whatever root it is joined to.
///
/// Rejects `..` segments, NUL bytes, backslashes (which are separators on Windows) and
/// segments that would be interpreted as a drive or root prefix.
#[must_use]
pub fn is_safe_relative(relative: &str) -> bool {
    if relative.contains('\0') || relative.contains('\\') {
        return false;
    }

    relative.split('/').all(|segment| {
        segment != ".."
            && Path::new(segment)
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    })
}

/// Joins a request path onto a root, or returns `None` if the path is unsafe.
///
/// Leading slashes are stripped so the result always lives under `root`.
#[must_use]
pub fn join_under(root: &Path, relative: &str) -> Option<PathBuf> {
    let relative = relative.trim_start_matches('/');
    if !is_safe_relative(relative) {
        return None;
    }

    let mut joined = root.to_path_buf();
    for segment in relative.split('/').filter(|s| !s.is_empty() && *s != ".") {
        joined.push(segment);
    }
    Some(joined)
}
