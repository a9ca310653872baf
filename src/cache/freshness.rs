//! Mtime-based freshness detection for built artifacts.
//!
//! An artifact is fresh when its modification time is not older than its source's.
//! Equal timestamps count as fresh: ties favor the cache.

use crate::core::file_error::{FileOperationError, metadata_if_exists};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Stat snapshot of a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    /// Absolute path of the source file
    pub absolute_path: PathBuf,
    /// Its modification time
    pub modified_at: SystemTime,
}

/// Stat snapshot of a destination artifact; `modified_at` is `None` when no artifact
/// exists yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationDescriptor {
    /// Absolute path of the artifact
    pub absolute_path: PathBuf,
    /// Its modification time, if it exists
    pub modified_at: Option<SystemTime>,
}

impl DestinationDescriptor {
    /// Whether an artifact exists at the destination.
    pub fn exists(&self) -> bool {
        self.modified_at.is_some()
    }
}

/// Decide whether `destination` must be rebuilt from `source`.
///
/// - destination absent ⇒ stale
/// - both present ⇒ stale iff the destination is strictly older
///
/// ```
/// use assetmill::cache::freshness::{DestinationDescriptor, SourceDescriptor, is_stale};
/// use std::time::{Duration, UNIX_EPOCH};
///
/// let source = SourceDescriptor {
///     absolute_path: "/s/app.js".into(),
///     modified_at: UNIX_EPOCH + Duration::from_secs(10),
/// };
/// let same_age = DestinationDescriptor {
///     absolute_path: "/d/app.js".into(),
///     modified_at: Some(UNIX_EPOCH + Duration::from_secs(10)),
/// };
/// assert!(!is_stale(&source, &same_age));
/// ```
pub fn is_stale(source: &SourceDescriptor, destination: &DestinationDescriptor) -> bool {
    match destination.modified_at {
        None => true,
        Some(dest_time) => dest_time < source.modified_at,
    }
}

/// Stat a source file. `Ok(None)` means there is no source (not an error).
pub async fn stat_source(path: &Path) -> Result<Option<SourceDescriptor>, FileOperationError> {
    let Some(metadata) = metadata_if_exists(path, "checking asset source", "freshness").await?
    else {
        return Ok(None);
    };
    let modified_at = modified(&metadata, path)?;

    Ok(Some(SourceDescriptor {
        absolute_path: path.to_path_buf(),
        modified_at,
    }))
}

/// Stat a destination artifact; absence is reported in the descriptor.
///
/// A file sitting where a destination directory should be also reads as "absent", so the
/// provisioning step gets to report it as a configuration error.
pub async fn stat_destination(path: &Path) -> Result<DestinationDescriptor, FileOperationError> {
    let metadata = match metadata_if_exists(path, "checking built artifact", "freshness").await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotADirectory => None,
        Err(e) => return Err(e),
    };
    let modified_at = match metadata {
        Some(metadata) => Some(modified(&metadata, path)?),
        None => None,
    };

    Ok(DestinationDescriptor {
        absolute_path: path.to_path_buf(),
        modified_at,
    })
}

fn modified(metadata: &std::fs::Metadata, path: &Path) -> Result<SystemTime, FileOperationError> {
    use crate::core::file_error::{FileOperation, FileResultExt};

    metadata.modified().with_file_context(
        FileOperation::Metadata,
        path,
        "reading modification time",
        "freshness",
    )
}
