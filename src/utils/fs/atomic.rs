//! Atomic artifact writes using a temp-and-rename strategy.
//!
//! Readers of the destination tree must never observe a half-written artifact whose
//! modification time already says "fresh", so every artifact is written to a temporary
//! file in its final directory, synced, and renamed over the destination.

use crate::core::AssetError;
use crate::core::file_error::{FileOperation, FileOperationError, FileResultExt};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const CALLER: &str = "atomic_write";

/// Atomically writes bytes to `path`.
///
/// The parent directory must already exist; provisioning it is the caller's job.
///
/// When `not_older_than` is given and the freshly written file's modification time is
/// earlier than it (a source stamped in the future, or a coarse filesystem clock), the
/// file's modification time is raised to `not_older_than` before it becomes visible.
///
/// # Guarantees
///
/// - **Atomicity**: the destination holds either the old or the new content
/// - **Durability**: content is synced to disk before the rename
/// - **Cleanup**: the temporary file is removed if any step fails
pub fn atomic_write(
    path: &Path,
    content: &[u8],
    not_older_than: Option<SystemTime>,
) -> Result<(), AssetError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();

    let prefix = format!(".{file_name}.");
    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix).suffix(crate::constants::TEMP_SUFFIX);
    // tempfile defaults to 0600; artifacts get the mode of a plain create
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(crate::constants::ARTIFACT_MODE));
    }

    let mut temp = builder
        .tempfile_in(parent)
        .with_file_context(FileOperation::Write, parent, "creating temporary artifact", CALLER)?;

    temp.write_all(content).with_file_context(
        FileOperation::Write,
        temp.path(),
        "writing temporary artifact",
        CALLER,
    )?;

    temp.as_file().sync_all().with_file_context(
        FileOperation::Write,
        temp.path(),
        "syncing temporary artifact",
        CALLER,
    )?;

    if let Some(floor) = not_older_than {
        let written_at = temp.as_file().metadata().and_then(|m| m.modified()).with_file_context(
            FileOperation::Metadata,
            temp.path(),
            "reading temporary artifact mtime",
            CALLER,
        )?;
        if written_at < floor {
            temp.as_file().set_modified(floor).with_file_context(
                FileOperation::Write,
                temp.path(),
                "raising artifact mtime to source mtime",
                CALLER,
            )?;
        }
    }

    temp.persist(path).map_err(|e| {
        FileOperationError::new(
            FileOperation::Rename,
            path,
            "moving artifact into place",
            CALLER,
            e.error,
        )
    })?;

    Ok(())
}

/// Async wrapper around [`atomic_write`] that runs on the blocking pool.
pub async fn atomic_write_async(
    path: PathBuf,
    content: Vec<u8>,
    not_older_than: Option<SystemTime>,
) -> Result<(), AssetError> {
    let display_path = path.clone();
    tokio::task::spawn_blocking(move || atomic_write(&path, &content, not_older_than))
        .await
        .map_err(|e| AssetError::BuildTaskFailed {
            path: display_path,
            reason: e.to_string(),
        })?
}
