//! Directory provisioning for artifact writes.
//!
//! [`ensure_directories`] walks a request path below a base directory and creates every
//! intermediate directory that is missing. It is the only place in the crate where a
//! concurrent race is tolerated rather than serialized: two requests provisioning
//! `a/b/c/x.js` and `a/b/d/y.js` may both try to create `a/b`, and the loser simply
//! carries on.

use crate::core::AssetError;
use crate::core::file_error::{FileOperation, FileOperationError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const CALLER: &str = "provisioner";

/// Loop state for one provisioning call.
///
/// `current` is the directory about to be ensured; `remaining` holds the directory
/// segments still below it. The file segment is never part of `remaining`.
#[derive(Debug)]
struct DirectoryCreationTask<'a> {
    current: PathBuf,
    remaining: std::vec::IntoIter<&'a str>,
}

impl<'a> DirectoryCreationTask<'a> {
    fn new(base: &Path, relative: &'a str) -> Result<Self, AssetError> {
        let mut segments: Vec<&str> =
            relative.split('/').filter(|s| !s.is_empty() && *s != ".").collect();

        if let Some(bad) = segments.iter().find(|s| **s == ".." || s.contains('\\')) {
            return Err(AssetError::InvalidPath {
                path: relative.to_string(),
                reason: format!("segment '{bad}' would leave the base directory"),
            });
        }

        // The last segment names the file itself
        segments.pop();

        Ok(Self {
            current: base.to_path_buf(),
            remaining: segments.into_iter(),
        })
    }

    fn advance(&mut self) -> bool {
        match self.remaining.next() {
            Some(segment) => {
                self.current.push(segment);
                true
            }
            None => false,
        }
    }
}

/// Ensures `base` and every directory named by `relative` (except its final, file
/// segment) exists.
///
/// `relative` is a `/`-separated request path; leading, doubled and `.` segments are
/// ignored.
///
/// # Errors
///
/// - [`AssetError::NotADirectory`] if an existing component is not a directory
/// - [`AssetError::InvalidPath`] if `relative` contains a `..` segment
/// - [`AssetError::FileOperation`] for any other stat or creation failure
///
/// # Examples
///
/// ```rust,no_run
/// use assetmill::utils::fs::ensure_directories;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), assetmill::core::AssetError> {
/// // Creates /srv/cache, /srv/cache/js and /srv/cache/js/vendor
/// ensure_directories(Path::new("/srv/cache"), "/js/vendor/jquery.js").await?;
/// # Ok(())
/// # }
/// ```
pub async fn ensure_directories(base: &Path, relative: &str) -> Result<(), AssetError> {
    let mut task = DirectoryCreationTask::new(base, relative)?;

    loop {
        ensure_one(&task.current).await?;
        if !task.advance() {
            return Ok(());
        }
    }
}

/// Ensure a single directory, treating a lost creation race as success.
async fn ensure_one(dir: &Path) -> Result<(), AssetError> {
    match tokio::fs::metadata(dir).await {
        Ok(metadata) if metadata.is_dir() => return Ok(()),
        Ok(_) => {
            return Err(AssetError::NotADirectory {
                path: dir.to_path_buf(),
            });
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            return Err(FileOperationError::new(
                FileOperation::Metadata,
                dir,
                "provisioning destination directory",
                CALLER,
                e,
            )
            .into());
        }
    }

    match create_dir(dir).await {
        Ok(()) => {
            tracing::trace!(target: "assetmill::provision", "created {}", dir.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            // Someone else won the race; make sure they created a directory
            match tokio::fs::metadata(dir).await {
                Ok(metadata) if metadata.is_dir() => {
                    tracing::trace!(
                        target: "assetmill::provision",
                        "{} created concurrently",
                        dir.display()
                    );
                    Ok(())
                }
                Ok(_) => Err(AssetError::NotADirectory {
                    path: dir.to_path_buf(),
                }),
                Err(e) => Err(FileOperationError::new(
                    FileOperation::Metadata,
                    dir,
                    "provisioning destination directory",
                    CALLER,
                    e,
                )
                .into()),
            }
        }
        Err(e) => Err(FileOperationError::new(
            FileOperation::CreateDir,
            dir,
            "provisioning destination directory",
            CALLER,
            e,
        )
        .into()),
    }
}

async fn create_dir(dir: &Path) -> std::io::Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    #[cfg(unix)]
    builder.mode(crate::constants::DIRECTORY_MODE);
    builder.create(dir).await
}
