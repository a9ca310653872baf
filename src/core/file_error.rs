//! Structured file system errors
//!
//! Every filesystem touch in the build cache records what it was doing, to which path and
//! from which component at the point of failure, so a failed request can be logged with
//! enough context to tell a missing source apart from an unwritable artifact tree.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Filesystem actions the build cache performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperation {
    /// Reading a whole source file
    Read,
    /// Writing (or syncing) a temporary artifact
    Write,
    /// Stat of a source, artifact or directory
    Metadata,
    /// Creating one destination directory
    CreateDir,
    /// Moving a temporary artifact over its destination
    Rename,
}

impl FileOperation {
    /// Verb phrase used in messages.
    pub fn as_str(self) -> &'static str {
        match self {
            FileOperation::Read => "read",
            FileOperation::Write => "write",
            FileOperation::Metadata => "stat",
            FileOperation::CreateDir => "create directory",
            FileOperation::Rename => "rename into place",
        }
    }
}

impl std::fmt::Display for FileOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed filesystem action and where it happened.
#[derive(Error, Debug)]
#[error("Could not {operation} {}", path.display())]
pub struct FileOperationError {
    /// What was attempted
    pub operation: FileOperation,
    /// Path the action was applied to
    pub path: PathBuf,
    /// Short description of the step, e.g. "reading asset source"
    pub purpose: String,
    /// Component that performed it, e.g. "build_cache"
    pub site: String,
    /// The underlying IO error
    #[source]
    pub source: std::io::Error,
}

impl FileOperationError {
    /// Wrap `source` with the action's context.
    pub fn new(
        operation: FileOperation,
        path: impl Into<PathBuf>,
        purpose: impl Into<String>,
        site: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self {
            operation,
            path: path.into(),
            purpose: purpose.into(),
            site: site.into(),
            source,
        }
    }

    /// The kind of the underlying IO error.
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    /// Multi-line explanation for the CLI.
    pub fn user_message(&self) -> String {
        let headline = format!(
            "{} failed on '{}' while {} [{}]",
            self.operation,
            self.path.display(),
            self.purpose,
            self.site
        );

        let hint = match self.kind() {
            ErrorKind::NotFound => {
                "The path disappeared while the request was being handled.".to_string()
            }
            ErrorKind::PermissionDenied => format!(
                "The process is not allowed to access '{}'.",
                self.path.display()
            ),
            ErrorKind::NotADirectory => {
                "A component of the path is a regular file, not a directory.".to_string()
            }
            _ => format!("Underlying error: {}", self.source),
        };

        format!("{headline}\n{hint}")
    }
}

/// Attach [`FileOperationError`] context to an `io::Result`.
pub trait FileResultExt<T> {
    /// Map the error side into a [`FileOperationError`].
    fn with_file_context(
        self,
        operation: FileOperation,
        path: impl Into<PathBuf>,
        purpose: impl Into<String>,
        site: impl Into<String>,
    ) -> Result<T, FileOperationError>;
}

impl<T> FileResultExt<T> for std::io::Result<T> {
    fn with_file_context(
        self,
        operation: FileOperation,
        path: impl Into<PathBuf>,
        purpose: impl Into<String>,
        site: impl Into<String>,
    ) -> Result<T, FileOperationError> {
        self.map_err(|e| FileOperationError::new(operation, path, purpose, site, e))
    }
}

/// Stat a path, mapping "not found" to `None`.
///
/// Every other failure keeps its context so the caller can surface it.
pub async fn metadata_if_exists(
    path: &Path,
    purpose: &str,
    site: &str,
) -> Result<Option<std::fs::Metadata>, FileOperationError> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(FileOperationError::new(FileOperation::Metadata, path, purpose, site, e)),
    }
}
