//! Error handling for assetmill
//!
//! The error system follows two principles:
//! 1. **Strongly-typed errors** ([`AssetError`]) so the host can decide how to react
//!    (for example, turn a transient I/O failure into a 500 response)
//! 2. **User-friendly messages** ([`ErrorContext`]) with actionable suggestions for the CLI
//!
//! # Error Categories
//!
//! - **Configuration**: missing required options, an empty extension set, or a destination
//!   path component that exists but is not a directory. Never retried.
//! - **Transient I/O**: stat/read/write failures other than "not found", compile failures and
//!   wait timeouts. Propagated to the caller's error channel, never swallowed.
//!
//! A failure shared with waiting requests ([`AssetError::InFlightBuildFailed`]) keeps the
//! category of the builder's error.
//!
//! "Not applicable" requests (unmatched extension, absent source) and benign directory
//! creation races are not errors at all and never surface here.

use crate::core::file_error::FileOperationError;
use colored::Colorize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of an [`AssetError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Fatal setup or data error; retrying will not help.
    Configuration,
    /// I/O or build failure for a single request; the host decides the fallback.
    TransientIo,
}

/// The main error type for build cache operations
#[derive(Error, Debug)]
pub enum AssetError {
    /// A required configuration option is missing
    #[error("{component}: requires a '{option}' option to be set")]
    MissingOption {
        /// Component being configured
        component: &'static str,
        /// Name of the missing option
        option: &'static str,
    },

    /// Configuration is present but invalid
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Why the configuration was rejected
        reason: String,
    },

    /// A path component exists but is not a directory
    #[error("{} is not a directory", path.display())]
    NotADirectory {
        /// The offending path
        path: PathBuf,
    },

    /// A relative path could not be provisioned safely
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath {
        /// The rejected path
        path: String,
        /// Why it was rejected
        reason: String,
    },

    /// File system operation failed
    #[error(transparent)]
    FileOperation(#[from] FileOperationError),

    /// The injected compile step failed
    #[error("Failed to compile {}", path.display())]
    CompileFailed {
        /// Source file that was being compiled
        path: PathBuf,
        /// The compile step's own error
        #[source]
        source: anyhow::Error,
    },

    /// The spawned build task panicked or was aborted
    #[error("Build task for {} did not complete: {reason}", path.display())]
    BuildTaskFailed {
        /// Destination being built
        path: PathBuf,
        /// Join failure description
        reason: String,
    },

    /// Another request's build of the same destination failed while this one waited
    #[error("In-flight build of {} failed: {reason}", path.display())]
    InFlightBuildFailed {
        /// Destination that was being built
        path: PathBuf,
        /// The builder's error, with its causes
        reason: String,
        /// Category of the builder's error
        category: ErrorCategory,
    },

    /// Gave up waiting for another request's build of the same destination
    #[error("Timed out after {timeout:?} waiting for in-flight build of {}", path.display())]
    WaitTimeout {
        /// Destination being built by another request
        path: PathBuf,
        /// How long we waited
        timeout: Duration,
    },
}

impl AssetError {
    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            AssetError::MissingOption { .. }
            | AssetError::InvalidConfig { .. }
            | AssetError::NotADirectory { .. }
            | AssetError::InvalidPath { .. } => ErrorCategory::Configuration,
            AssetError::FileOperation(_)
            | AssetError::CompileFailed { .. }
            | AssetError::BuildTaskFailed { .. }
            | AssetError::WaitTimeout { .. } => ErrorCategory::TransientIo,
            AssetError::InFlightBuildFailed { category, .. } => *category,
        }
    }

    /// Whether this is a configuration/data error.
    pub fn is_configuration(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }

    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        AssetError::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// Error wrapper that adds user-friendly details and suggestions for CLI display
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: anyhow::Error,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details
    #[must_use]
    pub fn new(error: impl Into<anyhow::Error>) -> Self {
        Self {
            error: error.into(),
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors
    pub fn display(&self) {
        eprintln!("{}: {:#}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

/// Convert any error into a user-friendly [`ErrorContext`] with suggestions.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let (suggestion, details) = match error.downcast_ref::<AssetError>() {
        Some(AssetError::MissingOption { option, .. }) => (
            Some(format!("Pass --{option} or set '{option}' in the configuration file")),
            Some("Both the source and destination roots are required before any request is handled".to_string()),
        ),
        Some(AssetError::InvalidConfig { .. }) => {
            (Some("Check the configuration file values".to_string()), None)
        }
        Some(AssetError::NotADirectory { .. }) => (
            Some("Remove or rename the file so the directory can be created".to_string()),
            Some("A file is sitting where the destination tree needs a directory".to_string()),
        ),
        Some(AssetError::FileOperation(file_error)) => (
            Some("Check that the source and destination roots are readable and writable".to_string()),
            Some(file_error.user_message()),
        ),
        Some(AssetError::CompileFailed { .. }) => {
            (Some("Fix the source file so the compile step accepts it".to_string()), None)
        }
        Some(AssetError::InFlightBuildFailed { .. }) => (
            Some("Fix the reported problem; the next request for the file builds it again".to_string()),
            Some("Another request was already building this file and failed".to_string()),
        ),
        Some(AssetError::WaitTimeout { .. }) => (
            Some("Increase wait_timeout_secs or investigate the slow compile step".to_string()),
            None,
        ),
        Some(_) => (None, None),
        None if error.downcast_ref::<toml::de::Error>().is_some() => (
            Some("Check the TOML syntax in your configuration file".to_string()),
            None,
        ),
        None => (None, None),
    };

    let mut context = ErrorContext::new(error);
    if let Some(suggestion) = suggestion {
        context = context.with_suggestion(suggestion);
    }
    if let Some(details) = details {
        context = context.with_details(details);
    }
    context
}
