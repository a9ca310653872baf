//! Core types for assetmill
//!
//! # Modules
//!
//! - `error`: [`AssetError`], its [`ErrorCategory`], and the CLI-facing [`ErrorContext`] /
//!   [`user_friendly_error`] pair
//! - [`file_error`]: structured context for failed filesystem operations
//! - [`request`]: the [`AssetRequest`] model and request-path resolution
//!
//! # Error Handling Pattern
//!
//! Library code returns `Result<_, AssetError>` so callers can match on the failure; the
//! binary and config loading work in `anyhow` and convert at the edge:
//!
//! ```rust
//! use assetmill::core::{AssetError, ErrorCategory, user_friendly_error};
//!
//! let error = AssetError::MissingOption { component: "assetmill", option: "src" };
//! assert_eq!(error.category(), ErrorCategory::Configuration);
//!
//! let friendly = user_friendly_error(error.into());
//! assert!(friendly.suggestion.is_some());
//! ```

pub mod error;
pub mod file_error;
pub mod request;

pub use error::{AssetError, ErrorCategory, ErrorContext, user_friendly_error};
pub use file_error::{FileOperation, FileOperationError, FileResultExt};
pub use request::{AssetRequest, ResolvedPath, resolve};
