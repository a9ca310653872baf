//! Utilities shared by the middlewares and the CLI
//!
//! - [`fs`] - Directory provisioning and atomic artifact writes
//! - [`path_validation`] - Keeping request-derived paths inside their roots

pub mod fs;
pub mod path_validation;

pub use fs::{atomic_write, atomic_write_async, ensure_directories};
pub use path_validation::{is_safe_relative, join_under};
