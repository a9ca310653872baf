//! File system utilities for the build cache
//!
//! - **Provisioning**: [`ensure_directories`] creates the directories an artifact needs,
//!   tolerating concurrent creation of shared prefixes
//! - **Atomic writes**: [`atomic_write`] writes artifacts via temp-and-rename so readers
//!   never observe partial content

pub mod atomic;
pub mod dirs;

pub use atomic::{atomic_write, atomic_write_async};
pub use dirs::ensure_directories;
