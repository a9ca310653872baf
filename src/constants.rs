//! Global constants used throughout assetmill.
//!
//! Timeouts, defaults and filesystem modes live here so the magic numbers are easy to
//! find.

use std::time::Duration;

/// Extensions handled when the configuration does not name any.
pub const DEFAULT_EXTENSIONS: &[&str] = &["js"];

/// Permission bits for directories created while provisioning (before umask).
pub const DIRECTORY_MODE: u32 = 0o775;

/// Permission bits for written artifacts (before umask), the same as a plain file create.
pub const ARTIFACT_MODE: u32 = 0o666;

/// Suffix of temporary artifacts written next to their destination.
pub const TEMP_SUFFIX: &str = ".tmp";

/// How long a request waits for another request's build of the same artifact (120 seconds).
///
/// The build itself is never cancelled; only the waiting request gives up.
pub fn default_wait_timeout() -> Duration {
    Duration::from_secs(120)
}

/// Minimum number of concurrent builds the `warm` command runs.
pub const MIN_PARALLELISM: usize = 4;

/// Multiplier applied to the CPU core count for the `warm` command's parallelism.
pub const PARALLELISM_CORE_MULTIPLIER: usize = 2;

/// Default parallelism for `build` and `warm`: twice the available cores, at least
/// [`MIN_PARALLELISM`].
pub fn default_parallelism() -> usize {
    let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    (cores * PARALLELISM_CORE_MULTIPLIER).max(MIN_PARALLELISM)
}
