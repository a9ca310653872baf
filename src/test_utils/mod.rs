//! Test utilities for assetmill
//!
//! Shared fixtures for unit, integration and stress tests:
//! - [`init_test_logging`]: one-time tracing setup that plays well with the test harness
//! - [`AssetTree`]: a temporary source/destination pair with helpers for writing sources,
//!   reading artifacts and forcing modification times
//! - [`CountingCompiler`]: a [`Compile`] implementation that counts invocations and can be
//!   slowed down or made to fail
//!
//! # Example
//!
//! ```rust,no_run
//! use assetmill::config::BuildPolicy;
//! use assetmill::middleware::BuildCacheMiddleware;
//! use assetmill::test_utils::{AssetTree, CountingCompiler};
//!
//! let tree = AssetTree::new();
//! tree.write_source("js/app.js", "var a;");
//! let compiler = CountingCompiler::uppercase();
//! let policy = BuildPolicy::new(&tree.config(), Some(compiler.as_compile())).unwrap();
//! let middleware = BuildCacheMiddleware::new(policy);
//! ```

use crate::compile::Compile;
use crate::config::BuildConfig;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has any effect. Uses `level` if given, otherwise `RUST_LOG`; with
/// neither, tests run silently.
///
/// ```bash
/// RUST_LOG=assetmill=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

/// A temporary `src/` + `dest/` pair.
///
/// Only `src/` is created up front; `dest/` is left for the code under test to provision.
/// Everything is removed when the tree is dropped.
#[derive(Debug)]
pub struct AssetTree {
    _temp: TempDir,
    source_root: PathBuf,
    dest_root: PathBuf,
}

impl Default for AssetTree {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetTree {
    /// Create a fresh tree.
    pub fn new() -> Self {
        let temp = TempDir::new().expect("failed to create temp dir");
        let source_root = temp.path().join("src");
        let dest_root = temp.path().join("dest");
        std::fs::create_dir(&source_root).expect("failed to create source root");

        Self {
            _temp: temp,
            source_root,
            dest_root,
        }
    }

    /// Root of the source tree.
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Root of the destination tree (may not exist yet).
    pub fn dest_root(&self) -> &Path {
        &self.dest_root
    }

    /// A config pointing at this tree, everything else defaulted.
    pub fn config(&self) -> BuildConfig {
        BuildConfig::new(&self.source_root, &self.dest_root)
    }

    /// Absolute path of a source file.
    pub fn source_path(&self, relative: &str) -> PathBuf {
        self.source_root.join(relative)
    }

    /// Absolute path of an artifact.
    pub fn artifact_path(&self, relative: &str) -> PathBuf {
        self.dest_root.join(relative)
    }

    /// Write a source file, creating its directories.
    pub fn write_source(&self, relative: &str, content: impl AsRef<[u8]>) -> PathBuf {
        write_file(&self.source_path(relative), content.as_ref())
    }

    /// Write an artifact directly, creating its directories.
    pub fn write_artifact(&self, relative: &str, content: impl AsRef<[u8]>) -> PathBuf {
        write_file(&self.artifact_path(relative), content.as_ref())
    }

    /// Read an artifact as UTF-8.
    pub fn read_artifact(&self, relative: &str) -> String {
        std::fs::read_to_string(self.artifact_path(relative)).expect("failed to read artifact")
    }

    /// Read an artifact's raw bytes.
    pub fn read_artifact_bytes(&self, relative: &str) -> Vec<u8> {
        std::fs::read(self.artifact_path(relative)).expect("failed to read artifact")
    }

    /// Whether an artifact exists.
    pub fn artifact_exists(&self, relative: &str) -> bool {
        self.artifact_path(relative).exists()
    }

    /// Force a source file's modification time.
    pub fn set_source_mtime(&self, relative: &str, time: SystemTime) {
        set_mtime(&self.source_path(relative), time);
    }

    /// Force an artifact's modification time.
    pub fn set_artifact_mtime(&self, relative: &str, time: SystemTime) {
        set_mtime(&self.artifact_path(relative), time);
    }

    /// An artifact's modification time.
    pub fn artifact_mtime(&self, relative: &str) -> SystemTime {
        std::fs::metadata(self.artifact_path(relative))
            .and_then(|m| m.modified())
            .expect("failed to stat artifact")
    }

    /// Every regular file below the destination root, as sorted `/`-separated paths.
    pub fn artifact_files(&self) -> Vec<String> {
        if !self.dest_root.exists() {
            return Vec::new();
        }
        let mut files: Vec<String> = walkdir::WalkDir::new(&self.dest_root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                e.path()
                    .strip_prefix(&self.dest_root)
                    .ok()
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
            })
            .collect();
        files.sort();
        files
    }
}

fn write_file(path: &Path, content: &[u8]) -> PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("failed to create parent directories");
    }
    std::fs::write(path, content).expect("failed to write file");
    path.to_path_buf()
}

fn set_mtime(path: &Path, time: SystemTime) {
    std::fs::File::options()
        .write(true)
        .open(path)
        .and_then(|f| f.set_modified(time))
        .expect("failed to set modification time");
}

/// Compile step that counts how often it runs.
///
/// Clones share the counter, so keep one handle for assertions and pass
/// [`as_compile`](CountingCompiler::as_compile) to the policy.
#[derive(Debug, Clone)]
pub struct CountingCompiler {
    calls: Arc<AtomicUsize>,
    failures_left: Arc<AtomicUsize>,
    delay: Duration,
    transform: fn(&[u8]) -> Vec<u8>,
}

impl CountingCompiler {
    /// Upper-cases ASCII, so compiled output is easy to tell from a copy.
    pub fn uppercase() -> Self {
        Self::with_transform(<[u8]>::to_ascii_uppercase)
    }

    /// Returns the source unchanged.
    pub fn identity() -> Self {
        Self::with_transform(<[u8]>::to_vec)
    }

    fn with_transform(transform: fn(&[u8]) -> Vec<u8>) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            failures_left: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
            transform,
        }
    }

    /// Sleep this long in every compile, to widen race windows.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the first `count` compiles.
    #[must_use]
    pub fn failing_first(self, count: usize) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    /// How many times the compile step has run.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// A shareable compile step backed by this counter.
    pub fn as_compile(&self) -> Arc<dyn Compile> {
        Arc::new(self.clone())
    }
}

impl Compile for CountingCompiler {
    fn compile(&self, source: &[u8]) -> anyhow::Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            anyhow::bail!("injected compile failure");
        }

        Ok((self.transform)(source))
    }
}
