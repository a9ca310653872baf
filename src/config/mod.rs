//! Configuration for the build cache
//!
//! Configuration comes in two layers:
//!
//! 1. [`BuildConfig`]: the raw, serializable settings as written in `assetmill.toml` or
//!    assembled from CLI flags. Every field is optional or defaulted.
//! 2. [`BuildPolicy`] / [`DirectoryPolicy`]: the validated, immutable values the middlewares
//!    are constructed from. Validation happens once, at startup; a policy never changes
//!    afterwards and is shared behind an [`Arc`].
//!
//! # File format
//!
//! ```toml
//! src = "~/site/assets"
//! dest = "$CACHE_DIR/assets"
//! extensions = ["js", "css"]
//! copy = false
//! debug = true
//! wait_timeout_secs = 60
//! command = ["terser", "--compress", "--mangle"]
//! ```
//!
//! `src` and `dest` support `~` and `$VAR` expansion.
//!
//! # Compile selection
//!
//! In order of precedence:
//! - `copy = true` always produces byte-exact copies
//! - a compile step supplied programmatically to [`BuildPolicy::new`]
//! - `command`, run through [`CommandCompiler`]
//! - otherwise copy-only mode is implied

use crate::compile::{CommandCompiler, Compile, CopyCompiler};
use crate::constants::{DEFAULT_EXTENSIONS, default_wait_timeout};
use crate::core::AssetError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const COMPONENT: &str = "assetmill";

/// Raw build cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// Root of the source tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<PathBuf>,

    /// Root of the artifact tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<PathBuf>,

    /// Extensions (without the dot) the middlewares act on.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Force byte-exact copies even when a compile step is available.
    #[serde(default)]
    pub copy: bool,

    /// Log every path decision at debug level.
    #[serde(default)]
    pub debug: bool,

    /// Seconds a request waits for another request's build of the same artifact.
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,

    /// External compile program and its arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
}

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(ToString::to_string).collect()
}

fn default_wait_timeout_secs() -> u64 {
    default_wait_timeout().as_secs()
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            src: None,
            dest: None,
            extensions: default_extensions(),
            copy: false,
            debug: false,
            wait_timeout_secs: default_wait_timeout_secs(),
            command: None,
        }
    }
}

impl BuildConfig {
    /// Config with both roots set and everything else defaulted.
    pub fn new(src: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        Self {
            src: Some(src.into()),
            dest: Some(dest.into()),
            ..Self::default()
        }
    }

    /// Load a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, has unknown keys,
    /// or references an undefined environment variable in `src`/`dest`.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Parse a configuration from TOML text, expanding `src` and `dest`.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        config.src = config.src.as_deref().map(expand_path).transpose()?;
        config.dest = config.dest.as_deref().map(expand_path).transpose()?;
        Ok(config)
    }

    /// Wait timeout as a [`Duration`].
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }
}

/// Expand `~` and `$VAR` in a configured path.
fn expand_path(path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw)
        .with_context(|| format!("Failed to expand variables in path '{raw}'"))?;
    Ok(PathBuf::from(expanded.into_owned()))
}

/// Normalize and validate a configured extension list.
///
/// A leading `.` is accepted and stripped. Matching is exact and case-sensitive.
fn normalize_extensions(extensions: &[String]) -> Result<BTreeSet<String>, AssetError> {
    let mut normalized = BTreeSet::new();
    for raw in extensions {
        let ext = raw.strip_prefix('.').unwrap_or(raw);
        if ext.is_empty() {
            return Err(AssetError::invalid_config("extensions must not contain empty entries"));
        }
        if ext.contains(['/', '\\', '?', '#']) {
            return Err(AssetError::invalid_config(format!(
                "extension '{raw}' contains a path or query character"
            )));
        }
        normalized.insert(ext.to_string());
    }

    if normalized.is_empty() {
        return Err(AssetError::invalid_config("at least one extension must be configured"));
    }
    Ok(normalized)
}

/// Validated, immutable settings for [`BuildCacheMiddleware`].
///
/// Invariants: `extensions` is never empty, and `copy_only` is true whenever the compile
/// step is the identity.
///
/// [`BuildCacheMiddleware`]: crate::middleware::BuildCacheMiddleware
#[derive(Clone)]
pub struct BuildPolicy {
    source_root: PathBuf,
    dest_root: PathBuf,
    extensions: BTreeSet<String>,
    compile: Arc<dyn Compile>,
    copy_only: bool,
    debug: bool,
    wait_timeout: Duration,
}

impl BuildPolicy {
    /// Validate `config` and freeze it, optionally with a programmatic compile step.
    ///
    /// # Errors
    ///
    /// - [`AssetError::MissingOption`] when `src` or `dest` is absent
    /// - [`AssetError::InvalidConfig`] for an empty or malformed extension list, or an empty
    ///   `command`
    pub fn new(config: &BuildConfig, compile: Option<Arc<dyn Compile>>) -> Result<Self, AssetError> {
        let source_root = config.src.clone().ok_or(AssetError::MissingOption {
            component: COMPONENT,
            option: "src",
        })?;
        let dest_root = config.dest.clone().ok_or(AssetError::MissingOption {
            component: COMPONENT,
            option: "dest",
        })?;
        let extensions = normalize_extensions(&config.extensions)?;

        let (compile, copy_only): (Arc<dyn Compile>, bool) = if config.copy {
            (Arc::new(CopyCompiler), true)
        } else if let Some(compile) = compile {
            (compile, false)
        } else if let Some(argv) = &config.command {
            let command = CommandCompiler::from_argv(argv)
                .map_err(|e| AssetError::invalid_config(e.to_string()))?;
            (Arc::new(command), false)
        } else {
            (Arc::new(CopyCompiler), true)
        };

        Ok(Self {
            source_root,
            dest_root,
            extensions,
            compile,
            copy_only,
            debug: config.debug,
            wait_timeout: config.wait_timeout(),
        })
    }

    /// Root of the source tree.
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Root of the artifact tree.
    pub fn dest_root(&self) -> &Path {
        &self.dest_root
    }

    /// The matched extensions, without dots.
    pub fn extensions(&self) -> &BTreeSet<String> {
        &self.extensions
    }

    /// Whether `extension` (without the dot) is handled.
    pub fn matches_extension(&self, extension: &str) -> bool {
        self.extensions.contains(extension)
    }

    /// The compile step.
    pub fn compile(&self) -> &Arc<dyn Compile> {
        &self.compile
    }

    /// Whether artifacts are byte-exact copies of their sources.
    pub fn copy_only(&self) -> bool {
        self.copy_only
    }

    /// Whether per-request path decisions are logged.
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// How long a request waits on another request's build.
    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }
}

impl fmt::Debug for BuildPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildPolicy")
            .field("source_root", &self.source_root)
            .field("dest_root", &self.dest_root)
            .field("extensions", &self.extensions)
            .field("copy_only", &self.copy_only)
            .field("debug", &self.debug)
            .field("wait_timeout", &self.wait_timeout)
            .finish_non_exhaustive()
    }
}

/// Validated settings for [`EnsureDirectoryMiddleware`].
///
/// Unlike [`BuildPolicy`], the source root is optional: without one, directories are
/// provisioned for every matching request.
///
/// [`EnsureDirectoryMiddleware`]: crate::middleware::EnsureDirectoryMiddleware
#[derive(Debug, Clone)]
pub struct DirectoryPolicy {
    source_root: Option<PathBuf>,
    dest_root: PathBuf,
    extensions: BTreeSet<String>,
    debug: bool,
}

impl DirectoryPolicy {
    /// Validate `config`. Only `dest` is required.
    pub fn new(config: &BuildConfig) -> Result<Self, AssetError> {
        let dest_root = config.dest.clone().ok_or(AssetError::MissingOption {
            component: COMPONENT,
            option: "dest",
        })?;

        Ok(Self {
            source_root: config.src.clone(),
            dest_root,
            extensions: normalize_extensions(&config.extensions)?,
            debug: config.debug,
        })
    }

    /// Root of the source tree, if directory creation is gated on it.
    pub fn source_root(&self) -> Option<&Path> {
        self.source_root.as_deref()
    }

    /// Root of the artifact tree.
    pub fn dest_root(&self) -> &Path {
        &self.dest_root
    }

    /// Whether `extension` (without the dot) is handled.
    pub fn matches_extension(&self, extension: &str) -> bool {
        self.extensions.contains(extension)
    }

    /// Whether per-request path decisions are logged.
    pub fn debug(&self) -> bool {
        self.debug
    }
}
