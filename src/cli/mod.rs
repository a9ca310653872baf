//! Command-line interface for assetmill.
//!
//! The binary drives the same [`BuildCacheMiddleware`](crate::middleware::BuildCacheMiddleware)
//! a server would embed, which makes it useful for warming a cache before deploy, for
//! scripting and for debugging why an artifact is (not) being rebuilt.
//!
//! # Available Commands
//!
//! - `build <PATH>...` - run the build cache for request paths, as if they were requested
//! - `status <PATH>...` - report whether each artifact is fresh, without building
//! - `warm` - build every matching file under the source root
//!
//! # Configuration
//!
//! Settings are read from `--config <FILE>` (or `./assetmill.toml` when present) and then
//! overridden by flags:
//!
//! ```bash
//! assetmill --src assets --dest public --ext js,css build /js/app.js /css/site.css
//! assetmill --config deploy/assetmill.toml warm --jobs 16
//! assetmill status --json /js/app.js
//! ```

mod build;
mod status;

use crate::config::BuildConfig;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

pub use build::{BuildCommand, BuildSummary, WarmCommand};
pub use status::StatusCommand;

/// Config file picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "assetmill.toml";

/// Runtime settings derived from global flags.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Tracing filter directive; `None` leaves `RUST_LOG` (or the default) in charge.
    pub log_level: Option<String>,
    /// Suppress per-path output.
    pub quiet: bool,
}

/// Settings handed to every subcommand.
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Merged file and flag configuration.
    pub config: BuildConfig,
    /// Suppress per-path output.
    pub quiet: bool,
}

/// On-demand asset build cache.
#[derive(Parser, Debug)]
#[command(
    name = "assetmill",
    about = "On-demand asset build cache - compile assets only when their sources change",
    version,
    long_about = "assetmill builds derived assets (minified scripts, compiled styles) into a \
                  destination tree that mirrors the source tree, recompiling an artifact only \
                  when its source is newer."
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    command: Commands,

    /// Show debug logging (equivalent to `RUST_LOG=assetmill=debug`).
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only print errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a configuration file (defaults to ./assetmill.toml if present).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Source root, overriding the configuration file.
    #[arg(long, global = true, env = "ASSETMILL_SRC")]
    src: Option<PathBuf>,

    /// Destination root, overriding the configuration file.
    #[arg(long, global = true, env = "ASSETMILL_DEST")]
    dest: Option<PathBuf>,

    /// Extensions to handle, comma separated (e.g. `js,css`).
    #[arg(long = "ext", global = true, value_delimiter = ',')]
    extensions: Vec<String>,

    /// Copy sources verbatim instead of compiling them.
    #[arg(long, global = true)]
    copy: bool,

    /// Log every path decision (use with --verbose).
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build artifacts for request paths.
    Build(BuildCommand),
    /// Show whether artifacts are fresh.
    Status(StatusCommand),
    /// Build every matching source file.
    Warm(WarmCommand),
}

impl Cli {
    /// Execute the parsed command line.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    /// Translate global flags into a [`CliConfig`].
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("assetmill=debug".to_string())
        } else if self.quiet {
            Some("error".to_string())
        } else {
            None
        };

        CliConfig {
            log_level,
            quiet: self.quiet,
        }
    }

    /// Execute with an explicit [`CliConfig`].
    pub async fn execute_with_config(self, cli_config: CliConfig) -> Result<()> {
        init_logging(cli_config.log_level.as_deref());

        let config = self.load_build_config(Path::new(DEFAULT_CONFIG_FILE)).await?;
        tracing::debug!("effective configuration: {config:?}");

        let context = CommandContext {
            config,
            quiet: cli_config.quiet,
        };

        match self.command {
            Commands::Build(cmd) => cmd.execute(&context).await,
            Commands::Status(cmd) => cmd.execute(&context).await,
            Commands::Warm(cmd) => cmd.execute(&context).await,
        }
    }

    /// Load the configuration file (if any) and apply flag overrides.
    ///
    /// `fallback` is used when `--config` was not given and it exists.
    pub async fn load_build_config(&self, fallback: &Path) -> Result<BuildConfig> {
        let mut config = match &self.config {
            Some(path) => BuildConfig::load_from(path).await?,
            None if fallback.is_file() => BuildConfig::load_from(fallback).await?,
            None => BuildConfig::default(),
        };

        if let Some(src) = &self.src {
            config.src = Some(src.clone());
        }
        if let Some(dest) = &self.dest {
            config.dest = Some(dest.clone());
        }
        if !self.extensions.is_empty() {
            config.extensions.clone_from(&self.extensions);
        }
        config.copy |= self.copy;
        config.debug |= self.debug;

        Ok(config)
    }
}

/// Install the global tracing subscriber on stderr.
///
/// `directive` wins over `RUST_LOG`; with neither, only warnings and errors are shown.
fn init_logging(directive: Option<&str>) {
    let filter = match directive {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
