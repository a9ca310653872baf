//! `build` and `warm` commands.

use crate::cli::CommandContext;
use crate::config::BuildPolicy;
use crate::constants::default_parallelism;
use crate::core::{AssetRequest, resolve};
use crate::middleware::{BuildCacheMiddleware, Middleware, Outcome, PassReason};
use anyhow::{Context, Result, bail};
use clap::Args;
use colored::Colorize;
use futures::stream::{self, StreamExt};
use std::path::Path;
use walkdir::WalkDir;

/// Build artifacts for the given request paths.
#[derive(Args, Debug)]
pub struct BuildCommand {
    /// Request paths, e.g. `/js/app.js` (query strings are ignored).
    #[arg(required = true)]
    paths: Vec<String>,

    /// Maximum number of concurrent builds [default: 2 x CPU cores, at least 4].
    #[arg(short, long)]
    jobs: Option<usize>,
}

impl BuildCommand {
    /// Run the command.
    pub async fn execute(self, context: &CommandContext) -> Result<()> {
        let middleware = middleware(context)?;
        let summary = run_requests(&middleware, self.paths, self.jobs, context.quiet).await;
        summary.finish(context.quiet)
    }
}

/// Build every matching file under the source root.
#[derive(Args, Debug)]
pub struct WarmCommand {
    /// Maximum number of concurrent builds [default: 2 x CPU cores, at least 4].
    #[arg(short, long)]
    jobs: Option<usize>,
}

impl WarmCommand {
    /// Run the command.
    pub async fn execute(self, context: &CommandContext) -> Result<()> {
        let middleware = middleware(context)?;
        let paths = discover_sources(&middleware)?;

        if paths.is_empty() && !context.quiet {
            println!("{}", "No matching source files found".yellow());
        }

        let summary = run_requests(&middleware, paths, self.jobs, context.quiet).await;
        summary.finish(context.quiet)
    }
}

fn middleware(context: &CommandContext) -> Result<BuildCacheMiddleware> {
    let policy = BuildPolicy::new(&context.config, None)?;
    Ok(BuildCacheMiddleware::new(policy))
}

/// Request paths (`/rel/path.ext`) of every source file with a matching extension.
fn discover_sources(middleware: &BuildCacheMiddleware) -> Result<Vec<String>> {
    let root = middleware.policy().source_root();
    if !root.is_dir() {
        bail!("Source root {} is not a directory", root.display());
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(request_path) = request_path(root, entry.path()) else {
            continue;
        };
        if middleware.policy().matches_extension(resolve(&request_path).extension) {
            paths.push(request_path);
        }
    }
    Ok(paths)
}

fn request_path(root: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(root).ok()?;
    let segments: Vec<&str> =
        relative.components().map(|c| c.as_os_str().to_str()).collect::<Option<_>>()?;
    Some(format!("/{}", segments.join("/")))
}

/// Tally of a batch of requests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    /// Artifacts compiled by this run.
    pub built: usize,
    /// Artifacts that were already fresh (including ones built by a concurrent request).
    pub fresh: usize,
    /// Requests with no source, an unmatched extension or an unsafe path.
    pub skipped: usize,
    /// Requests that failed, with their error messages.
    pub failures: Vec<(String, String)>,
}

impl BuildSummary {
    fn record(&mut self, path: &str, result: &Result<Outcome, crate::core::AssetError>) {
        match result {
            Ok(Outcome::Built) => self.built += 1,
            Ok(Outcome::Fresh | Outcome::Coalesced) => self.fresh += 1,
            Ok(Outcome::PassThrough(_) | Outcome::Provisioned) => self.skipped += 1,
            Err(e) => self.failures.push((path.to_string(), format!("{e:#}"))),
        }
    }

    fn finish(self, quiet: bool) -> Result<()> {
        if !quiet {
            println!(
                "{} built, {} fresh, {} skipped, {} failed",
                self.built.to_string().green(),
                self.fresh,
                self.skipped,
                if self.failures.is_empty() {
                    "0".normal()
                } else {
                    self.failures.len().to_string().red()
                }
            );
        }

        if self.failures.is_empty() {
            Ok(())
        } else {
            let total = self.built + self.fresh + self.skipped + self.failures.len();
            let details: Vec<String> =
                self.failures.iter().map(|(path, error)| format!("  {path}: {error}")).collect();
            bail!("{} of {} builds failed:\n{}", self.failures.len(), total, details.join("\n"))
        }
    }
}

/// Run the middleware for every path with bounded concurrency.
pub async fn run_requests(
    middleware: &BuildCacheMiddleware,
    paths: Vec<String>,
    jobs: Option<usize>,
    quiet: bool,
) -> BuildSummary {
    let jobs = jobs.unwrap_or_else(default_parallelism).max(1);

    let results: Vec<(String, Result<Outcome, crate::core::AssetError>)> = stream::iter(paths)
        .map(|path| async move {
            let result = middleware.prepare(&AssetRequest::get(path.as_str())).await;
            (path, result)
        })
        .buffer_unordered(jobs)
        .collect()
        .await;

    let mut summary = BuildSummary::default();
    for (path, result) in &results {
        if !quiet {
            print_result(path, result);
        }
        summary.record(path, result);
    }
    summary
}

fn print_result(path: &str, result: &Result<Outcome, crate::core::AssetError>) {
    match result {
        Ok(Outcome::Built) => println!("{} {path}", "built  ".green()),
        Ok(Outcome::Fresh) => println!("{} {path}", "fresh  ".dimmed()),
        Ok(Outcome::Coalesced) => println!("{} {path} (built concurrently)", "fresh  ".dimmed()),
        Ok(Outcome::PassThrough(PassReason::SourceMissing)) => {
            println!("{} {path} (no source)", "skipped".yellow());
        }
        Ok(Outcome::PassThrough(PassReason::ExtensionNotMatched)) => {
            println!("{} {path} (extension not configured)", "skipped".yellow());
        }
        Ok(Outcome::PassThrough(PassReason::UnsafePath)) => {
            println!("{} {path} (path leaves the asset roots)", "skipped".yellow());
        }
        Ok(Outcome::Provisioned) => println!("{} {path}", "ok     ".normal()),
        Err(e) => eprintln!("{} {path}: {e}", "failed ".red().bold()),
    }
}
