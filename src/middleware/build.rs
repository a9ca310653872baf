//! On-demand build cache middleware.
//!
//! For every request whose extension is configured, the middleware makes sure
//! `dest_root/<path>` exists and is at least as new as `source_root/<path>` before the
//! request moves on. A missing or stale artifact is compiled from its source, its
//! directories are provisioned, and it is written atomically.
//!
//! # Request flow
//!
//! 1. Resolve the path; an unmatched extension passes through with no I/O at all
//! 2. Stat the source; if there is none, pass through (a later stage answers 404)
//! 3. Stat the destination and compare modification times
//! 4. Fresh: done. Stale: claim the destination in the [`BuildRegistry`]
//! 5. As the builder: re-check freshness, then compile, provision and write on a spawned
//!    task. As a waiter: wait for the builder, return its failure if it failed, otherwise
//!    go back to step 2
//!
//! The spawned task owns the registry guard, so a request that is dropped mid-build
//! (client disconnect) never leaves waiters hanging or a half-finished artifact behind.

use crate::cache::{
    BuildRegistry, DestinationDescriptor, Slot, SourceDescriptor, is_stale, stat_destination,
    stat_source,
};
use crate::config::BuildPolicy;
use crate::core::file_error::{FileOperation, FileResultExt};
use crate::core::{AssetError, AssetRequest};
use crate::middleware::{AssetStatus, Middleware, Outcome, PassReason};
use crate::utils::fs::{atomic_write_async, ensure_directories};
use crate::utils::path_validation::join_under;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

const CALLER: &str = "build_cache";

/// Source and destination paths for a request that passed the extension and safety checks.
#[derive(Debug)]
struct Target {
    relative: String,
    source: PathBuf,
    destination: PathBuf,
}

/// Builds artifacts on demand and caches them on disk.
///
/// Cloning is cheap; clones share the policy and the in-flight build registry.
#[derive(Debug, Clone)]
pub struct BuildCacheMiddleware {
    policy: Arc<BuildPolicy>,
    registry: BuildRegistry,
}

impl BuildCacheMiddleware {
    /// Create a middleware with its own build registry.
    pub fn new(policy: BuildPolicy) -> Self {
        Self {
            policy: Arc::new(policy),
            registry: BuildRegistry::new(),
        }
    }

    /// The policy this middleware was built with.
    pub fn policy(&self) -> &BuildPolicy {
        &self.policy
    }

    /// The in-flight build registry.
    pub fn registry(&self) -> &BuildRegistry {
        &self.registry
    }

    /// Report whether the artifact for `request` is fresh, without building anything.
    ///
    /// # Errors
    ///
    /// Any stat failure other than "not found".
    pub async fn inspect(&self, request: &AssetRequest) -> Result<AssetStatus, AssetError> {
        let Ok(target) = self.target(request) else {
            return Ok(AssetStatus::Ignored);
        };
        let Some(source) = stat_source(&target.source).await? else {
            return Ok(AssetStatus::MissingSource);
        };
        let destination = stat_destination(&target.destination).await?;

        Ok(if is_stale(&source, &destination) {
            AssetStatus::Stale
        } else {
            AssetStatus::Fresh
        })
    }

    /// Resolve a request into its source and destination, or say why it is skipped.
    fn target(&self, request: &AssetRequest) -> Result<Target, PassReason> {
        let resolved = request.resolve();
        if !self.policy.matches_extension(resolved.extension) {
            return Err(PassReason::ExtensionNotMatched);
        }

        let relative = resolved.relative();
        match (
            join_under(self.policy.source_root(), relative),
            join_under(self.policy.dest_root(), relative),
        ) {
            (Some(source), Some(destination)) => Ok(Target {
                relative: relative.to_string(),
                source,
                destination,
            }),
            _ => Err(PassReason::UnsafePath),
        }
    }

    /// Stat both sides. `None` means there is no source.
    async fn observe(
        &self,
        target: &Target,
    ) -> Result<Option<(SourceDescriptor, DestinationDescriptor)>, AssetError> {
        let Some(source) = stat_source(&target.source).await? else {
            tracing::debug!(
                target: "assetmill::build",
                "source not found: {}",
                target.source.display()
            );
            return Ok(None);
        };
        let destination = stat_destination(&target.destination).await?;
        Ok(Some((source, destination)))
    }

    async fn build_request(&self, request: &AssetRequest) -> Result<Outcome, AssetError> {
        let target = match self.target(request) {
            Ok(target) => target,
            Err(reason) => {
                if self.policy.debug() {
                    tracing::debug!(
                        target: "assetmill::build",
                        "skipping {}: {reason:?}",
                        request.url
                    );
                }
                return Ok(Outcome::PassThrough(reason));
            }
        };

        let mut waited = false;
        loop {
            let Some((source, destination)) = self.observe(&target).await? else {
                return Ok(Outcome::PassThrough(PassReason::SourceMissing));
            };
            if !is_stale(&source, &destination) {
                return Ok(self.up_to_date(&target, waited));
            }

            if self.policy.debug() {
                tracing::debug!(
                    target: "assetmill::build",
                    "{} is stale (source {:?}, artifact {:?})",
                    target.destination.display(),
                    source.modified_at,
                    destination.modified_at
                );
            }

            match self.registry.claim(&target.destination, self.policy.wait_timeout()).await? {
                Slot::Waited => {
                    waited = true;
                }
                Slot::Builder(guard) => {
                    // A build may have finished between our stat and the claim
                    let Some((source, destination)) = self.observe(&target).await? else {
                        return Ok(Outcome::PassThrough(PassReason::SourceMissing));
                    };
                    if !is_stale(&source, &destination) {
                        return Ok(self.up_to_date(&target, waited));
                    }

                    self.spawn_build(guard, source, target).await?;
                    return Ok(Outcome::Built);
                }
            }
        }
    }

    fn up_to_date(&self, target: &Target, waited: bool) -> Outcome {
        if self.policy.debug() {
            tracing::debug!(
                target: "assetmill::build",
                "{} is fresh",
                target.destination.display()
            );
        }
        if waited { Outcome::Coalesced } else { Outcome::Fresh }
    }

    /// Run the build on its own task and wait for it.
    ///
    /// The task owns `guard`; it is released (and waiters woken) when the task ends, even
    /// if this future has been dropped by then. A failure is recorded on the guard first
    /// so the woken waiters return it instead of compiling again.
    async fn spawn_build(
        &self,
        guard: crate::cache::BuildGuard,
        source: SourceDescriptor,
        target: Target,
    ) -> Result<(), AssetError> {
        let policy = Arc::clone(&self.policy);
        let destination = target.destination.clone();

        let task = tokio::spawn(async move {
            let result = build_artifact(&policy, &source, &target).await;
            if let Err(error) = &result {
                guard.fail(error);
            }
            drop(guard);
            result
        });

        task.await.map_err(|e| AssetError::BuildTaskFailed {
            path: destination,
            reason: e.to_string(),
        })?
    }
}

impl Middleware for BuildCacheMiddleware {
    async fn prepare(&self, request: &AssetRequest) -> Result<Outcome, AssetError> {
        self.build_request(request).await
    }
}

/// Read, compile, provision, write.
async fn build_artifact(
    policy: &BuildPolicy,
    source: &SourceDescriptor,
    target: &Target,
) -> Result<(), AssetError> {
    let started = Instant::now();

    let bytes = tokio::fs::read(&source.absolute_path).await.with_file_context(
        FileOperation::Read,
        &source.absolute_path,
        "reading asset source",
        CALLER,
    )?;
    let input_len = bytes.len();

    let output = if policy.copy_only() {
        bytes
    } else {
        compile_blocking(policy, bytes, &source.absolute_path, &target.destination).await?
    };

    ensure_directories(policy.dest_root(), &target.relative).await?;
    let output_len = output.len();
    atomic_write_async(target.destination.clone(), output, Some(source.modified_at)).await?;

    tracing::info!(
        target: "assetmill::build",
        "built {} ({} -> {} bytes) in {:?}",
        target.relative,
        input_len,
        output_len,
        started.elapsed()
    );
    Ok(())
}

async fn compile_blocking(
    policy: &BuildPolicy,
    bytes: Vec<u8>,
    source_path: &Path,
    destination: &Path,
) -> Result<Vec<u8>, AssetError> {
    let compile = Arc::clone(policy.compile());

    tokio::task::spawn_blocking(move || compile.compile(&bytes))
        .await
        .map_err(|e| AssetError::BuildTaskFailed {
            path: destination.to_path_buf(),
            reason: e.to_string(),
        })?
        .map_err(|source| AssetError::CompileFailed {
            path: source_path.to_path_buf(),
            source,
        })
}
