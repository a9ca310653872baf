//! Directory-only provisioning middleware.
//!
//! Some pipelines produce artifacts in a later stage (a bundler, a response hook) and only
//! need the destination directory to exist when they run. This middleware provisions
//! `dest_root/<dirs of path>` for matching requests and does nothing else.
//!
//! When a source root is configured, provisioning is gated on the matching *source
//! directory* existing, so requests for paths that have no source tree do not litter the
//! destination with empty directories.

use crate::config::DirectoryPolicy;
use crate::core::file_error::metadata_if_exists;
use crate::core::{AssetError, AssetRequest};
use crate::middleware::{Middleware, Outcome, PassReason};
use crate::utils::fs::ensure_directories;
use crate::utils::path_validation::{is_safe_relative, join_under};
use std::sync::Arc;

/// Creates destination directories on demand.
#[derive(Debug, Clone)]
pub struct EnsureDirectoryMiddleware {
    policy: Arc<DirectoryPolicy>,
}

impl EnsureDirectoryMiddleware {
    /// Create the middleware.
    pub fn new(policy: DirectoryPolicy) -> Self {
        Self {
            policy: Arc::new(policy),
        }
    }

    async fn provision(&self, request: &AssetRequest) -> Result<Outcome, AssetError> {
        let resolved = request.resolve();
        if !self.policy.matches_extension(resolved.extension) {
            return Ok(Outcome::PassThrough(PassReason::ExtensionNotMatched));
        }

        let relative = resolved.relative();
        if !is_safe_relative(relative) {
            return Ok(Outcome::PassThrough(PassReason::UnsafePath));
        }

        if let Some(source_root) = self.policy.source_root() {
            let parent = relative.rsplit_once('/').map_or("", |(dir, _)| dir);
            let Some(source_dir) = join_under(source_root, parent) else {
                return Ok(Outcome::PassThrough(PassReason::UnsafePath));
            };

            let exists = metadata_if_exists(&source_dir, "checking source directory", "ensure_dir")
                .await?
                .is_some_and(|m| m.is_dir());
            if !exists {
                tracing::debug!(
                    target: "assetmill::provision",
                    "source directory not found: {}",
                    source_dir.display()
                );
                return Ok(Outcome::PassThrough(PassReason::SourceMissing));
            }
        }

        ensure_directories(self.policy.dest_root(), relative).await?;

        if self.policy.debug() {
            tracing::debug!(
                target: "assetmill::provision",
                "provisioned directories for {}",
                resolved.bare
            );
        }
        Ok(Outcome::Provisioned)
    }
}

impl Middleware for EnsureDirectoryMiddleware {
    async fn prepare(&self, request: &AssetRequest) -> Result<Outcome, AssetError> {
        self.provision(request).await
    }
}
