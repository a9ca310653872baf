//! Request middlewares
//!
//! Both middlewares run in filter-chain style: they do their work for a request, then
//! hand the untouched request to the next stage. A middleware never produces a response
//! itself; an artifact it builds is served by whatever static-file stage comes after it.
//!
//! - [`BuildCacheMiddleware`]: compiles an artifact on demand when it is missing or older
//!   than its source
//! - [`EnsureDirectoryMiddleware`]: only provisions the artifact's destination directories
//!
//! # Error channel
//!
//! [`Middleware::prepare`] reports what happened as an [`Outcome`], or an [`AssetError`].
//! [`Middleware::process`] turns that into the filter-chain contract: on success the next
//! stage runs, on failure the error is logged and returned *instead of* calling the next
//! stage, so the host can render its own 500 page.
//!
//! # Composition
//!
//! ```rust,no_run
//! use assetmill::config::{BuildConfig, BuildPolicy};
//! use assetmill::core::AssetRequest;
//! use assetmill::middleware::{BuildCacheMiddleware, Handler, Middleware};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let policy = BuildPolicy::new(&BuildConfig::new("assets", "public"), None)?;
//! let app = BuildCacheMiddleware::new(policy).wrap(|request: AssetRequest| async move {
//!     // serve request.url from "public"
//!     Ok::<_, anyhow::Error>(request.url)
//! });
//!
//! let served = app.handle(AssetRequest::get("/js/app.js")).await?;
//! # Ok(())
//! # }
//! ```

pub mod build;
pub mod ensure_dir;

pub use build::BuildCacheMiddleware;
pub use ensure_dir::EnsureDirectoryMiddleware;

use crate::core::{AssetError, AssetRequest};
use serde::Serialize;
use std::future::Future;

/// The next stage of the pipeline.
pub trait Handler: Send + Sync {
    /// What the stage produces for a request.
    type Response: Send;

    /// Handle `request`.
    fn handle(
        &self,
        request: AssetRequest,
    ) -> impl Future<Output = anyhow::Result<Self::Response>> + Send;
}

impl<F, Fut, R> Handler for F
where
    F: Fn(AssetRequest) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<R>> + Send,
    R: Send,
{
    type Response = R;

    fn handle(&self, request: AssetRequest) -> impl Future<Output = anyhow::Result<R>> + Send {
        self(request)
    }
}

/// A pipeline stage that acts on a request before passing it on.
pub trait Middleware: Send + Sync {
    /// Do this middleware's work for `request` without calling the next stage.
    fn prepare(
        &self,
        request: &AssetRequest,
    ) -> impl Future<Output = Result<Outcome, AssetError>> + Send;

    /// Run [`prepare`](Middleware::prepare), then `next` on success.
    ///
    /// On failure `next` is not called and the error is returned.
    fn process<H: Handler>(
        &self,
        request: AssetRequest,
        next: &H,
    ) -> impl Future<Output = anyhow::Result<H::Response>> + Send {
        async move {
            let prepared = self.prepare(&request).await;
            match prepared {
                Ok(_) => next.handle(request).await,
                Err(e) => {
                    tracing::error!(
                        target: "assetmill::build",
                        "{} {} failed: {e:#}",
                        request.method,
                        request.url
                    );
                    Err(e.into())
                }
            }
        }
    }

    /// Put this middleware in front of `next`, producing a new [`Handler`].
    fn wrap<H: Handler>(self, next: H) -> Stacked<Self, H>
    where
        Self: Sized,
    {
        Stacked {
            middleware: self,
            next,
        }
    }
}

/// A middleware in front of a handler; itself a [`Handler`], so stacks nest.
#[derive(Debug, Clone)]
pub struct Stacked<M, H> {
    middleware: M,
    next: H,
}

impl<M, H> Stacked<M, H> {
    /// The outer middleware.
    pub fn middleware(&self) -> &M {
        &self.middleware
    }
}

impl<M: Middleware, H: Handler> Handler for Stacked<M, H> {
    type Response = H::Response;

    fn handle(
        &self,
        request: AssetRequest,
    ) -> impl Future<Output = anyhow::Result<H::Response>> + Send {
        self.middleware.process(request, &self.next)
    }
}

/// What a middleware did for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing to do; the request continues unchanged.
    PassThrough(PassReason),
    /// The artifact was already at least as new as its source.
    Fresh,
    /// This request compiled and wrote the artifact.
    Built,
    /// Another request built the artifact while this one waited.
    Coalesced,
    /// The artifact's destination directories were provisioned.
    Provisioned,
}

/// Why a request was passed through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassReason {
    /// The request's extension is not configured.
    ExtensionNotMatched,
    /// The request path would leave the configured roots.
    UnsafePath,
    /// There is no source for the request (a later stage answers 404).
    SourceMissing,
}

/// Read-only freshness report for a request, see [`BuildCacheMiddleware::inspect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssetStatus {
    /// The request is not something the build cache handles.
    Ignored,
    /// No source exists for the request.
    MissingSource,
    /// The artifact exists and is at least as new as its source.
    Fresh,
    /// The artifact is missing or older than its source.
    Stale,
}

impl std::fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AssetStatus::Ignored => "ignored",
            AssetStatus::MissingSource => "missing-source",
            AssetStatus::Fresh => "fresh",
            AssetStatus::Stale => "stale",
        };
        f.write_str(label)
    }
}
