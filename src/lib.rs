//! assetmill - on-demand asset build cache
//!
//! assetmill sits in front of a static-file server and makes sure that a requested
//! derived artifact (a minified script, a compiled stylesheet) exists and is at least as
//! new as its source before the request is served. The filesystem is the cache: artifacts
//! live in a destination tree that mirrors the source tree one to one, and modification
//! times decide whether they need rebuilding.
//!
//! # Architecture Overview
//!
//! ```text
//! request ─► resolve path ─► extension matched? ──no──► next stage
//!                                   │yes
//!                            stat source ──absent──► next stage (404 later)
//!                                   │
//!                         stat artifact, compare mtimes ──fresh──► next stage
//!                                   │stale
//!                  claim in BuildRegistry ──in flight──► wait, re-check
//!                                   │builder
//!             compile ─► provision directories ─► atomic write ─► next stage
//! ```
//!
//! Concurrent requests for the same stale artifact collapse into one compile: the first
//! becomes the builder and the rest wait for it, then find the artifact fresh.
//!
//! # Core Modules
//!
//! - [`middleware`] - [`BuildCacheMiddleware`](middleware::BuildCacheMiddleware),
//!   [`EnsureDirectoryMiddleware`](middleware::EnsureDirectoryMiddleware) and the
//!   [`Handler`](middleware::Handler)/[`Middleware`](middleware::Middleware) traits
//! - [`cache`] - freshness checks and the in-flight build registry
//! - [`compile`] - the pluggable compile step
//! - [`config`] - file/CLI configuration and the validated, immutable policies
//! - [`core`] - request model, path resolution and error types
//! - [`utils`] - directory provisioning, atomic writes and path validation
//! - [`cli`] - the `assetmill` command-line interface
//!
//! # Example
//!
//! ```rust,no_run
//! use assetmill::compile::Compile;
//! use assetmill::config::{BuildConfig, BuildPolicy};
//! use assetmill::core::AssetRequest;
//! use assetmill::middleware::{BuildCacheMiddleware, Middleware, Outcome};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let minify: Arc<dyn Compile> = Arc::new(|source: &[u8]| -> anyhow::Result<Vec<u8>> {
//!     Ok(source.iter().copied().filter(|b| !b.is_ascii_whitespace()).collect())
//! });
//! let policy = BuildPolicy::new(&BuildConfig::new("assets", "public"), Some(minify))?;
//! let middleware = BuildCacheMiddleware::new(policy);
//!
//! match middleware.prepare(&AssetRequest::get("/js/app.js?v=3")).await? {
//!     Outcome::Built => println!("compiled"),
//!     Outcome::Fresh | Outcome::Coalesced => println!("cached"),
//!     other => println!("{other:?}"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cli;
pub mod compile;
pub mod config;
pub mod constants;
pub mod core;
pub mod middleware;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
