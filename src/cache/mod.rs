//! Build cache coordination
//!
//! The filesystem is the cache: artifacts live in the destination tree and their
//! modification times say whether they are fresh (see [`freshness`]). The only in-process
//! state is the [`BuildRegistry`], which records destinations that are being built right
//! now so concurrent stale requests collapse into a single compile-and-write.
//!
//! # Coordination
//!
//! ```text
//! Request A: claim("/d/app.js") ──► Builder ── compile ── write ── drop guard ─┐
//!                                                                              │ notify_waiters
//! Request B: claim("/d/app.js") ──► Pending: wait ◄────────────────────────────┘
//!                                   └─► re-check freshness (now fresh, no build)
//!
//! Request C: claim("/d/site.css") ─► Builder (different path, never blocked)
//! ```
//!
//! A waiter re-checks freshness after a successful build instead of trusting the
//! builder's result. When the builder records a failure, every request that was waiting
//! on it gets that failure instead of compiling again; failures are never cached, so the
//! next request that arrives afterwards starts a fresh build.

pub mod freshness;

use crate::core::{AssetError, ErrorCategory};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Notify;

pub use freshness::{
    DestinationDescriptor, SourceDescriptor, is_stale, stat_destination, stat_source,
};

/// Result of claiming a destination path.
#[derive(Debug)]
pub enum Slot {
    /// The caller is now the only builder for this path. Dropping the guard releases the
    /// path and wakes every waiter.
    Builder(BuildGuard),
    /// Another build of this path was in flight and has finished without recording a
    /// failure.
    Waited,
}

/// Why an in-flight build failed, as handed to the requests that waited for it.
#[derive(Debug, Clone)]
struct BuildFailure {
    category: ErrorCategory,
    reason: String,
}

/// One in-flight build.
#[derive(Debug, Default)]
struct InFlight {
    notify: Notify,
    /// Set by the builder before it releases the slot.
    failure: OnceLock<BuildFailure>,
}

/// Registry of in-flight builds keyed by destination path.
///
/// Cloning is cheap and clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct BuildRegistry {
    /// Destination path → state of its running build.
    ///
    /// An entry exists only while a build is running.
    in_flight: Arc<DashMap<PathBuf, Arc<InFlight>>>,
}

impl BuildRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the right to build `destination`, or wait for the build already in flight.
    ///
    /// Returns [`Slot::Builder`] immediately when nobody is building this path. Otherwise
    /// waits (up to `timeout`) for the in-flight build to finish and returns
    /// [`Slot::Waited`]; the caller must then re-check freshness and claim again if the
    /// artifact is still stale.
    ///
    /// # Errors
    ///
    /// - [`AssetError::WaitTimeout`] if the in-flight build does not finish within
    ///   `timeout`. The in-flight build is not affected.
    /// - [`AssetError::InFlightBuildFailed`] if the build this call waited for failed.
    pub async fn claim(&self, destination: &Path, timeout: Duration) -> Result<Slot, AssetError> {
        match self.in_flight.entry(destination.to_path_buf()) {
            Entry::Vacant(entry) => {
                let state = Arc::new(InFlight::default());
                entry.insert(Arc::clone(&state));

                tracing::trace!(
                    target: "assetmill::registry",
                    "claimed build slot for {}",
                    destination.display()
                );

                Ok(Slot::Builder(BuildGuard {
                    in_flight: Arc::clone(&self.in_flight),
                    destination: destination.to_path_buf(),
                    state,
                }))
            }
            Entry::Occupied(entry) => {
                let existing = Arc::clone(entry.get());

                // Register interest before releasing the shard lock: notify_waiters only
                // wakes futures that already exist
                let notified = existing.notify.notified();
                drop(entry);

                tracing::debug!(
                    target: "assetmill::registry",
                    "waiting for in-flight build of {}",
                    destination.display()
                );

                match tokio::time::timeout(timeout, notified).await {
                    Ok(()) => match existing.failure.get() {
                        None => Ok(Slot::Waited),
                        Some(failure) => Err(AssetError::InFlightBuildFailed {
                            path: destination.to_path_buf(),
                            reason: failure.reason.clone(),
                            category: failure.category,
                        }),
                    },
                    Err(_) => {
                        tracing::warn!(
                            target: "assetmill::registry",
                            "gave up after {:?} waiting for build of {}",
                            timeout,
                            destination.display()
                        );
                        Err(AssetError::WaitTimeout {
                            path: destination.to_path_buf(),
                            timeout,
                        })
                    }
                }
            }
        }
    }

    /// Whether a build of `destination` is currently in flight.
    pub fn is_building(&self, destination: &Path) -> bool {
        self.in_flight.contains_key(destination)
    }

    /// Number of builds currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

/// Exclusive build right for one destination path.
///
/// Released on drop, including when the build task panics.
#[derive(Debug)]
pub struct BuildGuard {
    in_flight: Arc<DashMap<PathBuf, Arc<InFlight>>>,
    destination: PathBuf,
    state: Arc<InFlight>,
}

impl BuildGuard {
    /// The destination this guard covers.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Record that the build failed with `error`.
    ///
    /// Requests already waiting on this build receive the failure when the guard drops
    /// instead of compiling again. Only the first recorded failure is kept.
    pub fn fail(&self, error: &AssetError) {
        let mut reason = error.to_string();
        let mut cause = std::error::Error::source(error);
        while let Some(inner) = cause {
            reason.push_str(": ");
            reason.push_str(&inner.to_string());
            cause = std::error::Error::source(inner);
        }

        let _ = self.state.failure.set(BuildFailure {
            category: error.category(),
            reason,
        });
    }
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        self.in_flight.remove_if(&self.destination, |_, state| Arc::ptr_eq(state, &self.state));
        self.state.notify.notify_waiters();

        tracing::trace!(
            target: "assetmill::registry",
            "released build slot for {}",
            self.destination.display()
        );
    }
}
