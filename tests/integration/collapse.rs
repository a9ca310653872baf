//! Concurrent requests for one artifact share a single build.

use crate::common::{middleware, middleware_with, stale_pair};
use assetmill::core::{AssetError, AssetRequest};
use assetmill::middleware::{Handler, Middleware, Outcome};
use assetmill::test_utils::{AssetTree, CountingCompiler};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Barrier;

const REQUESTS: usize = 50;

/// 50 concurrent requests for a stale artifact: one compile, and every request
/// continues only once the new artifact is in place.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fifty_concurrent_requests_compile_once() {
    let tree = Arc::new(AssetTree::new());
    stale_pair(&tree, "shared.js", "let shared = true;");
    let compiler = CountingCompiler::uppercase().with_delay(Duration::from_millis(200));
    let mw = Arc::new(middleware(&tree, &compiler));
    let barrier = Arc::new(Barrier::new(REQUESTS));

    let mut handles = Vec::new();
    for _ in 0..REQUESTS {
        let mw = Arc::clone(&mw);
        let tree = Arc::clone(&tree);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let outcome = mw.prepare(&AssetRequest::get("/shared.js")).await.unwrap();
            // By the time a request proceeds, the single write has completed
            assert_eq!(tree.read_artifact("shared.js"), "LET SHARED = TRUE;");
            outcome
        }));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }

    assert_eq!(compiler.calls(), 1);
    assert_eq!(outcomes.iter().filter(|o| **o == Outcome::Built).count(), 1);
    assert!(
        outcomes
            .iter()
            .all(|o| matches!(o, Outcome::Built | Outcome::Coalesced | Outcome::Fresh))
    );
    assert_eq!(mw.registry().in_flight_count(), 0);
    assert_eq!(tree.artifact_files(), vec!["shared.js".to_string()]);
}

/// The same collapse seen through a full pipeline: the next stage is reached 50 times,
/// never before the artifact exists.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_pipeline_reaches_next_after_write() {
    let tree = Arc::new(AssetTree::new());
    tree.write_source("bundle.js", "bundle");
    let compiler = CountingCompiler::uppercase().with_delay(Duration::from_millis(100));
    let served = Arc::new(AtomicUsize::new(0));

    let next = {
        let tree = Arc::clone(&tree);
        let served = Arc::clone(&served);
        move |request: AssetRequest| {
            let tree = Arc::clone(&tree);
            let served = Arc::clone(&served);
            async move {
                let body = tree.read_artifact(request.url.trim_start_matches('/'));
                served.fetch_add(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(body)
            }
        }
    };
    let app = Arc::new(middleware(&tree, &compiler).wrap(next));

    let mut handles = Vec::new();
    for _ in 0..REQUESTS {
        let app = Arc::clone(&app);
        handles.push(tokio::spawn(async move {
            app.handle(AssetRequest::get("/bundle.js")).await.unwrap()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), "BUNDLE");
    }

    assert_eq!(served.load(Ordering::SeqCst), REQUESTS);
    assert_eq!(compiler.calls(), 1);
}

/// Different artifacts build in parallel without waiting on each other.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_paths_build_in_parallel() {
    let tree = Arc::new(AssetTree::new());
    for i in 0..8 {
        tree.write_source(&format!("mod{i}.js"), format!("m{i}"));
    }
    let compiler = CountingCompiler::uppercase().with_delay(Duration::from_millis(300));
    let mw = Arc::new(middleware(&tree, &compiler));

    let started = std::time::Instant::now();
    let mut handles = Vec::new();
    for i in 0..8 {
        let mw = Arc::clone(&mw);
        handles.push(tokio::spawn(async move {
            mw.prepare(&AssetRequest::get(format!("/mod{i}.js"))).await.unwrap()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), Outcome::Built);
    }

    assert_eq!(compiler.calls(), 8);
    // Serialized builds would take 8 * 300ms
    assert!(started.elapsed() < Duration::from_millis(8 * 300));
}

/// When the in-flight build fails, the requests waiting on it get the same failure
/// instead of compiling again. The next request builds afresh.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_waiters_share_failed_build() {
    let tree = Arc::new(AssetTree::new());
    tree.write_source("flaky.js", "flaky");
    let compiler = CountingCompiler::uppercase()
        .with_delay(Duration::from_millis(300))
        .failing_first(1);
    let mw = Arc::new(middleware(&tree, &compiler));

    let first = {
        let mw = Arc::clone(&mw);
        tokio::spawn(async move { mw.prepare(&AssetRequest::get("/flaky.js")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let waiters: Vec<_> = (0..5)
        .map(|_| {
            let mw = Arc::clone(&mw);
            tokio::spawn(async move { mw.prepare(&AssetRequest::get("/flaky.js")).await })
        })
        .collect();

    let first = first.await.unwrap();
    assert!(matches!(first, Err(AssetError::CompileFailed { .. })));
    for waiter in waiters {
        let err = waiter.await.unwrap().unwrap_err();
        assert!(
            matches!(&err, AssetError::InFlightBuildFailed { reason, .. } if reason.contains("Failed to compile")),
            "unexpected error: {err:?}"
        );
        assert!(!err.is_configuration());
    }
    assert_eq!(compiler.calls(), 1);
    assert!(!tree.artifact_exists("flaky.js"));

    // The failure is not cached
    let retry = mw.prepare(&AssetRequest::get("/flaky.js")).await.unwrap();
    assert_eq!(retry, Outcome::Built);
    assert_eq!(compiler.calls(), 2);
    assert_eq!(tree.read_artifact("flaky.js"), "FLAKY");
}

/// A waiter gives up after the configured timeout; the build still finishes.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_waiter_times_out() {
    let tree = Arc::new(AssetTree::new());
    tree.write_source("slow.js", "slow");
    let compiler = CountingCompiler::uppercase().with_delay(Duration::from_millis(1500));
    let config = assetmill::config::BuildConfig {
        wait_timeout_secs: 1,
        ..tree.config()
    };
    let mw = Arc::new(middleware_with(config, &compiler));

    let builder = {
        let mw = Arc::clone(&mw);
        tokio::spawn(async move { mw.prepare(&AssetRequest::get("/slow.js")).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = mw.prepare(&AssetRequest::get("/slow.js")).await.unwrap_err();
    assert!(matches!(err, AssetError::WaitTimeout { .. }));
    assert!(!err.is_configuration());

    assert_eq!(builder.await.unwrap().unwrap(), Outcome::Built);
    assert_eq!(compiler.calls(), 1);
}

/// Dropping the request that started a build does not cancel it: the artifact is still
/// written and waiters are still released.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropped_builder_request_still_completes() {
    let tree = Arc::new(AssetTree::new());
    tree.write_source("orphan.js", "orphan");
    let compiler = CountingCompiler::uppercase().with_delay(Duration::from_millis(300));
    let mw = Arc::new(middleware(&tree, &compiler));

    let builder = {
        let mw = Arc::clone(&mw);
        tokio::spawn(async move { mw.prepare(&AssetRequest::get("/orphan.js")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let waiter = {
        let mw = Arc::clone(&mw);
        tokio::spawn(async move { mw.prepare(&AssetRequest::get("/orphan.js")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    builder.abort();
    assert!(builder.await.unwrap_err().is_cancelled());

    assert_eq!(waiter.await.unwrap().unwrap(), Outcome::Coalesced);
    assert_eq!(tree.read_artifact("orphan.js"), "ORPHAN");
    assert_eq!(compiler.calls(), 1);
    assert_eq!(mw.registry().in_flight_count(), 0);
}
