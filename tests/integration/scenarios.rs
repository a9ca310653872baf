//! Single-request flows through the build cache.

use crate::common::{an_hour_ago, middleware, middleware_with, stale_pair};
use assetmill::config::{BuildConfig, BuildPolicy};
use assetmill::core::{AssetError, AssetRequest};
use assetmill::middleware::{BuildCacheMiddleware, Middleware, Outcome, PassReason};
use assetmill::test_utils::{AssetTree, CountingCompiler};
use std::time::{Duration, SystemTime};

/// Missing artifact: the destination root is created and the compiled output written.
#[tokio::test]
async fn test_builds_when_artifact_missing() {
    let tree = AssetTree::new();
    tree.write_source("app.js", "function add(a, b) { return a + b; }");
    assert!(!tree.dest_root().exists());
    let compiler = CountingCompiler::uppercase();
    let mw = middleware(&tree, &compiler);

    let outcome = mw.prepare(&AssetRequest::get("/app.js?x=1")).await.unwrap();

    assert_eq!(outcome, Outcome::Built);
    assert!(tree.dest_root().is_dir());
    assert_eq!(tree.read_artifact("app.js"), "FUNCTION ADD(A, B) { RETURN A + B; }");
    assert_eq!(compiler.calls(), 1);
    assert_eq!(tree.artifact_files(), vec!["app.js".to_string()]);
}

/// Newer artifact: nothing is compiled or written.
#[tokio::test]
async fn test_newer_artifact_is_left_alone() {
    let tree = AssetTree::new();
    tree.write_source("app.js", "source");
    tree.set_source_mtime("app.js", an_hour_ago());
    tree.write_artifact("app.js", "cached output");
    let before = tree.artifact_mtime("app.js");
    let compiler = CountingCompiler::uppercase();
    let mw = middleware(&tree, &compiler);

    let outcome = mw.prepare(&AssetRequest::get("/app.js?x=1")).await.unwrap();

    assert_eq!(outcome, Outcome::Fresh);
    assert_eq!(tree.read_artifact("app.js"), "cached output");
    assert_eq!(tree.artifact_mtime("app.js"), before);
    assert_eq!(compiler.calls(), 0);
}

/// Equal modification times count as fresh.
#[tokio::test]
async fn test_equal_mtimes_are_fresh() {
    let tree = AssetTree::new();
    let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
    tree.write_source("tie.js", "source");
    tree.write_artifact("tie.js", "cached");
    tree.set_source_mtime("tie.js", stamp);
    tree.set_artifact_mtime("tie.js", stamp);
    let compiler = CountingCompiler::uppercase();
    let mw = middleware(&tree, &compiler);

    assert_eq!(mw.prepare(&AssetRequest::get("/tie.js")).await.unwrap(), Outcome::Fresh);
    assert_eq!(compiler.calls(), 0);
}

/// An unmatched extension never touches the filesystem: even a source root that cannot be
/// traversed does not produce an error.
#[tokio::test]
async fn test_unmatched_extension_performs_no_io() {
    let tree = AssetTree::new();
    let bogus_root = tree.source_root().join("not-a-directory");
    std::fs::write(&bogus_root, "file").unwrap();
    let config = BuildConfig::new(&bogus_root, tree.dest_root());
    let compiler = CountingCompiler::uppercase();
    let mw = middleware_with(config, &compiler);

    let outcome = mw.prepare(&AssetRequest::get("/app.css")).await.unwrap();
    assert_eq!(outcome, Outcome::PassThrough(PassReason::ExtensionNotMatched));

    // The same root does fail as soon as a stat is attempted
    let err = mw.prepare(&AssetRequest::get("/app.js")).await.unwrap_err();
    assert!(matches!(err, AssetError::FileOperation(_)));
    assert!(!tree.dest_root().exists());
}

/// No source: pass through with no destination side effects.
#[tokio::test]
async fn test_missing_source_has_no_side_effects() {
    let tree = AssetTree::new();
    let compiler = CountingCompiler::uppercase();
    let mw = middleware(&tree, &compiler);

    let outcome = mw.prepare(&AssetRequest::get("/missing.js")).await.unwrap();

    assert_eq!(outcome, Outcome::PassThrough(PassReason::SourceMissing));
    assert!(!tree.dest_root().exists());
    assert_eq!(compiler.calls(), 0);
}

/// Missing source under a nested path still leaves the destination untouched.
#[tokio::test]
async fn test_missing_nested_source() {
    let tree = AssetTree::new();
    tree.write_source("js/other.js", "x");
    let compiler = CountingCompiler::uppercase();
    let mw = middleware(&tree, &compiler);

    let outcome = mw.prepare(&AssetRequest::get("/js/deep/missing.js")).await.unwrap();

    assert_eq!(outcome, Outcome::PassThrough(PassReason::SourceMissing));
    assert!(!tree.dest_root().join("js").exists());
}

/// A stale artifact is replaced with freshly compiled content.
#[tokio::test]
async fn test_stale_artifact_is_rebuilt() {
    let tree = AssetTree::new();
    stale_pair(&tree, "lib/util.js", "export const x = 1;");
    let compiler = CountingCompiler::uppercase();
    let mw = middleware(&tree, &compiler);

    assert_eq!(mw.prepare(&AssetRequest::get("/lib/util.js")).await.unwrap(), Outcome::Built);
    assert_eq!(tree.read_artifact("lib/util.js"), "EXPORT CONST X = 1;");

    // Artifact is now at least as new as the source
    let source_mtime =
        std::fs::metadata(tree.source_path("lib/util.js")).unwrap().modified().unwrap();
    assert!(tree.artifact_mtime("lib/util.js") >= source_mtime);
    assert_eq!(mw.prepare(&AssetRequest::get("/lib/util.js")).await.unwrap(), Outcome::Fresh);
    assert_eq!(compiler.calls(), 1);
}

/// Editing the source after a build triggers exactly one more build.
#[tokio::test]
async fn test_source_edit_triggers_rebuild() {
    let tree = AssetTree::new();
    tree.write_source("app.js", "one");
    let compiler = CountingCompiler::uppercase();
    let mw = middleware(&tree, &compiler);

    mw.prepare(&AssetRequest::get("/app.js")).await.unwrap();
    tree.set_artifact_mtime("app.js", an_hour_ago());
    tree.write_source("app.js", "two");

    assert_eq!(mw.prepare(&AssetRequest::get("/app.js")).await.unwrap(), Outcome::Built);
    assert_eq!(tree.read_artifact("app.js"), "TWO");
    assert_eq!(compiler.calls(), 2);
}

/// Deeply nested destinations are provisioned on the way.
#[tokio::test]
async fn test_nested_destination_directories() {
    let tree = AssetTree::new();
    tree.write_source("a/b/c/d/e.js", "deep");
    let compiler = CountingCompiler::identity();
    let mw = middleware(&tree, &compiler);

    mw.prepare(&AssetRequest::get("/a/b/c/d/e.js")).await.unwrap();

    assert!(tree.dest_root().join("a/b/c/d").is_dir());
    assert_eq!(tree.read_artifact("a/b/c/d/e.js"), "deep");
}

/// Copy-only mode reproduces arbitrary bytes exactly.
#[tokio::test]
async fn test_copy_only_round_trip() {
    let tree = AssetTree::new();
    let bytes: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();
    tree.write_source("blob.js", &bytes);
    let policy = BuildPolicy::new(&tree.config(), None).unwrap();
    assert!(policy.copy_only());
    let mw = BuildCacheMiddleware::new(policy);

    mw.prepare(&AssetRequest::get("/blob.js")).await.unwrap();

    assert_eq!(tree.read_artifact_bytes("blob.js"), bytes);
}

/// Multiple extensions, and query strings on each.
#[tokio::test]
async fn test_multiple_extensions() {
    let tree = AssetTree::new();
    tree.write_source("site.css", "body{}");
    tree.write_source("app.js", "x");
    tree.write_source("logo.svg", "<svg/>");
    let config = BuildConfig {
        extensions: vec!["js".into(), ".css".into()],
        ..tree.config()
    };
    let compiler = CountingCompiler::identity();
    let mw = middleware_with(config, &compiler);

    assert_eq!(mw.prepare(&AssetRequest::get("/site.css?v=1")).await.unwrap(), Outcome::Built);
    assert_eq!(mw.prepare(&AssetRequest::get("/app.js#top")).await.unwrap(), Outcome::Built);
    assert_eq!(
        mw.prepare(&AssetRequest::get("/logo.svg")).await.unwrap(),
        Outcome::PassThrough(PassReason::ExtensionNotMatched)
    );
    assert_eq!(tree.artifact_files(), vec!["app.js".to_string(), "site.css".to_string()]);
}

/// Traversal attempts are passed through without touching either tree.
#[tokio::test]
async fn test_traversal_is_passed_through() {
    let tree = AssetTree::new();
    let outside = tree.source_root().parent().unwrap().join("secret.js");
    std::fs::write(&outside, "secret").unwrap();
    let compiler = CountingCompiler::identity();
    let mw = middleware(&tree, &compiler);

    for url in ["/../secret.js", "/js/../../secret.js", "/js/..\\..\\secret.js"] {
        let outcome = mw.prepare(&AssetRequest::get(url)).await.unwrap();
        assert_eq!(outcome, Outcome::PassThrough(PassReason::UnsafePath), "{url}");
    }
    assert!(!tree.dest_root().exists());
    assert_eq!(compiler.calls(), 0);
}

/// A file sitting where a destination directory belongs is a configuration error.
#[tokio::test]
async fn test_file_blocking_destination_directory() {
    let tree = AssetTree::new();
    tree.write_source("js/app.js", "x");
    tree.write_artifact("js", "i am a file");
    let compiler = CountingCompiler::identity();
    let mw = middleware(&tree, &compiler);

    let err = mw.prepare(&AssetRequest::get("/js/app.js")).await.unwrap_err();

    assert!(err.is_configuration());
    assert!(matches!(err, AssetError::NotADirectory { .. }));
    assert_eq!(mw.registry().in_flight_count(), 0);
}
