//! The `assetmill` binary.

use assert_cmd::Command;
use assetmill::test_utils::AssetTree;
use predicates::prelude::*;

/// A command running in `dir` with no ambient configuration leaking in.
fn assetmill(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("assetmill").unwrap();
    cmd.current_dir(dir)
        .env("NO_COLOR", "1")
        .env_remove("ASSETMILL_SRC")
        .env_remove("ASSETMILL_DEST")
        .env_remove("RUST_LOG");
    cmd
}

fn roots(cmd: &mut Command, tree: &AssetTree) {
    cmd.arg("--src").arg(tree.source_root()).arg("--dest").arg(tree.dest_root());
}

#[test]
fn test_build_copies_and_reports() {
    let tree = AssetTree::new();
    tree.write_source("js/app.js", "var app;");

    let mut cmd = assetmill(tree.source_root());
    roots(&mut cmd, &tree);
    cmd.args(["build", "/js/app.js?v=2", "/js/missing.js"])
        .assert()
        .success()
        .stdout(predicate::str::contains("built"))
        .stdout(predicate::str::contains("/js/missing.js (no source)"))
        .stdout(predicate::str::contains("1 built, 0 fresh, 1 skipped, 0 failed"));

    assert_eq!(tree.read_artifact("js/app.js"), "var app;");

    // A second run finds the artifact fresh
    let mut cmd = assetmill(tree.source_root());
    roots(&mut cmd, &tree);
    cmd.args(["build", "/js/app.js"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 built, 1 fresh"));
}

#[test]
fn test_missing_src_fails_with_suggestion() {
    let tree = AssetTree::new();

    assetmill(tree.source_root())
        .arg("--dest")
        .arg(tree.dest_root())
        .args(["build", "/app.js"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("assetmill: requires a 'src' option to be set"))
        .stderr(predicate::str::contains("--src"));
}

#[test]
fn test_status_json() {
    let tree = AssetTree::new();
    tree.write_source("a.js", "a");
    tree.write_source("b.js", "b");
    tree.write_artifact("b.js", "b");

    let mut cmd = assetmill(tree.source_root());
    roots(&mut cmd, &tree);
    let output = cmd
        .args(["status", "--json", "/a.js", "/b.js", "/c.js", "/d.css"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let entries: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        entries,
        serde_json::json!([
            { "path": "/a.js", "status": "stale" },
            { "path": "/b.js", "status": "fresh" },
            { "path": "/c.js", "status": "missing-source" },
            { "path": "/d.css", "status": "ignored" },
        ])
    );
    // status never builds
    assert!(!tree.artifact_exists("a.js"));
}

#[test]
fn test_warm_builds_matching_sources() {
    let tree = AssetTree::new();
    tree.write_source("js/a.js", "a");
    tree.write_source("js/lib/b.js", "b");
    tree.write_source("css/site.css", "c");
    tree.write_source("README", "r");

    let mut cmd = assetmill(tree.source_root());
    roots(&mut cmd, &tree);
    cmd.args(["--ext", "js,css", "warm", "--jobs", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 built"));

    assert_eq!(
        tree.artifact_files(),
        vec!["css/site.css".to_string(), "js/a.js".to_string(), "js/lib/b.js".to_string()]
    );
}

#[test]
fn test_config_file_is_picked_up() {
    let tree = AssetTree::new();
    tree.write_source("app.js", "hello");
    let work = tempfile::tempdir().unwrap();
    std::fs::write(
        work.path().join("assetmill.toml"),
        format!(
            "src = {:?}\ndest = {:?}\ncommand = [\"tr\", \"a-z\", \"A-Z\"]\n",
            tree.source_root().display().to_string(),
            tree.dest_root().display().to_string()
        ),
    )
    .unwrap();

    assetmill(work.path()).args(["-q", "build", "/app.js"]).assert().success().stdout("");

    assert_eq!(tree.read_artifact("app.js"), "HELLO");
}

#[test]
fn test_copy_flag_overrides_command() {
    let tree = AssetTree::new();
    tree.write_source("app.js", "hello");
    let config = tree.source_root().parent().unwrap().join("custom.toml");
    std::fs::write(&config, "command = [\"tr\", \"a-z\", \"A-Z\"]\n").unwrap();

    let mut cmd = assetmill(tree.source_root());
    roots(&mut cmd, &tree);
    cmd.arg("--config").arg(&config).args(["--copy", "build", "/app.js"]).assert().success();

    assert_eq!(tree.read_artifact("app.js"), "hello");
}

#[test]
fn test_unknown_config_key_is_rejected() {
    let work = tempfile::tempdir().unwrap();
    std::fs::write(work.path().join("assetmill.toml"), "srcdir = \"assets\"\n").unwrap();

    assetmill(work.path())
        .args(["status", "/a.js"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config"));
}

#[test]
fn test_failed_compile_exits_nonzero() {
    let tree = AssetTree::new();
    tree.write_source("ok.js", "fine");
    tree.write_source("bad.js", "broken");
    let config = tree.source_root().parent().unwrap().join("fail.toml");
    std::fs::write(
        &config,
        r#"command = ['sh', '-c', 'input=$(cat); case "$input" in *broken*) exit 3;; esac; printf %s "$input"']"#,
    )
    .unwrap();

    let mut cmd = assetmill(tree.source_root());
    roots(&mut cmd, &tree);
    cmd.arg("--config")
        .arg(&config)
        .args(["build", "/ok.js", "/bad.js"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("1 of 2 builds failed"))
        .stderr(predicate::str::contains("/bad.js"));

    assert_eq!(tree.read_artifact("ok.js"), "fine");
    assert!(!tree.artifact_exists("bad.js"));
}

#[test]
fn test_env_roots() {
    let tree = AssetTree::new();
    tree.write_source("env.js", "from env");

    assetmill(tree.source_root())
        .env("ASSETMILL_SRC", tree.source_root())
        .env("ASSETMILL_DEST", tree.dest_root())
        .args(["build", "/env.js"])
        .assert()
        .success();

    assert_eq!(tree.read_artifact("env.js"), "from env");
}
