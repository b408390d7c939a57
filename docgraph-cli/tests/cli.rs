use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn docgraph(store: &Path) -> Command {
    let mut cmd = Command::cargo_bin("docgraph").unwrap();
    cmd.arg("--store-dir").arg(store).env_remove("DOCGRAPH_STORE_DIR");
    cmd
}

fn json_of(output: &[u8]) -> serde_json::Value {
    serde_json::from_slice(output).expect("stdout should be JSON")
}

/// Record a project from a descriptor and return its node id.
fn add_project(store: &Path, descriptor: &serde_json::Value) -> String {
    let file = store.with_extension("descriptor.json");
    std::fs::write(&file, descriptor.to_string()).unwrap();
    let out = docgraph(store)
        .args(["project", "--json"])
        .arg(&file)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    json_of(&out)["id"].as_str().unwrap().to_string()
}

#[test]
fn status_on_empty_directory_reports_not_initialized() {
    let dir = tempfile::tempdir().unwrap();
    docgraph(&dir.path().join("store"))
        .arg("status")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("not initialized"));
}

#[test]
fn invalid_config_exits_with_config_code() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("config.toml"), "[events]\ndedup_window_secs = 0\n").unwrap();
    docgraph(dir.path())
        .args(["deploy", "--project", "project:x", "--ssg", "hugo"])
        .assert()
        .code(2);
}

#[test]
fn deploy_to_unknown_project_fails() {
    let dir = tempfile::tempdir().unwrap();
    docgraph(dir.path())
        .args(["deploy", "--project", "project:missing", "--ssg", "hugo"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("project:missing"));
}

#[test]
fn python_project_gets_mkdocs() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("store");
    let id = add_project(
        &store,
        &serde_json::json!({
            "path": "/work/pyproj",
            "languages": {"python": 12},
            "ecosystem": "python",
        }),
    );

    let out = docgraph(&store)
        .args(["recommend", "--json", "--project", &id])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let rec = json_of(&out);
    assert_eq!(rec["recommended"], "mkdocs");
    assert_eq!(rec["reasoning"][0], "Python ecosystem detected");

    docgraph(&store)
        .args(["recommend", "--path", "/work/pyproj"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Recommended: mkdocs"));
}

#[test]
fn deployments_feed_statistics_and_status() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("store");
    let id = add_project(
        &store,
        &serde_json::json!({"path": "/work/site", "languages": {"go": 3}}),
    );

    for (n, failed) in [(1, false), (2, false), (3, true)] {
        let mut cmd = docgraph(&store);
        cmd.args(["deploy", "--project", &id, "--ssg", "Hugo", "--token"])
            .arg(format!("run-{n}"));
        if failed {
            cmd.arg("--failed");
        }
        cmd.assert().success();
    }
    // Same token again: recorded once.
    docgraph(&store)
        .args(["deploy", "--project", &id, "--ssg", "hugo", "--token", "run-1"])
        .assert()
        .success();

    let out = docgraph(&store)
        .args(["stats", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stats = json_of(&out);
    assert_eq!(stats[0]["ssg"], "hugo");
    assert_eq!(stats[0]["total"], 3);
    assert_eq!(stats[0]["failures"], 1);

    docgraph(&store)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("project_deployed_with"));

    docgraph(&store)
        .arg("health")
        .assert()
        .success()
        .stdout(predicate::str::contains("Deployment health:"));
}

#[test]
fn preferences_round_trip_through_the_cli() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("store");
    docgraph(&store)
        .args(["prefs", "track", "--user", "alice", "--ssg", "hugo"])
        .assert()
        .success();
    docgraph(&store)
        .args(["prefs", "set", "--user", "alice", "--preferred", "hugo,mkdocs", "--auto-apply", "false"])
        .assert()
        .success();

    let out = docgraph(&store)
        .args(["prefs", "show", "--user", "alice", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let prefs = json_of(&out);
    assert_eq!(prefs["preferred_ssgs"], serde_json::json!(["hugo", "mkdocs"]));
    assert_eq!(prefs["auto_apply"], false);
    assert_eq!(prefs["stats"]["hugo"]["uses"], 1);
}

#[test]
fn trends_reject_zero_period() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("store");
    add_project(&store, &serde_json::json!({"path": "/work/p"}));
    docgraph(&store)
        .args(["trends", "--period-days", "0"])
        .assert()
        .failure();
}
