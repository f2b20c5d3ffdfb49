//! CLI contract tests: JSON on stdout, errors on stderr with a failing exit.

use std::path::{Path, PathBuf};

use assert_cmd::Command;

struct Env {
    dir: tempfile::TempDir,
    config: PathBuf,
}

fn env_with_role(role: &str) -> Env {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("warden.db");
    let config = dir.path().join("config.toml");
    let contents = format!(
        r#"
[database]
path = "{}"

[auth]
role = "{role}"

[[catalog.tools]]
namespace = "default"
name = "fetch"

[[catalog.workloads]]
namespace = "default"
name = "wf1"
tools = ["default/fetch"]
"#,
        db.display()
    );
    std::fs::write(&config, contents).expect("write config");
    Env { dir, config }
}

fn warden(config: &Path, args: &[&str]) -> assert_cmd::assert::Assert {
    Command::cargo_bin("warden")
        .expect("binary built")
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("WARDEN_DB")
        .env_remove("WARDEN_CONFIG")
        .env("RUST_LOG", "warn")
        .assert()
}

fn stdout_json(assert: &assert_cmd::assert::Assert) -> serde_json::Value {
    let out = &assert.get_output().stdout;
    serde_json::from_slice(out).expect("stdout should be JSON")
}

fn create(config: &Path, name: &str) {
    warden(
        config,
        &[
            "guardrail",
            "create",
            "--name",
            name,
            "--description",
            "test guardrail",
            "--deployment",
            "sidecar",
        ],
    )
    .success();
}

#[test]
fn create_get_and_list() {
    let env = env_with_role("admin");
    create(&env.config, "rate-limiter");

    let got = warden(&env.config, &["guardrail", "get", "default/rate-limiter"]).success();
    let json = stdout_json(&got);
    assert_eq!(json["name"], "rate-limiter");
    assert_eq!(json["usage"]["tools"].as_array().map(Vec::len), Some(0));

    let listed = warden(&env.config, &["guardrail", "list"]).success();
    assert_eq!(stdout_json(&listed).as_array().map(Vec::len), Some(1));
    assert!(env.dir.path().join("warden.db").exists());
}

#[test]
fn delete_is_blocked_while_attached() {
    let env = env_with_role("admin");
    create(&env.config, "rate-limiter");
    warden(
        &env.config,
        &[
            "tool",
            "attach",
            "default/fetch",
            "default/rate-limiter",
            "--timing",
            "pre-execution",
        ],
    )
    .success();

    let blocked = warden(&env.config, &["guardrail", "delete", "default/rate-limiter"]).failure();
    let stderr = String::from_utf8_lossy(&blocked.get_output().stderr).into_owned();
    assert!(stderr.contains("1 tool(s), 0 workload-tool"), "{stderr}");

    warden(
        &env.config,
        &["tool", "detach", "default/fetch", "default/rate-limiter"],
    )
    .success();
    warden(&env.config, &["guardrail", "delete", "default/rate-limiter"]).success();
}

#[test]
fn adopt_copies_tool_guardrails() {
    let env = env_with_role("admin");
    create(&env.config, "auth");
    warden(
        &env.config,
        &[
            "tool",
            "attach",
            "default/fetch",
            "default/auth",
            "--timing",
            "post-execution",
        ],
    )
    .success();

    let adopted = warden(&env.config, &["workload", "adopt", "default/wf1", "default/fetch"]).success();
    assert_eq!(stdout_json(&adopted)["copied"], 1);

    let listed = warden(&env.config, &["workload", "list", "default/wf1", "default/fetch"]).success();
    let rows = stdout_json(&listed);
    assert_eq!(rows[0]["source"], "tool");
    assert_eq!(rows[0]["execution_timing"], "post-execution");

    warden(
        &env.config,
        &[
            "workload",
            "remove",
            "default/wf1",
            "default/fetch",
            "default/auth",
        ],
    )
    .failure();
}

#[test]
fn viewer_role_cannot_create() {
    let env = env_with_role("viewer");
    let denied = warden(
        &env.config,
        &[
            "guardrail",
            "create",
            "--name",
            "pii",
            "--description",
            "d",
            "--deployment",
            "x",
        ],
    )
    .failure();
    let stderr = String::from_utf8_lossy(&denied.get_output().stderr).into_owned();
    assert!(stderr.contains("permission denied"), "{stderr}");
}

#[test]
fn import_reads_json_array() {
    let env = env_with_role("admin");
    let input = env.dir.path().join("batch.json");
    std::fs::write(
        &input,
        r#"[
            {"namespace": "default", "name": "one", "description": "d", "deployment": "x"},
            {"namespace": "default", "name": "BAD", "description": "d", "deployment": "x"}
        ]"#,
    )
    .expect("write batch");

    let imported = warden(
        &env.config,
        &["guardrail", "import", input.to_str().expect("utf-8 path")],
    )
    .success();
    let report = stdout_json(&imported);
    assert_eq!(report["imported"], 1);
    assert_eq!(report["failed"], 1);
    assert_eq!(report["items"][1]["kind"], "invalid_argument");
}

#[test]
fn malformed_reference_is_a_usage_error() {
    let env = env_with_role("admin");
    warden(&env.config, &["guardrail", "get", "no-slash"]).failure();
}
