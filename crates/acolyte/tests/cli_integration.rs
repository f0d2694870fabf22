//! CLI integration tests for the Acolyte command-line interface.
//!
//! Every test runs against its own temporary directory: an explicit config
//! file pointing at a fresh SQLite database, an empty user config dir and
//! the directory itself as working directory.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
    config: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("user")).unwrap();
        let config = dir.path().join("test.toml");
        let db = dir.path().join("flows.db");
        std::fs::write(
            &config,
            format!("[database]\npath = {:?}\n\n[logging]\nlevel = \"warn\"\n", db.display().to_string()),
        )
        .unwrap();
        Self { dir, config }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("acolyte").unwrap();
        cmd.current_dir(self.path())
            .env("ACOLYTE_CONFIG_DIR", self.path().join("user"))
            .env_remove("ACOLYTE_CONFIG")
            .env_remove("RUST_LOG")
            .arg("--config")
            .arg(&self.config);
        cmd
    }

    /// Run with `--json` and return the parsed result envelope.
    fn json(&self, args: &[&str]) -> Value {
        let output = self.cmd().arg("--json").args(args).output().unwrap();
        serde_json::from_slice(&output.stdout).unwrap()
    }

    /// Spawn a `--json` invocation without waiting for it.
    fn spawn_json(&self, args: &[&str]) -> std::process::Child {
        std::process::Command::new(assert_cmd::cargo::cargo_bin("acolyte"))
            .current_dir(self.path())
            .env("ACOLYTE_CONFIG_DIR", self.path().join("user"))
            .env_remove("ACOLYTE_CONFIG")
            .env_remove("RUST_LOG")
            .arg("--config")
            .arg(&self.config)
            .arg("--json")
            .args(args)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .spawn()
            .unwrap()
    }

    fn id(&self, args: &[&str]) -> String {
        let rs = self.json(args);
        assert_eq!(rs["status"], Value::from("ok"), "{rs}");
        rs["data"]["id"].as_i64().unwrap().to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_displays() {
    Command::cargo_bin("acolyte")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("human-in-the-loop flow engine"));
}

#[test]
fn test_version_displays() {
    Command::cargo_bin("acolyte")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("acolyte"));
}

#[test]
fn test_help_lists_subcommands() {
    Command::cargo_bin("acolyte")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("metas"))
        .stdout(predicate::str::contains("template"))
        .stdout(predicate::str::contains("start"))
        .stdout(predicate::str::contains("act"))
        .stdout(predicate::str::contains("instance"))
        .stdout(predicate::str::contains("actor"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_unknown_subcommand_fails() {
    Command::cargo_bin("acolyte")
        .unwrap()
        .arg("frobnicate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_act_requires_instance() {
    Command::cargo_bin("acolyte")
        .unwrap()
        .args(["act", "--step", "hr", "--action", "trigger", "--actor", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--instance"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Definitions
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_metas_lists_builtin_flow() {
    let ws = Workspace::new();
    ws.cmd()
        .arg("metas")
        .assert()
        .success()
        .stdout(predicate::str::contains("mooncake_flow"));
}

#[test]
fn test_meta_detail_and_missing_meta() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["meta", "mooncake_flow"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cake_num"));

    ws.cmd()
        .args(["meta", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("flow_meta_not_exist"));
}

#[test]
fn test_job_detail() {
    let ws = Workspace::new();
    let rs = ws.json(&["job", "hr"]);
    assert_eq!(rs["data"]["events"][1]["name"], Value::from("found"));
    assert_eq!(rs["data"]["events"][1]["args"][0]["field"]["regex"], Value::from(r"^\w+$"));
}

#[test]
fn test_invalid_json_args_rejected() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["start", "--template", "1", "--initiator", "1", "--args", "[1]"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be a JSON object"));
}

#[test]
fn test_broken_config_fails() {
    let ws = Workspace::new();
    std::fs::write(ws.path().join("acolyte.toml"), "[database\n").unwrap();
    ws.cmd()
        .arg("metas")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse config"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_init_writes_user_config_once() {
    let ws = Workspace::new();
    let written = ws.path().join("user").join("config.toml");

    ws.cmd()
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created config file"));
    let contents = std::fs::read_to_string(&written).unwrap();
    assert!(contents.contains("[database]"));
    assert!(contents.contains("lock_namespace = \"acolyte\""));

    ws.cmd()
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn test_config_init_local() {
    let ws = Workspace::new();
    ws.cmd().args(["config", "init", "--local"]).assert().success();
    assert!(ws.path().join("acolyte.toml").is_file());

    ws.cmd()
        .args(["config", "which"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 config file(s) loaded"));
}

#[test]
fn test_config_show_resolves_layers() {
    let ws = Workspace::new();
    let output = ws.cmd().args(["--json", "config", "show"]).output().unwrap();
    assert!(output.status.success());
    let shown: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        shown["database"]["path"],
        Value::from(ws.path().join("flows.db").display().to_string())
    );
    assert_eq!(shown["logging"]["level"], Value::from("warn"));
    assert_eq!(shown["engine"]["lock_namespace"], Value::from("acolyte"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Flow lifecycle across invocations
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_mooncake_flow_finishes() {
    let ws = Workspace::new();
    let actor = ws.id(&["actor", "add", "--email", "dev@example.com", "--name", "Dev"]);
    let template = ws.id(&[
        "template", "create", "--meta", "mooncake_flow", "--name", "autumn", "--max-run", "1",
        "--creator", &actor,
    ]);
    let instance = ws.id(&[
        "start", "--template", &template, "--initiator", &actor, "--description", "grab",
    ]);

    let rs = ws.json(&["start", "--template", &template, "--initiator", &actor]);
    assert_eq!(rs["reason"], Value::from("too_many_instance"));

    let act = |step: &str, action: &str, args: &str| {
        ws.json(&[
            "act", "--instance", &instance, "--step", step, "--action", action, "--actor", &actor,
            "--args", args,
        ])
    };

    assert_eq!(act("programmer", "trigger", "{}")["status"], Value::from("ok"));
    let rs = act("programmer", "midautumn", r#"{"cake_num": "3"}"#);
    assert_eq!(rs["data"], Value::from("I grabbed 3 mooncakes"));

    act("hr", "trigger", "{}");
    let rs = act("hr", "found", r#"{"who": "not a word"}"#);
    assert_eq!(rs["reason"], Value::from("hr.found.who_invalid_format"));
    act("hr", "found", r#"{"who": "dev"}"#);

    act("boss", "trigger", "{}");
    act("boss", "hr_report", r#"{"mood": "good"}"#);

    let rs = ws.json(&["instance", &instance]);
    assert_eq!(rs["data"]["status"], Value::from("FINISHED"));
    assert_eq!(rs["data"]["current_step"], Value::from("boss"));
    assert_eq!(rs["data"]["job_instances"].as_array().unwrap().len(), 3);

    let rs = ws.json(&["instances", "--status", "finished"]);
    assert_eq!(rs["data"].as_array().unwrap().len(), 1);
}

#[test]
fn test_parallel_processes_respect_instance_limit() {
    let ws = Workspace::new();
    let actor = ws.id(&["actor", "add", "--email", "dev@example.com", "--name", "Dev"]);

    for round in 0..3 {
        let name = format!("limited-{round}");
        let template = ws.id(&[
            "template", "create", "--meta", "mooncake_flow", "--name", &name, "--max-run", "1",
            "--creator", &actor,
        ]);
        let children: Vec<_> = (0..3)
            .map(|_| ws.spawn_json(&["start", "--template", &template, "--initiator", &actor]))
            .collect();
        let results: Vec<Value> = children
            .into_iter()
            .map(|child| serde_json::from_slice(&child.wait_with_output().unwrap().stdout).unwrap())
            .collect();

        let started = results.iter().filter(|rs| rs["status"] == "ok").count();
        assert_eq!(started, 1, "{results:?}");
        for rs in results.iter().filter(|rs| rs["status"] != "ok") {
            assert_eq!(rs["reason"], Value::from("too_many_instance"), "{rs}");
        }
    }
}

#[test]
fn test_boss_in_bad_mood_stops_flow() {
    let ws = Workspace::new();
    let actor = ws.id(&["actor", "add", "--email", "dev@example.com", "--name", "Dev"]);
    let template = ws.id(&[
        "template", "create", "--meta", "mooncake_flow", "--name", "autumn", "--creator", &actor,
    ]);
    let instance = ws.id(&["start", "--template", &template, "--initiator", &actor]);

    for (step, action, args) in [
        ("programmer", "trigger", "{}"),
        ("programmer", "midautumn", "{}"),
        ("hr", "trigger", "{}"),
        ("hr", "found", r#"{"who": "dev"}"#),
        ("boss", "trigger", "{}"),
        ("boss", "hr_report", r#"{"mood": "bad"}"#),
    ] {
        ws.cmd()
            .args([
                "act", "--instance", &instance, "--step", step, "--action", action, "--actor",
                &actor, "--args", args,
            ])
            .assert()
            .success();
    }

    ws.cmd()
        .args(["instance", &instance])
        .assert()
        .success()
        .stdout(predicate::str::contains("STOPPED"));

    ws.cmd()
        .args([
            "act", "--instance", &instance, "--step", "boss", "--action", "trigger", "--actor",
            &actor,
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid_status"));
}

#[test]
fn test_template_create_rejects_unknown_creator() {
    let ws = Workspace::new();
    ws.cmd()
        .args([
            "template", "create", "--meta", "mooncake_flow", "--name", "t", "--creator", "42",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid_creator_id"));
}
