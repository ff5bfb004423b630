//! CLI subprocess integration tests.
//!
//! These tests invoke the `stackpack` binary with the mock backend and
//! verify exit codes, stdout content and the files left on disk.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn stackpack_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_stackpack"));
    cmd.env("STACKPACK_SKIP_PREREQS", "1");
    cmd.env_remove("STACKPACK_LOG");
    cmd
}

fn write_spec(dir: &Path, os_version: &str, options: &str) -> PathBuf {
    let path = dir.join("input.yaml");
    std::fs::write(
        &path,
        format!(
            r#"os:
  name: rockylinux
  version: "{os_version}"
database:
  name: postgresql
  version: "15.8"
options:{options}
"#
        ),
    )
    .unwrap();
    path
}

fn build(dir: &Path, spec: &Path, extra: &[&str]) -> Output {
    let output = dir.join("bundle.tar");
    let logs = dir.join("logs");
    stackpack_bin()
        .current_dir(dir)
        .args([
            "build",
            &spec.to_string_lossy(),
            "--backend",
            "mock",
            "--output",
            &output.to_string_lossy(),
            "--log-dir",
            &logs.to_string_lossy(),
        ])
        .args(extra)
        .output()
        .unwrap()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn cli_version_exits_zero() {
    let output = stackpack_bin().arg("--version").output().unwrap();
    assert!(output.status.success(), "stackpack --version must exit 0");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("stackpack"), "version output: {stdout}");
}

#[test]
fn cli_help_lists_commands() {
    let output = stackpack_bin().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for cmd in ["build", "check", "versions", "completions"] {
        assert!(stdout.contains(cmd), "help must list '{cmd}'");
    }
}

#[test]
fn cli_build_database_only_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let spec = write_spec(dir.path(), "9.2", " []");

    let output = build(dir.path(), &spec, &[]);
    assert!(
        output.status.success(),
        "build must exit 0. stderr: {}",
        stderr(&output)
    );

    let file = std::fs::File::open(dir.path().join("bundle.tar")).unwrap();
    let mut archive = tar::Archive::new(file);
    let mut names = Vec::new();
    let mut manifest = String::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let name = entry.path().unwrap().to_string_lossy().into_owned();
        if name.ends_with("METADATA") {
            entry.read_to_string(&mut manifest).unwrap();
        }
        names.push(name.trim_end_matches('/').to_owned());
    }
    assert!(names.contains(&"stackpack/postgresql".to_owned()), "{names:?}");
    assert_eq!(manifest, "rockylinux 9.2\npostgresql 15.8\n");

    let logs: Vec<_> = std::fs::read_dir(dir.path().join("logs"))
        .unwrap()
        .collect();
    assert_eq!(logs.len(), 1);
}

#[test]
fn cli_build_json_summary() {
    let dir = tempfile::tempdir().unwrap();
    let spec = write_spec(
        dir.path(),
        "9.2",
        "\n  - name: barman\n    version: \"3.11.1\"",
    );

    let output = build(dir.path(), &spec, &["--json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["status"], "success");
    assert_eq!(
        json["manifest"],
        "rockylinux 9.2\npostgresql 15.8\nbarman 3.11.1\n"
    );
    assert_eq!(json["bundle"]["blake3"].as_str().unwrap().len(), 64);
    let steps: Vec<_> = json["outcomes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["step"].as_str().unwrap().to_owned())
        .collect();
    assert!(steps.contains(&"option:barman".to_owned()), "{steps:?}");
}

#[test]
fn cli_build_unsupported_os_version_exits_two_without_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let spec = write_spec(dir.path(), "7.9", " []");

    let output = build(dir.path(), &spec, &[]);
    assert_eq!(output.status.code(), Some(2), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("7.9"));
    assert!(!dir.path().join("logs").exists());
    assert!(!dir.path().join("bundle.tar").exists());
}

#[test]
fn cli_build_validates_before_checking_host_prerequisites() {
    let dir = tempfile::tempdir().unwrap();
    let spec = write_spec(dir.path(), "7.9", " []");

    let output = Command::new(env!("CARGO_BIN_EXE_stackpack"))
        .env_remove("STACKPACK_SKIP_PREREQS")
        .env("PATH", dir.path())
        .current_dir(dir.path())
        .args(["build", &spec.to_string_lossy(), "--backend", "podman"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("7.9"));
    assert!(!stderr(&output).contains("prerequisites"));
    assert!(!dir.path().join("logs").exists());
}

#[test]
fn cli_build_json_failure_reports_kind() {
    let dir = tempfile::tempdir().unwrap();
    let spec = write_spec(dir.path(), "7.9", " []");

    let output = build(dir.path(), &spec, &["--json"]);
    assert_eq!(output.status.code(), Some(2));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["status"], "failed");
    assert_eq!(json["kind"], "validation");
}

#[test]
fn cli_build_nonexistent_spec_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = build(dir.path(), &dir.path().join("missing.yaml"), &[]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("not found"));
}

#[test]
fn cli_build_rejects_relative_work_dir() {
    let dir = tempfile::tempdir().unwrap();
    let spec = write_spec(dir.path(), "9.2", " []");

    let output = build(dir.path(), &spec, &["--work-dir", "relative/dir"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(!dir.path().join("bundle.tar").exists());
}

#[test]
fn cli_check_prints_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let spec = write_spec(
        dir.path(),
        "8.10",
        "\n  - name: pg_hint_plan\n    version: \"1.5.2\"",
    );

    let output = stackpack_bin()
        .args(["check", &spec.to_string_lossy()])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "rockylinux 8.10\npostgresql 15.8\npg_hint_plan 1.5.2\n"
    );
}

#[test]
fn cli_check_rejects_unknown_option() {
    let dir = tempfile::tempdir().unwrap();
    let spec = write_spec(
        dir.path(),
        "9.2",
        "\n  - name: pgbouncer\n    version: \"1.0\"",
    );

    let output = stackpack_bin()
        .args(["check", &spec.to_string_lossy()])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("pgbouncer"));
}

#[test]
fn cli_versions_lists_builtin_matrix() {
    let output = stackpack_bin().arg("versions").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("postgresql"));
    assert!(stdout.contains("15.8"));
    assert!(stdout.contains("pg_hint_plan"));
}

#[test]
fn cli_versions_json_is_the_matrix() {
    let output = stackpack_bin().args(["--json", "versions"]).output().unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["postgresql"], serde_json::json!(["15.8"]));
    assert_eq!(json["pg_hint_plan"]["15"], serde_json::json!(["1.5.2"]));
}

#[test]
fn cli_matrix_override_changes_validation() {
    let dir = tempfile::tempdir().unwrap();
    let matrix = dir.path().join("matrix.json");
    std::fs::write(
        &matrix,
        r#"{"rockylinux": ["7.9"], "postgresql": ["15.8"]}"#,
    )
    .unwrap();
    let spec = write_spec(dir.path(), "7.9", " []");

    let output = stackpack_bin()
        .args([
            "--matrix",
            &matrix.to_string_lossy(),
            "check",
            &spec.to_string_lossy(),
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
}

#[test]
fn cli_check_and_build_agree_on_options_without_installer() {
    let dir = tempfile::tempdir().unwrap();
    let matrix = dir.path().join("matrix.json");
    std::fs::write(
        &matrix,
        r#"{"rockylinux": ["9.2"], "postgresql": ["15.8"], "pgbouncer": ["1.23"]}"#,
    )
    .unwrap();
    let spec = write_spec(
        dir.path(),
        "9.2",
        "\n  - name: pgbouncer\n    version: \"1.23\"",
    );
    let matrix_arg = matrix.to_string_lossy().into_owned();

    let check = stackpack_bin()
        .args(["--matrix", &matrix_arg, "check", &spec.to_string_lossy()])
        .output()
        .unwrap();
    assert_eq!(check.status.code(), Some(2));
    assert!(stderr(&check).contains("no handler registered for option 'pgbouncer'"));

    let build = build(dir.path(), &spec, &["--matrix", &matrix_arg]);
    assert_eq!(build.status.code(), Some(2));
    assert!(stderr(&build).contains("no handler registered for option 'pgbouncer'"));
    assert!(!dir.path().join("logs").exists());
}

#[test]
fn cli_completions_bash() {
    let output = stackpack_bin().args(["completions", "bash"]).output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("stackpack"));
}
