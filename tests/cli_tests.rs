mod common;

use common::fixture::Fixture;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn run(fixture: &Fixture, args: &[&str], envs: &[(&str, &Path)]) -> Output {
    let exe = env!("CARGO_BIN_EXE_gatewaygen");
    let mut command = Command::new(exe);
    command
        .current_dir(fixture.root())
        .env("GATEWAYGEN_LOG_LEVEL", "warn")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(fixture.root().join("build.yaml"))
        .args(args);
    for (key, value) in envs {
        command.env(key, value);
    }
    command.output().expect("run gatewaygen")
}

/// Executable shell script standing in for a formatter binary.
fn stub_formatter(dir: &Path, name: &str, body: &str) -> PathBuf {
    let stub = dir.join(name);
    fs::write(&stub, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = fs::metadata(&stub).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&stub, perms).unwrap();
    stub
}

#[test]
fn test_cli_builds_and_reports() {
    let fixture = Fixture::echo_mirror_bounce();
    let output = run(&fixture, &["--no-format"], &[]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("3 generated"), "{stdout}");
    assert!(fixture.gen_dir().join("clients/echo/echo.go").is_file());

    let again = run(&fixture, &["--no-format"], &[]);
    assert!(again.status.success());
    assert!(String::from_utf8_lossy(&again.stdout).contains("0 generated, 3 unchanged"));
}

#[test]
fn test_cli_selective_instance() {
    let fixture = Fixture::echo_mirror_bounce();
    let output = run(&fixture, &["--no-format", "--instance", "mirror", "--type", "client"], &[]);
    assert!(output.status.success());
    assert!(fixture.gen_dir().join("clients/mirror/mirror.go").is_file());
    assert!(!fixture.gen_dir().join("clients/echo").exists());
}

#[test]
fn test_cli_cycle_exits_with_one() {
    let fixture = Fixture::new();
    fixture.write("idl/clients/a/a.proto", common::fixture::ECHO_PROTO);
    fixture.write("idl/clients/b/b.proto", common::fixture::ECHO_PROTO);
    fixture.client("a", "grpc", "clients/a/a.proto", &["b"]);
    fixture.client("b", "grpc", "clients/b/b.proto", &["a"]);

    let output = run(&fixture, &["--no-format"], &[]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("cycle-detected"), "{stderr}");
    assert!(!fixture.gen_dir().exists());
}

#[test]
fn test_cli_missing_config_exits_with_one() {
    let fixture = Fixture::new();
    fs::remove_file(fixture.root().join("build.yaml")).unwrap();
    let output = run(&fixture, &[], &[]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_cli_runs_formatters_on_staged_files() {
    let fixture = Fixture::echo_mirror_bounce();
    let bin = tempfile::tempdir().unwrap();
    let log = bin.path().join("formatted.log");
    let gofmt = stub_formatter(
        bin.path(),
        "gofmt",
        &format!("for f in \"$@\"; do echo \"$f\" >> {}; done", log.display()),
    );
    let goimports = stub_formatter(bin.path(), "goimports", "exit 0");

    let output = run(
        &fixture,
        &[],
        &[
            ("GATEWAYGEN_GOFMT_BIN", gofmt.as_path()),
            ("GATEWAYGEN_GOIMPORTS_BIN", goimports.as_path()),
        ],
    );
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let formatted = fs::read_to_string(&log).unwrap();
    assert!(formatted.contains("-s"));
    assert!(formatted.contains("echo.go"));
    // Formatting happens before the swap, never in the output tree.
    assert!(formatted.contains(".gatewaygen"));
}

#[test]
fn test_cli_formatter_failure_leaves_tree_untouched() {
    let fixture = Fixture::echo_mirror_bounce();
    let bin = tempfile::tempdir().unwrap();
    let gofmt = stub_formatter(bin.path(), "gofmt", "echo 'syntax error' >&2; exit 2");

    let output = run(&fixture, &[], &[("GATEWAYGEN_GOFMT_BIN", gofmt.as_path())]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("formatter-failed"));
    assert!(!fixture.gen_dir().join("clients").exists());
    assert!(!fixture.gen_dir().join(".gatewaygen/cache.json").exists());
}
