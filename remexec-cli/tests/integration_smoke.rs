//! Smoke tests for the remexec binary

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// remexec with an isolated (missing) config file and a clean environment
fn remexec(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("remexec").unwrap();
    cmd.env("REMEXEC_CONFIG", config_dir.path().join("config.toml"))
        .env_remove("REMEXEC_BACKEND")
        .env_remove("REMEXEC_PASSWORD")
        .env_remove("RUST_LOG");
    cmd
}

// === Help Tests ===

#[test]
fn test_run_help() {
    let dir = TempDir::new().unwrap();
    remexec(&dir)
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Kill the backend after this many seconds"));
}

#[test]
fn test_args_help() {
    let dir = TempDir::new().unwrap();
    remexec(&dir)
        .args(["args", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Print the password instead of masking it"));
}

#[test]
fn test_run_requires_command() {
    let dir = TempDir::new().unwrap();
    remexec(&dir).args(["run", "10.0.0.5"]).assert().failure();
}

#[test]
fn test_completions_bash() {
    let dir = TempDir::new().unwrap();
    remexec(&dir)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("remexec"));
}

// === Args Tests ===

#[test]
fn test_args_winexe_masks_password() {
    let dir = TempDir::new().unwrap();
    remexec(&dir)
        .args([
            "args",
            "10.0.0.5",
            "--program",
            "/opt/bin/winexe",
            "-u",
            "admin",
            "-p",
            "s3cret",
            "--system",
            "--",
            "ipconfig",
            "/all",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("/opt/bin/winexe"))
        .stdout(predicate::str::contains("--user=admin%****"))
        .stdout(predicate::str::contains("--system"))
        .stdout(predicate::str::contains("//10.0.0.5"))
        .stdout(predicate::str::contains("'ipconfig /all'"))
        .stdout(predicate::str::contains("s3cret").not());
}

#[test]
fn test_args_show_password() {
    let dir = TempDir::new().unwrap();
    remexec(&dir)
        .args([
            "args",
            "host",
            "--program",
            "/opt/bin/winexe",
            "-u",
            "admin",
            "-p",
            "s3cret",
            "--show-password",
            "dir",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("--user=admin%s3cret"));
}

#[test]
fn test_args_psexec_json() {
    let dir = TempDir::new().unwrap();
    let output = remexec(&dir)
        .args([
            "args",
            "srv01",
            "--backend",
            "psexec",
            "--program",
            "/opt/bin/PsExec64.exe",
            "--elevated",
            "--json",
            "cmd",
            "/c",
            "ver",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(doc["backend"], "psexec");
    let args: Vec<&str> = doc["args"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(
        args,
        vec![r"\\srv01", "-h", "-accepteula", "-nobanner", "cmd", "/c", "ver"]
    );
}

#[test]
fn test_args_uses_host_profile() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("config.toml"),
        r#"
[backend]
program = "/opt/impacket/psexec.py"

[hosts.lab]
host = "192.168.56.10"
username = "labadmin"
password_env = "REMEXEC_TEST_LAB_PASSWORD"
"#,
    )
    .unwrap();

    remexec(&dir)
        .env("REMEXEC_TEST_LAB_PASSWORD", "pw")
        .args(["args", "lab", "hostname"])
        .assert()
        .success()
        .stdout(predicate::str::contains("labadmin:****@192.168.56.10"));
}

// === Config Tests ===

#[test]
fn test_config_path_honors_env() {
    let dir = TempDir::new().unwrap();
    remexec(&dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"))
        .stdout(predicate::str::contains(
            dir.path().display().to_string(),
        ));
}

#[test]
fn test_config_init_then_validate() {
    let dir = TempDir::new().unwrap();
    remexec(&dir).args(["config", "init"]).assert().success();
    assert!(dir.path().join("config.toml").exists());

    remexec(&dir)
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    remexec(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration valid"));
}

// === Run Tests (fake backends) ===

#[cfg(unix)]
mod fake_backend {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    fn install(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[test]
    fn test_run_streams_backend_output() {
        let dir = TempDir::new().unwrap();
        let winexe = install(&dir, "winexe", "for a in \"$@\"; do echo \"arg=$a\"; done");

        remexec(&dir)
            .args(["run", "10.0.0.5", "--program"])
            .arg(&winexe)
            .args(["-u", "admin", "-p", "pw", "--", "cmd", "/c", "echo hi"])
            .assert()
            .success()
            .stdout(predicate::str::contains("arg=--user=admin%pw\n"))
            .stdout(predicate::str::contains("arg=//10.0.0.5\n"))
            .stdout(predicate::str::contains("arg=cmd /c echo hi\n"));
    }

    #[test]
    fn test_run_drops_impacket_noise() {
        let dir = TempDir::new().unwrap();
        let psexec_py = install(
            &dir,
            "psexec.py",
            "echo 'Impacket v0.11.0 - Copyright 2023 Fortra'\n\
             echo '[*] Requesting shares on 10.0.0.5.....'\n\
             echo 'WIN-REMOTE'",
        );

        remexec(&dir)
            .args(["run", "10.0.0.5", "--program"])
            .arg(&psexec_py)
            .arg("hostname")
            .assert()
            .success()
            .stdout("WIN-REMOTE\n");
    }

    #[test]
    fn test_run_propagates_exit_code() {
        let dir = TempDir::new().unwrap();
        let winexe = install(&dir, "winexe", "echo 'NT_STATUS_LOGON_FAILURE' >&2\nexit 7");

        remexec(&dir)
            .args(["run", "host", "--program"])
            .arg(&winexe)
            .arg("dir")
            .assert()
            .code(7)
            .stderr(predicate::str::contains("NT_STATUS_LOGON_FAILURE"))
            .stderr(predicate::str::contains("Exit code: 7"));
    }

    #[test]
    fn test_run_timeout_exits_124() {
        let dir = TempDir::new().unwrap();
        let winexe = install(&dir, "winexe", "echo started\nexec sleep 30");

        remexec(&dir)
            .args(["run", "host", "--timeout", "1", "--program"])
            .arg(&winexe)
            .arg("dir")
            .timeout(std::time::Duration::from_secs(20))
            .assert()
            .code(124)
            .stdout(predicate::str::contains("started"))
            .stderr(predicate::str::contains("Timed out"));
    }

    #[test]
    fn test_run_json_report() {
        let dir = TempDir::new().unwrap();
        let winexe = install(&dir, "winexe", "echo one\necho two\necho warn >&2");

        let output = remexec(&dir)
            .args(["run", "host", "--json", "--program"])
            .arg(&winexe)
            .arg("dir")
            .output()
            .unwrap();
        assert!(output.status.success());

        let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(doc["success"], true);
        assert_eq!(doc["timed_out"], false);
        assert_eq!(doc["exit_code"], 0);
        assert_eq!(doc["stdout"], "one\ntwo\n");
        assert_eq!(doc["stderr"], "warn\n");
        assert_eq!(doc["backend"]["kind"], "winexe");
    }

    #[test]
    fn test_run_missing_program_exits_127_in_both_modes() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("no-such-winexe");

        remexec(&dir)
            .args(["run", "host", "--program"])
            .arg(&missing)
            .arg("dir")
            .assert()
            .code(127)
            .stderr(predicate::str::contains("failed to spawn"));

        let output = remexec(&dir)
            .args(["run", "host", "--json", "--program"])
            .arg(&missing)
            .arg("dir")
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(127));

        let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(doc["success"], false);
        assert!(doc["error"].as_str().unwrap().contains("failed to spawn"));
    }
}
