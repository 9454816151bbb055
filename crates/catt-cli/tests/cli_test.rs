//! Integration tests for the `catt` binary.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get the `catt` command for testing.
fn catt_cmd() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_catt"));
    // Only errors reach stderr; RUST_LOG replaces the info default.
    cmd.env("RUST_LOG", "error");
    cmd
}

fn write_config(dir: &Path, client: &Path, extra: &str) -> std::path::PathBuf {
    let path = dir.join("catt.toml");
    let text = format!(
        "[main]\nclient = \"{}\"\nlog_path = \"logs\"\ntimeout_secs = 5\n{extra}",
        client.display()
    );
    fs::write(&path, text).expect("write config");
    path
}

mod usage {
    use super::*;

    #[test]
    fn help_exits_cleanly() {
        catt_cmd()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("--only"));
    }

    #[test]
    fn host_is_required() {
        catt_cmd()
            .assert()
            .code(3)
            .stderr(predicate::str::contains("--host"));
    }

    #[test]
    fn port_zero_is_rejected() {
        catt_cmd()
            .args(["--host", "dut.local", "--port", "0"])
            .assert()
            .code(3)
            .stderr(predicate::str::contains("--port"));
    }

    #[test]
    fn unknown_only_id_is_rejected() {
        catt_cmd()
            .args(["--host", "dut.local", "--only", "bogus"])
            .assert()
            .code(3)
            .stderr(predicate::str::contains("server-verify"));
    }

    #[test]
    fn missing_config_file_fails() {
        let dir = TempDir::new().expect("tempdir");
        catt_cmd()
            .args(["--host", "dut.local", "--config"])
            .arg(dir.path().join("absent.toml"))
            .assert()
            .code(3)
            .stderr(predicate::str::contains("absent.toml"));
    }

    #[test]
    fn invalid_config_fails() {
        let dir = TempDir::new().expect("tempdir");
        let config = dir.path().join("catt.toml");
        fs::write(&config, "[main]\nclient = \"openssl\"\n[keys]\nproduction = \"k\"\n")
            .expect("write");
        catt_cmd()
            .args(["--host", "dut.local", "--config"])
            .arg(&config)
            .assert()
            .code(3)
            .stderr(predicate::str::contains("invalid config"));
    }
}

#[cfg(unix)]
mod suite {
    use super::*;
    use catt_core::Transcript;
    use catt_testkit::{FakeClientScript, fixtures};

    fn text(transcript: &Transcript) -> String {
        String::from_utf8_lossy(transcript.raw()).into_owned()
    }

    #[test]
    fn all_cases_skipped_without_inputs() {
        let dir = TempDir::new().expect("tempdir");
        let script = FakeClientScript::fixed(&text(&fixtures::accepted()), 0).expect("script");
        let config = write_config(dir.path(), &script.path(), "");

        catt_cmd()
            .args(["--host", "dut.local", "--config"])
            .arg(&config)
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "Testing: Verify Server's X.509 or DTCP certificate",
            ))
            .stdout(predicate::str::contains("TEST SKIPPED"))
            .stdout(predicate::str::contains(
                "5 tests: 0 passed, 0 failed, 5 skipped, 0 environment errors",
            ));

        assert!(dir.path().join("logs").is_dir());
        assert!(script.calls().is_empty());
    }

    #[test]
    fn rust_log_controls_stderr_verbosity() {
        let dir = TempDir::new().expect("tempdir");
        let script = FakeClientScript::fixed(&text(&fixtures::accepted()), 0).expect("script");
        let config = write_config(dir.path(), &script.path(), "");

        catt_cmd()
            .args(["--host", "dut.local", "--config"])
            .arg(&config)
            .assert()
            .success()
            .stderr(predicate::str::contains("starting CVP2 authentication tests").not())
            .stderr(predicate::str::contains("INFO").not());

        catt_cmd()
            .env_remove("RUST_LOG")
            .args(["--host", "dut.local", "--config"])
            .arg(&config)
            .assert()
            .success()
            .stderr(predicate::str::contains("starting CVP2 authentication tests"));
    }

    #[test]
    fn case_header_comes_before_its_outcome() {
        let dir = TempDir::new().expect("tempdir");
        let script = FakeClientScript::fixed(&text(&fixtures::rejected()), 1).expect("script");
        let config = write_config(
            dir.path(),
            &script.path(),
            "[libraries]\ntest_lib_cvp2 = \"lib/test.so\"\n[keys]\ntest_key_cvp2 = \"keys/test\"\n",
        );

        let output = catt_cmd()
            .args(["--host", "dut.local", "--only", "test-cvp2", "--config"])
            .arg(&config)
            .output()
            .expect("run catt");
        let stdout = String::from_utf8_lossy(&output.stdout);
        let lines: Vec<_> = stdout.lines().collect();
        assert!(lines[0].starts_with("Testing: Client DTCP Test Key With CVP2 Bit (log: "));
        assert_eq!(lines[1], "Connection failed");
        assert_eq!(lines[2], "TEST SUCCEEDED");
    }

    #[test]
    fn unwritable_report_is_a_setup_error() {
        let dir = TempDir::new().expect("tempdir");
        let script = FakeClientScript::fixed(&text(&fixtures::accepted()), 0).expect("script");
        let config = write_config(dir.path(), &script.path(), "");

        catt_cmd()
            .args(["--host", "dut.local", "--config"])
            .arg(&config)
            .arg("--report")
            .arg(dir.path().join("missing/report.jsonl"))
            .assert()
            .code(3)
            .stdout(predicate::str::contains("5 tests: 0 passed"))
            .stderr(predicate::str::contains("failed to create report"));
    }

    #[test]
    fn accepted_test_key_fails_the_run() {
        let dir = TempDir::new().expect("tempdir");
        let script = FakeClientScript::fixed(&text(&fixtures::accepted()), 0).expect("script");
        let config = write_config(
            dir.path(),
            &script.path(),
            "[libraries]\ntest_lib_cvp2 = \"lib/test.so\"\n[keys]\ntest_key_cvp2 = \"keys/test\"\n",
        );

        catt_cmd()
            .args(["--host", "dut.local", "--only", "test-cvp2", "--debug", "--config"])
            .arg(&config)
            .assert()
            .code(1)
            .stdout(predicate::str::contains("Running: "))
            .stdout(predicate::str::contains("HTTP Status: 200 OK"))
            .stdout(predicate::str::contains("TEST FAILED"));

        let calls = script.calls();
        assert_eq!(calls.len(), 1);
        let lib = dir.path().join("lib/test.so");
        assert!(calls[0].contains(&format!("-dtcp_dll_path {}", lib.display())));
        assert!(dir.path().join("logs/test-cvp2.log").is_file());
    }

    #[test]
    fn rejected_test_key_passes_and_writes_report() {
        let dir = TempDir::new().expect("tempdir");
        let script = FakeClientScript::fixed(&text(&fixtures::rejected()), 1).expect("script");
        let config = write_config(
            dir.path(),
            &script.path(),
            "[libraries]\ntest_lib_cvp2 = \"lib/test.so\"\n[keys]\ntest_key_cvp2 = \"keys/test\"\n",
        );
        let report = dir.path().join("report.jsonl");
        let logs = dir.path().join("custom-logs");

        catt_cmd()
            .args(["--host", "dut.local", "--path", "status", "--config"])
            .arg(&config)
            .arg("--report")
            .arg(&report)
            .arg("--log-dir")
            .arg(&logs)
            .assert()
            .success()
            .stdout(predicate::str::contains("Connection failed"))
            .stdout(predicate::str::contains("TEST SUCCEEDED"));

        assert_eq!(script.last_request(), b"GET /status HTTP/1.0\r\n\r\n".to_vec());
        assert!(logs.join("test-cvp2.log").is_file());

        let text = fs::read_to_string(&report).expect("report");
        let records: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        assert_eq!(records.len(), 5);
        assert_eq!(records[0]["log_id"], "server-verify");
        assert_eq!(records[0]["verdict"], "SKIPPED");
        assert_eq!(records[3]["log_id"], "test-cvp2");
        assert_eq!(records[3]["verdict"], "PASS");
        assert_eq!(records[3]["run_id"], records[0]["run_id"]);
    }

    #[test]
    fn client_without_dtcp_is_environment_error() {
        let dir = TempDir::new().expect("tempdir");
        let script =
            FakeClientScript::fixed(&text(&fixtures::unsupported_extension()), 1).expect("script");
        let config = write_config(
            dir.path(),
            &script.path(),
            "[libraries]\nproduction_lib_cvp2 = \"lib/prod.so\"\n[keys]\nproduction_key_cvp2 = \"keys/prod\"\n",
        );

        catt_cmd()
            .args(["--host", "dut.local", "--only", "production-cvp2", "--config"])
            .arg(&config)
            .assert()
            .code(2)
            .stdout(predicate::str::contains("ENVIRONMENT ERROR"))
            .stdout(predicate::str::contains("CVP2 OpenSSL build"));
    }

    #[test]
    fn server_verification_reports_both_stages() {
        let dir = TempDir::new().expect("tempdir");
        let script = FakeClientScript::split(
            (&text(&fixtures::generic_verify_failed()), 0),
            (&text(&fixtures::dtcp_server(true, false)), 0),
        )
        .expect("script");
        let config = write_config(
            dir.path(),
            &script.path(),
            "[libraries]\nproduction_lib_cvp2 = \"lib/prod.so\"\n[keys]\nproduction_key_cvp2 = \"keys/prod\"\n",
        );

        catt_cmd()
            .args(["--host", "dut.local", "--only", "server-verify", "--config"])
            .arg(&config)
            .assert()
            .code(1)
            .stdout(predicate::str::contains(
                "Server's X.509 certificate did not verify, checking DTCP certificate",
            ))
            .stdout(predicate::str::contains("Server's DTCP certificate is valid"))
            .stdout(predicate::str::contains("CVP2 bit is NOT set in remote certificate"))
            .stdout(predicate::str::contains("TEST FAILED"));

        assert_eq!(script.calls().len(), 2);
    }
}
