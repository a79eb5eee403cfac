//! Binary behaviour: modes, verbs and exit codes

use super::common::{read_to_string, Sandbox};
use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_dry_run_succeeds_without_the_tool() {
    let sandbox = Sandbox::new();
    sandbox
        .command()
        .args(["--dry-run", "design-patterns"])
        .assert()
        .success()
        .stdout(predicate::str::contains("DESIGN PATTERNS ANALYSIS - DRY RUN"))
        .stdout(predicate::str::contains("target-repo"))
        .stdout(predicate::str::contains("[CODE_PATH]").not());

    assert!(!sandbox.rate_file().exists());
}

#[test]
fn test_dry_run_wins_over_execute() {
    let sandbox = Sandbox::new();
    sandbox
        .command()
        .args(["--execute", "--dry-run", "--yes", "cloud"])
        .assert()
        .success()
        .stdout(predicate::str::contains("DRY RUN"));
}

#[test]
fn test_placeholder_is_the_default_mode() {
    let sandbox = Sandbox::new();
    sandbox
        .command()
        .arg("algorithms")
        .assert()
        .success()
        .stdout(predicate::str::contains("ANALYSIS PLACEHOLDER"))
        .stdout(predicate::str::contains("main.py"))
        .stdout(predicate::str::contains("--execute algorithms"));
}

#[test]
fn test_chain_dry_run_keeps_requested_order() {
    let sandbox = Sandbox::new();
    let output = sandbox
        .command()
        .args(["--dry-run", "all", "--chain", "--patterns", "cloud,algorithms"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let cloud = stdout.find("1. Cloud Architecture Patterns Analysis:").unwrap();
    let algorithms = stdout
        .find("2. Algorithms & Data Structures Analysis:")
        .unwrap();
    assert!(cloud < algorithms);
    assert!(!stdout.contains("Design Patterns Analysis:"));
}

#[test]
fn test_all_without_chain_renders_each_category() {
    let sandbox = Sandbox::new();
    let output = sandbox
        .command()
        .args(["--dry-run", "all"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.matches("- DRY RUN ===").count(), 4);
}

#[test]
fn test_service_collab_dry_run() {
    let sandbox = Sandbox::new();
    sandbox
        .command()
        .args(["--dry-run", "service-collab"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Supported patterns: Saga"));
}

#[test]
fn test_list_specs() {
    let sandbox = Sandbox::new();
    sandbox
        .command()
        .arg("list-specs")
        .assert()
        .success()
        .stdout(predicate::str::contains("Main:"))
        .stdout(predicate::str::contains("algorithms-data-structures-spec.yaml"))
        .stdout(predicate::str::contains("Service Collaboration:"));
}

#[test]
fn test_usage_on_fresh_record() {
    let sandbox = Sandbox::new();
    sandbox
        .command()
        .arg("usage")
        .assert()
        .success()
        .stdout(predicate::str::contains("Total requests: 0"))
        .stdout(predicate::str::contains("0 / 10"));
}

#[test]
fn test_missing_target_path_fails() {
    Command::cargo_bin("pattern-discovery")
        .unwrap()
        .args(["--target-path", "/definitely/not/a/real/dir", "--dry-run", "cloud"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_missing_knowledge_base_fails() {
    let sandbox = Sandbox::new();
    sandbox
        .command()
        .env("PATTERN_DISCOVERY_ROOT", sandbox.dir.path())
        .args(["--dry-run", "cloud"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cloud-architecture-spec.yaml"));
}

#[test]
fn test_execute_with_missing_tool_fails() {
    let sandbox = Sandbox::new();
    sandbox
        .command()
        .args(["--execute", "--yes", "cloud"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_test_claude_with_missing_tool_fails() {
    let sandbox = Sandbox::new();
    sandbox
        .command()
        .arg("test-claude")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("pattern-discovery-missing-tool"));
}

#[cfg(unix)]
mod with_fake_tool {
    use super::*;

    #[test]
    fn test_execute_forwards_model_and_records_usage() {
        let sandbox = Sandbox::new();
        let tool = sandbox.fake_tool("fake-claude", r#"echo "model=$3""#);

        sandbox
            .command()
            .env("PATTERN_DISCOVERY_TOOL", &tool)
            .args(["--execute", "--yes", "--model", "haiku", "algorithms"])
            .assert()
            .success()
            .stdout(predicate::str::contains("model=haiku"))
            .stdout(predicate::str::contains("Algorithms & Data Structures Results"));

        let record: serde_json::Value =
            serde_json::from_str(&read_to_string(&sandbox.rate_file())).unwrap();
        assert_eq!(record["total_requests"], 1);
        assert_eq!(record["minute"]["used"], 1);
    }

    #[test]
    fn test_declined_confirmation_runs_nothing() {
        let sandbox = Sandbox::new();
        let marker = sandbox.dir.path().join("ran");
        let tool = sandbox.fake_tool("fake-claude", &format!("touch {}", marker.display()));

        sandbox
            .command()
            .env("PATTERN_DISCOVERY_TOOL", &tool)
            .args(["--execute", "cloud"])
            .write_stdin("n\n")
            .assert()
            .code(130)
            .stdout(predicate::str::contains("Proceed? [y/N]"))
            .stdout(predicate::str::contains("Aborted."));

        assert!(!marker.exists());
        assert!(!sandbox.rate_file().exists());
    }

    #[test]
    fn test_failing_tool_reports_stderr() {
        let sandbox = Sandbox::new();
        let tool = sandbox.fake_tool("fake-claude", "echo 'quota exhausted' >&2\nexit 3");

        sandbox
            .command()
            .env("PATTERN_DISCOVERY_TOOL", &tool)
            .args(["--execute", "--yes", "design-patterns"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("quota exhausted"))
            .stderr(predicate::str::contains("exit code 3"));
    }

    #[test]
    fn test_timeout_exits_124() {
        let sandbox = Sandbox::new();
        let tool = sandbox.fake_tool("fake-claude", "sleep 30");

        let started = std::time::Instant::now();
        sandbox
            .command()
            .env("PATTERN_DISCOVERY_TOOL", &tool)
            .args(["--execute", "--yes", "--timeout", "1", "cloud"])
            .assert()
            .code(124)
            .stderr(predicate::str::contains("timed out"));
        assert!(started.elapsed() < std::time::Duration::from_secs(15));
    }

    #[test]
    fn test_stream_prints_lines() {
        let sandbox = Sandbox::new();
        let tool = sandbox.fake_tool("fake-claude", "echo first\necho second");

        let output = sandbox
            .command()
            .env("PATTERN_DISCOVERY_TOOL", &tool)
            .args(["--execute", "--yes", "--stream", "architectural"])
            .output()
            .unwrap();

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        let first = stdout.find("first").unwrap();
        let second = stdout.find("second").unwrap();
        assert!(first < second);
        assert_eq!(stdout.matches("first").count(), 1);
    }

    #[test]
    fn test_test_claude_reports_version() {
        let sandbox = Sandbox::new();
        let tool = sandbox.fake_tool("fake-claude", "echo 'fake-claude 9.9.9'");

        sandbox
            .command()
            .env("PATTERN_DISCOVERY_TOOL", &tool)
            .arg("test-claude")
            .assert()
            .success()
            .stdout(predicate::str::contains("fake-claude 9.9.9"));
    }

    #[test]
    fn test_rate_limit_refuses_second_run() {
        let sandbox = Sandbox::new();
        let config = format!(
            "rate_file: {}\nlimits:\n  per_minute: 1\n",
            sandbox.rate_file().display()
        );
        std::fs::write(sandbox.dir.path().join("config.yaml"), config).unwrap();
        let tool = sandbox.fake_tool("fake-claude", "echo ok");

        sandbox
            .command()
            .env("PATTERN_DISCOVERY_TOOL", &tool)
            .args(["--execute", "--yes", "cloud"])
            .assert()
            .success();

        sandbox
            .command()
            .env("PATTERN_DISCOVERY_TOOL", &tool)
            .args(["--execute", "--yes", "cloud"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("minute"));
    }

    #[test]
    fn test_session_returns_tool_exit_code() {
        let sandbox = Sandbox::new();
        let tool = sandbox.fake_tool("fake-claude", "exit 3");

        sandbox
            .command()
            .env("PATTERN_DISCOVERY_TOOL", &tool)
            .arg("session")
            .assert()
            .code(3);

        let record: serde_json::Value =
            serde_json::from_str(&read_to_string(&sandbox.rate_file())).unwrap();
        assert_eq!(record["total_requests"], 1);
    }

    #[test]
    fn test_session_success_exits_zero() {
        let sandbox = Sandbox::new();
        let tool = sandbox.fake_tool("fake-claude", r#"echo "session model=$2""#);

        sandbox
            .command()
            .env("PATTERN_DISCOVERY_TOOL", &tool)
            .args(["--model", "haiku", "session"])
            .assert()
            .success()
            .stdout(predicate::str::contains("session model=haiku"));
    }

    #[test]
    fn test_output_survives_lingering_background_process() {
        let sandbox = Sandbox::new();
        let tool = sandbox.fake_tool("fake-claude", "echo the-analysis-result\nsleep 30 &");

        let started = std::time::Instant::now();
        sandbox
            .command()
            .env("PATTERN_DISCOVERY_TOOL", &tool)
            .args(["--execute", "--yes", "cloud"])
            .assert()
            .success()
            .stdout(predicate::str::contains("the-analysis-result"));
        assert!(started.elapsed() < std::time::Duration::from_secs(15));
    }
}
