//! Engine Integration Tests
//!
//! Drive the fuzz session, the load controller and the binary against small
//! shell-script runtimes.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use langfuzz::fuzzer::{ErrorKind, FuzzConfig, FuzzSession, ProcessHarness, RunState, SuiteProfile};
use langfuzz::load::{LoadPattern, LoadTestConfig, LoadTestController};
use langfuzz::reporter::{write_summary, ComponentResults, Report, RunSummary};

/// A toy runtime: division by zero is a runtime error, everything else
/// prints `ok`; coverage depends on the program length
const TOY_RUNTIME: &str = r#"#!/bin/sh
content=$(cat "$1")
if [ -n "$LANGFUZZ_COVERAGE_FILE" ]; then
  line=$(( ${#content} % 20 + 1 ))
  echo "{\"files\": {\"main.lang\": {\"lines\": [$line], \"total_lines\": 20}}}" > "$LANGFUZZ_COVERAGE_FILE"
fi
case "$content" in
  *"/ 0"*) echo "Runtime error: division by zero" >&2; exit 1 ;;
esac
echo ok
"#;

fn write_runtime(dir: &Path) -> PathBuf {
    let path = dir.join("toylang");
    std::fs::write(&path, TOY_RUNTIME).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

mod session_tests {
    use super::*;

    #[tokio::test]
    async fn finds_division_crash_and_writes_reports() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = write_runtime(dir.path());
        let output = dir.path().join("out");

        let config = FuzzConfig::with_suite(SuiteProfile::Quick)
            .with_output_dir(&output)
            .with_workers(2)
            .with_seed(1)
            .with_max_executions(30);
        let mut session =
            FuzzSession::new("toylang", config, Arc::new(ProcessHarness::new(runtime))).unwrap();

        let results = session.run().await.unwrap();

        assert_eq!(results.state, RunState::LimitReached);
        assert_eq!(results.total_tests, 30);
        assert!(results.unique_crashes >= 1);
        let crash = results
            .crashes
            .iter()
            .find(|c| c.message.contains("division by zero"))
            .expect("division crash recorded");
        assert_eq!(crash.error_kind, ErrorKind::Runtime);
        assert!(std::fs::read_dir(output.join("crashes")).unwrap().count() >= 1);

        let summary = RunSummary::new(
            "toylang",
            SuiteProfile::Quick,
            ComponentResults {
                fuzz: Some(results),
                load: None,
            },
            1.0,
        );
        write_summary(&output, &Report::new(summary)).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(output.join("summary.json")).unwrap())
                .unwrap();
        assert_eq!(json["totalTests"], 30);
        assert!(json["uniqueCrashes"].as_u64().unwrap() >= 1);
        assert!(output.join("summary.txt").exists());
    }

    #[tokio::test]
    async fn coverage_feedback_grows_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = write_runtime(dir.path());
        let output = dir.path().join("out");

        let config = FuzzConfig::with_suite(SuiteProfile::Quick)
            .with_output_dir(&output)
            .with_workers(2)
            .with_seed(3)
            .with_coverage(true)
            .with_max_executions(40);
        let harness = ProcessHarness::new(runtime).with_coverage(true);
        let mut session = FuzzSession::new("toylang", config, Arc::new(harness)).unwrap();

        let results = session.run().await.unwrap();

        assert!(results.coverage_percent > 0.0);
        assert!(results.interesting_inputs > 0);
        assert!(std::fs::read_dir(output.join("coverage")).unwrap().count() > 0);
    }

    #[tokio::test]
    async fn seed_directory_drives_first_executions() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = write_runtime(dir.path());
        let seeds = dir.path().join("seeds");
        std::fs::create_dir(&seeds).unwrap();
        std::fs::write(seeds.join("boom.lang"), "y = 10 / 0").unwrap();

        let config = FuzzConfig::with_suite(SuiteProfile::Quick)
            .with_output_dir(dir.path().join("out"))
            .with_seed_dir(Some(seeds))
            .with_workers(1)
            .with_max_executions(1);
        let mut session =
            FuzzSession::new("toylang", config, Arc::new(ProcessHarness::new(runtime))).unwrap();

        let results = session.run().await.unwrap();

        assert_eq!(results.unique_crashes, 1);
        assert_eq!(results.crashes[0].first_seen_test_case_id, "boom");
    }
}

mod load_tests {
    use super::*;

    #[tokio::test]
    async fn constant_load_executes_target() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = write_runtime(dir.path());

        let config = LoadTestConfig::new(LoadPattern::Constant)
            .with_loads(2, 2)
            .with_duration(Duration::from_secs(2))
            .with_tick_interval(Duration::from_millis(500));
        let cases = langfuzz::fuzzer::corpus::builtin_seeds();
        let controller =
            LoadTestController::new(config, Arc::new(ProcessHarness::new(runtime)), cases);

        let result = controller.run().await;

        assert!(result.success);
        assert!(result.total_executions > 0);
        assert!(!result.throughput_series.is_empty());
        assert_eq!(result.breaking_point, None);
    }
}

mod cli_tests {
    use super::*;

    fn langfuzz() -> Command {
        Command::new(env!("CARGO_BIN_EXE_langfuzz"))
    }

    #[test]
    fn ci_strict_fails_on_crash() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = write_runtime(dir.path());
        let output = dir.path().join("out");

        let status = langfuzz()
            .arg("run")
            .arg(&runtime)
            .args(["--suite", "quick", "--exclude", "load", "--seed", "5"])
            .args(["--max-executions", "20", "--ci-strict"])
            .arg("--output")
            .arg(&output)
            .status()
            .unwrap();

        assert_eq!(status.code(), Some(1));
        assert!(output.join("summary.json").exists());
        assert!(output.join("summary.txt").exists());
    }

    #[test]
    fn crash_without_ci_strict_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = write_runtime(dir.path());
        let reports = dir.path().join("reports");

        let status = langfuzz()
            .arg("run")
            .arg(&runtime)
            .args(["--suite", "quick", "--exclude", "load", "--max-executions", "10"])
            .arg("--output")
            .arg(dir.path().join("out"))
            .arg("--reports")
            .arg(&reports)
            .status()
            .unwrap();

        assert_eq!(status.code(), Some(0));
        assert!(reports.join("summary.json").exists());
    }

    #[test]
    fn unknown_component_is_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = write_runtime(dir.path());

        let output = langfuzz()
            .arg("run")
            .arg(&runtime)
            .args(["--exclude", "lod"])
            .arg("--output")
            .arg(dir.path().join("out"))
            .output()
            .unwrap();

        assert_eq!(output.status.code(), Some(2));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("Unknown component"));
        assert!(stderr.contains("load"));
    }

    #[test]
    fn missing_target_is_setup_error() {
        let dir = tempfile::tempdir().unwrap();

        let output = langfuzz()
            .arg("run")
            .arg(dir.path().join("no-such-runtime"))
            .arg("--output")
            .arg(dir.path().join("out"))
            .output()
            .unwrap();

        assert_eq!(output.status.code(), Some(2));
        assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));
    }
}
