//! End-to-end scenarios against a real Docker daemon
//!
//! Need the `*-code-runner` images, each with `coderun-runner` as its
//! entrypoint, available to the daemon. Container listings are global, so
//! run these with `--test-threads=1`.

use std::process::Command;
use std::time::{Duration, Instant};

use coderun::config::Config;
use coderun::{Dispatcher, ExecutionRequest, ExecutionResult};

use super::fixture_source;

fn dispatcher() -> Dispatcher {
    Dispatcher::with_defaults()
}

/// Names of all containers, running or not, started by coderun
fn coderun_containers() -> Vec<String> {
    let output = Command::new("docker")
        .args(["ps", "-a", "--filter", "name=coderun-", "--format", "{{.Names}}"])
        .output()
        .expect("failed to list containers");
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_owned)
        .collect()
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_python_hello() {
    let request = ExecutionRequest::new("python", fixture_source("hello.py"));
    let result = dispatcher().submit(&request).await;

    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        serde_json::json!({"stdout": "hi\n", "stderr": "", "returncode": 0})
    );
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_python_reads_input() {
    let request = ExecutionRequest::new("python", fixture_source("sum_input.py")).with_stdin("3 4");
    let result = dispatcher().submit(&request).await;

    match result {
        ExecutionResult::Success {
            stdout, exit_code, ..
        } => {
            assert_eq!(stdout, "7\n");
            assert_eq!(exit_code, 0);
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_java_compile_error() {
    let request = ExecutionRequest::new("java", fixture_source("compile_error.java"));
    let result = dispatcher().submit(&request).await;

    match result {
        ExecutionResult::CompileFailure { stderr } => assert!(!stderr.trim().is_empty()),
        other => panic!("expected compile failure, got {other:?}"),
    }
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_unregistered_language() {
    let before = coderun_containers();
    let result = dispatcher()
        .submit(&ExecutionRequest::new("ruby", "puts 1"))
        .await;

    assert_eq!(result, ExecutionResult::UnsupportedLanguage);
    assert_eq!(coderun_containers(), before);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_container_without_output() {
    let mut config = Config::default();
    let mut python = config.get_language("python").unwrap().clone();
    python.image = "coderun-missing-image:never-built".to_owned();
    config.languages.insert("missing".to_owned(), python);

    let result = Dispatcher::new(config)
        .submit(&ExecutionRequest::new("missing", "print(1)"))
        .await;

    match result {
        ExecutionResult::EmptyOutput { stderr } => assert!(!stderr.trim().is_empty()),
        other => panic!("expected empty output, got {other:?}"),
    }
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_infinite_loop_hits_orchestration_deadline() {
    // Inner run deadline longer than the outer one so the host has to step in
    let mut config = Config::default();
    if let Some(cpp) = config.languages.get_mut("cpp") {
        cpp.run.timeout = 60.0;
    }
    let outer = config.timeouts.orchestration().unwrap();

    let started = Instant::now();
    let result = Dispatcher::new(config)
        .submit(&ExecutionRequest::new("cpp", fixture_source("infinite_loop.cpp")))
        .await;

    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        serde_json::json!({"error": "Execution timed out (orchestration)"})
    );
    assert!(started.elapsed() < outer + Duration::from_secs(10));
    assert!(coderun_containers().is_empty());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_infinite_loop_hits_run_deadline() {
    let started = Instant::now();
    let result = dispatcher()
        .submit(&ExecutionRequest::new("cpp", fixture_source("infinite_loop.cpp")))
        .await;

    assert_eq!(result.error_message(), Some("Execution timed out"));
    assert!(!result.is_orchestrator_failure());
    assert!(started.elapsed() < Duration::from_secs(10));
}
