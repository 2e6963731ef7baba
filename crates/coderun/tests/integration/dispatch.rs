//! Dispatch against a scripted docker client
//!
//! Each test writes a small shell script that stands in for `docker`. It
//! records its arguments, the forwarded profile and (optionally) the payload
//! into its own directory, then plays the container's part.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use coderun::config::{Config, RunnerProfile};
use coderun::{
    Dispatcher, ExecutionPayload, ExecutionRequest, ExecutionResult, Phase,
};
use tempfile::TempDir;

struct FakeDocker {
    dir: TempDir,
}

impl FakeDocker {
    /// `body` runs in place of the container after the invocation is logged
    fn new(body: &str) -> Self {
        let dir = tempfile::Builder::new()
            .prefix("fake-docker-")
            .tempdir()
            .unwrap();
        let log = dir.path().display();
        let script = format!(
            r#"#!/bin/sh
log="{log}"
if [ "$1" = "rm" ]; then
    echo "$3" >> "$log/rm.log"
    exit 0
fi
printf '%s\n' "$@" > "$log/args"
printf '%s' "$CODERUN_PROFILE" > "$log/profile"
{body}
"#
        );

        let path = dir.path().join("docker");
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir }
    }

    fn binary(&self) -> PathBuf {
        self.dir.path().join("docker")
    }

    fn log(&self, name: &str) -> Option<String> {
        fs::read_to_string(self.dir.path().join(name)).ok()
    }

    fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.config())
    }

    fn config(&self) -> Config {
        let mut config = Config::default();
        config.docker_path = Some(self.binary());
        config
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }
}

const OK_REPORT: &str = r#"printf '{"stdout":"ok","stderr":"","returncode":0}'"#;

#[tokio::test]
async fn test_payload_bytes_reach_container() {
    let docker = FakeDocker::new(&format!(r#"cat > "$log/payload"; {OK_REPORT}"#));
    let result = docker
        .dispatcher()
        .submit(&ExecutionRequest::new("python", "print(1)"))
        .await;

    assert!(result.is_success(), "unexpected result: {result:?}");
    let payload: serde_json::Value =
        serde_json::from_str(&docker.log("payload").unwrap()).unwrap();
    assert_eq!(payload, serde_json::json!({"code": "print(1)", "input": ""}));
}

#[tokio::test]
async fn test_payload_carries_input_verbatim() {
    let docker = FakeDocker::new(&format!(r#"cat > "$log/payload"; {OK_REPORT}"#));
    let request = ExecutionRequest::new("python", "x = input()").with_stdin("3 4\r\n");
    docker.dispatcher().submit(&request).await;

    let raw = docker.log("payload").unwrap();
    let payload = ExecutionPayload::from_json(raw.as_bytes()).unwrap();
    assert_eq!(payload.code, "x = input()");
    assert_eq!(payload.input, "3 4\r\n");
}

#[tokio::test]
async fn test_submit_parts_defaults_absent_fields() {
    let docker = FakeDocker::new(&format!(r#"cat > "$log/payload"; {OK_REPORT}"#));
    docker.dispatcher().submit_parts("python", None, None).await;

    let payload: serde_json::Value =
        serde_json::from_str(&docker.log("payload").unwrap()).unwrap();
    assert_eq!(payload, serde_json::json!({"code": "", "input": ""}));
}

#[tokio::test]
async fn test_launch_arguments_match_template() {
    let docker = FakeDocker::new(&format!("cat > /dev/null; {OK_REPORT}"));
    docker
        .dispatcher()
        .submit(&ExecutionRequest::new("cpp", "int main() {}"))
        .await;

    let args = docker.log("args").unwrap();
    let args: Vec<&str> = args.lines().collect();
    assert_eq!(args.len(), 10, "unexpected arguments: {args:?}");
    assert_eq!(&args[..3], ["run", "-i", "--rm"]);
    assert!(args[3].starts_with("--name=coderun-"));
    assert_eq!(
        &args[4..],
        [
            "--network=none",
            "--cpus=1",
            "--memory=256m",
            "--pids-limit=64",
            "--env=CODERUN_PROFILE",
            "cpp-code-runner",
        ]
    );
}

#[tokio::test]
async fn test_container_names_are_unique() {
    let docker = FakeDocker::new(&format!("cat > /dev/null; {OK_REPORT}"));
    let dispatcher = docker.dispatcher();
    let request = ExecutionRequest::new("python", "print(1)");

    dispatcher.submit(&request).await;
    let first = docker.log("args").unwrap();
    dispatcher.submit(&request).await;
    let second = docker.log("args").unwrap();

    let name = |args: &str| args.lines().nth(3).map(str::to_owned);
    assert_ne!(name(&first), name(&second));
}

#[tokio::test]
async fn test_profile_forwarded_through_environment() {
    let docker = FakeDocker::new(&format!("cat > /dev/null; {OK_REPORT}"));
    docker
        .dispatcher()
        .submit(&ExecutionRequest::new("java", "class Main {}"))
        .await;

    let profile = RunnerProfile::from_json(&docker.log("profile").unwrap()).unwrap();
    let expected = docker.config().get_language("java").unwrap().profile();
    assert_eq!(profile, expected);
    assert_eq!(profile.source_name.as_str(), "Main.java");
}

#[tokio::test]
async fn test_unsupported_language_spawns_nothing() {
    let docker = FakeDocker::new(&format!("cat > /dev/null; {OK_REPORT}"));
    let result = docker
        .dispatcher()
        .submit(&ExecutionRequest::new("ruby", "puts 1"))
        .await;

    assert_eq!(result, ExecutionResult::UnsupportedLanguage);
    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        serde_json::json!({"error": "Unsupported language"})
    );
    assert!(docker.log("args").is_none());
    assert!(docker.log("profile").is_none());
}

#[tokio::test]
async fn test_orchestration_timeout_kills_and_removes_container() {
    let docker = FakeDocker::new("cat > /dev/null; exec sleep 30");
    let mut config = docker.config();
    config.timeouts.orchestration = 0.5;
    config.timeouts.cleanup = 2.0;

    let started = Instant::now();
    let result = Dispatcher::new(config)
        .submit(&ExecutionRequest::new("cpp", "int main() { for (;;); }"))
        .await;

    assert_eq!(result, ExecutionResult::Timeout);
    assert!(result.is_orchestrator_failure());
    assert!(started.elapsed() < Duration::from_secs(5));

    let args = docker.log("args").unwrap();
    let name = args.lines().nth(3).unwrap().trim_start_matches("--name=");
    let removed = docker.log("rm.log").expect("container was not removed");
    assert_eq!(removed.trim(), name);
}

#[tokio::test]
async fn test_timeout_ignores_stdin_that_is_never_read() {
    // The container never drains stdin; a large payload must not block past the deadline
    let docker = FakeDocker::new("exec sleep 30");
    let mut config = docker.config();
    config.timeouts.orchestration = 0.5;

    let code = "x".repeat(4 << 20);
    let started = Instant::now();
    let result = Dispatcher::new(config)
        .submit(&ExecutionRequest::new("python", code))
        .await;

    assert_eq!(result, ExecutionResult::Timeout);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_finished_container_is_not_removed() {
    let docker = FakeDocker::new(&format!("cat > /dev/null; {OK_REPORT}"));
    docker
        .dispatcher()
        .submit(&ExecutionRequest::new("python", "print(1)"))
        .await;
    assert!(docker.log("rm.log").is_none());
}

#[tokio::test]
async fn test_empty_output_surfaces_stderr() {
    let docker = FakeDocker::new(
        r#"cat > /dev/null
echo "docker: Error response from daemon: no such image" >&2
exit 125"#,
    );
    let result = docker
        .dispatcher()
        .submit(&ExecutionRequest::new("python", "print(1)"))
        .await;

    match &result {
        ExecutionResult::EmptyOutput { stderr } => {
            assert!(stderr.contains("Error response from daemon"))
        }
        other => panic!("expected empty output, got {other:?}"),
    }
    assert_eq!(result.error_message(), Some("Container returned no output"));
}

#[tokio::test]
async fn test_malformed_output_keeps_raw_text() {
    let docker = FakeDocker::new("cat > /dev/null; echo 'Segmentation fault'");
    let result = docker
        .dispatcher()
        .submit(&ExecutionRequest::new("python", "print(1)"))
        .await;

    assert_eq!(
        result,
        ExecutionResult::MalformedOutput {
            raw: "Segmentation fault\n".to_owned(),
            stderr: String::new()
        }
    );
}

#[tokio::test]
async fn test_stderr_attached_when_report_has_none() {
    let docker = FakeDocker::new(
        r#"cat > /dev/null
echo "WARNING: memory limit without swap" >&2
printf '{"stdout":"1","returncode":0}'"#,
    );
    let result = docker
        .dispatcher()
        .submit(&ExecutionRequest::new("python", "print(1)"))
        .await;

    assert_eq!(
        result,
        ExecutionResult::Success {
            stdout: "1".to_owned(),
            stderr: "WARNING: memory limit without swap\n".to_owned(),
            exit_code: 0
        }
    );
}

#[tokio::test]
async fn test_client_exit_status_does_not_override_report() {
    let docker = FakeDocker::new(&format!("cat > /dev/null; {OK_REPORT}; exit 1"));
    let result = docker
        .dispatcher()
        .submit(&ExecutionRequest::new("python", "print(1)"))
        .await;
    assert!(result.is_success());
}

#[tokio::test]
async fn test_sandbox_timeout_stays_on_sandbox_channel() {
    let docker = FakeDocker::new(r#"cat > /dev/null; printf '{"error":"Execution timed out"}'"#);
    let result = docker
        .dispatcher()
        .submit(&ExecutionRequest::new("python", "while True: pass"))
        .await;

    assert_eq!(
        result,
        ExecutionResult::SandboxTimeout {
            phase: Phase::Execute,
            stderr: None
        }
    );
    assert!(!result.is_orchestrator_failure());
}

#[tokio::test]
async fn test_compile_failure_passes_through() {
    let docker = FakeDocker::new(
        r#"cat > /dev/null; printf '{"error":"Compilation failed","stderr":"Main.java:3: error"}'"#,
    );
    let result = docker
        .dispatcher()
        .submit(&ExecutionRequest::new("java", "class Main {"))
        .await;

    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        serde_json::json!({"error": "Compilation failed", "stderr": "Main.java:3: error"})
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_are_independent() {
    // Echo the numeric input back as the program's stdout
    let docker = FakeDocker::new(
        r#"input=$(sed -n 's/.*"input":"\([0-9]*\)".*/\1/p')
printf '{"stdout":"%s","stderr":"","returncode":0}' "$input""#,
    );
    let dispatcher = docker.dispatcher();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                let request = ExecutionRequest::new("python", "print(input())")
                    .with_stdin(i.to_string());
                (i, dispatcher.submit(&request).await)
            })
        })
        .collect();

    for handle in handles {
        let (i, result) = handle.await.unwrap();
        match result {
            ExecutionResult::Success { stdout, .. } => assert_eq!(stdout, i.to_string()),
            other => panic!("submission {i} failed: {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_identical_submissions_give_identical_results() {
    let docker = FakeDocker::new(&format!("cat > /dev/null; {OK_REPORT}"));
    let dispatcher = docker.dispatcher();
    let request = ExecutionRequest::new("python", "print('hi')");

    let first = dispatcher.submit(&request).await;
    let second = dispatcher.submit(&request).await;
    assert_eq!(first, second);
    assert!(docker.path().join("args").exists());
}
