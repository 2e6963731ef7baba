//! Container process spawning and I/O
//!
//! Runs the docker client with separate stdout and stderr pipes and applies
//! the orchestration deadline.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::{Config, PROFILE_ENV_VAR};
use crate::docker::LaunchError;
use crate::docker::command::{DockerAction, DockerCommand};
use crate::process::{Bounded, own_process_group, run_bounded, terminate};

const REMOVAL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What a container left behind after exiting on its own
#[derive(Debug, Clone)]
pub struct ContainerOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Exit code of the docker client (the container's, unless docker failed)
    pub exit_code: Option<i32>,
}

#[derive(Debug)]
pub enum LaunchOutcome {
    /// The container exited before the deadline
    Exited(ContainerOutput),
    /// The deadline fired; the container was killed and its output discarded
    TimedOut,
}

/// Start one container from `image`, write `payload` to its stdin, and wait
/// for it under the orchestration deadline.
///
/// The runner profile is handed over through the client's environment and
/// forwarded into the container, so it never appears on the command line.
#[instrument(skip(config, profile_json, payload), fields(container))]
pub async fn launch(
    config: &Config,
    image: &str,
    profile_json: &str,
    payload: &[u8],
) -> Result<LaunchOutcome, LaunchError> {
    let deadline = config
        .timeouts
        .orchestration()
        .map_err(|e| LaunchError::InvalidTimeout("orchestration", e))?;
    let cleanup = config
        .timeouts
        .cleanup()
        .map_err(|e| LaunchError::InvalidTimeout("cleanup", e))?;

    let name = format!("coderun-{}", Uuid::new_v4());
    tracing::Span::current().record("container", name.as_str());

    let args = DockerCommand::new(config.docker_binary(), &name)
        .action(DockerAction::Run)
        .image(image)
        .limits(config.limits.clone())
        .env_forward(PROFILE_ENV_VAR)
        .build();

    debug!(?args, "starting container");

    let (program, rest) = args
        .split_first()
        .ok_or_else(|| LaunchError::CommandFailed("empty command arguments".to_string()))?;
    let mut command = Command::new(program);
    command
        .args(rest)
        .env(PROFILE_ENV_VAR, profile_json)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    own_process_group(&mut command);

    let mut child = command.spawn().map_err(LaunchError::SpawnFailed)?;
    let mut guard = ContainerGuard::new(config.docker_binary(), name.clone(), cleanup);

    match run_bounded(&mut child, payload, deadline).await {
        Ok(Bounded::Finished(output)) => {
            // `--rm` takes care of the container once the client returns
            guard.disarm();
            debug!(
                exit_code = ?output.status.code(),
                stdout_bytes = output.stdout.len(),
                stderr_bytes = output.stderr.len(),
                "container exited"
            );
            Ok(LaunchOutcome::Exited(ContainerOutput {
                stdout: output.stdout,
                stderr: output.stderr,
                exit_code: output.status.code(),
            }))
        }
        Ok(Bounded::Expired) => {
            warn!(?deadline, "container exceeded orchestration deadline, killing it");
            terminate(&mut child).await;
            if remove_container(config, &name).await {
                guard.disarm();
            }
            Ok(LaunchOutcome::TimedOut)
        }
        Err(source) => {
            warn!(error = %source, "lost track of container, killing it");
            terminate(&mut child).await;
            if remove_container(config, &name).await {
                guard.disarm();
            }
            Err(LaunchError::WaitFailed { name, source })
        }
    }
}

/// Force-remove a container, killing it if it is still running.
///
/// Bounded by the cleanup timeout. Returns whether docker confirmed the removal.
#[instrument(skip(config))]
pub async fn remove_container(config: &Config, name: &str) -> bool {
    let args = DockerCommand::new(config.docker_binary(), name)
        .action(DockerAction::Remove)
        .build();

    let cleanup = match config.timeouts.cleanup() {
        Ok(cleanup) => cleanup,
        Err(e) => {
            warn!(error = %e, "cleanup timeout is unusable, not removing container");
            return false;
        }
    };

    let Some((program, rest)) = args.split_first() else {
        return false;
    };
    let mut command = Command::new(program);
    command
        .args(rest)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match tokio::time::timeout(cleanup, command.output()).await {
        Ok(Ok(output)) if output.status.success() => {
            debug!("container removed");
            true
        }
        Ok(Ok(output)) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(stderr = %stderr.trim(), "failed to remove container");
            false
        }
        Ok(Err(e)) => {
            warn!(error = %e, "failed to run docker rm");
            false
        }
        Err(_) => {
            warn!("timed out removing container");
            false
        }
    }
}

/// Removes the container on drop unless disarmed.
///
/// Covers the case where the launch future is dropped mid-flight, and a
/// failed removal after the deadline fired.
#[derive(Debug)]
struct ContainerGuard {
    docker_path: PathBuf,
    name: String,
    cleanup: Duration,
    armed: bool,
}

impl ContainerGuard {
    fn new(docker_path: PathBuf, name: String, cleanup: Duration) -> Self {
        Self {
            docker_path,
            name,
            cleanup,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        warn!(
            container = %self.name,
            "container still tracked on drop, attempting best-effort removal"
        );

        let args = DockerCommand::new(&self.docker_path, &self.name)
            .action(DockerAction::Remove)
            .build();

        let cleanup = self.cleanup;
        std::thread::spawn(move || remove_blocking(&args, cleanup));
    }
}

/// Run a removal command from a plain thread, killing it once `cleanup`
/// has elapsed. Returns whether it exited successfully in time.
fn remove_blocking(args: &[String], cleanup: Duration) -> bool {
    let Some((program, rest)) = args.split_first() else {
        return false;
    };
    let mut child = match std::process::Command::new(program)
        .args(rest)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            warn!(error = %e, "best-effort removal could not run");
            return false;
        }
    };

    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) if status.success() => {
                debug!("best-effort removal succeeded");
                return true;
            }
            Ok(Some(status)) => {
                warn!(?status, "best-effort removal failed");
                return false;
            }
            Ok(None) if started.elapsed() >= cleanup => {
                warn!(?cleanup, "best-effort removal timed out, killing docker client");
                break;
            }
            Ok(None) => std::thread::sleep(REMOVAL_POLL_INTERVAL),
            Err(e) => {
                warn!(error = %e, "lost track of best-effort removal");
                break;
            }
        }
    }

    let _ = child.kill();
    let _ = child.wait();
    false
}
