//! In-container runner
//!
//! Reads one payload, writes the code into a scratch directory, optionally
//! compiles it, runs it with the payload's input and reports exactly one
//! [`SandboxReport`]. Each phase runs in its own process group under its own
//! deadline.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, TryFromFloatSecsError};

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::config::RunnerProfile;
use crate::process::{
    Bounded, CapturedOutput, kill_process_group, own_process_group, run_bounded, terminate,
};
use crate::sandbox::compile::CompileOutcome;
use crate::sandbox::workspace::Workspace;
use crate::types::{ExecutionPayload, INVALID_INPUT_JSON, Phase, SandboxReport};

mod compile;
mod execute;
mod workspace;

/// Errors that stop the runner from producing a program outcome
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to create work directory: {0}")]
    WorkDir(#[source] std::io::Error),

    #[error("failed to write source file {path}: {source}")]
    WriteSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed while waiting for {0} step: {1}")]
    WaitFailed(Phase, #[source] std::io::Error),

    #[error("{0} command is empty")]
    EmptyCommand(Phase),

    #[error("{0} timeout is not a usable duration: {1}")]
    InvalidDeadline(Phase, #[source] TryFromFloatSecsError),
}

/// Runs submissions according to one language profile
#[derive(Debug, Clone)]
pub struct SandboxRunner {
    profile: RunnerProfile,
}

impl SandboxRunner {
    pub fn new(profile: RunnerProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &RunnerProfile {
        &self.profile
    }

    /// Decode raw stdin bytes and run the payload they carry
    pub async fn handle(&self, raw: &[u8]) -> SandboxReport {
        match ExecutionPayload::from_json(raw) {
            Ok(payload) => self.run(&payload).await,
            Err(e) => {
                warn!(error = %e, "payload is not valid JSON");
                SandboxReport::Failed {
                    error: INVALID_INPUT_JSON.to_owned(),
                    stderr: Some(e.to_string()),
                }
            }
        }
    }

    /// Compile (if needed) and run one payload.
    ///
    /// Infrastructure errors are reported as [`SandboxReport::Failed`]; this
    /// never returns without a report.
    #[instrument(skip_all, fields(source_name = %self.profile.source_name))]
    pub async fn run(&self, payload: &ExecutionPayload) -> SandboxReport {
        match self.try_run(payload).await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "runner failed");
                SandboxReport::Failed {
                    error: e.to_string(),
                    stderr: None,
                }
            }
        }
    }

    async fn try_run(&self, payload: &ExecutionPayload) -> Result<SandboxReport, SandboxError> {
        let workspace = Workspace::create(&self.profile, &payload.code).await?;

        if let Some(config) = &self.profile.compile {
            match compile::compile(&workspace, config).await? {
                CompileOutcome::Succeeded => {}
                CompileOutcome::Failed { diagnostics } => {
                    return Ok(SandboxReport::CompileFailed {
                        stderr: Some(diagnostics),
                    });
                }
                CompileOutcome::TimedOut => {
                    return Ok(SandboxReport::TimedOut {
                        phase: Phase::Compile,
                        stderr: None,
                    });
                }
            }
        }

        let stdin = payload.stdin_bytes(self.profile.run.input_newline);
        execute::execute(&workspace, &self.profile.run, &stdin).await
    }
}

/// How one compile or execute step ended
#[derive(Debug)]
pub(crate) enum PhaseOutcome {
    Finished(CapturedOutput),
    TimedOut,
}

/// Run one step in `cwd` with `input` on stdin, bounded by `deadline`.
///
/// The step gets its own process group; whatever it leaves behind is killed
/// once it finishes or its deadline fires.
pub(crate) async fn run_phase(
    phase: Phase,
    argv: &[String],
    env: &HashMap<String, String>,
    cwd: &Path,
    input: &[u8],
    deadline: Duration,
) -> Result<PhaseOutcome, SandboxError> {
    let (program, args) = argv
        .split_first()
        .ok_or(SandboxError::EmptyCommand(phase))?;

    let mut command = Command::new(program);
    command
        .args(args)
        .envs(env)
        .current_dir(cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    own_process_group(&mut command);

    let mut child = command.spawn().map_err(|source| SandboxError::SpawnFailed {
        program: program.clone(),
        source,
    })?;
    let pgid = child.id();

    match run_bounded(&mut child, input, deadline).await {
        Ok(Bounded::Finished(output)) => {
            kill_process_group(pgid);
            Ok(PhaseOutcome::Finished(output))
        }
        Ok(Bounded::Expired) => {
            debug!(%phase, ?deadline, "deadline expired, killing process group");
            terminate(&mut child).await;
            Ok(PhaseOutcome::TimedOut)
        }
        Err(e) => {
            terminate(&mut child).await;
            Err(SandboxError::WaitFailed(phase, e))
        }
    }
}
