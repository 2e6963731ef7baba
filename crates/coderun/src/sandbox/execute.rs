//! Execution step inside the sandbox

use std::process::ExitStatus;

use tracing::{debug, instrument};

use crate::config::RunConfig;
use crate::sandbox::workspace::Workspace;
use crate::sandbox::{PhaseOutcome, SandboxError, run_phase};
use crate::types::{Phase, SandboxReport};

/// Run the program with `stdin` and report how it ended
#[instrument(skip_all, fields(stdin_bytes = stdin.len()))]
pub(crate) async fn execute(
    workspace: &Workspace,
    config: &RunConfig,
    stdin: &[u8],
) -> Result<SandboxReport, SandboxError> {
    let deadline = config
        .deadline()
        .map_err(|e| SandboxError::InvalidDeadline(Phase::Execute, e))?;
    let argv = workspace.expand(&config.command);
    debug!(?argv, "executing program");

    let outcome = run_phase(
        Phase::Execute,
        &argv,
        &config.env,
        workspace.path(),
        stdin,
        deadline,
    )
    .await?;

    let PhaseOutcome::Finished(output) = outcome else {
        return Ok(SandboxReport::TimedOut {
            phase: Phase::Execute,
            stderr: None,
        });
    };

    let returncode = exit_code(output.status);
    debug!(returncode, "execution complete");

    Ok(SandboxReport::Completed {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: Some(String::from_utf8_lossy(&output.stderr).into_owned()),
        returncode,
    })
}

/// Exit code, or the negated signal number for a killed process
pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }

    -1
}
