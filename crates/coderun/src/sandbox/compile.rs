//! Compilation step inside the sandbox

use tracing::{debug, instrument};

use crate::config::CompileConfig;
use crate::sandbox::workspace::Workspace;
use crate::sandbox::{PhaseOutcome, SandboxError, run_phase};
use crate::types::Phase;

/// How the compile step ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CompileOutcome {
    Succeeded,
    /// Compiler diagnostics: its stderr, or its stdout if stderr was empty
    Failed { diagnostics: String },
    TimedOut,
}

/// Run the compile command in the workspace under its deadline
#[instrument(skip_all)]
pub(crate) async fn compile(
    workspace: &Workspace,
    config: &CompileConfig,
) -> Result<CompileOutcome, SandboxError> {
    let deadline = config
        .deadline()
        .map_err(|e| SandboxError::InvalidDeadline(Phase::Compile, e))?;
    let argv = workspace.expand(&config.command);
    let outcome = run_phase(
        Phase::Compile,
        &argv,
        &config.env,
        workspace.path(),
        &[],
        deadline,
    )
    .await?;

    let output = match outcome {
        PhaseOutcome::Finished(output) => output,
        PhaseOutcome::TimedOut => return Ok(CompileOutcome::TimedOut),
    };

    let success = output.status.success();
    debug!(success, exit_code = ?output.status.code(), "compilation complete");
    if success {
        return Ok(CompileOutcome::Succeeded);
    }

    // Some toolchains print errors to stdout
    let diagnostics = if output.stderr.iter().all(u8::is_ascii_whitespace) {
        String::from_utf8_lossy(&output.stdout).into_owned()
    } else {
        String::from_utf8_lossy(&output.stderr).into_owned()
    };
    Ok(CompileOutcome::Failed { diagnostics })
}
