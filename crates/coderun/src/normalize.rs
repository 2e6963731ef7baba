//! Interpretation of what a container wrote
//!
//! Turns captured stdout/stderr into exactly one [`ExecutionResult`]. Only
//! stdout carries the result object; stderr is diagnostic text that is kept
//! alongside whatever the result turns out to be.

use serde::de::Error as _;
use tracing::debug;

use crate::types::{ExecutionResult, SandboxReport};

/// Normalize captured container output into a result.
///
/// - blank stdout: the container died before reporting, [`ExecutionResult::EmptyOutput`]
/// - stdout that is not exactly one result object: [`ExecutionResult::MalformedOutput`]
/// - otherwise the sandbox's own report, with captured stderr attached when
///   the report carries none
pub fn normalize(stdout: &[u8], stderr: &[u8]) -> ExecutionResult {
    let stdout = String::from_utf8_lossy(stdout).into_owned();
    let stderr = String::from_utf8_lossy(stderr).into_owned();

    if stdout.trim().is_empty() {
        debug!(stderr_bytes = stderr.len(), "container produced no output");
        return ExecutionResult::EmptyOutput { stderr };
    }

    match decode_report(stdout.trim()) {
        Ok(report) => from_report(report, stderr),
        Err(e) => {
            debug!(error = %e, "container output is not a result object");
            ExecutionResult::MalformedOutput { raw: stdout, stderr }
        }
    }
}

/// Map a decoded sandbox report, attaching `captured_stderr` only where the
/// report has no stderr of its own.
pub fn from_report(report: SandboxReport, captured_stderr: String) -> ExecutionResult {
    let fallback = (!captured_stderr.trim().is_empty()).then_some(captured_stderr);

    match report {
        SandboxReport::Completed {
            stdout,
            stderr,
            returncode,
        } => ExecutionResult::Success {
            stdout,
            stderr: stderr.or(fallback).unwrap_or_default(),
            exit_code: returncode,
        },
        SandboxReport::CompileFailed { stderr } => ExecutionResult::CompileFailure {
            stderr: stderr.or(fallback).unwrap_or_default(),
        },
        SandboxReport::TimedOut { phase, stderr } => ExecutionResult::SandboxTimeout {
            phase,
            stderr: stderr.or(fallback),
        },
        SandboxReport::Failed { error, stderr } => ExecutionResult::SandboxFailure {
            error,
            stderr: stderr.or(fallback),
        },
    }
}

// Structs also deserialize from JSON arrays, so require an object up front
fn decode_report(text: &str) -> Result<SandboxReport, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(serde_json::Error::custom("expected a JSON object"));
    }
    serde_json::from_value(value)
}
