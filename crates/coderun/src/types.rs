use std::fmt;
use std::time::{Duration, TryFromFloatSecsError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reported by the runner when the compiler exits non-zero
pub const COMPILATION_FAILED: &str = "Compilation failed";
/// Reported by the runner when the compile deadline expires
pub const COMPILATION_TIMED_OUT: &str = "Compilation timed out";
/// Reported by the runner when the execute deadline expires
pub const EXECUTION_TIMED_OUT: &str = "Execution timed out";
/// Reported by the runner when its stdin is not a payload object
pub const INVALID_INPUT_JSON: &str = "Invalid input JSON";

const ORCHESTRATION_TIMED_OUT: &str = "Execution timed out (orchestration)";
const UNSUPPORTED_LANGUAGE: &str = "Unsupported language";
const EMPTY_OUTPUT: &str = "Container returned no output";
const MALFORMED_OUTPUT: &str = "Invalid JSON from container";

/// A request to run code, as received from a caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Language tag, looked up in the image registry
    pub language: String,

    /// Source code to run
    #[serde(default)]
    pub code: String,

    /// Data delivered to the program's standard input
    #[serde(default, alias = "input")]
    pub stdin: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("code must not be blank")]
    BlankCode,

    #[error("language must not be empty")]
    EmptyLanguage,
}

impl ExecutionRequest {
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            code: code.into(),
            stdin: None,
        }
    }

    /// Set the program's standard input
    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    /// Reject requests that would never produce a meaningful run
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.language.trim().is_empty() {
            return Err(RequestError::EmptyLanguage);
        }
        if self.code.trim().is_empty() {
            return Err(RequestError::BlankCode);
        }
        Ok(())
    }
}

/// The `{code, input}` object written to the sandbox's stdin
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPayload {
    #[serde(default)]
    pub code: String,

    #[serde(default)]
    pub input: String,
}

impl ExecutionPayload {
    /// Build a payload, treating absent fields as empty strings
    pub fn new(code: Option<&str>, input: Option<&str>) -> Self {
        Self {
            code: code.unwrap_or_default().to_owned(),
            input: input.unwrap_or_default().to_owned(),
        }
    }

    /// Encode to the wire format
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode from the wire format. Blank input decodes as an empty payload.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(bytes)
    }

    /// Bytes to feed the program's stdin.
    ///
    /// Non-empty input always ends in a newline so that line-based readers
    /// see the last line. Empty input stays empty.
    pub fn stdin_bytes(&self, newline: InputNewline) -> Vec<u8> {
        if self.input.is_empty() {
            return Vec::new();
        }
        let mut input = match newline {
            InputNewline::Append => self.input.clone(),
            InputNewline::Normalize => self.input.trim_end_matches(['\r', '\n']).to_owned(),
        };
        if !input.ends_with('\n') {
            input.push('\n');
        }
        input.into_bytes()
    }
}

/// How the trailing line ending of a program's input is treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputNewline {
    /// Add a `\n` only when the input does not already end with one
    Append,
    /// Strip trailing CR/LF, then add exactly one `\n`
    #[default]
    Normalize,
}

/// Which in-sandbox deadline fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Compile,
    Execute,
}

impl Phase {
    fn timeout_message(self) -> &'static str {
        match self {
            Phase::Compile => COMPILATION_TIMED_OUT,
            Phase::Execute => EXECUTION_TIMED_OUT,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Compile => write!(f, "compile"),
            Phase::Execute => write!(f, "execute"),
        }
    }
}

/// The terminal outcome emitted by the in-sandbox runner.
///
/// Serialized to the flat object the host reads back from stdout:
/// `{stdout, stderr, returncode}` on completion, `{error, [stderr]}` otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "WireReport", try_from = "WireReport")]
pub enum SandboxReport {
    /// The program ran to completion (any exit code)
    Completed {
        stdout: String,
        stderr: Option<String>,
        returncode: i32,
    },

    /// The compiler rejected the source
    CompileFailed { stderr: Option<String> },

    /// A phase deadline expired inside the sandbox
    TimedOut {
        phase: Phase,
        stderr: Option<String>,
    },

    /// Any other problem the runner reported about itself
    Failed {
        error: String,
        stderr: Option<String>,
    },
}

impl SandboxReport {
    /// Diagnostic text supplied by the sandbox, if any
    pub fn stderr(&self) -> Option<&str> {
        match self {
            SandboxReport::Completed { stderr, .. }
            | SandboxReport::CompileFailed { stderr }
            | SandboxReport::TimedOut { stderr, .. }
            | SandboxReport::Failed { stderr, .. } => stderr.as_deref(),
        }
    }

    /// Encode as a single JSON line
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Error)]
#[error("result object has neither `error` nor `returncode`")]
pub struct ReportShapeError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WireReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    stdout: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    stderr: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    returncode: Option<i32>,
}

impl From<SandboxReport> for WireReport {
    fn from(report: SandboxReport) -> Self {
        match report {
            SandboxReport::Completed {
                stdout,
                stderr,
                returncode,
            } => WireReport {
                stdout: Some(stdout),
                stderr: Some(stderr.unwrap_or_default()),
                returncode: Some(returncode),
                ..Default::default()
            },
            SandboxReport::CompileFailed { stderr } => WireReport {
                error: Some(COMPILATION_FAILED.to_owned()),
                stderr: Some(stderr.unwrap_or_default()),
                ..Default::default()
            },
            SandboxReport::TimedOut { phase, stderr } => WireReport {
                error: Some(phase.timeout_message().to_owned()),
                stderr,
                ..Default::default()
            },
            SandboxReport::Failed { error, stderr } => WireReport {
                error: Some(error),
                stderr,
                ..Default::default()
            },
        }
    }
}

impl TryFrom<WireReport> for SandboxReport {
    type Error = ReportShapeError;

    fn try_from(wire: WireReport) -> Result<Self, Self::Error> {
        if let Some(error) = wire.error {
            let stderr = wire.stderr;
            return Ok(match error.as_str() {
                COMPILATION_FAILED => SandboxReport::CompileFailed { stderr },
                COMPILATION_TIMED_OUT => SandboxReport::TimedOut {
                    phase: Phase::Compile,
                    stderr,
                },
                EXECUTION_TIMED_OUT => SandboxReport::TimedOut {
                    phase: Phase::Execute,
                    stderr,
                },
                _ => SandboxReport::Failed { error, stderr },
            });
        }

        let returncode = wire.returncode.ok_or(ReportShapeError)?;
        Ok(SandboxReport::Completed {
            stdout: wire.stdout.unwrap_or_default(),
            stderr: wire.stderr,
            returncode,
        })
    }
}

/// Orchestrator-side failure that is not the sandbox's fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportFailureKind {
    /// The payload or launch template could not be encoded
    Serialization,
    /// The container client could not be started
    Launch,
    /// Waiting for the container failed before it finished
    Interrupted,
}

impl TransportFailureKind {
    fn message(self) -> &'static str {
        match self {
            TransportFailureKind::Serialization => "Failed to serialize input JSON",
            TransportFailureKind::Launch => "Failed to start docker process",
            TransportFailureKind::Interrupted => "Interrupted while waiting for docker",
        }
    }
}

/// Where a result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Reported by the runner inside the container
    Sandbox,
    /// Detected by the host while launching, waiting, or reading
    Orchestrator,
}

/// Result of one submission.
///
/// Every way a submission can end maps to exactly one variant. At the
/// boundary it serializes to a flat object keyed by `error`, `stdout`,
/// `stderr`, `returncode`, `raw` and `details`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "WireResult")]
pub enum ExecutionResult {
    /// The program ran; a non-zero `exit_code` is still reported here
    Success {
        stdout: String,
        stderr: String,
        exit_code: i32,
    },

    CompileFailure {
        stderr: String,
    },

    /// The runner's own compile or execute deadline fired
    SandboxTimeout {
        phase: Phase,
        stderr: Option<String>,
    },

    /// The runner reported some other error about itself
    SandboxFailure {
        error: String,
        stderr: Option<String>,
    },

    /// The outer deadline around the whole container fired
    Timeout,

    UnsupportedLanguage,

    TransportFailure {
        kind: TransportFailureKind,
        details: String,
    },

    /// The container wrote something that is not a result object
    MalformedOutput {
        raw: String,
        stderr: String,
    },

    /// The container exited without writing anything to stdout
    EmptyOutput {
        stderr: String,
    },
}

impl ExecutionResult {
    /// Check if the program ran and exited with code 0
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success { exit_code: 0, .. })
    }

    /// Which side of the container boundary produced this result
    pub fn origin(&self) -> Origin {
        match self {
            ExecutionResult::Success { .. }
            | ExecutionResult::CompileFailure { .. }
            | ExecutionResult::SandboxTimeout { .. }
            | ExecutionResult::SandboxFailure { .. } => Origin::Sandbox,
            ExecutionResult::Timeout
            | ExecutionResult::UnsupportedLanguage
            | ExecutionResult::TransportFailure { .. }
            | ExecutionResult::MalformedOutput { .. }
            | ExecutionResult::EmptyOutput { .. } => Origin::Orchestrator,
        }
    }

    #[must_use]
    pub fn is_orchestrator_failure(&self) -> bool {
        self.origin() == Origin::Orchestrator
    }

    /// The `error` string this result carries on the wire
    pub fn error_message(&self) -> Option<&str> {
        match self {
            ExecutionResult::Success { .. } => None,
            ExecutionResult::CompileFailure { .. } => Some(COMPILATION_FAILED),
            ExecutionResult::SandboxTimeout { phase, .. } => Some(phase.timeout_message()),
            ExecutionResult::SandboxFailure { error, .. } => Some(error),
            ExecutionResult::Timeout => Some(ORCHESTRATION_TIMED_OUT),
            ExecutionResult::UnsupportedLanguage => Some(UNSUPPORTED_LANGUAGE),
            ExecutionResult::TransportFailure { kind, .. } => Some(kind.message()),
            ExecutionResult::MalformedOutput { .. } => Some(MALFORMED_OUTPUT),
            ExecutionResult::EmptyOutput { .. } => Some(EMPTY_OUTPUT),
        }
    }

    pub(crate) fn transport(kind: TransportFailureKind, details: impl ToString) -> Self {
        ExecutionResult::TransportFailure {
            kind,
            details: details.to_string(),
        }
    }
}

/// Flat wire representation of [`ExecutionResult`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returncode: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl From<ExecutionResult> for WireResult {
    fn from(result: ExecutionResult) -> Self {
        let error = result.error_message().map(str::to_owned);
        match result {
            ExecutionResult::Success {
                stdout,
                stderr,
                exit_code,
            } => WireResult {
                stdout: Some(stdout),
                stderr: Some(stderr),
                returncode: Some(exit_code),
                ..Default::default()
            },
            ExecutionResult::CompileFailure { stderr }
            | ExecutionResult::EmptyOutput { stderr } => WireResult {
                error,
                stderr: Some(stderr),
                ..Default::default()
            },
            ExecutionResult::SandboxTimeout { stderr, .. }
            | ExecutionResult::SandboxFailure { stderr, .. } => WireResult {
                error,
                stderr,
                ..Default::default()
            },
            ExecutionResult::Timeout | ExecutionResult::UnsupportedLanguage => WireResult {
                error,
                ..Default::default()
            },
            ExecutionResult::TransportFailure { details, .. } => WireResult {
                error,
                details: Some(details),
                ..Default::default()
            },
            ExecutionResult::MalformedOutput { raw, stderr } => WireResult {
                error,
                raw: Some(raw),
                stderr: Some(stderr),
                ..Default::default()
            },
        }
    }
}

/// Resource caps requested for every container.
///
/// Applied uniformly to all launches; requests cannot change them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxLimits {
    /// CPU share passed to `--cpus`
    #[serde(default = "default_cpus")]
    pub cpus: String,

    /// Memory ceiling passed to `--memory` (e.g. "256m")
    #[serde(default = "default_memory")]
    pub memory: String,

    /// Maximum live processes inside the container
    #[serde(default = "default_pids_limit")]
    pub pids_limit: u32,

    /// Docker network mode
    #[serde(default = "default_network")]
    pub network: String,
}

impl SandboxLimits {
    /// Set the CPU share
    pub fn with_cpus(mut self, cpus: impl Into<String>) -> Self {
        self.cpus = cpus.into();
        self
    }

    /// Set the memory ceiling
    pub fn with_memory(mut self, memory: impl Into<String>) -> Self {
        self.memory = memory.into();
        self
    }

    /// Set the process count cap
    pub fn with_pids_limit(mut self, count: u32) -> Self {
        self.pids_limit = count;
        self
    }
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            cpus: default_cpus(),
            memory: default_memory(),
            pids_limit: default_pids_limit(),
            network: default_network(),
        }
    }
}

fn default_cpus() -> String {
    "1".to_owned()
}

fn default_memory() -> String {
    "256m".to_owned()
}

fn default_pids_limit() -> u32 {
    64
}

fn default_network() -> String {
    "none".to_owned()
}

/// Host-side deadlines, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Timeouts {
    /// Bound on the whole container lifetime
    #[serde(default = "default_orchestration_timeout")]
    pub orchestration: f64,

    /// Bound on forced container removal after the outer deadline fires
    #[serde(default = "default_cleanup_timeout")]
    pub cleanup: f64,
}

impl Timeouts {
    /// Fails for negative, non-finite or overflowing values
    pub fn orchestration(&self) -> Result<Duration, TryFromFloatSecsError> {
        Duration::try_from_secs_f64(self.orchestration)
    }

    pub fn cleanup(&self) -> Result<Duration, TryFromFloatSecsError> {
        Duration::try_from_secs_f64(self.cleanup)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            orchestration: default_orchestration_timeout(),
            cleanup: default_cleanup_timeout(),
        }
    }
}

fn default_orchestration_timeout() -> f64 {
    10.0
}

fn default_cleanup_timeout() -> f64 {
    5.0
}
