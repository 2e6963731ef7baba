//! A library for sandboxed code execution.
//!
//! Coderun runs untrusted source code in disposable Docker containers. The
//! host side picks a container image by language tag, sends the code and its
//! input to a fresh container and turns whatever comes back into exactly one
//! [`ExecutionResult`]. The container side compiles and runs the code under
//! its own deadlines and reports a single JSON object.
//!
//! # Features
//!
//! - **Per-request isolation**: one container per submission, no network, capped CPU, memory and process count.
//! - **Two-layer deadlines**: compile and run deadlines inside the container, an orchestration deadline around it.
//! - **Exhaustive results**: every way a submission can end maps to one variant.
//! - **TOML configuration**: the image registry and per-language toolchains are plain config.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, Language, RunnerProfile};
pub use dispatcher::Dispatcher;
pub use docker::{LaunchError, LaunchOutcome};
pub use normalize::normalize;
pub use sandbox::{SandboxError, SandboxRunner};
pub use types::{
    ExecutionPayload, ExecutionRequest, ExecutionResult, InputNewline, Origin, Phase,
    RequestError, SandboxLimits, SandboxReport, Timeouts, TransportFailureKind, WireResult,
};

pub mod config;
pub mod dispatcher;
pub mod docker;
pub mod normalize;
mod process;
pub mod sandbox;
pub mod types;
