//! Docker container launcher
//!
//! Starts one disposable container per submission, feeds it the payload,
//! and enforces the orchestration deadline around its whole lifetime.

use std::time::TryFromFloatSecsError;

use thiserror::Error;

pub use crate::docker::command::{DockerAction, DockerCommand};
pub use crate::docker::process::{ContainerOutput, LaunchOutcome, launch, remove_container};

mod command;
mod process;

/// Errors that occur while launching or waiting for a container
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to spawn docker client: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("docker command failed: {0}")]
    CommandFailed(String),

    #[error("{0} timeout is not a usable duration: {1}")]
    InvalidTimeout(&'static str, #[source] TryFromFloatSecsError),

    #[error("failed while waiting for container {name}: {source}")]
    WaitFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },
}
