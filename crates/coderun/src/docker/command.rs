//! Command builder for the docker CLI
//!
//! Builds command-line arguments for launching and removing sandbox containers.

use std::path::PathBuf;

use crate::types::SandboxLimits;

/// Builder for docker command-line arguments
#[derive(Debug)]
pub struct DockerCommand {
    /// Path to the docker client
    docker_path: PathBuf,
    /// One of `run`, `rm --force`
    action: DockerAction,
    /// --name
    container_name: String,
    image: String,
    /// Resource caps
    limits: SandboxLimits,
    /// --env NAME, value taken from the client's environment
    env_forward: Vec<String>,
}

impl DockerCommand {
    /// Create a new docker command builder
    pub fn new(docker_path: impl Into<PathBuf>, container_name: impl Into<String>) -> Self {
        Self {
            docker_path: docker_path.into(),
            action: DockerAction::Run,
            container_name: container_name.into(),
            image: String::new(),
            limits: SandboxLimits::default(),
            env_forward: Vec::new(),
        }
    }

    /// Set the action to perform
    pub fn action(mut self, action: DockerAction) -> Self {
        self.action = action;
        self
    }

    /// Set the image to start
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Set resource caps
    pub fn limits(mut self, limits: SandboxLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Forward an environment variable from the client into the container
    pub fn env_forward(mut self, key: impl Into<String>) -> Self {
        self.env_forward.push(key.into());
        self
    }

    /// Build the command-line arguments
    ///
    /// Consumes self to avoid cloning the argument vectors.
    pub fn build(self) -> Vec<String> {
        let mut args = vec![self.docker_path.to_string_lossy().into_owned()];

        match self.action {
            DockerAction::Remove => {
                args.push("rm".to_string());
                args.push("--force".to_string());
                args.push(self.container_name);
            }
            DockerAction::Run => {
                // Payload goes over stdin; the container never outlives its client
                args.push("run".to_string());
                args.push("-i".to_string());
                args.push("--rm".to_string());
                args.push(format!("--name={}", self.container_name));

                // Resource caps
                args.push(format!("--network={}", self.limits.network));
                args.push(format!("--cpus={}", self.limits.cpus));
                args.push(format!("--memory={}", self.limits.memory));
                args.push(format!("--pids-limit={}", self.limits.pids_limit));

                for key in &self.env_forward {
                    args.push(format!("--env={key}"));
                }

                args.push(self.image);
            }
        }

        args
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockerAction {
    /// Start a container and attach to it
    Run,
    /// Force-remove a container, killing it if still running
    Remove,
}
