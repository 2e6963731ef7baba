//! Submission entry point
//!
//! Looks a request's language up in the image registry, hands the payload to
//! a fresh container and turns whatever comes back into an [`ExecutionResult`].

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::docker::{self, LaunchError, LaunchOutcome};
use crate::normalize::normalize;
use crate::types::{ExecutionPayload, ExecutionRequest, ExecutionResult, TransportFailureKind};

/// Dispatches submissions to per-request containers
///
/// Cheap to clone; clones share the same read-only configuration, so one
/// dispatcher can serve many concurrent submissions.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    config: Arc<Config>,
}

impl Dispatcher {
    /// Create a dispatcher over the given registry and limits
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Create a dispatcher with the embedded default configuration
    pub fn with_defaults() -> Self {
        Self::new(Config::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one request to completion
    pub async fn submit(&self, request: &ExecutionRequest) -> ExecutionResult {
        self.submit_parts(
            &request.language,
            Some(request.code.as_str()),
            request.stdin.as_deref(),
        )
        .await
    }

    /// Run one submission given as loose parts.
    ///
    /// Absent code or stdin are sent as empty strings. An unregistered
    /// language is rejected before any container is started.
    #[instrument(skip(self, code, stdin))]
    pub async fn submit_parts(
        &self,
        language: &str,
        code: Option<&str>,
        stdin: Option<&str>,
    ) -> ExecutionResult {
        let Ok(template) = self.config.get_language(language) else {
            debug!("no image registered for language");
            return ExecutionResult::UnsupportedLanguage;
        };

        let payload = match ExecutionPayload::new(code, stdin).to_json() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to encode payload");
                return ExecutionResult::transport(TransportFailureKind::Serialization, e);
            }
        };
        let profile = match template.profile().to_json() {
            Ok(profile) => profile,
            Err(e) => {
                warn!(error = %e, "failed to encode runner profile");
                return ExecutionResult::transport(TransportFailureKind::Serialization, e);
            }
        };

        let outcome = docker::launch(&self.config, &template.image, &profile, &payload).await;
        let result = match outcome {
            Ok(LaunchOutcome::Exited(output)) => {
                debug!(exit_code = ?output.exit_code, "normalizing container output");
                normalize(&output.stdout, &output.stderr)
            }
            Ok(LaunchOutcome::TimedOut) => ExecutionResult::Timeout,
            Err(
                e @ (LaunchError::SpawnFailed(_)
                | LaunchError::CommandFailed(_)
                | LaunchError::InvalidTimeout(..)),
            ) => {
                warn!(error = %e, "failed to launch container");
                ExecutionResult::transport(TransportFailureKind::Launch, e)
            }
            Err(e @ LaunchError::WaitFailed { .. }) => {
                warn!(error = %e, "wait for container was interrupted");
                ExecutionResult::transport(TransportFailureKind::Interrupted, e)
            }
        };

        info!(
            image = %template.image,
            outcome = result.error_message().unwrap_or("completed"),
            "submission finished"
        );
        result
    }
}
