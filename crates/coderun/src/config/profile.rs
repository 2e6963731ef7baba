//! Toolchain profile handed to the in-sandbox runner
//!
//! The host forwards a language's profile into the container through the
//! [`PROFILE_ENV_VAR`] environment variable as JSON. Images may instead bake
//! a TOML profile in and point the runner at it with `--profile`.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::config::language::{CompileConfig, RunConfig, SourceName};

/// Environment variable carrying the JSON-encoded profile
pub const PROFILE_ENV_VAR: &str = "CODERUN_PROFILE";

/// How to compile and run one submission inside the sandbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerProfile {
    /// File the submitted code is written to
    pub source_name: SourceName,

    /// Compilation step (None for interpreted languages)
    #[serde(default)]
    pub compile: Option<CompileConfig>,

    /// Execution step
    pub run: RunConfig,
}

impl RunnerProfile {
    /// Encode for the profile environment variable
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode and validate a JSON profile
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let profile: RunnerProfile = serde_json::from_str(content)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Read the profile from [`PROFILE_ENV_VAR`]
    pub fn from_env() -> Result<Self, ConfigError> {
        let content = std::env::var(PROFILE_ENV_VAR)
            .map_err(|_| ConfigError::MissingProfile(PROFILE_ENV_VAR))?;
        Self::from_json(&content)
    }
}
