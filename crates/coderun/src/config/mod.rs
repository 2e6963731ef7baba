use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::language::{
    CompileConfig, DEFAULT_COMPILE_TIMEOUT, DEFAULT_RUN_TIMEOUT, Language, RunConfig, SourceName,
};
pub use crate::config::profile::{PROFILE_ENV_VAR, RunnerProfile};
use crate::types::{SandboxLimits, Timeouts};

pub mod language;
mod loader;
pub mod profile;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../coderun.example.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid source file name '{0}': must not contain '/' or start with '.'")]
    InvalidSourceName(String),

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("failed to parse runner profile: {0}")]
    ParseProfile(#[from] serde_json::Error),

    #[error("environment variable {0} is not set")]
    MissingProfile(&'static str),

    #[error("language '{0}' not found in configuration")]
    LanguageNotFound(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for coderun
///
/// Loaded once at startup and shared read-only between requests.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path to the docker client (uses PATH if not specified).
    #[serde(default)]
    pub docker_path: Option<PathBuf>,

    /// Resource caps requested for every container.
    #[serde(default)]
    pub limits: SandboxLimits,

    /// Host-side deadlines.
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Image registry: launch templates keyed by language tag
    #[serde(default)]
    pub languages: HashMap<String, Language>,
}

impl Config {
    /// Create a new config with embedded default languages
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty config with no languages
    pub fn empty() -> Self {
        Self {
            docker_path: None,
            limits: SandboxLimits::default(),
            timeouts: Timeouts::default(),
            languages: HashMap::new(),
        }
    }

    /// Get a language by tag
    pub fn get_language(&self, id: &str) -> Result<&Language, ConfigError> {
        self.languages
            .get(id)
            .ok_or_else(|| ConfigError::LanguageNotFound(id.to_string()))
    }

    /// Get the path to the docker client
    pub fn docker_binary(&self) -> PathBuf {
        self.docker_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("docker"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}
