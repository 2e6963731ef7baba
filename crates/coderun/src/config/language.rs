use std::collections::HashMap;
use std::time::{Duration, TryFromFloatSecsError};

use serde::{Deserialize, Deserializer, Serialize, de};

use crate::config::ConfigError;
use crate::config::profile::RunnerProfile;
use crate::types::InputNewline;

/// Default compile deadline inside the sandbox, in seconds
pub const DEFAULT_COMPILE_TIMEOUT: f64 = 5.0;

/// Default execute deadline inside the sandbox, in seconds
pub const DEFAULT_RUN_TIMEOUT: f64 = 5.0;

/// Launch template for a language tag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Language {
    /// Human-readable name for the language (e.g., "C++ 17 (GCC)")
    pub name: String,

    /// Container image that carries the toolchain and the runner
    pub image: String,

    /// File the submitted code is written to inside the sandbox
    pub source_name: SourceName,

    /// Compilation configuration (None for interpreted languages)
    #[serde(default)]
    pub compile: Option<CompileConfig>,

    /// Execution configuration
    pub run: RunConfig,
}

impl Language {
    /// Check if the language is compiled
    pub fn is_compiled(&self) -> bool {
        self.compile.is_some()
    }

    /// The part of this template the in-sandbox runner needs
    pub fn profile(&self) -> RunnerProfile {
        RunnerProfile {
            source_name: self.source_name.clone(),
            compile: self.compile.clone(),
            run: self.run.clone(),
        }
    }

    /// Expand placeholders in the given command
    ///
    /// `{source}` is the source file, `{binary}` the compiled artifact,
    /// `{dir}` the working directory.
    pub fn expand_command(command: &[String], source: &str, binary: &str, dir: &str) -> Vec<String> {
        command
            .iter()
            .map(|arg| {
                arg.replace("{source}", source)
                    .replace("{binary}", binary)
                    .replace("{dir}", dir)
            })
            .collect()
    }
}

/// Bare file name for the submitted source (e.g., "Main.java")
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceName(String);

impl SourceName {
    pub fn new(name: &str) -> Result<Self, ConfigError> {
        if name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(ConfigError::InvalidSourceName(name.to_owned()));
        }
        Ok(Self(name.to_owned()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for SourceName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        SourceName::new(&s).map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"a file name without '/' that does not start with '.'",
            )
        })
    }
}

impl std::fmt::Display for SourceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Configuration for the compilation step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {source}, {binary}, {dir}
    pub command: Vec<String>,

    /// Compiled artifact name (e.g., "main")
    #[serde(default = "default_output_name")]
    pub output_name: String,

    /// Compile deadline in seconds
    #[serde(default = "default_compile_timeout")]
    pub timeout: f64,

    /// Environment variables to set during compilation
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl CompileConfig {
    pub fn deadline(&self) -> Result<Duration, TryFromFloatSecsError> {
        Duration::try_from_secs_f64(self.timeout)
    }
}

/// Configuration for the execution step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {source}, {binary}, {dir}
    pub command: Vec<String>,

    /// Execute deadline in seconds
    #[serde(default = "default_run_timeout")]
    pub timeout: f64,

    /// Environment variables to set
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Treatment of the input's trailing line ending
    #[serde(default)]
    pub input_newline: InputNewline,
}

impl RunConfig {
    pub fn deadline(&self) -> Result<Duration, TryFromFloatSecsError> {
        Duration::try_from_secs_f64(self.timeout)
    }
}

fn default_output_name() -> String {
    "main".to_owned()
}

fn default_compile_timeout() -> f64 {
    DEFAULT_COMPILE_TIMEOUT
}

fn default_run_timeout() -> f64 {
    DEFAULT_RUN_TIMEOUT
}
