//! Configuration file loading for coderun
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, File, FileFormat};

use crate::config::language::{CompileConfig, RunConfig, SourceName};
use crate::config::profile::RunnerProfile;
use crate::config::{Config, ConfigError};

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.cpus.trim().is_empty() || self.limits.memory.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "limits must set cpus and memory".to_owned(),
            ));
        }
        if self.limits.pids_limit == 0 {
            return Err(ConfigError::Invalid(
                "limits.pids_limit must be at least 1".to_owned(),
            ));
        }
        if self.limits.network.trim().is_empty() {
            return Err(ConfigError::Invalid("limits.network is empty".to_owned()));
        }
        validate_timeout("timeouts.orchestration", self.timeouts.orchestration)?;
        validate_timeout("timeouts.cleanup", self.timeouts.cleanup)?;

        for (id, lang) in &self.languages {
            let label = format!("language '{id}'");
            if lang.name.is_empty() {
                return Err(ConfigError::Invalid(format!("{label} has empty name")));
            }
            if lang.image.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{label} has empty image")));
            }
            validate_template(&label, &lang.source_name, lang.compile.as_ref(), &lang.run)?;
        }

        Ok(())
    }
}

impl RunnerProfile {
    /// Load a profile from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let profile = ConfigBuilder::builder()
            .add_source(File::from(path.as_ref()))
            .build()?;

        let profile: RunnerProfile = profile.try_deserialize()?;
        profile.validate()?;
        Ok(profile)
    }

    /// Validate the profile
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_template(
            "runner profile",
            &self.source_name,
            self.compile.as_ref(),
            &self.run,
        )
    }
}

fn validate_template(
    label: &str,
    source_name: &SourceName,
    compile: Option<&CompileConfig>,
    run: &RunConfig,
) -> Result<(), ConfigError> {
    if source_name.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "{label} has empty source name"
        )));
    }
    if run.command.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "{label} has empty run command"
        )));
    }
    validate_timeout(&format!("{label} run timeout"), run.timeout)?;
    if let Some(compile) = compile {
        if compile.command.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "{label} has empty compile command"
            )));
        }
        if compile.output_name.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "{label} output name must be a bare file name"
            )));
        }
        validate_timeout(&format!("{label} compile timeout"), compile.timeout)?;
    }
    Ok(())
}

// Zero, negative, NaN and day-plus timeouts are rejected at load time
fn validate_timeout(label: &str, seconds: f64) -> Result<(), ConfigError> {
    if !seconds.is_finite() || seconds <= 0.0 || seconds > 86_400.0 {
        return Err(ConfigError::Invalid(format!(
            "{label} must be a positive number of seconds (got {seconds})"
        )));
    }
    Ok(())
}
