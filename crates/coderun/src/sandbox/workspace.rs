//! Per-submission scratch directory

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::config::RunnerProfile;
use crate::sandbox::SandboxError;

/// Fresh directory holding one submission's source and build artifacts.
///
/// Removed with everything in it when dropped.
#[derive(Debug)]
pub(crate) struct Workspace {
    dir: TempDir,
    source: PathBuf,
    binary: PathBuf,
}

impl Workspace {
    /// Create the directory and write `code` to the profile's source file
    pub(crate) async fn create(profile: &RunnerProfile, code: &str) -> Result<Self, SandboxError> {
        let dir = tempfile::Builder::new()
            .prefix("coderun-")
            .tempdir()
            .map_err(SandboxError::WorkDir)?;

        let source = dir.path().join(profile.source_name.as_str());
        tokio::fs::write(&source, code)
            .await
            .map_err(|source_err| SandboxError::WriteSource {
                path: source.clone(),
                source: source_err,
            })?;

        // Interpreted languages run the source itself
        let binary = match &profile.compile {
            Some(compile) => dir.path().join(&compile.output_name),
            None => source.clone(),
        };

        debug!(dir = %dir.path().display(), bytes = code.len(), "wrote source file");

        Ok(Self {
            dir,
            source,
            binary,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Substitute this workspace's paths into a command template
    pub(crate) fn expand(&self, command: &[String]) -> Vec<String> {
        crate::config::Language::expand_command(
            command,
            &self.source.to_string_lossy(),
            &self.binary.to_string_lossy(),
            &self.dir.path().to_string_lossy(),
        )
    }
}
