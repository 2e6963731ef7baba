//! Coderun in-container runner
//!
//! Reads one `{code, input}` payload from stdin, compiles and runs it, and
//! prints exactly one JSON result line to stdout. Logs go to stderr.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use coderun::{RunnerProfile, SandboxReport, SandboxRunner};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{Level, debug, error};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "coderun-runner")]
#[command(about = "Compile and run one submission inside a sandbox container")]
#[command(version)]
struct Cli {
    /// TOML profile file (default: JSON from the CODERUN_PROFILE environment variable)
    #[arg(short, long)]
    profile: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };

    // stdout carries the result object only
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    let profile = match &cli.profile {
        Some(path) => RunnerProfile::from_file(path),
        None => RunnerProfile::from_env(),
    };
    let profile = match profile {
        Ok(profile) => profile,
        Err(e) => {
            error!(error = %e, "failed to load runner profile");
            emit(&SandboxReport::Failed {
                error: e.to_string(),
                stderr: None,
            })
            .await?;
            std::process::exit(2);
        }
    };

    let mut raw = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut raw)
        .await
        .context("failed to read payload from stdin")?;
    debug!(bytes = raw.len(), "read payload");

    let report = SandboxRunner::new(profile).handle(&raw).await;
    emit(&report).await
}

async fn emit(report: &SandboxReport) -> Result<()> {
    let mut line = report.to_json().context("failed to encode result")?;
    line.push('\n');

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(line.as_bytes())
        .await
        .context("failed to write result")?;
    stdout.flush().await.context("failed to flush result")?;
    Ok(())
}
