//! Coderun CLI
//!
//! A command-line tool for running code in disposable Docker containers.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coderun::{Config, Dispatcher, EXAMPLE_CONFIG, ExecutionRequest, ExecutionResult};
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "coderun")]
#[command(about = "A tool for orchestrating sandboxed code execution")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: coderun.toml)
        #[arg(short, long, default_value = "coderun.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Run a source file in a fresh container
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language tag (e.g., python, cpp, java, go)
        #[arg(short, long)]
        language: String,

        /// Input file fed to the program's stdin
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Run a JSON request ({"language", "code", "input"}) read from a file or stdin
    Submit {
        /// Request file ("-" for stdin)
        #[arg(value_name = "FILE", default_value = "-")]
        request: PathBuf,
    },

    /// List available languages
    Languages,

    /// Show effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    // Results go to stdout; keep logs on stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::default()
    };

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Run {
            source,
            language,
            input,
        } => {
            let request = read_request(&source, language, input.as_deref()).await?;
            submit(config, request).await
        }
        Commands::Submit { request } => {
            let request = parse_request(&request)?;
            submit(config, request).await
        }
        Commands::Languages => {
            list_languages(&config);
            Ok(())
        }
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
    }
}

async fn read_request(
    source: &Path,
    language: String,
    input: Option<&Path>,
) -> Result<ExecutionRequest> {
    let code = tokio::fs::read_to_string(source)
        .await
        .context("failed to read source file")?;

    let mut request = ExecutionRequest::new(language, code);
    if let Some(input_path) = input {
        let stdin = tokio::fs::read_to_string(input_path)
            .await
            .context("failed to read input file")?;
        request = request.with_stdin(stdin);
    }
    Ok(request)
}

fn parse_request(path: &Path) -> Result<ExecutionRequest> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read request from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path).context("failed to read request file")?
    };
    serde_json::from_str(&content).context("request is not valid JSON")
}

async fn submit(config: Config, request: ExecutionRequest) -> Result<()> {
    request.validate().context("invalid request")?;

    info!(language = %request.language, "submitting code");
    let dispatcher = Dispatcher::new(config);
    let result = dispatcher.submit(&request).await;

    println!(
        "{}",
        serde_json::to_string(&result).context("failed to encode result")?
    );

    info!(
        origin = ?result.origin(),
        error = result.error_message(),
        "execution result"
    );

    // Exit with appropriate code
    if result.is_success() {
        Ok(())
    } else {
        let code = match result {
            ExecutionResult::Success { exit_code, .. } if exit_code > 0 => exit_code,
            _ => 1,
        };
        std::process::exit(code);
    }
}

fn list_languages(config: &Config) {
    println!("Available languages:\n");

    let mut languages: Vec<_> = config.languages.iter().collect();
    languages.sort_by_key(|(id, _)| *id);

    for (id, lang) in languages {
        let lang_type = if lang.is_compiled() {
            "compiled"
        } else {
            "interpreted"
        };
        println!("  {:<10} {:<20} {} ({})", id, lang.image, lang.name, lang_type);
    }
}

fn show_config(config: &Config) {
    println!("Container limits:");
    println!("  CPUs: {}", config.limits.cpus);
    println!("  Memory: {}", config.limits.memory);
    println!("  Max processes: {}", config.limits.pids_limit);
    println!("  Network: {}", config.limits.network);
    println!();
    println!("Timeouts:");
    println!("  Orchestration: {:.1}s", config.timeouts.orchestration);
    println!("  Cleanup: {:.1}s", config.timeouts.cleanup);
    println!();
    println!("Docker binary: {}", config.docker_binary().display());
    println!();
    println!("Languages configured: {}", config.languages.len());
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
