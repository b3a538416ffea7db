//! Sandpit CLI
//!
//! A command-line tool for running code snippets and shell commands in the
//! sandbox, and for serving the HTTP API.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sandpit::{
    Config, EXAMPLE_CONFIG, JAVASCRIPT_ENABLED, Language, ResourceLimits, Sandbox, TrustMode,
};
use sandpit_server::{AppState, GroqClient, Settings, SuggestError};
use tracing::{Level, debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sandpit")]
#[command(about = "Run untrusted code snippets and shell commands under limits")]
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
        /// Output path (default: sandpit.toml)
        #[arg(short, long, default_value = "sandpit.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Run a source file
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language ID (e.g., javascript, python)
        #[arg(short, long)]
        language: String,

        /// Wall clock limit in seconds
        #[arg(short = 't', long)]
        wall_time_limit: Option<f64>,

        /// Output limit in KB
        #[arg(short, long)]
        max_output: Option<u64>,
    },

    /// Run a shell command through the gateway
    Shell {
        /// Command line to run
        #[arg(value_name = "COMMAND")]
        command: String,

        /// Skip the allow-list and run any command
        #[arg(long)]
        trusted: bool,
    },

    /// Serve the HTTP API
    Serve {
        /// Address to listen on (overrides server.bind)
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },

    /// List supported languages
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

    // Logs go to stderr so stdout carries only program output
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Init { output, force } = &cli.command {
        return init_config(output, *force).await;
    }

    if let Some(path) = &cli.config {
        info!(?path, "loading configuration");
    } else {
        debug!("using embedded configuration");
    }
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Run {
            source,
            language,
            wall_time_limit,
            max_output,
        } => run_source(config, &source, &language, wall_time_limit, max_output).await,
        Commands::Shell { command, trusted } => run_shell(config, command, trusted).await,
        Commands::Serve { bind } => serve(config, cli.config.as_deref(), bind).await,
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

async fn run_source(
    config: Config,
    source: &Path,
    language_id: &str,
    wall_time_limit: Option<f64>,
    max_output: Option<u64>,
) -> Result<()> {
    let code = tokio::fs::read_to_string(source)
        .await
        .context("failed to read source file")?;

    // Only explicitly-specified values, so per-language limits still apply
    let user_limits = ResourceLimits {
        wall_time_limit,
        max_output,
        memory_limit: None,
    };
    let has_user_limits = wall_time_limit.is_some() || max_output.is_some();

    let language = Language::from_id(language_id);
    if language.is_supported() {
        info!(%language, "running program");
    } else {
        warn!(%language, "language is not supported");
    }
    let sandbox = Sandbox::new(config);
    let result = sandbox
        .run_code(language_id, code, has_user_limits.then_some(&user_limits))
        .await
        .context("execution failed")?;

    println!("{}", result.output);
    info!(
        exit_reason = %result.exit_reason,
        limit_exceeded = ?result.limit_exceeded,
        exit_code = result.exit_code,
        wall_time = format_args!("{:.3}s", result.wall_time),
        "execution result"
    );

    if result.is_error {
        std::process::exit(result.exit_code.filter(|code| *code != 0).unwrap_or(1));
    }
    Ok(())
}

async fn run_shell(config: Config, command: String, trusted: bool) -> Result<()> {
    let mode = if trusted {
        TrustMode::Trusted
    } else {
        TrustMode::Restricted
    };

    let sandbox = Sandbox::new(config);
    let result = sandbox
        .run_command(command, mode, None)
        .await
        .context("command failed")?;

    println!("{}", result.output);
    debug!(exit_reason = %result.exit_reason, "command result");

    if !result.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

async fn serve(config: Config, path: Option<&Path>, bind: Option<SocketAddr>) -> Result<()> {
    let mut settings = Settings::load(path).context("failed to load server settings")?;
    if let Some(bind) = bind {
        settings.server.bind = bind;
    }
    let addr = settings.server.bind;

    let mut state = AppState::new(Sandbox::new(config), settings.clone());
    match GroqClient::from_env(&settings.suggest) {
        Ok(client) => {
            info!(model = %settings.suggest.model, "AI suggestions enabled");
            state = state.with_suggestions(Arc::new(client));
        }
        Err(SuggestError::MissingApiKey(var)) => {
            warn!("{var} is not set, AI suggestions are disabled");
        }
        Err(e) => return Err(e).context("failed to create suggestion client"),
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    sandpit_server::serve(listener, state)
        .await
        .context("server error")
}

fn list_languages(config: &Config) {
    println!("Supported languages:\n");
    if JAVASCRIPT_ENABLED {
        println!("  {:<12} in-process V8 isolate", Language::JavaScript.id());
    }
    println!(
        "  {:<12} {} ({})",
        Language::Python.id(),
        config.python.name,
        config.python.command.join(" ")
    );
}

fn show_config(config: &Config) {
    println!("Default resource limits:");
    println!(
        "  Wall time limit: {:?}",
        config.default_limits.wall_time_limit
    );
    println!("  Max output: {:?} KB", config.default_limits.max_output);
    println!(
        "  Memory limit: {:?} KB",
        config.default_limits.memory_limit
    );
    println!();
    println!("Scratch directory: {}", config.scratch_dir().display());
    println!("Max source size: {} bytes", config.max_source_bytes);
    println!();
    println!("Shell allow-list: {}", config.shell.allow_list.join(", "));
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
