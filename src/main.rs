//! Margarine client - Entry Point
//!
//! A small host that stands in for the editor: it resolves the language
//! server, activates a session for a workspace, opens documents, and
//! deactivates on Ctrl+C.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use margarine_client::config::LauncherConfig;
use margarine_client::extension::{self, ExtensionContext, ServerLocator};

/// Launcher and language client for the Margarine language server.
#[derive(Parser, Debug)]
#[command(name = "margarine-client")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level: trace, debug, info, warn, error.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the language server command that activation would run.
    Resolve {
        /// Extension install directory (defaults to this executable's directory).
        #[arg(long)]
        extension_path: Option<PathBuf>,

        /// Print the full run configuration as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Activate a session and keep it running until Ctrl+C.
    Run {
        /// Extension install directory (defaults to this executable's directory).
        #[arg(long)]
        extension_path: Option<PathBuf>,

        /// Workspace root directory.
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,

        /// Use the debug server options.
        #[arg(long)]
        debug: bool,

        /// Documents to open once the server is ready.
        files: Vec<PathBuf>,
    },
}

impl Args {
    /// Parses the log level string into a tracing Level.
    fn parse_log_level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            other => anyhow::bail!("invalid log level: {}", other),
        }
    }
}

/// Initializes the tracing subscriber for logging.
fn init_tracing(level: Level, json: bool) -> Result<()> {
    // RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("margarine_client={level},async_lsp={level}"))
    });

    // Logs go to stderr; stdout carries command output
    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()
    };
    result.context("failed to initialize tracing subscriber")?;

    Ok(())
}

/// Directory of the running executable, standing in for the extension path.
fn default_extension_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn resolve(extension_path: Option<PathBuf>, as_json: bool) -> Result<()> {
    let config = LauncherConfig::default();
    let extension_path = extension_path.unwrap_or_else(default_extension_path);
    let locator = ServerLocator::new(&extension_path, &config);
    let command = locator.resolve();

    if as_json {
        let options = extension::server_options(command, &config);
        let report = json!({
            "extension_path": extension_path,
            "candidates": {
                "release": locator.release_path(),
                "debug": locator.debug_path(),
            },
            "server": options,
        });
        let out = serde_json::to_string_pretty(&report).context("failed to serialize JSON")?;
        println!("{out}");
    } else {
        println!("{command}");
    }
    Ok(())
}

async fn run(
    extension_path: Option<PathBuf>,
    workspace: PathBuf,
    debug: bool,
    files: Vec<PathBuf>,
) -> Result<()> {
    let workspace = workspace.canonicalize().context(format!(
        "failed to canonicalize workspace path: {}",
        workspace.display()
    ))?;

    let ctx = ExtensionContext {
        extension_path: extension_path.unwrap_or_else(default_extension_path),
        workspace_root: workspace,
        debug,
    };

    info!(
        extension_path = %ctx.extension_path.display(),
        workspace = %ctx.workspace_root.display(),
        "activating"
    );
    let session = extension::activate(&ctx).context("failed to activate language client")?;

    for file in &files {
        match session.client().open_path(file).await {
            Ok(true) => info!(file = %file.display(), "opened document"),
            Ok(false) => info!(file = %file.display(), "document not handled by this server"),
            Err(e) => warn!(file = %file.display(), error = %e, "failed to open document"),
        }
    }

    info!("session running, press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    info!("deactivating");
    if let Some(stopped) = extension::deactivate(Some(session)) {
        stopped.await.context("failed to stop language client")?;
    }

    Ok(())
}

/// Main entry point.
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = args.parse_log_level()?;
    init_tracing(log_level, args.log_json)?;

    match args.command {
        Command::Resolve {
            extension_path,
            json,
        } => resolve(extension_path, json),
        Command::Run {
            extension_path,
            workspace,
            debug,
            files,
        } => run(extension_path, workspace, debug, files).await,
    }
}
