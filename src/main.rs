//! `devloop`: restart a development server whenever a packed artifact changes.
//!
//! Loads configuration, applies command-line overrides, and runs the dev loop
//! until Ctrl+C or SIGTERM.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use devloop_runner::config::{validate_config, Config};
use devloop_runner::DevLoopRunner;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_CONFIG_FILE: &str = "devloop.json";

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(
    name = "devloop",
    version,
    about = "Reinstall a local package artifact and restart the dev server whenever it is rebuilt"
)]
struct Cli {
    /// Configuration file (JSON, or YAML by extension). Defaults to ./devloop.json if present.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Artifact to watch and install, overriding the configuration
    #[arg(long, short)]
    artifact: Option<PathBuf>,

    /// Port the dev server binds, overriding the configuration
    #[arg(long, short)]
    port: Option<u16>,

    /// Directory the install and server commands run in, overriding the configuration
    #[arg(long)]
    app_root: Option<PathBuf>,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
    let path = match &cli.config {
        Some(path) => Some(path.clone()),
        None if default_path.is_file() => Some(default_path),
        None => None,
    };

    let mut config = match (path, &cli.artifact) {
        (Some(path), _) => Config::from_file(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        (None, Some(artifact)) => Config::new(artifact.clone()),
        (None, None) => bail!(
            "no {} found; pass --config or --artifact",
            DEFAULT_CONFIG_FILE
        ),
    };

    if let Some(artifact) = &cli.artifact {
        config.artifact = artifact.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(app_root) = &cli.app_root {
        config.app_root = app_root.clone();
    }

    validate_config(&config)?;
    Ok(config)
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    tracing::info!(
        artifact = %config.artifact_path().display(),
        port = config.port,
        server = %config.server.display(),
        "Starting dev loop"
    );

    let runner = DevLoopRunner::from_config(config)?;
    runner.run(shutdown_signal()).await?;

    tracing::info!("Dev loop exited");
    Ok(())
}
