//! Homologaciones MCP Server
//!
//! This binary runs the MCP server over stdin/stdout transport. Logging
//! goes to stderr; stdout carries the protocol.

use anyhow::Result;
use clap::Parser;
use homologacion_mcp::config::{AuthConfig, DbConfig};
use homologacion_mcp::db::DbGateway;
use homologacion_mcp::homologacion::ApprovalGateway;
use homologacion_mcp::server::HomologacionMcpServer;
use homologacion_mcp::session::{AuthGateway, SessionStore, SWEEP_INTERVAL};
use rmcp::transport::stdio;
use rmcp::ServiceExt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "homologacion-mcp", version, about = "Homologaciones MCP Server")]
struct Cli {
    /// Dotenv file to load (defaults to ./.env when present)
    #[arg(long)]
    env_file: Option<PathBuf>,
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::select! {
            _ = sigterm.recv() => {},
            _ = sigint.recv() => {},
            _ = tokio::signal::ctrl_c() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging to stderr (stdout is used for MCP protocol)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("homologacion_mcp=info")),
        )
        .init();

    let cli = Cli::parse();
    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", path.display()))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    let auth_config = AuthConfig::from_env();
    if auth_config.secret.is_none() {
        warn!("AUTH_SECRET is not set; auth_login will fail until it is configured");
    }
    let db_config = DbConfig::from_env();
    if let Err(e) = &db_config {
        warn!(error = %e, "Database tools will fail until the DB_* variables are configured");
    }

    // The store is constructed once here and injected; the sweeper lives
    // exactly as long as the server.
    let sessions = Arc::new(SessionStore::new());
    let sweeper = sessions.spawn_sweeper(SWEEP_INTERVAL);

    let auth = Arc::new(AuthGateway::new(auth_config.secret, Arc::clone(&sessions)));
    let db = Arc::new(DbGateway::new(db_config));
    let approvals = Arc::new(ApprovalGateway::new());
    let server = HomologacionMcpServer::new(sessions, auth, db, approvals);

    info!("MCP server listening on stdio");
    let service = server.serve(stdio()).await?;

    tokio::select! {
        quit = service.waiting() => {
            let _ = quit;
            info!("Transport closed");
        }
        _ = wait_for_shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    sweeper.abort();
    info!("Server stopped");
    Ok(())
}
