//! pandav-bridge - Transfer bridge between Rec cloud storage and a WebDAV endpoint.

mod auth;
mod config;
mod contracts;
mod daemon;
mod error;
mod routes;
mod state;
mod transfer;
mod utils;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use crate::config::Config;
use crate::daemon::shutdown::ShutdownCoordinator;
use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = if let Some(path) = args.config {
        Config::from_file(&path)?
    } else {
        Config::default()
    };

    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    let port = args.port.unwrap_or(config.server.port);

    tracing::info!("Starting pandav-bridge v{}", env!("CARGO_PKG_VERSION"));

    let state = Arc::new(AppState::new(config));
    let app = routes::router(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{addr}");

    let shutdown = ShutdownCoordinator::new();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.wait_for_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
