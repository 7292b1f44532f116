//! Dream Library server
//!
//! Serves the EPUB catalog, accounts and admin reports over HTTP.

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info, warn};

use dreamlib_core::config::load_config;
use dreamlib_core::tracing_init::{DEFAULT_FILTER, LogFormat, init_tracing};
use dreamlib_server::{AppState, build_router};

#[derive(Parser, Debug)]
#[command(name = "dreamlib-server")]
#[command(version, about = "Dream Library server - EPUB catalog, accounts and analytics")]
struct Args {
    /// Address to listen on (overrides config).
    #[arg(long)]
    addr: Option<String>,

    /// Path to a JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding users.json, downloads.json and the other tables.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory holding the EPUB files, metadata/ and covers/.
    #[arg(long)]
    books_dir: Option<PathBuf>,

    /// JWT signing secret.
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,

    /// Always mark the session cookie Secure.
    #[arg(long)]
    secure_cookies: bool,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(DEFAULT_FILTER, LogFormat::from_json_flag(args.log_json))?;

    let mut config = load_config(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        config.server.listen_addr = addr;
    }
    if let Some(dir) = args.data_dir {
        config.storage.data_dir = dir;
    }
    if let Some(dir) = args.books_dir {
        config.storage.books_dir = dir;
    }
    if let Some(secret) = args.jwt_secret {
        config.auth.jwt_secret = secret;
    }
    if args.secure_cookies {
        config.server.secure_cookies = true;
    }

    if config.auth.jwt_secret == dreamlib_core::config::AuthConfig::default().jwt_secret {
        warn!("Using the built-in development JWT secret; set JWT_SECRET in production");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.server.listen_addr,
        data_dir = %config.storage.data_dir.display(),
        "Starting dreamlib-server"
    );

    let addr = config.server.listen_addr.clone();
    let state = AppState::from_config(config)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
