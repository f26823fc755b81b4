//! DougChat Server - Main entry point.
//!
//! This binary starts the DougChat server with:
//! - Structured JSON logging
//! - A Supabase readiness probe (or the in-memory backend)
//! - Graceful shutdown handling (SIGTERM/SIGINT)
//!
//! # Configuration
//!
//! See [`dougchat_server::config`] for environment variable configuration.
//!
//! # Example
//!
//! ```bash
//! # Development mode (in-memory store and auth)
//! DOUGCHAT_UNSAFE_MEMORY_BACKEND=true DOUGCHAT_SECURE_COOKIES=false \
//!   cargo run --bin dougchat-server
//!
//! # Production mode
//! DOUGCHAT_SUPABASE_URL="https://xyz.supabase.co" \
//! DOUGCHAT_SUPABASE_ANON_KEY="..." \
//! PORT=8080 \
//! cargo run --release --bin dougchat-server
//! ```

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use dougchat_server::config::{Backend, Config};
use dougchat_server::memory::MemoryBackend;
use dougchat_server::routes::{create_router, AppState};
use dougchat_server::supabase::SupabaseClient;

/// Cleanup interval for expired in-memory sessions (60 seconds).
const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load configuration");
            eprintln!("Error: {err}");
            eprintln!();
            eprintln!("Required environment variables:");
            eprintln!("  DOUGCHAT_SUPABASE_URL           - Supabase project URL");
            eprintln!("  DOUGCHAT_SUPABASE_ANON_KEY      - Supabase anon key");
            eprintln!();
            eprintln!("Optional environment variables:");
            eprintln!("  PORT                            - HTTP server port (default: 8080)");
            eprintln!("  RUST_LOG                        - Log level filter (default: info)");
            eprintln!("  DOUGCHAT_TRUST_CLIENT_EMAIL     - Store the sender email from the request body");
            eprintln!("  DOUGCHAT_SECURE_COOKIES         - Secure session cookie (default: true)");
            eprintln!("  DOUGCHAT_UNSAFE_MEMORY_BACKEND  - In-memory store and auth (dev only)");
            return ExitCode::from(1);
        }
    };

    match run(config).await {
        Ok(()) => {
            info!("Server shutdown complete");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = ?err, "Server failed");
            ExitCode::from(1)
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let mut cleanup_handle = None;

    let state = match &config.backend {
        Backend::Supabase { url, anon_key } => {
            info!(port = config.port, supabase_url = %url, "DougChat server starting");

            let client = SupabaseClient::new(url.as_str(), anon_key.as_str())
                .context("failed to create Supabase client")?;
            client
                .wait_until_ready()
                .await
                .context("Supabase did not become ready")?;

            AppState::from_backend(config.clone(), Arc::new(client))
                .context("failed to compile page templates")?
        }
        Backend::Memory => {
            info!(port = config.port, backend = "memory (UNSAFE)", "DougChat server starting");

            let backend = Arc::new(MemoryBackend::new());
            cleanup_handle = Some(backend.spawn_cleanup_task(SESSION_CLEANUP_INTERVAL));

            AppState::from_backend(config.clone(), backend)
                .context("failed to compile page templates")?
        }
    };

    let app = create_router(state);

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind to {bind_addr}"))?;
    info!(port = config.port, address = %bind_addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server shutting down gracefully");
    if let Some(handle) = cleanup_handle {
        handle.abort();
    }

    Ok(())
}

/// Initialize structured logging with tracing.
///
/// JSON output, filtered by `RUST_LOG` with a default of `info` plus request
/// traces from tower-http.
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,axum::rejection=trace"));

    let json_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .init();
}

/// Resolves when SIGTERM or SIGINT (Ctrl+C) is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
