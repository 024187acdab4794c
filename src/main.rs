use std::net::IpAddr;

use clap::Parser;

use portcullis::config::GatewayConfig;
use portcullis::observability;
use portcullis::routes::{AppState, build_router};

#[derive(Parser, Debug)]
#[command(version, about = "Portcullis authentication gateway", long_about = None)]
struct Args {
    /// Address to bind the listener on
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to bind the listener on
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    observability::init_tracing();

    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(%error, "invalid configuration");
            std::process::exit(1);
        }
    };

    tracing::info!(
        mode = %config.mode,
        pocketbase_url = %config.pocketbase_url,
        group_enforcement = config.group_field.is_some(),
        "starting gateway"
    );

    if !config.static_dir.exists() {
        tracing::warn!(path = %config.static_dir.display(), "static content directory does not exist");
    }

    let state = AppState::new(config);
    let app = build_router(state);

    let bind_addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();
}

/// Resolve on SIGINT or SIGTERM so container runtimes can stop the gateway
/// cleanly.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
