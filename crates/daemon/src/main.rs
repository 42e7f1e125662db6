// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

use axum::routing::get;
use axum::Router;
use kh_daemon::config::Config;
use kh_daemon::{http, lifecycle, link_ws};
use std::error::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    let config = Config::load()?;
    let result = lifecycle::startup(config).await?;
    let state = result.state;

    let app = Router::new()
        .route("/agent/ws", get(link_ws::handler))
        .route("/vnc-viewer/{session_id}", get(http::vnc_ws::handler))
        .with_state(state.clone())
        .nest("/api/v1", http::router(state.clone()));

    let listener = tokio::net::TcpListener::bind(state.config.bind_addr.as_str()).await?;
    tracing::info!(addr = %state.config.bind_addr, "listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    lifecycle::shutdown(&state, result.lock_file)?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_dir = std::env::var("KH_LOG_DIR").ok();
    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "khd.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            Box::leak(Box::new(guard));
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(writer))
                .init();
        }
        None => {
            tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).init();
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
