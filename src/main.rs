// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use tenant_session_auth::{
    api::router,
    config::{AuthSettings, LogFormat, ServerSettings, DEFAULT_LOG_FILTER},
    state::AppState,
};
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let server = match ServerSettings::from_env() {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Invalid server configuration: {e}");
            std::process::exit(1);
        }
    };
    init_tracing(server.log_format);

    let settings = match AuthSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Invalid authentication configuration");
            std::process::exit(1);
        }
    };

    let state = match AppState::from_settings(&settings) {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "Failed to build security service client");
            std::process::exit(1);
        }
    };

    match state.signing_keys.get().await {
        Ok(_) => info!("Bearer signing certificate loaded"),
        Err(e) => error!(error = %e, "Bearer signing certificate unavailable, will retry on demand"),
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(listen_for_shutdown(shutdown.clone()));

    let addr = server.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listener");

    info!(
        %addr,
        security_service = %settings.security_service_url,
        proxy = settings.proxy_address.is_some(),
        "Tenant session auth listening (docs at /docs)"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .expect("HTTP server failed");

    info!("Server stopped");
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn listen_for_shutdown(shutdown: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}
