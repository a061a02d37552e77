// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;

use axum_server::{tls_rustls::RustlsConfig, Handle};
use tokio_util::sync::CancellationToken;

use relational_gatekeeper::{
    api::router,
    config::Config,
    state::{seed_admin, AppState, Backends},
    telemetry::{self, LogFormat},
};

#[tokio::main]
async fn main() -> ExitCode {
    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        eprintln!("Failed to install rustls crypto provider");
        return ExitCode::FAILURE;
    }

    telemetry::init(LogFormat::from_env());

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(?config, "Loaded configuration");

    let (backends, credentials) = Backends::in_memory(&config);
    let state = match AppState::new(&config, backends) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize application state");
            return ExitCode::FAILURE;
        }
    };

    if let Some(password) = config.seed_admin_password.as_deref() {
        if let Err(e) = seed_admin(&credentials, &state.rbac, password).await {
            tracing::error!(error = %e, "Failed to seed admin account");
            return ExitCode::FAILURE;
        }
    }

    let app = router(state);

    let shutdown = CancellationToken::new();
    let handle = Handle::new();
    {
        let shutdown = shutdown.clone();
        let handle = handle.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => tracing::info!("Shutdown signal received"),
                _ = shutdown.cancelled() => {}
            }
            handle.graceful_shutdown(Some(std::time::Duration::from_secs(10)));
        });
    }

    let addr = config.bind_addr;
    let served = match &config.tls {
        Some(tls) => {
            let tls_config = match RustlsConfig::from_pem_file(&tls.cert, &tls.key).await {
                Ok(tls_config) => tls_config,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to load TLS certificate");
                    return ExitCode::FAILURE;
                }
            };
            tracing::info!(%addr, "Gatekeeper listening on https (docs at /docs)");
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
        None => {
            tracing::info!(%addr, "Gatekeeper listening on http (docs at /docs)");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
    };
    shutdown.cancel();

    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}
