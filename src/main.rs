// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, process::ExitCode, sync::Arc};

use campus_api::{
    api::router,
    bootstrap::seed_admin,
    config::Config,
    logging::init_tracing,
    mailer::LogMailer,
    state::AppState,
    storage::Database,
    sweeper::ActivationSweeper,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let db = match Database::open(&config.database_path()) {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(error = %e, "failed to open database");
            return ExitCode::FAILURE;
        }
    };

    if let Some(admin) = &config.seed_admin {
        if let Err(e) = seed_admin(&db, admin).await {
            tracing::error!(error = %e, "failed to seed admin account");
            return ExitCode::FAILURE;
        }
    }

    let addr = config.bind_addr();
    let env = config.env.clone();
    let sweep_interval = config.sweep_interval;
    let mailer = Arc::new(LogMailer::new(config.mail_sender.clone()));
    let state = AppState::new(config, db, mailer);

    let shutdown = CancellationToken::new();
    let sweeper = ActivationSweeper::new(state.db.clone(), state.tasks.clone())
        .with_interval(sweep_interval);
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown.clone()));
    let pruner_handle = tokio::spawn(state.limiter.clone().run_pruner(shutdown.clone()));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "failed to bind");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(%addr, %env, "campus api listening (docs at /docs)");

    let app = router(state.clone());
    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    shutdown.cancel();
    let _ = sweeper_handle.await;
    let _ = pruner_handle.await;
    tracing::info!(pending = state.tasks.len(), "draining background tasks");
    state.tasks.shutdown().await;

    match served {
        Ok(()) => {
            tracing::info!("server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "server error");
            ExitCode::FAILURE
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl-C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
