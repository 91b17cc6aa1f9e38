#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::Context;
use gateway_api::{construct_router, extraction::FatalError, state::State};
use std::{future::IntoFuture, sync::Arc};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenv::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(err) = dotenv {
        tracing::warn!("No .env file loaded ({}), using process environment", err);
    }

    tracing::info!("Starting gateway");

    let config = config::GatewayConfig::from_env().context("invalid configuration")?;
    tracing::info!(
        port = config.port,
        inference = %config.state.inference.url,
        otp_replay_policy = ?config.state.otp_replay_policy,
        "Loaded configuration"
    );

    let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel::<FatalError>();
    let state = Arc::new(
        State::connect(&config.state, fatal_tx)
            .await
            .context("failed to initialise gateway state")?,
    );

    let app = construct_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("could not bind {addr}"))?;
    tracing::info!("Listening on {}", addr);

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .into_future();

    tokio::select! {
        served = server => {
            served.context("server error")?;
            tracing::info!("Gateway stopped");
            Ok(())
        }
        Some(fatal) = fatal_rx.recv() => {
            tracing::error!(error = %fatal, "Fatal error, exiting for restart");
            std::process::exit(1);
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!("Could not listen for ctrl-c: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!("Could not listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
