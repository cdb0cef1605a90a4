// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::signal::unix::{signal as unix_signal, SignalKind};

use drift_http::config::Config;
use drift_http::server::{self, AppState};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cfg = Config::parse();

    if cfg.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is required");
    }
    if cfg.encryption_key.is_empty() {
        warn!("ENCRYPTION_KEY not set, secrets will be stored in plaintext");
    }
    if cfg.auth_token.is_empty() {
        warn!("AUTH_TOKEN not set, accepting any bearer token (development mode)");
    }

    let state = Arc::new(AppState::new(cfg.verifier()));

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let (addr, server) = server::serve(cfg.listen_addr(), state, async move {
        let _ = shutdown_rx.await;
    })?;
    info!(%addr, environment = %cfg.environment, "server started");
    let server_task = tokio::spawn(server);

    let mut terminate = unix_signal(SignalKind::terminate())?;
    tokio::select! {
        _ = signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
    info!("shutting down");
    let _ = shutdown_tx.send(());

    // bounded drain; an SSE stream left open must not keep the process
    // alive past the window
    match tokio::time::timeout(Duration::from_secs(30), server_task).await {
        Ok(joined) => joined??,
        Err(_) => warn!("drain window elapsed, exiting with connections open"),
    }

    info!("server exited gracefully");
    Ok(())
}
