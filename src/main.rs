// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use identity_auth_server::{
    api::router,
    auth::{KeyError, SigningKeys},
    config::{Config, ConfigError, LogFormat},
    init_tracing,
    oauth::{LineProvider, OAuthError, OAuthProviders},
    state::AppState,
    storage::{IdentityDatabase, RepoError, DATABASE_FILE},
};
use tokio_util::sync::CancellationToken;

/// Failures that stop the process before it serves requests.
#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to load signing key: {0}")]
    Key(#[from] KeyError),

    #[error("failed to open identity database: {0}")]
    Database(#[from] RepoError),

    #[error("failed to set up OAuth provider: {0}")]
    OAuth(#[from] OAuthError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

#[tokio::main]
async fn main() {
    init_tracing(LogFormat::from_env());

    if let Err(e) = run().await {
        tracing::error!(error = %e, "Startup failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    let config = Config::from_env()?;

    let keys = SigningKeys::load(&config.private_key_path, &config.key_allowed_dirs)?;

    let database = IdentityDatabase::open(&config.data_dir.join(DATABASE_FILE))?;

    let mut oauth = OAuthProviders::new();
    if let Some(line) = config.line.clone() {
        oauth = oauth.with(Arc::new(LineProvider::new(line)?));
    }
    tracing::info!(providers = ?oauth.names(), "OAuth providers configured");

    let state = AppState::new(keys, database)
        .with_oauth(oauth)
        .with_frontend_callback_url(config.frontend_callback_url.clone());
    let app = router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| StartupError::Bind {
            addr: addr.clone(),
            source,
        })?;
    tracing::info!(%addr, "Identity auth server listening (docs at /docs)");

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_on_ctrl_c(shutdown.clone()));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(StartupError::Serve)?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_on_ctrl_c(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
