// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Relay server: accepts WebSocket channels and streams each prompt's
//! generated response back as it is produced.
//!
//! # Routes
//!
//! | Path      | Purpose                                   |
//! |-----------|-------------------------------------------|
//! | `/`       | WebSocket channel (legacy clients)        |
//! | `/ws`     | WebSocket channel                         |
//! | `/health` | liveness probe, returns `ok`              |

mod error;
pub mod relay;
pub mod ws;

use std::{future::Future, net::SocketAddr, sync::Arc};

use axum::{routing::get, Router};
use rill_config::ServerConfig;
use rill_model::ModelProvider;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub use error::RelayError;
pub use relay::{relay_prompt, Outbound, RelayOutcome, UPSTREAM_FAILED};

/// Shared state handed to every channel.
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn ModelProvider>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(provider: Arc<dyn ModelProvider>, config: ServerConfig) -> Self {
        Self { provider, config: Arc::new(config) }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws::ws_handler))
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
}

/// Bind `config.bind_addr()` and serve until Ctrl-C.
pub async fn serve(config: ServerConfig, provider: Arc<dyn ModelProvider>) -> Result<(), RelayError> {
    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| RelayError::Bind { addr: addr.clone(), source })?;
    info!(
        addr = %listener.local_addr()?,
        provider = provider.name(),
        model = provider.model_name(),
        wire_format = config.wire_format.as_str(),
        "relay listening"
    );
    run(listener, AppState::new(provider, config), shutdown_signal()).await
}

/// Serve on an already bound listener until the process exits.
pub async fn serve_on(listener: TcpListener, state: AppState) -> Result<(), RelayError> {
    run(listener, state, std::future::pending()).await
}

async fn run(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), RelayError> {
    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("relay shutting down");
}
