//! Documentation of the governance voting dashboard backend.
//!
//!
//!
//! # General Infrastructure
//! - Frontend renders proposals, tallies and "load more"; it never talks to a subgraph directly
//! - Proposal, vote and cancellation events come from the governance subgraph
//! - Delegate balance changes come from the delegate subgraph
//! - Delegate documents live in Redis and are refreshed by the sync job
//!
//!
//!
//! # Routes
//!
//! | Method | Path | Response |
//! |---|---|---|
//! | POST | `/sync` | 202 `{message}`, 409 `{error}` while a run is active |
//! | GET | `/sync` | last run status with summary |
//! | POST | `/boards` | new session, first page of proposals with tallies |
//! | POST | `/boards/{session}/more` | next page of the session |
//! | GET | `/proposals/{id}/votes` | one proposal's tally |
//! | GET | `/canceled` | canceled proposals, newest first |
//!
//! Errors are always `{error}` with a 4xx/5xx status.
//!
//!
//!
//! # Notes
//!
//! ## Why sync in the background
//! One subgraph lookup per delegate adds up to minutes for a few thousand delegates.
//! Holding the HTTP request open that long invites proxy timeouts, so the request
//! only starts the run and the outcome is polled.
//!
//! ## Snapshot balances
//! Balances are synced as of `BALANCE_CUTOFF`, not as of now. Re-running the sync
//! without upstream changes is a no-op.
//!
//!
//!
//! # Setup
//!
//! Run locally.
//! ```sh
//! REDIS_URL=redis://localhost:6379 RUST_LOG=info cargo run -p dashboard
//! ```
//!
//! One-off sync from the command line.
//! ```sh
//! REDIS_URL=redis://localhost:6379 cargo run -p process -- --batch-size 500
//! ```
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::{get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod board;
pub mod error;
pub mod jobs;
pub mod routes;
pub mod state;

use routes::{
    canceled_handler, more_handler, open_board_handler, start_sync_handler, sync_status_handler,
    votes_handler,
};
use state::State;

pub fn app(state: Arc<State>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/sync", post(start_sync_handler).get(sync_status_handler))
        .route("/boards", post(open_board_handler))
        .route("/boards/{session}/more", post(more_handler))
        .route("/proposals/{id}/votes", get(votes_handler))
        .route("/canceled", get(canceled_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = State::new().await?;

    info!("Starting server...");

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down...");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
