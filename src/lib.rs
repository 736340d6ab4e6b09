//! Documentation of the Abqeri Safe-AI backend.
//!
//! A small edge-hosted web backend: registration/login with signed cookie
//! sessions, a rules-based safety filter gating a proxied streaming chat
//! completion call, static asset serving, and i18n string tables.
//!
//!
//!
//! # General Infrastructure
//! - User talks to this server directly (or through a single reverse proxy)
//! - Chat requests are classified against the guardrail table before any
//!   upstream call is made
//! - Allowed requests are relayed to the hosted model and streamed back as
//!   newline-delimited JSON records
//! - Restricted requests are answered with a synthesized refusal through the
//!   exact same stream shape, so the client never needs a second code path
//! - Everything else falls through to the static asset directory
//!
//!
//!
//! # Wire Contract of `/api/chat`
//!
//! Request: `POST {messages: [{role, content}], mode?, safety?, lang?}`.
//!
//! Response: always `200` with `application/x-ndjson` once past validation.
//! One meta record first, then zero or more token records, then the literal
//! `[DONE]` line. Upstream failure never surfaces as an HTTP error; it shows
//! up as placeholder text inside the stream.
//!
//!
//!
//! # Notes
//!
//! ## Redis
//! Redis holds the user table and the chat audit log. There is no server-side
//! session table; the session is the signed cookie itself, verified with an
//! HMAC tag and a server-side TTL check.
use std::time::Duration;

use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    middleware,
    routing::{get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod config;
pub mod database;
pub mod error;
pub mod guardrails;
pub mod i18n;
pub mod model;
pub mod routes;
pub mod session;
pub mod state;
pub mod stream;
pub mod synth;

use routes::{
    chat_handler, i18n_handler, login_handler, me_handler, register_handler, security_headers,
    status_handler,
};
use state::AppState;

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await;

    info!("Starting server...");

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let app = Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/status", get(status_handler))
        .route("/api/register", post(register_handler))
        .route("/api/login", post(login_handler))
        .route("/api/me", get(me_handler))
        .route("/api/i18n/{lang}", get(i18n_handler))
        .fallback_service(ServeDir::new(&state.config.asset_dir))
        .layer(middleware::from_fn(security_headers))
        .layer(cors)
        .with_state(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
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
