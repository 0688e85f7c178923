use auth::GuestAuthenticator;
use axum::{routing::get, Router};
use config::ServerConfig;
use game_manager::AppState;
use rating::EloRating;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use ws::ws_handler;

mod auth;
mod config;
mod engine;
mod error;
mod game_manager;
mod rating;
mod ws;

#[tokio::main]
async fn main() {
    // initialize tracing
    tracing_subscriber::fmt::init();

    let config = ServerConfig::from_env().expect("Failed to load configuration");
    config.validate().expect("Invalid configuration");

    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::new(GuestAuthenticator::default()),
        Arc::new(EloRating::default()),
    ));
    state.clone().spawn_sweep_task();

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("listening on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .expect("Failed to bind to address");
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
