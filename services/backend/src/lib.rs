// Library interface for backend - exposes modules for testing

pub mod config;
pub mod domain;
pub mod errors;
pub mod extractors;
pub mod handlers;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use state::AppState;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health::health_check))
        .route("/health/detailed", get(handlers::health::detailed_health))
        // Crash round
        .route("/api/crash/state", get(handlers::crash::get_state))
        .route("/api/crash/bets", post(handlers::crash::place_bet))
        .route("/api/crash/cashouts", post(handlers::crash::cash_out))
        .route("/api/crash/history", get(handlers::crash::list_history))
        .route(
            "/api/crash/history/:round_id/verify",
            get(handlers::crash::verify_round),
        )
        // Pari-mutuel markets
        .route("/api/markets/settle", post(handlers::markets::settle))
        // Live events
        .route("/ws", get(handlers::ws::ws_handler))
        // State
        .with_state(state)
        // Middleware
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}
