//! Crab Store Mock - in-memory remote store over HTTP
//!
//! Serves [`crab_table::MemoryStore`] with the same routes and
//! `ApiResponse` envelopes the engine's `NetworkStore` talks to.

pub mod api;
pub mod state;

pub use state::AppState;

use axum::Router;
use axum::routing::{get, post, put};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn router(state: AppState) -> Router {
    use tower::limit::ConcurrencyLimitLayer;

    let status_route = if state.patch_enabled {
        put(api::update_order_status).patch(api::update_order_status)
    } else {
        put(api::update_order_status)
    };

    let restaurant_routes = Router::new()
        .route("/tables", get(api::list_tables))
        .route("/tables/{table}/claim", post(api::claim_table))
        .route("/tables/{table}/close", put(api::close_table))
        .route("/tables/{table}/status", put(api::set_table_status))
        .route("/orders", get(api::list_orders).post(api::create_order))
        .route("/sessions", get(api::list_sessions));

    Router::new()
        .nest("/api/restaurants/{slug}", restaurant_routes)
        .route("/api/orders/{id}/status", status_route)
        .route("/health", get(api::health))
        .layer(ConcurrencyLimitLayer::new(100))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
