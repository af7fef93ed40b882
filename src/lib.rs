// Library root for the Local Delish review API

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod store;

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::time::Duration;

use handlers::{
    analytics::data_analytics,
    favorites::{create_favorite, delete_favorite, list_favorites},
    health_check,
    reviews::{create_review, delete_review, get_review, list_reviews, update_review},
    root,
};

// Re-export commonly used types
pub use db::Database;
pub use error::ApiError;
pub use store::{MemoryStore, SharedStore, Store};

/// Create the Axum router with all endpoints and middleware
pub fn build_router(store: SharedStore, request_timeout: Duration) -> Router {
    let router = Router::new()
        // Liveness / readiness
        .route("/", get(root))
        .route("/health", get(health_check))
        // Review endpoints
        .route("/reviews", post(create_review).get(list_reviews))
        .route(
            "/reviews/:id",
            get(get_review).put(update_review).delete(delete_review),
        )
        // Favorite endpoints
        .route("/my-favorites", post(create_favorite).get(list_favorites))
        .route("/my-favorites/:id", delete(delete_favorite))
        // Aggregate counts
        .route("/data-analytics", get(data_analytics))
        // Add shared state (injected store)
        .with_state(store);

    middleware::apply_middleware(router, request_timeout)
}
