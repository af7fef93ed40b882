// Handlers module
// HTTP handlers for the REST API

pub mod analytics;
pub mod favorites;
pub mod reviews;

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use uuid::Uuid;

use crate::{error::ApiError, store::SharedStore};

/// Liveness message served at the root path
/// GET /
pub async fn root() -> impl IntoResponse {
    (StatusCode::OK, "Local Delish Server is running")
}

/// Readiness check: round-trips to the store
/// GET /health
pub async fn health_check(
    State(store): State<SharedStore>,
) -> Result<impl IntoResponse, ApiError> {
    store.health_check().await?;
    Ok((StatusCode::OK, "OK"))
}

/// パスパラメータの ID を UUID として解釈する。
/// 失敗した場合はリクエストを落とさず `ApiError::Validation` (400) を返す。
pub(crate) fn parse_id(raw: &str, resource: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::validation(format!("Invalid {} ID format: '{}'", resource, raw)))
}
