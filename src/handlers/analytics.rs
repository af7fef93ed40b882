use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::info;

use crate::{error::ApiError, models::Analytics, store::SharedStore};

/// Collection totals
/// GET /data-analytics
pub async fn data_analytics(
    State(store): State<SharedStore>,
) -> Result<impl IntoResponse, ApiError> {
    let (total_reviews, total_favorites) =
        tokio::try_join!(store.count_reviews(), store.count_favorites())?;

    info!(total_reviews, total_favorites, "Computed analytics");
    Ok((
        StatusCode::OK,
        Json(Analytics {
            total_reviews,
            total_favorites,
        }),
    ))
}
