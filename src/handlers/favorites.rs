// Favorite handlers
// HTTP handlers for a user's favorite reviews

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use tracing::info;

use super::parse_id;
use crate::{
    error::ApiError,
    models::{CreateFavoriteRequest, InsertResult, ListFavoritesQuery},
    store::SharedStore,
};

/// Add a review to a user's favorites
/// POST /my-favorites
///
/// 既に同じ (foodId, userEmail) が登録済みなら 409 ではなく 200 で通知する。
/// クライアントから見て冪等な操作にするため。
pub async fn create_favorite(
    State(store): State<SharedStore>,
    payload: Result<Json<CreateFavoriteRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    request.validate().map_err(ApiError::Validation)?;

    info!("Adding favorite food_id: {} for {}", request.food_id, request.user_email);

    let response = match store.insert_favorite(request.into_favorite()).await? {
        Some(inserted_id) => {
            info!("Successfully created favorite with id: {}", inserted_id);
            (
                StatusCode::CREATED,
                Json(json!(InsertResult::new(inserted_id))),
            )
        }
        None => {
            info!("Favorite already exists, nothing inserted");
            (
                StatusCode::OK,
                Json(json!({
                    "success": false,
                    "message": "Already in favorites",
                })),
            )
        }
    };

    Ok(response)
}

/// List favorites, optionally for one user
/// GET /my-favorites?email=<email>
pub async fn list_favorites(
    State(store): State<SharedStore>,
    query: Result<Query<ListFavoritesQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = query?;
    let email = params.email();

    let favorites = store.find_favorites(email.as_deref()).await?;

    info!("Retrieved {} favorites", favorites.len());
    Ok((StatusCode::OK, Json(favorites)))
}

/// Remove a favorite by ID
/// DELETE /my-favorites/:id
pub async fn delete_favorite(
    State(store): State<SharedStore>,
    Path(favorite_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&favorite_id, "favorite")?;
    info!("Deleting favorite with id: {}", id);

    let deleted_count = store.delete_favorite(id).await?;

    info!("Deleted {} favorites for id: {}", deleted_count, id);
    Ok((
        StatusCode::OK,
        Json(json!({
            "success": deleted_count > 0,
            "result": { "deletedCount": deleted_count },
        })),
    ))
}
