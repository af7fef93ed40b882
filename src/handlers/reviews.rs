// Review handlers
// HTTP handlers for review CRUD operations

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
    models::{CreateReviewRequest, InsertResult, ListReviewsQuery, UpdateReviewRequest},
    store::{SharedStore, UpdateOutcome},
};

/// Create a new review
/// POST /reviews
pub async fn create_review(
    State(store): State<SharedStore>,
    payload: Result<Json<CreateReviewRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    request.validate().map_err(ApiError::Validation)?;

    info!("Creating review for food: {}", request.food_name);

    let inserted_id = store.insert_review(request.into_review()).await?;

    info!("Successfully created review with id: {}", inserted_id);
    Ok((StatusCode::CREATED, Json(InsertResult::new(inserted_id))))
}

/// List reviews, optionally filtered and sorted
/// GET /reviews?email=<email>&search=<text>&limit=<n>&sort=top|recent
pub async fn list_reviews(
    State(store): State<SharedStore>,
    query: Result<Query<ListReviewsQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = query?;
    let filter = params.into_filter().map_err(ApiError::Validation)?;

    info!("Fetching reviews with filter: {:?}", filter);

    let reviews = store.find_reviews(&filter).await?;

    info!("Retrieved {} reviews", reviews.len());
    Ok((StatusCode::OK, Json(reviews)))
}

/// Get review by ID
/// GET /reviews/:id
pub async fn get_review(
    State(store): State<SharedStore>,
    Path(review_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&review_id, "review")?;
    info!("Fetching review with id: {}", id);

    let review = store
        .find_review(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Review with id {}", id)))?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "review": review,
        })),
    ))
}

/// Merge fields into an existing review
/// PUT /reviews/:id
pub async fn update_review(
    State(store): State<SharedStore>,
    Path(review_id): Path<String>,
    payload: Result<Json<UpdateReviewRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&review_id, "review")?;
    let Json(request) = payload?;
    request.validate().map_err(ApiError::Validation)?;

    info!("Updating review with id: {}", id);

    let body = match store.update_review(id, request.into_changes()).await? {
        UpdateOutcome::NotFound => {
            return Err(ApiError::not_found(format!("Review with id {}", id)));
        }
        UpdateOutcome::Unchanged => {
            info!("Review {} left unchanged", id);
            json!({
                "success": false,
                "message": "No changes were applied to the review",
            })
        }
        UpdateOutcome::Modified(review) => {
            info!("Successfully updated review with id: {}", id);
            json!({
                "success": true,
                "message": "Review updated successfully",
                "review": review,
            })
        }
    };

    Ok((StatusCode::OK, Json(body)))
}

/// Delete review by ID
/// DELETE /reviews/:id
pub async fn delete_review(
    State(store): State<SharedStore>,
    Path(review_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&review_id, "review")?;
    info!("Deleting review with id: {}", id);

    if !store.delete_review(id).await? {
        return Err(ApiError::not_found(format!("Review with id {}", id)));
    }

    // Favorites pointing at this review are left in place
    info!("Successfully deleted review with id: {}", id);
    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "Review deleted successfully",
        })),
    ))
}
