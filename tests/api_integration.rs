//! Integration tests for the review API endpoints.
//!
//! Drives the full router (middleware included) against the in-memory store.

use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use futures::future::join_all;
use local_delish_api::error::ApiResult;
use local_delish_api::models::{Favorite, Review, ReviewChanges, ReviewFilter};
use local_delish_api::store::UpdateOutcome;
use local_delish_api::{build_router, ApiError, MemoryStore, SharedStore, Store};
use serde_json::{json, Value};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Build test server with the application router
fn build_test_server() -> TestServer {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let app = build_router(store, Duration::from_secs(30));
    TestServer::new(app).unwrap()
}

/// Store whose backend is gone: every call fails the way a dropped database does
struct UnavailableStore;

fn unavailable<T>() -> ApiResult<T> {
    Err(ApiError::Database("Database service unavailable".to_string()))
}

#[async_trait]
impl Store for UnavailableStore {
    async fn health_check(&self) -> ApiResult<()> {
        unavailable()
    }

    async fn insert_review(&self, _review: Review) -> ApiResult<Uuid> {
        unavailable()
    }

    async fn find_reviews(&self, _filter: &ReviewFilter) -> ApiResult<Vec<Review>> {
        unavailable()
    }

    async fn find_review(&self, _id: Uuid) -> ApiResult<Option<Review>> {
        unavailable()
    }

    async fn update_review(&self, _id: Uuid, _changes: ReviewChanges) -> ApiResult<UpdateOutcome> {
        unavailable()
    }

    async fn delete_review(&self, _id: Uuid) -> ApiResult<bool> {
        unavailable()
    }

    async fn insert_favorite(&self, _favorite: Favorite) -> ApiResult<Option<Uuid>> {
        unavailable()
    }

    async fn find_favorites(&self, _email: Option<&str>) -> ApiResult<Vec<Favorite>> {
        unavailable()
    }

    async fn delete_favorite(&self, _id: Uuid) -> ApiResult<u64> {
        unavailable()
    }

    async fn count_reviews(&self) -> ApiResult<u64> {
        unavailable()
    }

    async fn count_favorites(&self) -> ApiResult<u64> {
        unavailable()
    }
}

fn build_unavailable_server() -> TestServer {
    let store: SharedStore = Arc::new(UnavailableStore);
    let app = build_router(store, Duration::from_secs(30));
    TestServer::new(app).unwrap()
}

/// Create a review and return its inserted id
async fn create_review(server: &TestServer, body: Value) -> String {
    let response = server.post("/reviews").json(&body).await;
    response.assert_status(StatusCode::CREATED);

    let ack: Value = response.json();
    assert_eq!(ack["acknowledged"], json!(true));
    ack["insertedId"].as_str().unwrap().to_string()
}

fn review_body(food_name: &str, rating: f64, email: &str) -> Value {
    json!({
        "foodName": food_name,
        "rating": rating,
        "userEmail": email,
    })
}

async fn analytics(server: &TestServer) -> (u64, u64) {
    let response = server.get("/data-analytics").await;
    response.assert_status_ok();
    let body: Value = response.json();
    (
        body["totalReviews"].as_u64().unwrap(),
        body["totalFavorites"].as_u64().unwrap(),
    )
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_root_reports_running() {
    let server = build_test_server();

    let response = server.get("/").await;
    response.assert_status_ok();
    response.assert_text("Local Delish Server is running");
}

#[tokio::test]
async fn test_health_check() {
    let server = build_test_server();

    let response = server.get("/health").await;
    response.assert_status_ok();
    response.assert_text("OK");
}

// ============================================================================
// Reviews
// ============================================================================

#[tokio::test]
async fn test_create_then_fetch_returns_payload_with_id() {
    let server = build_test_server();

    let payload = json!({
        "foodName": "Margherita Pizza",
        "rating": 4.5,
        "userEmail": "foodie@example.com",
        "createdAt": "2024-05-01T12:00:00Z",
        "restaurantName": "Luigi's",
        "reviewText": "Perfect crust",
    });
    let id = create_review(&server, payload.clone()).await;

    let response = server.get(&format!("/reviews/{}", id)).await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["success"], json!(true));

    let mut expected = payload;
    expected["_id"] = json!(id);
    assert_eq!(body["review"], expected);

    // Integer ratings come back as integers
    let payload = json!({
        "foodName": "Carbonara",
        "rating": 4,
        "userEmail": "foodie@example.com",
        "createdAt": "2024-05-02T12:00:00Z",
    });
    let id = create_review(&server, payload.clone()).await;

    let body: Value = server.get(&format!("/reviews/{}", id)).await.json();
    let mut expected = payload;
    expected["_id"] = json!(id);
    assert_eq!(body["review"], expected);
    assert!(body["review"]["rating"].is_u64());
}

#[tokio::test]
async fn test_create_without_created_at_gets_timestamp() {
    let server = build_test_server();

    let id = create_review(&server, review_body("Ramen", 4.0, "a@example.com")).await;

    let body: Value = server.get(&format!("/reviews/{}", id)).await.json();
    assert!(body["review"]["createdAt"].is_string());
}

#[tokio::test]
async fn test_create_rejects_malformed_reviews() {
    let server = build_test_server();

    // Missing foodName
    let response = server
        .post("/reviews")
        .json(&json!({"rating": 3, "userEmail": "a@example.com"}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));

    // Rating out of range
    let response = server
        .post("/reviews")
        .json(&review_body("Ramen", 11.0, "a@example.com"))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    // Client-chosen identifier
    let mut body = review_body("Ramen", 4.0, "a@example.com");
    body["_id"] = json!("abc");
    let response = server.post("/reviews").json(&body).await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let (total_reviews, _) = analytics(&server).await;
    assert_eq!(total_reviews, 0);
}

#[tokio::test]
async fn test_search_is_case_insensitive_substring() {
    let server = build_test_server();

    create_review(&server, review_body("Pepperoni PIZZA", 4.0, "a@example.com")).await;
    create_review(&server, review_body("pizza bianca", 3.0, "b@example.com")).await;
    create_review(&server, review_body("Sushi Platter", 5.0, "a@example.com")).await;

    let response = server.get("/reviews").add_query_param("search", "pizza").await;
    response.assert_status_ok();

    let reviews: Vec<Value> = response.json();
    assert_eq!(reviews.len(), 2);
    for review in &reviews {
        let name = review["foodName"].as_str().unwrap().to_lowercase();
        assert!(name.contains("pizza"), "unexpected match: {}", name);
    }
}

#[tokio::test]
async fn test_sort_top_orders_by_rating() {
    let server = build_test_server();

    for (name, rating) in [("Tacos", 3.5), ("Pho", 5.0), ("Bagel", 1.0), ("Curry", 4.0)] {
        create_review(&server, review_body(name, rating, "a@example.com")).await;
    }

    let reviews: Vec<Value> = server
        .get("/reviews")
        .add_query_param("sort", "top")
        .await
        .json();

    let ratings: Vec<f64> = reviews.iter().map(|r| r["rating"].as_f64().unwrap()).collect();
    assert_eq!(ratings.len(), 4);
    assert!(ratings.windows(2).all(|pair| pair[0] >= pair[1]), "{:?}", ratings);
}

#[tokio::test]
async fn test_default_order_is_most_recent_first() {
    let server = build_test_server();

    for (name, created_at) in [
        ("Old", "2023-01-01T00:00:00Z"),
        ("New", "2024-06-01T00:00:00Z"),
        ("Middle", "2023-09-01T00:00:00Z"),
    ] {
        let mut body = review_body(name, 3.0, "a@example.com");
        body["createdAt"] = json!(created_at);
        create_review(&server, body).await;
    }

    let reviews: Vec<Value> = server.get("/reviews").await.json();
    let names: Vec<&str> = reviews.iter().map(|r| r["foodName"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["New", "Middle", "Old"]);
}

#[tokio::test]
async fn test_email_filter_and_limit() {
    let server = build_test_server();

    create_review(&server, review_body("One", 3.0, "mine@example.com")).await;
    create_review(&server, review_body("Two", 3.0, "Mine@Example.com")).await;
    create_review(&server, review_body("Three", 3.0, "other@example.com")).await;

    let mine: Vec<Value> = server
        .get("/reviews")
        .add_query_param("email", "mine@example.com")
        .await
        .json();
    assert_eq!(mine.len(), 2);

    let limited: Vec<Value> = server
        .get("/reviews")
        .add_query_param("limit", "1")
        .await
        .json();
    assert_eq!(limited.len(), 1);

    let response = server.get("/reviews").add_query_param("limit", "0").await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server.get("/reviews").add_query_param("sort", "cheapest").await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_review_invalid_and_missing_ids() {
    let server = build_test_server();

    let response = server.get("/reviews/not-a-valid-id").await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .get("/reviews/123e4567-e89b-12d3-a456-426614174000")
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], json!("NOT_FOUND"));
}

#[tokio::test]
async fn test_update_distinguishes_missing_unchanged_and_modified() {
    let server = build_test_server();
    let id = create_review(&server, review_body("Tacos", 3.0, "a@example.com")).await;
    let path = format!("/reviews/{}", id);

    // Changed
    let response = server
        .put(&path)
        .json(&json!({"rating": 4.5, "reviewText": "Even better the second time"}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["review"]["_id"], json!(id));
    assert_eq!(body["review"]["rating"], json!(4.5));

    let review: Value = server.get(&path).await.json();
    assert_eq!(review["review"]["rating"], json!(4.5));
    assert_eq!(review["review"]["foodName"], json!("Tacos"));
    assert_eq!(review["review"]["reviewText"], json!("Even better the second time"));

    // Same values again: record exists, nothing changes
    let response = server.put(&path).json(&json!({"rating": 4.5})).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], json!(false));

    // Missing record
    let response = server
        .put("/reviews/123e4567-e89b-12d3-a456-426614174000")
        .json(&json!({"rating": 2.0}))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);

    // Invalid payloads
    server.put(&path).json(&json!({})).await.assert_status(StatusCode::BAD_REQUEST);
    server
        .put(&path)
        .json(&json!({"createdAt": "2020-01-01T00:00:00Z"}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    server
        .put("/reviews/nope")
        .json(&json!({"rating": 2.0}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_review() {
    let server = build_test_server();
    let id = create_review(&server, review_body("Tacos", 3.0, "a@example.com")).await;

    let response = server.delete(&format!("/reviews/{}", id)).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], json!(true));

    // Gone now: not found, not a server error
    let response = server.delete(&format!("/reviews/{}", id)).await;
    response.assert_status(StatusCode::NOT_FOUND);

    let response = server.delete("/reviews/garbage").await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

// ============================================================================
// Favorites
// ============================================================================

#[tokio::test]
async fn test_duplicate_favorite_reports_already_exists() {
    let server = build_test_server();
    let food_id = create_review(&server, review_body("Pho", 5.0, "a@example.com")).await;
    let favorite = json!({"foodId": food_id, "userEmail": "fan@example.com"});

    let response = server.post("/my-favorites").json(&favorite).await;
    response.assert_status(StatusCode::CREATED);
    let ack: Value = response.json();
    assert!(ack["insertedId"].is_string());

    let response = server.post("/my-favorites").json(&favorite).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["message"], json!("Already in favorites"));

    let favorites: Vec<Value> = server
        .get("/my-favorites")
        .add_query_param("email", "fan@example.com")
        .await
        .json();
    assert_eq!(favorites.len(), 1);
    assert_eq!(favorites[0]["foodId"], json!(food_id));
}

#[tokio::test]
async fn test_concurrent_identical_favorites_persist_once() {
    let server = build_test_server();
    let favorite = json!({"foodId": "food-42", "userEmail": "racer@example.com"});

    let requests: Vec<_> = (0..16)
        .map(|_| server.post("/my-favorites").json(&favorite).into_future())
        .collect();
    let responses = join_all(requests).await;

    let created = responses
        .iter()
        .filter(|response| response.status_code() == StatusCode::CREATED)
        .count();
    assert_eq!(created, 1);
    assert!(responses
        .iter()
        .all(|r| r.status_code() == StatusCode::CREATED || r.status_code() == StatusCode::OK));

    let favorites: Vec<Value> = server.get("/my-favorites").await.json();
    assert_eq!(favorites.len(), 1);
}

#[tokio::test]
async fn test_list_favorites_filters_by_email() {
    let server = build_test_server();

    let favorites = [
        ("f1", "a@example.com"),
        ("f2", "a@example.com"),
        ("f1", "b@example.com"),
    ];
    for (food_id, email) in favorites {
        server
            .post("/my-favorites")
            .json(&json!({"foodId": food_id, "userEmail": email}))
            .await
            .assert_status(StatusCode::CREATED);
    }

    let all: Vec<Value> = server.get("/my-favorites").await.json();
    assert_eq!(all.len(), 3);

    let mine: Vec<Value> = server
        .get("/my-favorites")
        .add_query_param("email", "a@example.com")
        .await
        .json();
    assert_eq!(mine.len(), 2);
}

#[tokio::test]
async fn test_delete_favorite() {
    let server = build_test_server();

    let ack: Value = server
        .post("/my-favorites")
        .json(&json!({"foodId": "f1", "userEmail": "a@example.com"}))
        .await
        .json();
    let id = ack["insertedId"].as_str().unwrap().to_string();

    let response = server.delete(&format!("/my-favorites/{}", id)).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["result"]["deletedCount"], json!(1));

    let body: Value = server.delete(&format!("/my-favorites/{}", id)).await.json();
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["result"]["deletedCount"], json!(0));

    server
        .delete("/my-favorites/not-an-id")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_favorite_validation() {
    let server = build_test_server();

    server
        .post("/my-favorites")
        .json(&json!({"userEmail": "a@example.com"}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    server
        .post("/my-favorites")
        .json(&json!({"foodId": "f1", "userEmail": "not-an-email"}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

// ============================================================================
// Analytics
// ============================================================================

#[tokio::test]
async fn test_analytics_tracks_inserts_and_deletes() {
    let server = build_test_server();
    assert_eq!(analytics(&server).await, (0, 0));

    let first = create_review(&server, review_body("Pho", 5.0, "a@example.com")).await;
    create_review(&server, review_body("Tacos", 4.0, "a@example.com")).await;
    server
        .post("/my-favorites")
        .json(&json!({"foodId": first, "userEmail": "a@example.com"}))
        .await
        .assert_status(StatusCode::CREATED);
    assert_eq!(analytics(&server).await, (2, 1));

    server
        .delete(&format!("/reviews/{}", first))
        .await
        .assert_status_ok();
    // No cascade: the favorite survives its review
    assert_eq!(analytics(&server).await, (1, 1));
}

// ============================================================================
// Store failures
// ============================================================================

async fn assert_database_error(response: axum_test::TestResponse) {
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], json!("DATABASE_ERROR"));
    assert!(body["error"]["message"].is_string());
}

#[tokio::test]
async fn test_store_failures_return_database_error() {
    let server = build_unavailable_server();

    assert_database_error(server.get("/health").await).await;
    assert_database_error(server.get("/reviews").await).await;
    assert_database_error(
        server
            .post("/reviews")
            .json(&review_body("Pho", 5.0, "a@example.com"))
            .await,
    )
    .await;
    assert_database_error(server.get("/my-favorites").await).await;
    assert_database_error(server.get("/data-analytics").await).await;
}

// ============================================================================
// CORS
// ============================================================================

#[tokio::test]
async fn test_any_origin_is_allowed() {
    let server = build_test_server();

    let response = server
        .get("/reviews")
        .add_header(
            axum::http::header::ORIGIN,
            axum::http::HeaderValue::from_static("https://delish.example"),
        )
        .await;
    response.assert_status_ok();
    assert_eq!(
        response.header(axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN),
        "*"
    );
}
