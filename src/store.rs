//! Store abstraction shared by the PostgreSQL backend and the in-process backend.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::models::{Favorite, Review, ReviewChanges, ReviewFilter};

/// 部分更新の結果。「レコードが存在しない」と「値が何も変わらなかった」を区別する。
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    NotFound,
    Unchanged,
    Modified(Review),
}

/// ハンドラーから見たストアの操作一覧。
/// `Arc<dyn Store>` として axum の `State` に注入される。
#[async_trait]
pub trait Store: Send + Sync {
    /// Cheap round trip used by `GET /health`.
    async fn health_check(&self) -> ApiResult<()>;

    async fn insert_review(&self, review: Review) -> ApiResult<Uuid>;

    async fn find_reviews(&self, filter: &ReviewFilter) -> ApiResult<Vec<Review>>;

    async fn find_review(&self, id: Uuid) -> ApiResult<Option<Review>>;

    /// Merge `changes` into the review atomically.
    async fn update_review(&self, id: Uuid, changes: ReviewChanges) -> ApiResult<UpdateOutcome>;

    /// Returns whether a review was removed.
    async fn delete_review(&self, id: Uuid) -> ApiResult<bool>;

    /// Insert unless a favorite for the same (`foodId`, `userEmail`) exists.
    /// The check and the insert are one atomic step; `None` means it already existed.
    async fn insert_favorite(&self, favorite: Favorite) -> ApiResult<Option<Uuid>>;

    async fn find_favorites(&self, email: Option<&str>) -> ApiResult<Vec<Favorite>>;

    /// Returns the number of removed favorites (0 or 1).
    async fn delete_favorite(&self, id: Uuid) -> ApiResult<u64>;

    async fn count_reviews(&self) -> ApiResult<u64>;

    async fn count_favorites(&self) -> ApiResult<u64>;

    /// Release backend resources once the server has drained.
    async fn close(&self) {}
}

pub type SharedStore = Arc<dyn Store>;

#[derive(Debug, Default)]
struct Collections {
    // Insertion order, oldest first
    reviews: Vec<Review>,
    favorites: Vec<Favorite>,
}

/// プロセス内で完結するストア。ローカル開発と HTTP テストで使う。
/// 1 つの `RwLock` で両コレクションを守るので、書き込み系の操作はすべて原子的。
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        info!("Using in-memory store");
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> ApiResult<()> {
        Ok(())
    }

    async fn insert_review(&self, review: Review) -> ApiResult<Uuid> {
        let id = review.id;
        self.inner.write().await.reviews.push(review);
        Ok(id)
    }

    async fn find_reviews(&self, filter: &ReviewFilter) -> ApiResult<Vec<Review>> {
        let collections = self.inner.read().await;

        // Newest insert first so the stable sort breaks timestamp ties the same way
        let mut reviews: Vec<Review> = collections
            .reviews
            .iter()
            .rev()
            .filter(|review| filter.matches(review))
            .cloned()
            .collect();
        reviews.sort_by(|a, b| filter.sort.compare(a, b));

        if let Some(limit) = filter.limit {
            reviews.truncate(limit as usize);
        }

        Ok(reviews)
    }

    async fn find_review(&self, id: Uuid) -> ApiResult<Option<Review>> {
        let collections = self.inner.read().await;
        Ok(collections.reviews.iter().find(|r| r.id == id).cloned())
    }

    async fn update_review(&self, id: Uuid, changes: ReviewChanges) -> ApiResult<UpdateOutcome> {
        let mut collections = self.inner.write().await;

        let Some(review) = collections.reviews.iter_mut().find(|r| r.id == id) else {
            return Ok(UpdateOutcome::NotFound);
        };

        if review.apply(changes) {
            Ok(UpdateOutcome::Modified(review.clone()))
        } else {
            Ok(UpdateOutcome::Unchanged)
        }
    }

    async fn delete_review(&self, id: Uuid) -> ApiResult<bool> {
        let mut collections = self.inner.write().await;
        let before = collections.reviews.len();
        collections.reviews.retain(|r| r.id != id);
        Ok(collections.reviews.len() < before)
    }

    async fn insert_favorite(&self, favorite: Favorite) -> ApiResult<Option<Uuid>> {
        let mut collections = self.inner.write().await;

        let exists = collections
            .favorites
            .iter()
            .any(|f| f.food_id == favorite.food_id && f.user_email == favorite.user_email);
        if exists {
            return Ok(None);
        }

        let id = favorite.id;
        collections.favorites.push(favorite);
        Ok(Some(id))
    }

    async fn find_favorites(&self, email: Option<&str>) -> ApiResult<Vec<Favorite>> {
        let collections = self.inner.read().await;
        Ok(collections
            .favorites
            .iter()
            .rev()
            .filter(|f| email.map_or(true, |email| f.user_email == email))
            .cloned()
            .collect())
    }

    async fn delete_favorite(&self, id: Uuid) -> ApiResult<u64> {
        let mut collections = self.inner.write().await;
        let before = collections.favorites.len();
        collections.favorites.retain(|f| f.id != id);
        Ok((before - collections.favorites.len()) as u64)
    }

    async fn count_reviews(&self) -> ApiResult<u64> {
        Ok(self.inner.read().await.reviews.len() as u64)
    }

    async fn count_favorites(&self) -> ApiResult<u64> {
        Ok(self.inner.read().await.favorites.len() as u64)
    }
}
