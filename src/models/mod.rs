// Models module

pub mod analytics;
pub mod favorite;
pub mod review;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// Re-export commonly used types
pub use analytics::Analytics;
pub use favorite::{CreateFavoriteRequest, Favorite, ListFavoritesQuery};
pub use review::{
    CreateReviewRequest, ListReviewsQuery, Review, ReviewChanges, ReviewFilter, ReviewSort,
    UpdateReviewRequest,
};

/// 挿入成功時に返す確認応答。
/// クライアントは `insertedId` から新しいレコードの ID を受け取る。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertResult {
    pub acknowledged: bool,
    pub inserted_id: Uuid,
}

impl InsertResult {
    pub fn new(inserted_id: Uuid) -> Self {
        InsertResult {
            acknowledged: true,
            inserted_id,
        }
    }
}

/// Keys that clients may never set through the free-form part of a record.
const RESERVED_KEYS: &[&str] = &["_id", "createdAt"];

/// 任意フィールド (`#[serde(flatten)]` で集めた Map) に予約キーが紛れていないか確認する。
pub(crate) fn check_reserved_keys(details: &Map<String, Value>) -> Result<(), String> {
    match RESERVED_KEYS.iter().find(|key| details.contains_key(**key)) {
        Some(key) => Err(format!("Field '{}' cannot be set by the client", key)),
        None => Ok(()),
    }
}

pub(crate) fn validate_email(email: &str) -> Result<(), String> {
    if email.trim().is_empty() {
        return Err("userEmail cannot be empty".to_string());
    }

    if email.len() > 255 {
        return Err("userEmail cannot exceed 255 characters".to_string());
    }

    if !is_valid_email(email.trim()) {
        return Err("Invalid userEmail format".to_string());
    }

    Ok(())
}

/// メールは大小区別しないので、保存時も検索時もこの形に揃える。
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// シンプルなメールフォーマット検証。
/// 正規表現を使わず、`split_once('@')` で分けた各部分を最小限のルールでチェックする。
fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    if local.is_empty() || local.len() > 64 {
        return false;
    }

    if domain.is_empty() || domain.len() > 253 || !domain.contains('.') {
        return false;
    }

    if domain.starts_with('.') || domain.ends_with('.') {
        return false;
    }

    let valid_local = |c: char| c.is_alphanumeric() || ".-_+".contains(c);
    let valid_domain = |c: char| c.is_alphanumeric() || ".-".contains(c);

    local.chars().all(valid_local) && domain.chars().all(valid_domain)
}
