use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{check_reserved_keys, normalize_email, validate_email};

const MAX_FOOD_ID_LEN: usize = 100;

/// ユーザーがお気に入り登録したレビューへの参照。
/// `foodId` はレビュー ID への弱い参照で、参照整合性は保証しない。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub food_id: String,
    pub user_email: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFavoriteRequest {
    pub food_id: String,
    pub user_email: String,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListFavoritesQuery {
    pub email: Option<String>,
}

impl CreateFavoriteRequest {
    pub fn validate(&self) -> Result<(), String> {
        let food_id = self.food_id.trim();
        if food_id.is_empty() {
            return Err("foodId cannot be empty".to_string());
        }

        if food_id.len() > MAX_FOOD_ID_LEN {
            return Err(format!("foodId cannot exceed {} characters", MAX_FOOD_ID_LEN));
        }

        validate_email(&self.user_email)?;
        check_reserved_keys(&self.details)?;
        Ok(())
    }

    pub fn into_favorite(self) -> Favorite {
        Favorite {
            id: Uuid::new_v4(),
            food_id: self.food_id.trim().to_string(),
            user_email: normalize_email(&self.user_email),
            created_at: Utc::now(),
            details: self.details,
        }
    }
}

impl ListFavoritesQuery {
    /// Owner filter in stored (normalized) form; blank means "all".
    pub fn email(&self) -> Option<String> {
        self.email
            .as_deref()
            .map(normalize_email)
            .filter(|email| !email.is_empty())
    }
}
