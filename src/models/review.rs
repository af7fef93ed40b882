use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;
use uuid::Uuid;

use super::{check_reserved_keys, normalize_email, validate_email};

const MAX_FOOD_NAME_LEN: usize = 200;
const MIN_RATING: f64 = 0.0;
const MAX_RATING: f64 = 5.0;

/// 保存済みのレビューを表すドメインモデル。
/// 型付きのコア (`foodName` / `rating` / `userEmail` / `createdAt`) 以外のキーは
/// `details` にそのまま保持し、JSON 化の際は `#[serde(flatten)]` で同じ階層に展開する。
/// `rating` は `4` と `4.0` を区別したまま返せるよう、JSON の数値表現のまま持つ。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub food_name: String,
    pub rating: Number,
    pub user_email: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// レビュー作成 API が受け取るペイロード。
/// `createdAt` は省略可能で、省略時はサーバー側の現在時刻で埋める。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReviewRequest {
    pub food_name: String,
    pub rating: Number,
    pub user_email: String,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// レビュー更新 API の入力。部分更新なので型付きフィールドはすべて `Option`。
/// それ以外のキーは `details` にマージされる。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReviewRequest {
    pub food_name: Option<String>,
    pub rating: Option<Number>,
    pub user_email: Option<String>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// Validated, normalized form of an [`UpdateReviewRequest`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewChanges {
    pub food_name: Option<String>,
    pub rating: Option<Number>,
    pub user_email: Option<String>,
    pub details: Map<String, Value>,
}

/// Result ordering for review listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReviewSort {
    /// Newest first
    #[default]
    Recent,
    /// Highest rating first, newest first among equal ratings
    Top,
}

/// Raw query string of `GET /reviews`.
/// 空文字列は「指定なし」として扱いたいので、すべて文字列で受けてから `into_filter` で解釈する。
#[derive(Debug, Default, Deserialize)]
pub struct ListReviewsQuery {
    pub email: Option<String>,
    pub search: Option<String>,
    pub limit: Option<String>,
    pub sort: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewFilter {
    pub email: Option<String>,
    pub search: Option<String>,
    pub limit: Option<u32>,
    pub sort: ReviewSort,
}

impl Review {
    /// Numeric value of `rating` for comparisons and sorting.
    pub fn rating_value(&self) -> f64 {
        self.rating.as_f64().unwrap_or_default()
    }

    /// 変更内容をマージし、実際に値が変わったかどうかを返す。
    /// 同じ値での上書きは変更とみなさない。
    pub fn apply(&mut self, changes: ReviewChanges) -> bool {
        let mut changed = false;

        if let Some(food_name) = changes.food_name {
            if food_name != self.food_name {
                self.food_name = food_name;
                changed = true;
            }
        }

        // `4` over `4.0` is the same value, not a change
        if let Some(rating) = changes.rating {
            if rating.as_f64() != self.rating.as_f64() {
                self.rating = rating;
                changed = true;
            }
        }

        if let Some(user_email) = changes.user_email {
            if user_email != self.user_email {
                self.user_email = user_email;
                changed = true;
            }
        }

        for (key, value) in changes.details {
            if self.details.get(&key) != Some(&value) {
                self.details.insert(key, value);
                changed = true;
            }
        }

        changed
    }
}

impl CreateReviewRequest {
    pub fn validate(&self) -> Result<(), String> {
        validate_food_name(&self.food_name)?;
        validate_rating(&self.rating)?;
        validate_email(&self.user_email)?;
        check_reserved_keys(&self.details)?;
        Ok(())
    }

    /// 入力をトリム・正規化して `Review` に変換する。ID はここで採番する。
    pub fn into_review(self) -> Review {
        Review {
            id: Uuid::new_v4(),
            food_name: self.food_name.trim().to_string(),
            rating: self.rating,
            user_email: normalize_email(&self.user_email),
            created_at: self.created_at.unwrap_or_else(Utc::now),
            details: self.details,
        }
    }
}

impl UpdateReviewRequest {
    /// 更新時は少なくとも 1 フィールドが必要。
    /// 指定されたフィールドだけ作成時と同じルールで検証する。
    pub fn validate(&self) -> Result<(), String> {
        if self.food_name.is_none()
            && self.rating.is_none()
            && self.user_email.is_none()
            && self.details.is_empty()
        {
            return Err("At least one field must be provided for update".to_string());
        }

        if let Some(ref food_name) = self.food_name {
            validate_food_name(food_name)?;
        }

        if let Some(ref rating) = self.rating {
            validate_rating(rating)?;
        }

        if let Some(ref user_email) = self.user_email {
            validate_email(user_email)?;
        }

        check_reserved_keys(&self.details)?;
        Ok(())
    }

    pub fn into_changes(self) -> ReviewChanges {
        ReviewChanges {
            food_name: self.food_name.map(|name| name.trim().to_string()),
            rating: self.rating,
            user_email: self.user_email.as_deref().map(normalize_email),
            details: self.details,
        }
    }
}

impl ReviewSort {
    /// Total order used by in-process listings; mirrors the SQL `ORDER BY`.
    pub fn compare(&self, a: &Review, b: &Review) -> Ordering {
        match self {
            ReviewSort::Recent => b.created_at.cmp(&a.created_at),
            ReviewSort::Top => b
                .rating_value()
                .total_cmp(&a.rating_value())
                .then_with(|| b.created_at.cmp(&a.created_at)),
        }
    }
}

impl ListReviewsQuery {
    pub fn into_filter(self) -> Result<ReviewFilter, String> {
        let limit = match non_empty(self.limit) {
            None => None,
            Some(raw) => match raw.parse::<u32>() {
                Ok(0) => return Err("limit must be greater than 0".to_string()),
                Ok(limit) => Some(limit),
                Err(_) => return Err(format!("limit must be a positive integer, got '{}'", raw)),
            },
        };

        let sort = match non_empty(self.sort).as_deref() {
            None | Some("recent") => ReviewSort::Recent,
            Some("top") => ReviewSort::Top,
            Some(other) => {
                return Err(format!("Unknown sort '{}', expected 'top' or 'recent'", other))
            }
        };

        Ok(ReviewFilter {
            email: non_empty(self.email).map(|email| normalize_email(&email)),
            search: non_empty(self.search),
            limit,
            sort,
        })
    }
}

impl ReviewFilter {
    /// `search` は大文字小文字を無視した部分一致 (SQL 側では `ILIKE`)。
    pub fn matches(&self, review: &Review) -> bool {
        if let Some(ref email) = self.email {
            if review.user_email != *email {
                return false;
            }
        }

        if let Some(ref search) = self.search {
            if !review
                .food_name
                .to_lowercase()
                .contains(&search.to_lowercase())
            {
                return false;
            }
        }

        true
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_food_name(food_name: &str) -> Result<(), String> {
    if food_name.trim().is_empty() {
        return Err("foodName cannot be empty".to_string());
    }

    if food_name.trim().chars().count() > MAX_FOOD_NAME_LEN {
        return Err(format!("foodName cannot exceed {} characters", MAX_FOOD_NAME_LEN));
    }

    Ok(())
}

fn validate_rating(rating: &Number) -> Result<(), String> {
    let in_range = rating
        .as_f64()
        .is_some_and(|value| value.is_finite() && (MIN_RATING..=MAX_RATING).contains(&value));
    if !in_range {
        return Err(format!(
            "rating must be a number between {} and {}",
            MIN_RATING, MAX_RATING
        ));
    }

    Ok(())
}
