use serde::{Deserialize, Serialize};

/// Collection totals served by `GET /data-analytics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub total_reviews: u64,
    pub total_favorites: u64,
}
