//! Product rank tracking records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a tracked product appeared in one keyword's search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankCheck {
    pub keyword: String,
    pub product_id: String,

    /// 1-based position; `None` if the product was not in the searched range
    pub rank: Option<u32>,

    pub checked_at: DateTime<Utc>,
}

impl RankCheck {
    /// Positions gained since `previous` (positive means moved up).
    ///
    /// `None` when either check did not find the product.
    pub fn change_since(&self, previous: Option<u32>) -> Option<i64> {
        Some(i64::from(previous?) - i64::from(self.rank?))
    }
}
