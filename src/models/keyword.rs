//! Keyword research records.

use serde::{Deserialize, Serialize};

/// Monthly search volume for a keyword.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeywordVolume {
    pub keyword: String,

    /// PC searches per month
    pub pc: u64,

    /// Mobile searches per month
    pub mobile: u64,
}

impl KeywordVolume {
    pub fn total(&self) -> u64 {
        self.pc + self.mobile
    }
}

/// Shopping category a keyword maps to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeywordCategory {
    pub keyword: String,

    /// Category path, e.g. `"Food > Snacks > Cookies"`. Empty when unknown.
    pub category: String,
}
