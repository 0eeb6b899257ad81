//! Community board crawl records.

use serde::{Deserialize, Serialize};

/// A board inside a cafe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CafeBoard {
    pub cafe_id: String,
    pub board_id: String,
    pub name: String,
}

/// An article author seen on a board page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CafeMember {
    pub user_id: String,
    pub nickname: String,

    /// Articles attributed to this member
    #[serde(default = "one")]
    pub article_count: u32,
}

fn one() -> u32 {
    1
}

impl CafeMember {
    pub fn new(user_id: impl Into<String>, nickname: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            nickname: nickname.into(),
            article_count: 1,
        }
    }
}
