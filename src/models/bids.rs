//! Search-ad bid analysis records.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ad placement surface. Bids are quoted separately for each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    Pc,
    Mobile,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Device::Pc => "pc",
            Device::Mobile => "mobile",
        })
    }
}

/// Bid required to reach one ad position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidPosition {
    /// 1-based ad slot
    pub position: u32,

    /// Bid in KRW
    pub bid_price: u64,
}

/// Monthly search and click statistics for a keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordBasics {
    pub keyword: String,
    pub pc_search_volume: u64,
    pub mobile_search_volume: u64,
    pub pc_clicks: f64,
    /// Percent
    pub pc_ctr: f64,
    pub mobile_clicks: f64,
    /// Percent
    pub mobile_ctr: f64,
}

/// Basics plus the bid ladder for both devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidAnalysis {
    pub basics: KeywordBasics,
    pub pc_bids: Vec<BidPosition>,
    pub mobile_bids: Vec<BidPosition>,
}

impl BidAnalysis {
    pub fn keyword(&self) -> &str {
        &self.basics.keyword
    }

    pub fn bids(&self, device: Device) -> &[BidPosition] {
        match device {
            Device::Pc => &self.pc_bids,
            Device::Mobile => &self.mobile_bids,
        }
    }

    /// Bid for the top slot.
    pub fn first_position_bid(&self, device: Device) -> Option<u64> {
        self.bids(device)
            .iter()
            .min_by_key(|b| b.position)
            .map(|b| b.bid_price)
    }

    /// Cheapest bid that still gets a first-page slot.
    pub fn min_exposure_bid(&self, device: Device) -> Option<u64> {
        self.bids(device).iter().map(|b| b.bid_price).min()
    }

    /// Number of first-page slots quoted.
    pub fn first_page_positions(&self, device: Device) -> usize {
        self.bids(device).len()
    }
}
