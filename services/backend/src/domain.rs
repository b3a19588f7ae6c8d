use chrono::{DateTime, Utc};
use engine::ledger::Bet;
use serde::{Deserialize, Serialize};
use shared::pari_mutuel::{MarketSettlement, MarketStake, WinnerIdentity};
use std::collections::HashMap;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PlaceBetRequest {
    #[validate(length(min = 1, max = 128))]
    pub address: String,
    #[validate(range(min = 1))]
    pub amount: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CashoutRequest {
    #[validate(length(min = 1, max = 128))]
    pub address: String,
}

#[derive(Debug, Serialize)]
pub struct BetResponse {
    pub bet: Bet,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// Flat list of stakes plus the winning identity per market
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SettleMarketsRequest {
    #[validate(length(min = 1))]
    pub stakes: Vec<MarketStake>,
    pub winners: HashMap<String, WinnerIdentity>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleMarketsResponse {
    pub settled_at: DateTime<Utc>,
    pub markets: Vec<MarketSettlement>,
}
