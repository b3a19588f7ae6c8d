use axum::Json;
use shared::pari_mutuel::{settle_markets, SettlementStatus};

use crate::{
    domain::{SettleMarketsRequest, SettleMarketsResponse},
    errors::Result,
    extractors::ValidatedJson,
};

/// Pari-mutuel settlement of every market with a resolved winner
pub async fn settle(
    ValidatedJson(req): ValidatedJson<SettleMarketsRequest>,
) -> Result<Json<SettleMarketsResponse>> {
    let markets = settle_markets(&req.stakes, &req.winners);

    for market in &markets {
        tracing::info!(
            market_id = %market.market_id,
            outcome = %market.outcome,
            pot = %market.result.pot,
            winners = market.result.payouts.len(),
            house_take = %market.result.house_take,
            carryover = %market.result.carryover,
            no_winners = market.result.status == SettlementStatus::NoWinners,
            "Market settled"
        );
    }

    Ok(Json(SettleMarketsResponse {
        settled_at: chrono::Utc::now(),
        markets,
    }))
}
