use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use engine::{EngineError, HistoryEntry, RoundSnapshot};
use serde_json::{json, Value};
use shared::types::RoundId;
use tracing::Instrument;

use crate::{
    domain::{BetResponse, CashoutRequest, HistoryQuery, PlaceBetRequest},
    errors::{AppError, Result},
    extractors::ValidatedJson,
    state::AppState,
};

const DEFAULT_HISTORY_LIMIT: usize = 20;

pub async fn get_state(State(state): State<AppState>) -> Result<Json<RoundSnapshot>> {
    let snapshot = state
        .engine
        .snapshot()
        .await
        .ok_or(EngineError::NoActiveRound)?;
    Ok(Json(snapshot))
}

pub async fn place_bet(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<PlaceBetRequest>,
) -> Result<(StatusCode, Json<BetResponse>)> {
    let span = tracing::info_span!("place_bet", bet.amount = req.amount);
    let bet = state
        .engine
        .register_bet(&req.address, req.amount)
        .instrument(span)
        .await?;
    tracing::info!(address = %bet.address, amount = bet.amount.as_u64(), "Bet placed");

    Ok((StatusCode::CREATED, Json(BetResponse { bet })))
}

pub async fn cash_out(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CashoutRequest>,
) -> Result<Json<BetResponse>> {
    let bet = state.engine.register_cashout(&req.address).await?;
    tracing::info!(
        address = %bet.address,
        payout = bet.payout.as_u64(),
        "Cashout accepted"
    );

    Ok(Json(BetResponse { bet }))
}

pub async fn list_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntry>>> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if limit == 0 {
        return Err(AppError::InvalidInput("limit must be positive".into()));
    }
    Ok(Json(state.engine.history().recent(limit).await))
}

pub async fn verify_round(
    State(state): State<AppState>,
    Path(round_id): Path<String>,
) -> Result<Json<Value>> {
    let round_id: RoundId = round_id
        .parse()
        .map_err(|_| AppError::InvalidInput(format!("Invalid round id: {}", round_id)))?;

    let entry = state
        .engine
        .history()
        .find(&round_id)
        .await
        .ok_or(EngineError::RoundNotFound(round_id))?;
    let report = state.engine.verify(&round_id).await?;

    Ok(Json(json!({
        "roundId": round_id,
        "proof": entry.proof(),
        "report": report,
    })))
}
