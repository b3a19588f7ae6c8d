/// Integration tests for the HTTP surface, driven through the router in-process
use axum::http::StatusCode;
use axum_test::TestServer;
use backend::{build_router, state::AppState};
use engine::settlement_worker::{loss_channel, LossReceiver};
use engine::{Broadcaster, EngineConfig, HistoryStore, ManualClock, Phase, RoundEngine};
use serde_json::{json, Value};
use std::sync::Arc;

struct TestContext {
    server: TestServer,
    engine: Arc<RoundEngine>,
    clock: ManualClock,
    _losses: LossReceiver,
}

impl TestContext {
    async fn new() -> Self {
        let ctx = Self::idle();
        ctx.engine.start().await.expect("round opens");
        ctx
    }

    /// No round opened yet
    fn idle() -> Self {
        let clock = ManualClock::default();
        let (tx, rx) = loss_channel();
        let engine = Arc::new(
            RoundEngine::new(
                EngineConfig::default(),
                Arc::new(clock.clone()),
                Broadcaster::default(),
                Arc::new(HistoryStore::in_memory(50)),
                tx,
            )
            .expect("default config is valid"),
        );
        let server = TestServer::new(build_router(AppState::new(engine.clone())))
            .expect("Failed to start test server");

        Self {
            server,
            engine,
            clock,
            _losses: rx,
        }
    }

    async fn run_round_to_crash(&self) {
        self.clock.advance_ms(10_000);
        self.engine.advance().await.unwrap();
        for _ in 0..2_000 {
            self.clock.advance_ms(50);
            if self.engine.advance().await.unwrap() == Some(Phase::Crashed) {
                return;
            }
        }
        panic!("round never crashed");
    }
}

/// (code, category) of a standard error body
fn parse_error(body: &Value) -> (String, String) {
    (
        body["error"]["code"].as_str().unwrap_or_default().to_string(),
        body["error"]["category"].as_str().unwrap_or_default().to_string(),
    )
}

#[tokio::test]
async fn test_health() {
    let ctx = TestContext::new().await;

    let response = ctx.server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "healthy");

    let detailed = ctx.server.get("/health/detailed").await.json::<Value>();
    assert_eq!(detailed["components"]["engine"]["phase"], "BETTING");
    assert_eq!(detailed["components"]["history"]["sink"], "memory");
}

#[tokio::test]
async fn test_state_without_round() {
    let ctx = TestContext::idle();
    let response = ctx.server.get("/api/crash/state").await;

    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    let (code, category) = parse_error(&response.json::<Value>());
    assert_eq!(code, "STATE_NO_ACTIVE_ROUND");
    assert_eq!(category, "State");
}

#[tokio::test]
async fn test_state_hides_outcome_while_betting() {
    let ctx = TestContext::new().await;
    let body = ctx.server.get("/api/crash/state").await.json::<Value>();

    assert_eq!(body["phase"], "BETTING");
    assert_eq!(body["roundNumber"], 1);
    assert!(body["commitHash"].as_str().unwrap().len() == 64);
    assert!(body.get("serverSeed").is_none());
    assert!(body.get("crashPoint").is_none());
}

#[tokio::test]
async fn test_place_bet_and_duplicate() {
    let ctx = TestContext::new().await;

    let response = ctx
        .server
        .post("/api/crash/bets")
        .json(&json!({ "address": "alice", "amount": 100 }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body = response.json::<Value>();
    assert_eq!(body["bet"]["address"], "alice");
    assert_eq!(body["bet"]["amount"], 100);
    assert_eq!(body["bet"]["cashedOut"], false);

    let duplicate = ctx
        .server
        .post("/api/crash/bets")
        .json(&json!({ "address": "alice", "amount": 50 }))
        .await;
    assert_eq!(duplicate.status_code(), StatusCode::CONFLICT);
    let (code, category) = parse_error(&duplicate.json::<Value>());
    assert_eq!(code, "CONFLICT_DUPLICATE_BET");
    assert_eq!(category, "Conflict");
}

#[tokio::test]
async fn test_bet_validation() {
    let ctx = TestContext::new().await;

    let zero = ctx
        .server
        .post("/api/crash/bets")
        .json(&json!({ "address": "bob", "amount": 0 }))
        .await;
    assert_eq!(zero.status_code(), StatusCode::BAD_REQUEST);
    let (code, category) = parse_error(&zero.json::<Value>());
    assert_eq!(code, "VALIDATION_INVALID_AMOUNT");
    assert_eq!(category, "Validation");

    let missing = ctx
        .server
        .post("/api/crash/bets")
        .json(&json!({ "address": "bob" }))
        .await;
    assert_eq!(missing.status_code(), StatusCode::BAD_REQUEST);
    let (code, _) = parse_error(&missing.json::<Value>());
    assert_eq!(code, "VALIDATION_MISSING_FIELD");

    // blank after trimming is caught by the engine
    let blank = ctx
        .server
        .post("/api/crash/bets")
        .json(&json!({ "address": "   ", "amount": 10 }))
        .await;
    assert_eq!(blank.status_code(), StatusCode::BAD_REQUEST);
    let (code, _) = parse_error(&blank.json::<Value>());
    assert_eq!(code, "VALIDATION_INVALID_ADDRESS");
}

#[tokio::test]
async fn test_cashout_during_betting_rejected() {
    let ctx = TestContext::new().await;
    ctx.server
        .post("/api/crash/bets")
        .json(&json!({ "address": "carol", "amount": 10 }))
        .await;

    let response = ctx
        .server
        .post("/api/crash/cashouts")
        .json(&json!({ "address": "carol" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    let body = response.json::<Value>();
    assert_eq!(parse_error(&body).0, "STATE_WRONG_PHASE");
    assert_eq!(body["error"]["context"], "phase: BETTING");
}

#[tokio::test]
async fn test_history_and_verification() {
    let ctx = TestContext::new().await;
    ctx.server
        .post("/api/crash/bets")
        .json(&json!({ "address": "dave", "amount": 25 }))
        .await;
    ctx.run_round_to_crash().await;

    let history = ctx
        .server
        .get("/api/crash/history")
        .add_query_param("limit", 5)
        .await
        .json::<Value>();
    let entries = history.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["bets"][0]["address"], "dave");
    let round_id = entries[0]["roundId"].as_str().unwrap().to_string();

    let verified = ctx
        .server
        .get(&format!("/api/crash/history/{}/verify", round_id))
        .await;
    verified.assert_status_ok();
    let body = verified.json::<Value>();
    assert_eq!(body["report"]["valid"], true);
    assert_eq!(body["proof"]["serverSeed"], entries[0]["serverSeed"]);

    let zero_limit = ctx
        .server
        .get("/api/crash/history")
        .add_query_param("limit", 0)
        .await;
    assert_eq!(zero_limit.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(
        parse_error(&zero_limit.json::<Value>()).0,
        "VALIDATION_INVALID_INPUT"
    );

    let bad_id = ctx.server.get("/api/crash/history/not-a-uuid/verify").await;
    assert_eq!(bad_id.status_code(), StatusCode::BAD_REQUEST);

    let unknown = ctx
        .server
        .get("/api/crash/history/00000000-0000-4000-8000-000000000000/verify")
        .await;
    assert_eq!(unknown.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(parse_error(&unknown.json::<Value>()).0, "NOT_FOUND_ROUND");
}

#[tokio::test]
async fn test_settle_markets() {
    let ctx = TestContext::new().await;

    let response = ctx
        .server
        .post("/api/markets/settle")
        .json(&json!({
            "stakes": [
                { "marketId": "final", "outcome": "champ", "userId": "a", "displayName": "Champ", "amount": 1 },
                { "marketId": "final", "outcome": "champ", "userId": "b", "displayName": "champ", "amount": 1 },
                { "marketId": "final", "outcome": "champ", "userId": "c", "displayName": "CHAMP", "amount": 1 },
                { "marketId": "final", "outcome": "champ", "userId": "d", "displayName": "Other", "amount": 7 },
                { "marketId": "semi", "outcome": "x", "userId": "e", "amount": 100 }
            ],
            "winners": {
                "final": { "displayName": "champ" },
                "semi": { "userId": "nobody" }
            }
        }))
        .await;
    response.assert_status_ok();

    let body = response.json::<Value>();
    let markets = body["markets"].as_array().unwrap();
    assert_eq!(markets.len(), 2);

    let final_result = &markets[0]["result"];
    assert_eq!(final_result["pot"], 10);
    assert_eq!(final_result["status"], "PAID");
    let amounts: Vec<u64> = final_result["payouts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["amount"].as_u64().unwrap())
        .collect();
    assert_eq!(amounts, vec![4, 3, 3]);

    let semi = &markets[1]["result"];
    assert_eq!(semi["status"], "NO_WINNERS");
    assert_eq!(semi["houseTake"], 50);
    assert_eq!(semi["carryover"], 50);
}

#[tokio::test]
async fn test_settle_requires_stakes() {
    let ctx = TestContext::new().await;
    let response = ctx
        .server
        .post("/api/markets/settle")
        .json(&json!({ "stakes": [], "winners": {} }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}
