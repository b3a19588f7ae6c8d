use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::types::RoundId;
use std::fmt;

use crate::fairness::{FairnessProof, RoundOutcome};
use crate::ledger::{Bet, BetLedger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Betting,
    Running,
    Crashed,
    Cooldown,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Betting => "BETTING",
            Phase::Running => "RUNNING",
            Phase::Crashed => "CRASHED",
            Phase::Cooldown => "COOLDOWN",
        }
    }

    /// Seed and crash point may be published
    pub fn is_revealed(&self) -> bool {
        matches!(self, Phase::Crashed | Phase::Cooldown)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One play cycle, owned by the engine behind its round lock
#[derive(Debug)]
pub struct Round {
    pub(crate) id: RoundId,
    pub(crate) number: u64,
    pub(crate) phase: Phase,
    pub(crate) outcome: RoundOutcome,
    pub(crate) house_edge_bps: i64,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) betting_closes_at: DateTime<Utc>,
    pub(crate) running_started_at: Option<DateTime<Utc>>,
    pub(crate) crashed_at: Option<DateTime<Utc>>,
    pub(crate) cooldown_ends_at: Option<DateTime<Utc>>,
    pub(crate) current_multiplier: f64,
    pub(crate) ledger: BetLedger,
}

impl Round {
    pub(crate) fn open(
        id: RoundId,
        number: u64,
        outcome: RoundOutcome,
        house_edge_bps: i64,
        now: DateTime<Utc>,
        betting_window: chrono::Duration,
        start_multiplier: f64,
    ) -> Self {
        Self {
            id,
            number,
            phase: Phase::Betting,
            outcome,
            house_edge_bps,
            created_at: now,
            betting_closes_at: now + betting_window,
            running_started_at: None,
            crashed_at: None,
            cooldown_ends_at: None,
            current_multiplier: start_multiplier,
            ledger: BetLedger::new(),
        }
    }

    pub fn id(&self) -> RoundId {
        self.id
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn commit_hash(&self) -> &str {
        &self.outcome.commit_hash
    }

    pub fn current_multiplier(&self) -> f64 {
        self.current_multiplier
    }

    pub fn bets(&self) -> &[Bet] {
        self.ledger.bets()
    }

    /// `None` until the round has crashed
    pub fn proof(&self) -> Option<FairnessProof> {
        if !self.phase.is_revealed() {
            return None;
        }
        Some(FairnessProof {
            round_id: self.id,
            commit_hash: self.outcome.commit_hash.clone(),
            server_seed: self.outcome.seed.to_hex(),
            derived_hash: self.outcome.derived_hash.clone(),
            u: self.outcome.u,
            crash_point: self.outcome.crash_point,
            house_edge_bps: self.house_edge_bps,
        })
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        let revealed = self.phase.is_revealed();
        RoundSnapshot {
            round_id: self.id,
            round_number: self.number,
            phase: self.phase,
            commit_hash: self.outcome.commit_hash.clone(),
            created_at: self.created_at,
            betting_closes_at: self.betting_closes_at,
            running_started_at: self.running_started_at,
            crashed_at: self.crashed_at,
            cooldown_ends_at: self.cooldown_ends_at,
            current_multiplier: self.current_multiplier,
            bets: self.ledger.bets().to_vec(),
            server_seed: revealed.then(|| self.outcome.seed.to_hex()),
            derived_hash: revealed.then(|| self.outcome.derived_hash.clone()),
            u: revealed.then_some(self.outcome.u),
            crash_point: revealed.then_some(self.outcome.crash_point),
            crash_point_display: revealed.then_some(self.outcome.crash_point_display),
        }
    }
}

/// Read-only view of a round; outcome fields are `None` before CRASHED
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSnapshot {
    pub round_id: RoundId,
    pub round_number: u64,
    pub phase: Phase,
    pub commit_hash: String,
    pub created_at: DateTime<Utc>,
    pub betting_closes_at: DateTime<Utc>,
    pub running_started_at: Option<DateTime<Utc>>,
    pub crashed_at: Option<DateTime<Utc>>,
    pub cooldown_ends_at: Option<DateTime<Utc>>,
    pub current_multiplier: f64,
    pub bets: Vec<Bet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_seed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derived_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub u: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crash_point: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crash_point_display: Option<f64>,
}
